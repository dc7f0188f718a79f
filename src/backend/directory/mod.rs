//! Directory data model shared by the backends and the mapping engine
//!
//! Entries, native filters, requests with their controls and result codes.
//! The wire protocol itself lives behind [`crate::backend::RequestInterface`].

pub mod config;
pub mod entry;
pub mod filter;
pub mod request;
pub mod result_code;

pub use config::DirectoryBackendConfig;
pub use entry::{DirAttribute, Entry, Modification, ModificationType};
pub use filter::DirectoryFilter;
pub use request::{
    AddRequest, Control, DeleteRequest, ModifyRequest, OperationResult, SearchRequest, SearchResult, SearchScope,
    SortKey, VlvRequest, VlvResponse, WithControls,
};
pub use result_code::{DirectoryError, DirectoryResult, ResultCode};
