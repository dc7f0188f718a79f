pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod mapping;
pub mod models;
pub mod parser;
pub mod registry;
pub mod resource;
pub mod schema;
pub mod utils;

// Re-export commonly used types for easier access
pub use backend::{DirectoryBackend, EmbeddedDirectory, RequestContext};
pub use config::GatewayConfig;
pub use error::{AppError, AppResult};
pub use mapping::ResourceMapper;
pub use models::{ScimAttribute, ScimObject};
pub use resource::{AttributeFilter, GetResourcesRequest, ResourceService};
