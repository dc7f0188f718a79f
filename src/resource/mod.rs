//! Resource operations on top of the mapping engine

pub mod attribute_filter;
pub mod service;

pub use attribute_filter::AttributeFilter;
pub use service::{
    GetResourcesRequest, QueryParams, ResourceService, Resources, ServiceSettings, DEFAULT_BACKEND,
};
