use std::sync::Arc;
use tracing::info;

use crate::error::{AppError, AppResult};

pub mod directory;
pub mod embedded;
pub mod external;
pub mod pool;

use directory::request::{OID_POST_READ, OID_PROXIED_AUTHORIZATION, OID_SERVER_SIDE_SORT, OID_VIRTUAL_LIST_VIEW};
use directory::{
    AddRequest, DeleteRequest, DirectoryBackendConfig, DirectoryFilter, DirectoryResult, Entry, ModifyRequest,
    OperationResult, SearchRequest, SearchResult, SearchScope,
};
pub use embedded::EmbeddedDirectory;
pub use external::ExternalDirectoryBackend;
pub use pool::{ConnectionFactory, ConnectionPool};

/// Supported directory backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// In-process directory, no connection handling
    Embedded,
    /// Remote directory reached through a connection pool
    External,
}

/// Directory operations available to the mapping engine
///
/// An implementation is one connection, or a handle to an embedded
/// directory. Obtain one per call through [`DirectoryBackend::request_interface`].
pub trait RequestInterface {
    fn search(&self, request: &SearchRequest) -> DirectoryResult<SearchResult>;

    fn add(&self, request: &AddRequest) -> DirectoryResult<OperationResult>;

    fn modify(&self, request: &ModifyRequest) -> DirectoryResult<OperationResult>;

    fn delete(&self, request: &DeleteRequest) -> DirectoryResult<OperationResult>;

    /// Read the root DSE with its advertised controls
    fn root_dse(&self) -> DirectoryResult<Entry> {
        let request = SearchRequest::new("", SearchScope::Base, DirectoryFilter::present("objectClass"))
            .with_attributes(vec!["supportedControl".to_string(), "namingContexts".to_string()]);
        self.search(&request)?
            .entries
            .into_iter()
            .next()
            .ok_or_else(|| directory::DirectoryError::no_such_object("root DSE"))
    }
}

/// What the directory can do, detected once when the backend starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackendCapabilities {
    pub server_side_sort: bool,
    pub virtual_list_view: bool,
    pub post_read: bool,
    pub proxied_authorization: bool,
}

impl BackendCapabilities {
    /// Everything supported
    pub fn all() -> Self {
        Self {
            server_side_sort: true,
            virtual_list_view: true,
            post_read: true,
            proxied_authorization: true,
        }
    }

    pub fn from_supported_controls<S: AsRef<str>>(oids: &[S]) -> Self {
        let has = |oid: &str| oids.iter().any(|o| o.as_ref() == oid);
        Self {
            server_side_sort: has(OID_SERVER_SIDE_SORT),
            virtual_list_view: has(OID_VIRTUAL_LIST_VIEW),
            post_read: has(OID_POST_READ),
            proxied_authorization: has(OID_PROXIED_AUTHORIZATION),
        }
    }

    /// Windowed searches need both sort and VLV
    pub fn can_page(&self) -> bool {
        self.server_side_sort && self.virtual_list_view
    }
}

/// Who a request runs on behalf of
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// DN of the authenticated caller; `None` runs as the backend's own identity
    pub authz_dn: Option<String>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn as_user(dn: &str) -> Self {
        Self {
            authz_dn: Some(dn.to_string()),
        }
    }
}

/// Source of [`RequestInterface`] handles
pub trait DirectoryBackend: Send + Sync {
    /// A handle for one call, acting for the caller in `context`
    fn request_interface(&self, context: &RequestContext) -> AppResult<Box<dyn RequestInterface + '_>>;

    fn capabilities(&self) -> BackendCapabilities;

    fn backend_type(&self) -> BackendType;
}

/// Factory for creating backend instances
pub struct BackendFactory;

impl BackendFactory {
    /// Create a backend based on configuration.
    ///
    /// An external backend also needs a connection factory; use
    /// [`BackendFactory::create_external`] for that.
    pub fn create(config: &DirectoryBackendConfig) -> AppResult<Arc<dyn DirectoryBackend>> {
        config.validate().map_err(AppError::Configuration)?;
        match config.backend_type {
            BackendType::Embedded => {
                info!("Using embedded directory backend");
                Ok(Arc::new(EmbeddedDirectory::new()))
            }
            BackendType::External => Err(AppError::Configuration(
                "an external directory backend needs a connection factory".to_string(),
            )),
        }
    }

    /// Create a pooled backend for an external directory
    pub fn create_external(
        config: &DirectoryBackendConfig,
        factory: Arc<dyn ConnectionFactory>,
    ) -> AppResult<Arc<dyn DirectoryBackend>> {
        let backend = ExternalDirectoryBackend::connect(config, factory)?;
        Ok(Arc::new(backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_from_controls() {
        let capabilities = BackendCapabilities::from_supported_controls(&[OID_SERVER_SIDE_SORT, OID_POST_READ]);
        assert!(capabilities.server_side_sort);
        assert!(capabilities.post_read);
        assert!(!capabilities.virtual_list_view);
        assert!(!capabilities.can_page());
        assert!(BackendCapabilities::all().can_page());
    }

    #[test]
    fn test_factory_requires_connector_for_external() {
        let config = DirectoryBackendConfig::external("ldap://localhost:389".to_string());
        let err = BackendFactory::create(&config).err().unwrap();
        assert_eq!(err.status(), 500);

        let embedded = BackendFactory::create(&DirectoryBackendConfig::embedded()).unwrap();
        assert_eq!(embedded.backend_type(), BackendType::Embedded);
        assert!(embedded.capabilities().can_page());
    }
}
