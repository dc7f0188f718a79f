//! Pooled backend for a remote directory server

use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::directory::{
    AddRequest, Control, DeleteRequest, DirectoryBackendConfig, DirectoryResult, ModifyRequest, OperationResult,
    SearchRequest, SearchResult, WithControls,
};
use super::pool::{ConnectionFactory, ConnectionPool, PooledConnection};
use super::{BackendCapabilities, BackendType, DirectoryBackend, RequestContext, RequestInterface};
use crate::error::{AppError, AppResult};

pub struct ExternalDirectoryBackend {
    pool: ConnectionPool,
    capabilities: BackendCapabilities,
    url: String,
}

impl ExternalDirectoryBackend {
    /// Build the pool and read the server's supported controls once
    pub fn connect(config: &DirectoryBackendConfig, factory: Arc<dyn ConnectionFactory>) -> AppResult<Self> {
        config.validate().map_err(AppError::Configuration)?;
        let pool = ConnectionPool::new(
            factory,
            config.max_connections as usize,
            Duration::from_secs(config.connection_timeout),
        );

        let capabilities = {
            let connection = pool.acquire()?;
            let root_dse = connection.root_dse()?;
            BackendCapabilities::from_supported_controls(root_dse.values("supportedControl"))
        };
        info!(
            url = %config.url,
            sort = capabilities.server_side_sort,
            vlv = capabilities.virtual_list_view,
            post_read = capabilities.post_read,
            proxied_auth = capabilities.proxied_authorization,
            "Connected to external directory"
        );

        Ok(Self {
            pool,
            capabilities,
            url: config.url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

impl DirectoryBackend for ExternalDirectoryBackend {
    fn request_interface(&self, context: &RequestContext) -> AppResult<Box<dyn RequestInterface + '_>> {
        let authorization = match &context.authz_dn {
            Some(_) if !self.capabilities.proxied_authorization => {
                return Err(AppError::Forbidden(
                    "the directory does not support acting on behalf of the caller".to_string(),
                ));
            }
            Some(dn) => Some(format!("dn:{}", dn)),
            None => None,
        };
        let connection = self.pool.acquire()?;
        Ok(Box::new(ProxiedConnection {
            connection,
            authorization,
            broken: Cell::new(false),
        }))
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    fn backend_type(&self) -> BackendType {
        BackendType::External
    }
}

/// A pooled connection that acts for one caller
struct ProxiedConnection<'a> {
    connection: PooledConnection<'a>,
    authorization: Option<String>,
    broken: Cell<bool>,
}

impl ProxiedConnection<'_> {
    fn run<R, T>(
        &self,
        request: &R,
        operation: impl FnOnce(&(dyn RequestInterface + Send), &R) -> DirectoryResult<T>,
    ) -> DirectoryResult<T>
    where
        R: WithControls + Clone,
    {
        let result = match &self.authorization {
            Some(id) => {
                let mut request = request.clone();
                request.add_control(Control::ProxiedAuthorization(id.clone()));
                operation(&*self.connection, &request)
            }
            None => operation(&*self.connection, request),
        };
        if let Err(e) = &result {
            if e.code.is_connection_error() {
                self.broken.set(true);
            }
        }
        result
    }
}

impl RequestInterface for ProxiedConnection<'_> {
    fn search(&self, request: &SearchRequest) -> DirectoryResult<SearchResult> {
        self.run(request, |c, r| c.search(r))
    }

    fn add(&self, request: &AddRequest) -> DirectoryResult<OperationResult> {
        self.run(request, |c, r| c.add(r))
    }

    fn modify(&self, request: &ModifyRequest) -> DirectoryResult<OperationResult> {
        self.run(request, |c, r| c.modify(r))
    }

    fn delete(&self, request: &DeleteRequest) -> DirectoryResult<OperationResult> {
        self.run(request, |c, r| c.delete(r))
    }
}

impl Drop for ProxiedConnection<'_> {
    fn drop(&mut self) {
        if self.broken.get() {
            self.connection.mark_broken();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::directory::request::{OID_SERVER_SIDE_SORT, OID_VIRTUAL_LIST_VIEW};
    use crate::backend::directory::{DirectoryFilter, Entry, SearchScope};
    use crate::backend::EmbeddedDirectory;

    fn config() -> DirectoryBackendConfig {
        DirectoryBackendConfig::external("ldap://localhost:1389".to_string()).with_max_connections(2)
    }

    fn seeded(directory: EmbeddedDirectory) -> EmbeddedDirectory {
        directory
            .load_entry(Entry::new("dc=example,dc=com").with_attribute("objectClass", ["top", "domain"]))
            .unwrap();
        directory
    }

    #[test]
    fn test_capabilities_detected_at_connect() {
        let directory = seeded(EmbeddedDirectory::with_supported_controls(&[
            OID_SERVER_SIDE_SORT,
            OID_VIRTUAL_LIST_VIEW,
        ]));
        let backend = ExternalDirectoryBackend::connect(&config(), Arc::new(directory.clone())).unwrap();
        assert!(backend.capabilities().can_page());
        assert!(!backend.capabilities().post_read);
        assert_eq!(backend.pool().open_connections(), 1);
        assert_eq!(directory.connections_opened(), 1);
    }

    #[test]
    fn test_requests_carry_caller_identity() {
        let directory = seeded(EmbeddedDirectory::new());
        let backend = ExternalDirectoryBackend::connect(&config(), Arc::new(directory.clone())).unwrap();
        let handle = backend
            .request_interface(&RequestContext::as_user("uid=admin,dc=example,dc=com"))
            .unwrap();
        let request = SearchRequest::new("dc=example,dc=com", SearchScope::Base, DirectoryFilter::present("objectClass"));
        assert_eq!(handle.search(&request).unwrap().entries.len(), 1);
        assert_eq!(directory.authorization_ids(), vec!["dn:uid=admin,dc=example,dc=com".to_string()]);
    }

    #[test]
    fn test_caller_identity_requires_proxied_authorization() {
        let directory = seeded(EmbeddedDirectory::with_supported_controls(&[OID_SERVER_SIDE_SORT]));
        let backend = ExternalDirectoryBackend::connect(&config(), Arc::new(directory)).unwrap();
        let err = backend
            .request_interface(&RequestContext::as_user("uid=admin,dc=example,dc=com"))
            .err()
            .unwrap();
        assert_eq!(err.status(), 403);
        assert!(backend.request_interface(&RequestContext::anonymous()).is_ok());
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let config = DirectoryBackendConfig::external("http://localhost".to_string());
        let err = ExternalDirectoryBackend::connect(&config, Arc::new(EmbeddedDirectory::new()))
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Configuration(_)));
    }
}
