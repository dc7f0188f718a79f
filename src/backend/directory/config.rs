use crate::backend::BackendType;

/// Configuration for directory backends
///
/// Holds what is needed to reach the directory: an embedded instance needs
/// nothing, an external one needs a URL, bind credentials and pool limits.
#[derive(Debug, Clone)]
pub struct DirectoryBackendConfig {
    pub backend_type: BackendType,

    /// Examples: "ldap://localhost:389", "ldaps://ldap.example.com"
    pub url: String,

    /// Identity the pooled connections bind as
    pub bind_dn: Option<String>,
    pub bind_password: Option<String>,

    /// Maximum number of pooled connections
    pub max_connections: u32,

    /// Seconds to wait for a free pooled connection
    pub connection_timeout: u64,
}

impl DirectoryBackendConfig {
    pub fn new(backend_type: BackendType, url: String) -> Self {
        Self {
            backend_type,
            url,
            bind_dn: None,
            bind_password: None,
            max_connections: 10,
            connection_timeout: 30,
        }
    }

    /// An in-process directory
    pub fn embedded() -> Self {
        Self::new(BackendType::Embedded, String::new())
    }

    pub fn external(url: String) -> Self {
        Self::new(BackendType::External, url)
    }

    pub fn with_credentials(mut self, bind_dn: String, bind_password: String) -> Self {
        self.bind_dn = Some(bind_dn);
        self.bind_password = Some(bind_password);
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_connection_timeout(mut self, timeout_seconds: u64) -> Self {
        self.connection_timeout = timeout_seconds;
        self
    }

    pub fn is_embedded(&self) -> bool {
        self.backend_type == BackendType::Embedded
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.is_embedded() {
            return Ok(());
        }

        if self.url.is_empty() {
            return Err("Directory URL cannot be empty".to_string());
        }
        let parsed = url::Url::parse(&self.url).map_err(|e| format!("Invalid directory URL '{}': {}", self.url, e))?;
        if parsed.scheme() != "ldap" && parsed.scheme() != "ldaps" {
            return Err("Directory URL must start with 'ldap://' or 'ldaps://'".to_string());
        }

        if self.max_connections == 0 {
            return Err("Max connections must be greater than 0".to_string());
        }

        if self.bind_dn.is_some() != self.bind_password.is_some() {
            return Err("Bind DN and bind password must be given together".to_string());
        }

        Ok(())
    }
}

impl Default for DirectoryBackendConfig {
    fn default() -> Self {
        Self::embedded()
    }
}
