use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::backend::directory::entry::{rdn, OBJECT_CLASS};
use crate::backend::directory::{DirectoryBackendConfig, Entry, ResultCode};
use crate::backend::{BackendFactory, ConnectionFactory, DirectoryBackend, EmbeddedDirectory};
use crate::error::{AppError, AppResult};
use crate::mapping::{build_mappers, default_group_mapping, default_user_mapping, ResourceMapping};
use crate::resource::{ResourceService, ServiceSettings};

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").unwrap();
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Prefix of `meta.location`, e.g. `https://example.com/scim/v1`
    #[serde(default)]
    pub base_uri: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Reject filter and sort paths the schema does not declare
    #[serde(default = "default_strict")]
    pub strict: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub backend: BackendConfig,
    pub resources: Vec<ResourceMapping>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BackendConfig {
    /// In-process directory seeded with the suffix and every search base
    #[serde(rename_all = "camelCase")]
    Embedded { suffix: String },
    #[serde(rename_all = "camelCase")]
    External {
        url: String,
        #[serde(default)]
        bind_dn: Option<String>,
        #[serde(default)]
        bind_password: Option<String>,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Seconds to wait for a pooled connection
        #[serde(default = "default_connection_timeout")]
        connection_timeout: u64,
    },
}

fn default_max_results() -> usize {
    100
}

fn default_strict() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    30
}

impl BackendConfig {
    pub fn to_directory_config(&self) -> DirectoryBackendConfig {
        match self {
            BackendConfig::Embedded { .. } => DirectoryBackendConfig::embedded(),
            BackendConfig::External {
                url,
                bind_dn,
                bind_password,
                max_connections,
                connection_timeout,
            } => {
                let mut config = DirectoryBackendConfig::external(url.clone())
                    .with_max_connections(*max_connections)
                    .with_connection_timeout(*connection_timeout);
                config.bind_dn = bind_dn.clone();
                config.bind_password = bind_password.clone();
                config
            }
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a YAML file, expanding environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> AppResult<Self> {
        let path = config_path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::Configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> AppResult<Self> {
        let expanded = expand_env_vars(content)?;
        let config: GatewayConfig = serde_yaml::from_str(&expanded)
            .map_err(|e| AppError::Configuration(format!("Failed to parse config: {}", e)))?;
        if config.resources.is_empty() {
            return Err(AppError::Configuration(
                "Configuration must map at least one resource".to_string(),
            ));
        }
        if config.max_results == 0 {
            return Err(AppError::Configuration("maxResults must be greater than 0".to_string()));
        }
        Ok(config)
    }

    /// Embedded directory under `dc=example,dc=com` serving Users and Groups
    pub fn default_config() -> Self {
        let suffix = "dc=example,dc=com";
        GatewayConfig {
            base_uri: None,
            max_results: default_max_results(),
            strict: default_strict(),
            log_level: default_log_level(),
            backend: BackendConfig::Embedded {
                suffix: suffix.to_string(),
            },
            resources: vec![default_user_mapping(suffix), default_group_mapping(suffix)],
        }
    }

    pub fn settings(&self) -> ServiceSettings {
        ServiceSettings {
            base_uri: self.base_uri.clone(),
            max_results: self.max_results,
            strict: self.strict,
        }
    }

    /// Service over an embedded directory. An external backend needs
    /// [`GatewayConfig::build_service_with_factory`].
    pub fn build_service(&self) -> AppResult<ResourceService> {
        let backend: Arc<dyn DirectoryBackend> = match &self.backend {
            BackendConfig::Embedded { suffix } => Arc::new(self.seed_embedded(suffix)?),
            BackendConfig::External { .. } => BackendFactory::create(&self.backend.to_directory_config())?,
        };
        self.service_over(backend)
    }

    /// Service over an external directory reached through `factory`
    pub fn build_service_with_factory(&self, factory: Arc<dyn ConnectionFactory>) -> AppResult<ResourceService> {
        let backend = BackendFactory::create_external(&self.backend.to_directory_config(), factory)?;
        self.service_over(backend)
    }

    fn service_over(&self, backend: Arc<dyn DirectoryBackend>) -> AppResult<ResourceService> {
        let mappers = build_mappers(&self.resources)?;
        let service = ResourceService::new(backend, self.settings());
        for mapper in mappers {
            service.register_mapper(mapper);
        }
        Ok(service)
    }

    /// Embedded directory holding the suffix and each mapping's search base
    fn seed_embedded(&self, suffix: &str) -> AppResult<EmbeddedDirectory> {
        let directory = EmbeddedDirectory::new();
        let bases = std::iter::once(suffix).chain(self.resources.iter().map(|r| r.search_base.as_str()));
        for dn in bases {
            let entry = container_entry(dn)?;
            match directory.load_entry(entry) {
                Ok(()) => info!(dn, "Seeded embedded directory"),
                Err(e) if e.code == ResultCode::EntryAlreadyExists => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(directory)
    }
}

/// A container entry typed by its RDN attribute
fn container_entry(dn: &str) -> AppResult<Entry> {
    let (attribute, value) =
        rdn(dn).ok_or_else(|| AppError::Configuration(format!("'{}' is not a valid DN", dn)))?;
    let class = match attribute.to_ascii_lowercase().as_str() {
        "dc" => "domain",
        "o" => "organization",
        "ou" => "organizationalUnit",
        _ => "extensibleObject",
    };
    Ok(Entry::new(dn)
        .with_attribute(OBJECT_CLASS, ["top", class])
        .with_attribute(&attribute, [value]))
}

/// Expand `${VAR}` and `${VAR:-default}` from the environment
pub fn expand_env_vars(content: &str) -> AppResult<String> {
    let mut missing = None;
    let expanded = ENV_VAR.replace_all(content, |caps: &Captures| {
        match (std::env::var(&caps[1]), caps.get(2)) {
            (Ok(value), _) => value,
            (Err(_), Some(default)) => default.as_str().to_string(),
            (Err(_), None) => {
                missing.get_or_insert_with(|| caps[1].to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(name) => Err(AppError::Configuration(format!(
            "Environment variable {} not found and no default provided",
            name
        ))),
        None => Ok(expanded.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendType, RequestContext};
    use crate::resource::GetResourcesRequest;

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("GATEWAY_TEST_URL", "ldap://directory:1389");
        let expanded = expand_env_vars("url: ${GATEWAY_TEST_URL:-ldap://localhost}\nlevel: ${GATEWAY_MISSING:-debug}")
            .unwrap();
        assert_eq!(expanded, "url: ldap://directory:1389\nlevel: debug");
        std::env::remove_var("GATEWAY_TEST_URL");

        let err = expand_env_vars("password: ${GATEWAY_UNSET_PASSWORD}").unwrap_err();
        assert!(err.to_string().contains("GATEWAY_UNSET_PASSWORD"));
    }

    #[test]
    fn test_config_file_loading() {
        let config_content = r#"
baseUri: https://example.com/scim/v1
maxResults: 50
backend:
  type: external
  url: "${GATEWAY_TEST_LDAP_URL:-ldap://localhost:1389}"
  bindDn: cn=gateway,dc=example,dc=com
  bindPassword: secret
  maxConnections: 4
resources:
  - resource: User
    searchBase: ou=people,dc=example,dc=com
    objectClasses: [top, inetOrgPerson]
    rdnAttribute: uid
    attributes:
      - name: userName
        directoryAttribute: uid
"#;
        let temp_file = std::env::temp_dir().join("scim_gateway_test_config.yaml");
        std::fs::write(&temp_file, config_content).unwrap();

        let config = GatewayConfig::load_from_file(&temp_file).unwrap();
        assert_eq!(config.base_uri.as_deref(), Some("https://example.com/scim/v1"));
        assert_eq!(config.max_results, 50);
        assert!(config.strict);
        let directory = config.backend.to_directory_config();
        assert_eq!(directory.backend_type, BackendType::External);
        assert_eq!(directory.url, "ldap://localhost:1389");
        assert_eq!(directory.max_connections, 4);
        assert_eq!(directory.connection_timeout, 30);
        assert!(directory.validate().is_ok());

        std::fs::remove_file(&temp_file).unwrap();
    }

    #[test]
    fn test_missing_config_file() {
        let err = GatewayConfig::load_from_file("/nonexistent/path/gateway.yaml").unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn test_invalid_configs() {
        assert!(GatewayConfig::from_yaml("backend: [").is_err());
        let no_resources = "backend:\n  type: embedded\n  suffix: dc=example,dc=com\nresources: []\n";
        assert!(GatewayConfig::from_yaml(no_resources).is_err());
    }

    #[test]
    fn test_default_config_builds_service() {
        let config = GatewayConfig::default_config();
        let service = config.build_service().unwrap();
        assert_eq!(service.endpoints(), vec!["groups".to_string(), "users".to_string()]);
        let users = service
            .get_resources(&RequestContext::anonymous(), "Users", &GetResourcesRequest::default())
            .unwrap();
        assert_eq!(users.total_results, 0);
    }

    #[test]
    fn test_external_backend_needs_factory() {
        let mut config = GatewayConfig::default_config();
        config.backend = BackendConfig::External {
            url: "ldap://localhost:1389".to_string(),
            bind_dn: None,
            bind_password: None,
            max_connections: 2,
            connection_timeout: 1,
        };
        assert!(matches!(config.build_service().err(), Some(AppError::Configuration(_))));
    }
}
