use std::sync::Arc;
use std::thread;

use scim_gateway::backend::directory::request::{OID_SERVER_SIDE_SORT, OID_VIRTUAL_LIST_VIEW};
use scim_gateway::backend::{BackendFactory, EmbeddedDirectory, RequestContext};
use scim_gateway::config::{BackendConfig, GatewayConfig};
use scim_gateway::mapping::{build_mappers, default_user_mapping};
use scim_gateway::parser::PageSpec;
use scim_gateway::resource::{AttributeFilter, GetResourcesRequest, ResourceService};
use scim_gateway::schema::SCHEMA_URI_CORE;

mod common;

const ADMIN: &str = "uid=admin,dc=example,dc=com";

fn external_config(max_connections: u32) -> GatewayConfig {
    let mut config = GatewayConfig::default_config();
    config.backend = BackendConfig::External {
        url: "ldap://directory.example.com:389".to_string(),
        bind_dn: Some("cn=gateway,dc=example,dc=com".to_string()),
        bind_password: Some("secret".to_string()),
        max_connections,
        connection_timeout: 5,
    };
    config
}

/// Service reaching `directory` through the connection pool
fn setup(controls: &[&str], max_connections: u32) -> (EmbeddedDirectory, ResourceService) {
    let directory = common::setup_test_directory(controls);
    let service = external_config(max_connections)
        .build_service_with_factory(Arc::new(directory.clone()))
        .unwrap();
    (directory, service)
}

#[test]
fn test_crud_through_the_pool() {
    let (directory, service) = setup(&common::ALL_CONTROLS, 4);
    let id = common::post_user(&service, &common::create_test_user("bjensen", "Barbara", "Jensen"));
    assert!(directory.entry(&id).is_some());

    let user = service
        .get_resource(&common::context(), "Users", &id, &AttributeFilter::all())
        .unwrap();
    assert_eq!(common::string_value(&user, SCHEMA_URI_CORE, "userName").as_deref(), Some("bjensen"));

    service.delete_resource(&common::context(), "Users", &id).unwrap();
    assert!(directory.entry(&id).is_none());

    // one connection reused for the capability check and every request
    assert_eq!(directory.connections_opened(), 1);
}

#[test]
fn test_requests_act_for_the_caller() {
    let (directory, service) = setup(&common::ALL_CONTROLS, 2);
    let caller = RequestContext::as_user(ADMIN);
    service
        .post_resource(
            &caller,
            "Users",
            &common::create_test_user("jsmith", "John", "Smith"),
            &AttributeFilter::all(),
        )
        .unwrap();
    service
        .get_resources(&caller, "Users", &GetResourcesRequest::default())
        .unwrap();

    let ids = directory.authorization_ids();
    assert_eq!(ids.len(), 2);
    assert!(ids.iter().all(|id| id == &format!("dn:{}", ADMIN)));

    service
        .get_resources(&common::context(), "Users", &GetResourcesRequest::default())
        .unwrap();
    assert_eq!(directory.authorization_ids().len(), 2);
}

#[test]
fn test_caller_identity_needs_proxied_authorization() {
    let (directory, service) = setup(&[OID_SERVER_SIDE_SORT, OID_VIRTUAL_LIST_VIEW], 2);
    let err = service
        .get_resources(&RequestContext::as_user(ADMIN), "Users", &GetResourcesRequest::default())
        .unwrap_err();
    assert_eq!(err.status(), 403);
    assert!(directory.authorization_ids().is_empty());

    let anonymous = service.get_resources(&common::context(), "Users", &GetResourcesRequest::default());
    assert!(anonymous.is_ok());
}

#[test]
fn test_paging_without_directory_controls() {
    let (_, service) = setup(&[], 2);
    for name in ["carol", "alice", "bob"] {
        common::post_user(&service, &common::create_test_user(name, "Test", "User"));
    }
    let request = GetResourcesRequest::default().with_page(PageSpec {
        start_index: 2,
        count: 1,
    });
    let result = service.get_resources(&common::context(), "Users", &request).unwrap();
    assert_eq!(common::user_names(&result.resources), vec!["bob"]);
    assert_eq!(result.total_results, 1);
    assert_eq!(result.start_index, 1);
}

#[test]
fn test_concurrent_searches_share_a_bounded_pool() {
    let (directory, service) = setup(&common::ALL_CONTROLS, 2);
    common::post_user(&service, &common::create_test_user("bjensen", "Barbara", "Jensen"));

    thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for _ in 0..5 {
                    let result = service
                        .get_resources(&common::context(), "Users", &GetResourcesRequest::default())
                        .unwrap();
                    assert_eq!(result.total_results, 1);
                }
            });
        }
    });
    assert!(directory.connections_opened() <= 2);
}

#[test]
fn test_endpoint_rebound_to_a_second_backend() {
    let service = GatewayConfig::default_config().build_service().unwrap();
    let replica = common::setup_test_directory(&common::ALL_CONTROLS);
    let backend = BackendFactory::create_external(
        &external_config(2).backend.to_directory_config(),
        Arc::new(replica.clone()),
    )
    .unwrap();
    service.register_backend("replica", backend);

    let mut mapping = default_user_mapping(common::SUFFIX);
    mapping.endpoint = Some("ReplicaUsers".to_string());
    let mapper = build_mappers(&[mapping]).unwrap().remove(0);
    service.register_mapper_with_backend(mapper, "replica").unwrap();
    assert_eq!(service.endpoints(), vec!["groups", "replicausers", "users"]);

    let created = service
        .post_resource(
            &common::context(),
            "ReplicaUsers",
            &common::create_test_user("bjensen", "Barbara", "Jensen"),
            &AttributeFilter::all(),
        )
        .unwrap();
    let id = common::string_value(&created, SCHEMA_URI_CORE, "id").unwrap();
    assert!(replica.entry(&id).is_some());

    // Users is still served from the embedded directory
    let primary = service
        .get_resources(&common::context(), "Users", &GetResourcesRequest::default())
        .unwrap();
    assert_eq!(primary.total_results, 0);

    assert!(service.unregister_mapper("ReplicaUsers"));
    let err = service
        .get_resource(&common::context(), "ReplicaUsers", &id, &AttributeFilter::all())
        .unwrap_err();
    assert_eq!(err.status(), 501);
}

#[test]
fn test_external_backend_from_yaml() {
    let yaml = r#"
backend:
  type: external
  url: ldaps://directory.example.com:636
  maxConnections: 3
resources:
  - resource: Group
    searchBase: ou=groups,dc=example,dc=com
    objectClasses: [top, groupOfUniqueNames]
    rdnAttribute: cn
    attributes:
      - name: displayName
        directoryAttribute: cn
      - name: members
        directoryAttribute: uniqueMember
"#;
    let config = GatewayConfig::from_yaml(yaml).unwrap();
    let directory = common::setup_test_directory(&common::ALL_CONTROLS);
    let service = config.build_service_with_factory(Arc::new(directory.clone())).unwrap();
    assert_eq!(service.endpoints(), vec!["groups".to_string()]);

    let created = service
        .post_resource(
            &common::context(),
            "Groups",
            &common::create_test_group("admins", &[]),
            &AttributeFilter::all(),
        )
        .unwrap();
    assert_eq!(
        common::string_value(&created, SCHEMA_URI_CORE, "id").as_deref(),
        Some("cn=admins,ou=groups,dc=example,dc=com")
    );
}
