use std::sync::Arc;

use scim_gateway::backend::EmbeddedDirectory;
use scim_gateway::config::GatewayConfig;
use scim_gateway::mapping::build_mappers;
use scim_gateway::parser::{parse_filter, AttributePath, SortOrder, SortSpec};
use scim_gateway::resource::{
    AttributeFilter, GetResourcesRequest, QueryParams, ResourceService, Resources, ServiceSettings,
};
use scim_gateway::schema::SCHEMA_URI_CORE;
use scim_gateway::AppError;

mod common;

struct Fixture {
    service: ResourceService,
    ids: Vec<String>,
}

/// alice and carol are leads; carol has no email address
fn setup(settings: Option<ServiceSettings>) -> Fixture {
    let directory = common::setup_test_directory(&common::ALL_CONTROLS);
    let service = match settings {
        Some(settings) => service_with_settings(&directory, settings),
        None => common::setup_test_service(&directory),
    };
    let people = [
        ("alice", Some("Lead"), Some("alice@example.com"), "1"),
        ("bob", None, Some("bob@example.org"), "2"),
        ("carol", Some("Lead"), None, "3"),
    ];
    let ids = people
        .iter()
        .map(|(user_name, title, email, number)| {
            let mut user = common::with_employee_number(common::create_test_user(user_name, "Test", "User"), number);
            if let Some(title) = title {
                user.set_attribute(common::user_attribute(SCHEMA_URI_CORE, "title", title));
            }
            if let Some(email) = email {
                user = common::with_emails(user, &[("work", email)]);
            }
            common::post_user(&service, &user)
        })
        .collect();
    Fixture { service, ids }
}

fn service_with_settings(directory: &EmbeddedDirectory, settings: ServiceSettings) -> ResourceService {
    let config = GatewayConfig::default_config();
    let service = ResourceService::new(Arc::new(directory.clone()), settings);
    for mapper in build_mappers(&config.resources).unwrap() {
        service.register_mapper(mapper);
    }
    service
}

fn search(fixture: &Fixture, filter: &str) -> Resources {
    let request = GetResourcesRequest::default()
        .with_filter(parse_filter(filter).unwrap())
        .with_sort(SortSpec::new(AttributePath::core("userName", None), SortOrder::Ascending));
    fixture
        .service
        .get_resources(&common::context(), "Users", &request)
        .unwrap()
}

fn found(fixture: &Fixture, filter: &str) -> Vec<String> {
    common::user_names(&search(fixture, filter).resources)
}

#[test]
fn test_filter_on_simple_attributes() {
    let fixture = setup(None);
    assert_eq!(found(&fixture, "title eq 'lead'"), vec!["alice", "carol"]);
    assert_eq!(found(&fixture, "userName sw 'b'"), vec!["bob"]);
    assert_eq!(found(&fixture, "userName co 'aro'"), vec!["carol"]);
    assert_eq!(found(&fixture, "title pr and userName eq 'alice'"), vec!["alice"]);
    assert!(found(&fixture, "userName eq 'dave'").is_empty());
}

#[test]
fn test_filter_on_extension_and_complex_attributes() {
    let fixture = setup(None);
    assert_eq!(
        found(&fixture, "urn:scim:schemas:extension:enterprise:1.0:employeeNumber eq '2'"),
        vec!["bob"]
    );
    assert_eq!(found(&fixture, "name.familyName eq 'User'").len(), 3);
    assert_eq!(found(&fixture, "name pr").len(), 3);
}

#[test]
fn test_filter_on_canonical_plural_attribute() {
    let fixture = setup(None);
    assert_eq!(found(&fixture, "emails eq 'bob@example.org'"), vec!["bob"]);
    assert_eq!(found(&fixture, "emails.value co 'example.com'"), vec!["alice"]);
    assert_eq!(found(&fixture, "emails.type eq 'work'"), vec!["alice", "bob"]);
    assert_eq!(found(&fixture, "emails pr"), vec!["alice", "bob"]);
}

#[test]
fn test_filter_on_meta_timestamps() {
    let fixture = setup(None);
    assert_eq!(found(&fixture, "meta.created gt '2000-01-01T00:00:00Z'").len(), 3);
    assert_eq!(found(&fixture, "meta.lastModified ge '2000-01-01T00:00:00Z'").len(), 3);
    assert!(found(&fixture, "meta.lastModified lt '2000-01-01T00:00:00Z'").is_empty());
}

#[test]
fn test_id_filter_reads_one_entry() {
    let fixture = setup(None);
    let result = search(&fixture, &format!("id eq '{}'", fixture.ids[1]));
    assert_eq!(common::user_names(&result.resources), vec!["bob"]);
    assert_eq!(result.total_results, 1);

    let result = search(&fixture, "id eq 'uid=dave,ou=people,dc=example,dc=com'");
    assert_eq!(result.total_results, 0);

    let result = search(&fixture, "id eq 'ou=groups,dc=example,dc=com'");
    assert_eq!(result.total_results, 0);
}

#[test]
fn test_unmapped_branch_is_checked_in_memory() {
    let fixture = setup(None);
    // nickName has no directory attribute, so the OR is decided per resource
    let result = search(&fixture, "nickName eq 'x' or userName eq 'alice'");
    assert_eq!(common::user_names(&result.resources), vec!["alice"]);
    assert_eq!(result.total_results, 1);

    // under AND the unmapped side only narrows the directory result
    assert!(found(&fixture, "title eq 'Lead' and nickName pr").is_empty());
}

#[test]
fn test_ordering_sent_to_the_directory_survives_the_in_memory_check() {
    let fixture = setup(None);
    let created = "meta.created gt '2000-01-01T00:00:00Z'";
    assert_eq!(found(&fixture, created).len(), 3);
    assert_eq!(
        found(&fixture, &format!("{created} and (userName eq 'alice' or nickName pr)")),
        vec!["alice"]
    );
    assert_eq!(
        found(&fixture, &format!("title eq 'Lead' and {created} and nickName pr")),
        Vec::<String>::new()
    );
}

#[test]
fn test_filter_only_attributes_are_not_returned() {
    let fixture = setup(None);
    let request = GetResourcesRequest::default()
        .with_filter(parse_filter("title eq 'Lead'").unwrap())
        .with_attributes(AttributeFilter::from_params(Some("userName")).unwrap());
    let result = fixture
        .service
        .get_resources(&common::context(), "Users", &request)
        .unwrap();

    assert_eq!(result.total_results, 2);
    for resource in &result.resources {
        let names: Vec<&str> = resource.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["id", "userName"]);
    }
}

#[test]
fn test_query_params_drive_the_search() {
    let fixture = setup(None);
    let request = fixture
        .service
        .parse_query(&QueryParams {
            filter: Some("title eq 'Lead'".to_string()),
            sort_by: Some("userName".to_string()),
            sort_order: Some("descending".to_string()),
            attributes: Some("userName,title".to_string()),
            ..Default::default()
        })
        .unwrap();
    let result = fixture
        .service
        .get_resources(&common::context(), "Users", &request)
        .unwrap();
    assert_eq!(common::user_names(&result.resources), vec!["carol", "alice"]);
    assert!(!result.resources[0].has_attribute(SCHEMA_URI_CORE, "displayName"));

    let err = fixture
        .service
        .parse_query(&QueryParams {
            filter: Some("title eq".to_string()),
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(err.status(), 400);
}

#[test]
fn test_unknown_endpoint_is_not_implemented() {
    let fixture = setup(None);
    let err = fixture
        .service
        .get_resources(&common::context(), "Widgets", &GetResourcesRequest::default())
        .unwrap_err();
    assert!(matches!(err, AppError::UnsupportedOperation(_)));
    assert_eq!(err.status(), 501);
}

#[test]
fn test_undeclared_attribute_in_strict_mode() {
    let fixture = setup(None);
    let request = GetResourcesRequest::default().with_filter(parse_filter("shoeSize eq '9'").unwrap());
    let err = fixture
        .service
        .get_resources(&common::context(), "Users", &request)
        .unwrap_err();
    assert_eq!(err.status(), 400);

    let request = GetResourcesRequest::default()
        .with_sort(SortSpec::new(AttributePath::core("shoeSize", None), SortOrder::Ascending));
    let err = fixture
        .service
        .get_resources(&common::context(), "Users", &request)
        .unwrap_err();
    assert_eq!(err.status(), 400);
}

#[test]
fn test_undeclared_attribute_in_lenient_mode_matches_nothing() {
    let settings = ServiceSettings {
        strict: false,
        ..GatewayConfig::default_config().settings()
    };
    let fixture = setup(Some(settings));
    let request = GetResourcesRequest::default().with_filter(parse_filter("shoeSize eq '9'").unwrap());
    let result = fixture
        .service
        .get_resources(&common::context(), "Users", &request)
        .unwrap();
    assert_eq!(result.total_results, 0);
}

#[test]
fn test_groups_and_users_stay_apart() {
    let fixture = setup(None);
    let group = common::create_test_group("leads", &[fixture.ids[0].as_str(), fixture.ids[2].as_str()]);
    fixture
        .service
        .post_resource(&common::context(), "Groups", &group, &AttributeFilter::all())
        .unwrap();

    let users = fixture
        .service
        .get_resources(&common::context(), "Users", &GetResourcesRequest::default())
        .unwrap();
    assert_eq!(users.total_results, 3);

    let request = GetResourcesRequest::default()
        .with_filter(parse_filter(&format!("members eq '{}'", fixture.ids[2])).unwrap());
    let groups = fixture
        .service
        .get_resources(&common::context(), "Groups", &request)
        .unwrap();
    assert_eq!(groups.total_results, 1);
    assert_eq!(
        common::string_value(&groups.resources[0], SCHEMA_URI_CORE, "displayName").as_deref(),
        Some("leads")
    );
}
