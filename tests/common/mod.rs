#![allow(dead_code)]

use std::sync::Arc;

use scim_gateway::backend::directory::entry::OBJECT_CLASS;
use scim_gateway::backend::directory::request::{
    OID_POST_READ, OID_PROXIED_AUTHORIZATION, OID_SERVER_SIDE_SORT, OID_VIRTUAL_LIST_VIEW,
};
use scim_gateway::backend::directory::Entry;
use scim_gateway::backend::{EmbeddedDirectory, RequestContext};
use scim_gateway::config::GatewayConfig;
use scim_gateway::mapping::build_mappers;
use scim_gateway::models::{ComplexValue, ScimAttribute, ScimObject, ScimValue};
use scim_gateway::resource::{AttributeFilter, ResourceService};
use scim_gateway::schema::{
    ResolutionMode, GROUP_DESCRIPTOR, SCHEMA_URI_CORE, SCHEMA_URI_ENTERPRISE_EXTENSION, USER_DESCRIPTOR,
};

pub const SUFFIX: &str = "dc=example,dc=com";

pub const ALL_CONTROLS: [&str; 4] = [
    OID_SERVER_SIDE_SORT,
    OID_VIRTUAL_LIST_VIEW,
    OID_POST_READ,
    OID_PROXIED_AUTHORIZATION,
];

pub fn context() -> RequestContext {
    RequestContext::anonymous()
}

/// Embedded directory advertising only `controls`, holding the suffix and
/// the people and groups containers
pub fn setup_test_directory(controls: &[&str]) -> EmbeddedDirectory {
    let directory = EmbeddedDirectory::with_supported_controls(controls);
    let containers = [
        (SUFFIX.to_string(), "domain"),
        (format!("ou=people,{}", SUFFIX), "organizationalUnit"),
        (format!("ou=groups,{}", SUFFIX), "organizationalUnit"),
    ];
    for (dn, class) in containers {
        directory
            .load_entry(Entry::new(&dn).with_attribute(OBJECT_CLASS, ["top", class]))
            .unwrap();
    }
    directory
}

/// Service over `directory` with the default Users and Groups mappings
pub fn setup_test_service(directory: &EmbeddedDirectory) -> ResourceService {
    let config = GatewayConfig::default_config();
    let service = ResourceService::new(Arc::new(directory.clone()), config.settings());
    for mapper in build_mappers(&config.resources).unwrap() {
        service.register_mapper(mapper);
    }
    service
}

pub fn user_attribute(schema: &str, name: &str, value: &str) -> ScimAttribute {
    let descriptor = USER_DESCRIPTOR.resolve(schema, name, ResolutionMode::Strict).unwrap();
    ScimAttribute::simple(descriptor, value)
}

pub fn create_test_user(user_name: &str, given_name: &str, family_name: &str) -> ScimObject {
    let name = USER_DESCRIPTOR.find_attribute(SCHEMA_URI_CORE, "name").unwrap().clone();
    let sub = |sub_name: &str, value: &str| ScimAttribute::simple(name.sub_attribute(sub_name).unwrap().clone(), value);

    let mut user = ScimObject::new("User");
    user.set_attribute(user_attribute(SCHEMA_URI_CORE, "userName", user_name));
    user.set_attribute(ScimAttribute::complex(
        name.clone(),
        [
            sub("formatted", &format!("{} {}", given_name, family_name)),
            sub("familyName", family_name),
            sub("givenName", given_name),
        ],
    ));
    user.set_attribute(user_attribute(
        SCHEMA_URI_CORE,
        "displayName",
        &format!("{} {}", given_name, family_name),
    ));
    user
}

/// Add `emails` elements of the given (type, value) pairs
pub fn with_emails(mut user: ScimObject, emails: &[(&str, &str)]) -> ScimObject {
    let descriptor = USER_DESCRIPTOR.find_attribute(SCHEMA_URI_CORE, "emails").unwrap().clone();
    let values = emails
        .iter()
        .map(|(email_type, value)| {
            let element: ComplexValue = [
                ScimAttribute::simple(descriptor.sub_attribute("value").unwrap().clone(), *value),
                ScimAttribute::simple(descriptor.sub_attribute("type").unwrap().clone(), *email_type),
            ]
            .into_iter()
            .collect();
            ScimValue::Complex(element)
        })
        .collect();
    user.set_attribute(ScimAttribute::plural(descriptor, values));
    user
}

pub fn with_employee_number(mut user: ScimObject, number: &str) -> ScimObject {
    user.set_attribute(user_attribute(SCHEMA_URI_ENTERPRISE_EXTENSION, "employeeNumber", number));
    user
}

pub fn create_test_group(display_name: &str, member_ids: &[&str]) -> ScimObject {
    let display = GROUP_DESCRIPTOR.find_attribute(SCHEMA_URI_CORE, "displayName").unwrap().clone();
    let members = GROUP_DESCRIPTOR.find_attribute(SCHEMA_URI_CORE, "members").unwrap().clone();
    let value = members.sub_attribute("value").unwrap().clone();

    let mut group = ScimObject::new("Group");
    group.set_attribute(ScimAttribute::simple(display, display_name));
    if !member_ids.is_empty() {
        let elements = member_ids
            .iter()
            .map(|id| ScimValue::Complex([ScimAttribute::simple(value.clone(), *id)].into_iter().collect()))
            .collect();
        group.set_attribute(ScimAttribute::plural(members, elements));
    }
    group
}

/// Create a user through the service and return its id
pub fn post_user(service: &ResourceService, user: &ScimObject) -> String {
    let created = service
        .post_resource(&context(), "Users", user, &AttributeFilter::all())
        .unwrap();
    string_value(&created, SCHEMA_URI_CORE, "id").unwrap()
}

pub fn string_value(resource: &ScimObject, schema: &str, name: &str) -> Option<String> {
    resource.get_simple_value(schema, name).map(|v| v.string_value())
}

pub fn user_names(resources: &[ScimObject]) -> Vec<String> {
    resources
        .iter()
        .filter_map(|r| string_value(r, SCHEMA_URI_CORE, "userName"))
        .collect()
}
