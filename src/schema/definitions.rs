//! Standard resource descriptors
//!
//! The User, Group and Schema resources, with the core and enterprise
//! extension schemas. Any customization of the built-in resources belongs here.

use lazy_static::lazy_static;
use std::sync::Arc;

use super::descriptor::{AttributeDescriptor, DataType};
use super::resource_descriptor::ResourceDescriptor;

/// Core schema identifier
pub const SCHEMA_URI_CORE: &str = "urn:scim:schemas:core:1.0";
/// Enterprise user extension schema identifier
pub const SCHEMA_URI_ENTERPRISE_EXTENSION: &str = "urn:scim:schemas:extension:enterprise:1.0";

fn string(name: &str, description: &str, schema: &str) -> AttributeDescriptor {
    AttributeDescriptor::simple(name, DataType::String, description, schema, false, false, false)
}

fn typed(name: &str, data_type: DataType, description: &str, schema: &str) -> AttributeDescriptor {
    AttributeDescriptor::simple(name, data_type, description, schema, false, false, false)
}

fn read_only(name: &str, description: &str, schema: &str) -> AttributeDescriptor {
    AttributeDescriptor::simple(name, DataType::String, description, schema, true, false, false)
}

fn complex(name: &str, description: &str, schema: &str, subs: Vec<AttributeDescriptor>) -> AttributeDescriptor {
    let mut descriptor = AttributeDescriptor::unchecked(
        name,
        DataType::Complex,
        description,
        schema,
        false,
        false,
        false,
        false,
        Vec::new(),
        subs,
    );
    descriptor.inject_normative_sub_attributes();
    descriptor
}

#[allow(clippy::too_many_arguments)]
fn plural(
    name: &str,
    data_type: DataType,
    description: &str,
    schema: &str,
    read_only: bool,
    canonical_values: &[&str],
    subs: Vec<AttributeDescriptor>,
) -> AttributeDescriptor {
    let mut descriptor = AttributeDescriptor::unchecked(
        name,
        data_type,
        description,
        schema,
        true,
        read_only,
        false,
        false,
        canonical_values.iter().map(|v| v.to_string()).collect(),
        subs,
    );
    descriptor.inject_normative_sub_attributes();
    descriptor
}

/// Attributes every resource carries
fn common_attributes() -> Vec<AttributeDescriptor> {
    let s = SCHEMA_URI_CORE;
    vec![
        AttributeDescriptor::simple(
            "id",
            DataType::String,
            "Unique identifier for the SCIM Resource as defined by the Service Provider",
            s,
            true,
            true,
            true,
        ),
        AttributeDescriptor::simple(
            "externalId",
            DataType::String,
            "Unique identifier for the Resource as defined by the Service Consumer",
            s,
            false,
            false,
            true,
        ),
        complex("meta", "A complex type containing metadata about the resource", s, vec![]),
    ]
}

fn user_attributes() -> Vec<AttributeDescriptor> {
    let s = SCHEMA_URI_CORE;
    let mut attributes = common_attributes();
    attributes.extend([
        AttributeDescriptor::simple(
            "userName",
            DataType::String,
            "Unique identifier for the User, typically used by the user to directly authenticate to the service provider",
            s,
            false,
            true,
            false,
        ),
        complex(
            "name",
            "The components of the User's real name",
            s,
            vec![
                string("formatted", "The full name, including all middle names, titles, and suffixes as appropriate", s),
                string("familyName", "The family name of the User", s),
                string("givenName", "The given name of the User", s),
                string("middleName", "The middle name(s) of the User", s),
                string("honorificPrefix", "The honorific prefix(es) of the User", s),
                string("honorificSuffix", "The honorific suffix(es) of the User", s),
            ],
        ),
        string("displayName", "The name of the User, suitable for display to end-users", s),
        string("nickName", "The casual way to address the user in real life", s),
        string("profileUrl", "URL to a page representing the User's online profile", s),
        string("title", "The User's title", s),
        string("userType", "The organization-to-user relationship", s),
        string("preferredLanguage", "The User's preferred written or spoken language", s),
        string("locale", "Used to indicate the User's default location", s),
        string("timezone", "The User's time zone in the Olson timezone database format", s),
        typed("active", DataType::Boolean, "A Boolean value indicating the User's administrative status", s),
        string("password", "The User's clear text password", s),
        plural("emails", DataType::String, "E-mail addresses for the User", s, false, &["work", "home", "other"], vec![]),
        plural(
            "phoneNumbers",
            DataType::String,
            "Phone numbers for the User",
            s,
            false,
            &["work", "home", "mobile", "fax", "pager", "other"],
            vec![],
        ),
        plural(
            "ims",
            DataType::String,
            "Instant messaging address for the User",
            s,
            false,
            &["aim", "gtalk", "icq", "xmpp", "msn", "skype", "qq", "yahoo"],
            vec![],
        ),
        plural("photos", DataType::String, "URL of photos of the User", s, false, &["photo", "thumbnail"], vec![]),
        plural(
            "addresses",
            DataType::Complex,
            "A physical mailing address for this User",
            s,
            false,
            &["work", "home", "other"],
            vec![
                string("formatted", "The full mailing address, formatted for display", s),
                string("streetAddress", "The full street address component", s),
                string("locality", "The city or locality component", s),
                string("region", "The state or region component", s),
                string("postalCode", "The zipcode or postal code component", s),
                string("country", "The country name component", s),
            ],
        ),
        plural(
            "groups",
            DataType::String,
            "A list of groups that the user belongs to",
            s,
            true,
            &["direct", "indirect"],
            vec![],
        ),
        plural("entitlements", DataType::String, "A list of entitlements for the User", s, false, &[], vec![]),
        plural("roles", DataType::String, "A list of roles for the User", s, false, &[], vec![]),
        plural("x509Certificates", DataType::Binary, "A list of certificates issued to the User", s, false, &[], vec![]),
    ]);

    let e = SCHEMA_URI_ENTERPRISE_EXTENSION;
    attributes.extend([
        string("employeeNumber", "Numeric or alphanumeric identifier assigned to a person", e),
        string("costCenter", "Identifies the name of a cost center", e),
        string("organization", "Identifies the name of an organization", e),
        string("division", "Identifies the name of a division", e),
        string("department", "Identifies the name of a department", e),
        complex(
            "manager",
            "The User's manager",
            e,
            vec![
                string("managerId", "The id of the SCIM resource representing the User's manager", e),
                read_only("displayName", "The displayName of the User's manager", e),
            ],
        ),
    ]);
    attributes
}

fn group_attributes() -> Vec<AttributeDescriptor> {
    let s = SCHEMA_URI_CORE;
    let mut attributes = common_attributes();
    attributes.extend([
        AttributeDescriptor::simple(
            "displayName",
            DataType::String,
            "A human readable name for the Group",
            s,
            false,
            true,
            false,
        ),
        plural("members", DataType::String, "A list of members of the Group", s, false, &["User", "Group"], vec![]),
    ]);
    attributes
}

/// Fields of one attribute definition in a `Schema` resource
fn definition_fields(s: &str) -> Vec<AttributeDescriptor> {
    vec![
        string("name", "The attribute's name", s),
        string("type", "The attribute's data type", s),
        typed("multiValued", DataType::Boolean, "Whether the attribute is multi-valued", s),
        string("description", "The attribute's human readable description", s),
        typed("readOnly", DataType::Boolean, "Whether the attribute is modifiable", s),
        typed("required", DataType::Boolean, "Whether the attribute is required", s),
        typed("caseExact", DataType::Boolean, "Whether the string attribute is case sensitive", s),
        AttributeDescriptor::unchecked(
            "canonicalValues",
            DataType::String,
            "A collection of canonical values",
            s,
            true,
            false,
            false,
            false,
            Vec::new(),
            Vec::new(),
        ),
    ]
}

fn schema_attributes_descriptor() -> AttributeDescriptor {
    let s = SCHEMA_URI_CORE;
    let mut fields = definition_fields(s);
    fields.insert(4, string("schema", "The URI of the schema defining the attribute", s));
    fields.push(AttributeDescriptor::unchecked(
        "subAttributes",
        DataType::Complex,
        "A list specifying the contained attributes",
        s,
        true,
        false,
        false,
        false,
        Vec::new(),
        definition_fields(s),
    ));
    AttributeDescriptor::unchecked(
        "attributes",
        DataType::Complex,
        "A complex type that specifies the set of associated attributes",
        s,
        true,
        false,
        false,
        false,
        Vec::new(),
        fields,
    )
}

lazy_static! {
    /// The `attributes` attribute of a `Schema` resource
    pub static ref SCHEMA_ATTRIBUTES_DESCRIPTOR: Arc<AttributeDescriptor> =
        Arc::new(schema_attributes_descriptor());

    pub static ref USER_DESCRIPTOR: Arc<ResourceDescriptor> = Arc::new(ResourceDescriptor::new(
        "User",
        "SCIM core resource for representing users",
        SCHEMA_URI_CORE,
        "Users",
        user_attributes(),
    ));

    pub static ref GROUP_DESCRIPTOR: Arc<ResourceDescriptor> = Arc::new(ResourceDescriptor::new(
        "Group",
        "SCIM core resource for representing groups",
        SCHEMA_URI_CORE,
        "Groups",
        group_attributes(),
    ));

    /// Resource describing other resources, for schema introspection
    pub static ref SCHEMA_DESCRIPTOR: Arc<ResourceDescriptor> = Arc::new(ResourceDescriptor::new(
        "Schema",
        "The Schema of a resource",
        SCHEMA_URI_CORE,
        "Schemas",
        vec![
            read_only("id", "The unique URI of the schema", SCHEMA_URI_CORE),
            string("name", "The resource's human readable name", SCHEMA_URI_CORE),
            string("description", "The resource's human readable description", SCHEMA_URI_CORE),
            string("schema", "The resource's associated schema", SCHEMA_URI_CORE),
            string("endpoint", "The resource's HTTP addressable endpoint", SCHEMA_URI_CORE),
            (**SCHEMA_ATTRIBUTES_DESCRIPTOR).clone(),
        ],
    ));
}

/// Built-in descriptor for a resource name, ignoring case
pub fn standard_descriptor(name: &str) -> Option<Arc<ResourceDescriptor>> {
    [&*USER_DESCRIPTOR, &*GROUP_DESCRIPTOR, &*SCHEMA_DESCRIPTOR]
        .into_iter()
        .find(|d| d.name().eq_ignore_ascii_case(name))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_lookup() {
        assert_eq!(standard_descriptor("user").unwrap().endpoint(), "Users");
        assert_eq!(standard_descriptor("GROUP").unwrap().endpoint(), "Groups");
        assert!(standard_descriptor("Device").is_none());
    }

    #[test]
    fn test_user_descriptor_shape() {
        let meta = USER_DESCRIPTOR.find_attribute(SCHEMA_URI_CORE, "meta").unwrap();
        assert!(meta.sub_attribute("lastModified").is_some());

        let addresses = USER_DESCRIPTOR.find_attribute(SCHEMA_URI_CORE, "addresses").unwrap();
        assert!(addresses.has_complex_values());
        assert!(addresses.sub_attribute("value").is_none());
        assert!(addresses.sub_attribute("type").is_some());

        let manager = USER_DESCRIPTOR
            .find_attribute(SCHEMA_URI_ENTERPRISE_EXTENSION, "manager")
            .unwrap();
        assert_eq!(manager.sub_attributes().len(), 2);
    }
}
