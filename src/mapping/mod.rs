//! Resource to directory mapping
//!
//! Mapping definitions are plain configuration data; [`ResourceMapper`]
//! compiles one against a resource descriptor and does the conversions,
//! filter translation and update deltas.

pub mod attribute_mapper;
pub mod resource_mapper;
pub mod transformation;

use serde::{Deserialize, Serialize};

pub use attribute_mapper::{create_mapper, AttributeMapper};
pub use resource_mapper::{FilterTranslation, ResourceMapper};
pub use transformation::Transformation;

use crate::error::AppResult;
use crate::schema::{SCHEMA_URI_CORE, SCHEMA_URI_ENTERPRISE_EXTENSION};

fn default_schema() -> String {
    SCHEMA_URI_CORE.to_string()
}

/// How one resource type is stored in the directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMapping {
    /// Built-in resource name, e.g. `User`
    pub resource: String,
    /// Endpoint serving the resource; defaults to the resource's own, e.g. `Users`
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Entries of this resource live directly below this DN
    pub search_base: String,
    /// Object classes written on new entries
    pub object_classes: Vec<String>,
    /// Object class identifying entries of this resource in searches;
    /// defaults to the last of `object_classes`
    #[serde(default)]
    pub filter_object_class: Option<String>,
    /// Attribute naming new entries
    pub rdn_attribute: String,
    #[serde(default)]
    pub attributes: Vec<AttributeMapping>,
}

/// How one SCIM attribute is stored.
///
/// Which fields apply depends on the attribute: a singular simple attribute
/// or a plain plural attribute uses `directory_attribute`, a singular
/// complex attribute uses `sub_attributes`, and a plural attribute split by
/// canonical type uses `canonical_values`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeMapping {
    #[serde(default = "default_schema")]
    pub schema: String,
    pub name: String,
    #[serde(default)]
    pub directory_attribute: Option<String>,
    #[serde(default)]
    pub transformation: Transformation,
    #[serde(default)]
    pub sub_attributes: Vec<SubAttributeMapping>,
    #[serde(default)]
    pub canonical_values: Vec<CanonicalValueMapping>,
}

impl AttributeMapping {
    fn empty(schema: &str, name: &str) -> Self {
        Self {
            schema: schema.to_string(),
            name: name.to_string(),
            directory_attribute: None,
            transformation: Transformation::Default,
            sub_attributes: Vec::new(),
            canonical_values: Vec::new(),
        }
    }

    pub fn simple(schema: &str, name: &str, directory_attribute: &str) -> Self {
        Self {
            directory_attribute: Some(directory_attribute.to_string()),
            ..Self::empty(schema, name)
        }
    }

    pub fn complex(schema: &str, name: &str, sub_attributes: Vec<SubAttributeMapping>) -> Self {
        Self {
            sub_attributes,
            ..Self::empty(schema, name)
        }
    }

    pub fn canonical(schema: &str, name: &str, canonical_values: Vec<CanonicalValueMapping>) -> Self {
        Self {
            canonical_values,
            ..Self::empty(schema, name)
        }
    }

    pub fn with_transformation(mut self, transformation: Transformation) -> Self {
        self.transformation = transformation;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubAttributeMapping {
    pub name: String,
    pub directory_attribute: String,
    #[serde(default)]
    pub transformation: Transformation,
}

impl SubAttributeMapping {
    pub fn new(name: &str, directory_attribute: &str) -> Self {
        Self {
            name: name.to_string(),
            directory_attribute: directory_attribute.to_string(),
            transformation: Transformation::Default,
        }
    }
}

/// Elements of one canonical type: every `value` in one directory
/// attribute, or one complex element spread over `sub_attributes`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalValueMapping {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub directory_attribute: Option<String>,
    #[serde(default)]
    pub transformation: Transformation,
    #[serde(default)]
    pub sub_attributes: Vec<SubAttributeMapping>,
}

impl CanonicalValueMapping {
    pub fn value(type_name: &str, directory_attribute: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            directory_attribute: Some(directory_attribute.to_string()),
            transformation: Transformation::Default,
            sub_attributes: Vec::new(),
        }
    }

    pub fn complex(type_name: &str, sub_attributes: Vec<SubAttributeMapping>) -> Self {
        Self {
            type_name: type_name.to_string(),
            directory_attribute: None,
            transformation: Transformation::Default,
            sub_attributes,
        }
    }
}

/// Users as inetOrgPerson entries below `ou=people`
pub fn default_user_mapping(suffix: &str) -> ResourceMapping {
    let core = SCHEMA_URI_CORE;
    let enterprise = SCHEMA_URI_ENTERPRISE_EXTENSION;
    ResourceMapping {
        resource: "User".to_string(),
        endpoint: None,
        search_base: format!("ou=people,{}", suffix),
        object_classes: ["top", "person", "organizationalPerson", "inetOrgPerson"]
            .into_iter()
            .map(String::from)
            .collect(),
        filter_object_class: None,
        rdn_attribute: "uid".to_string(),
        attributes: vec![
            AttributeMapping::simple(core, "userName", "uid"),
            AttributeMapping::complex(
                core,
                "name",
                vec![
                    SubAttributeMapping::new("formatted", "cn"),
                    SubAttributeMapping::new("familyName", "sn"),
                    SubAttributeMapping::new("givenName", "givenName"),
                ],
            ),
            AttributeMapping::simple(core, "displayName", "displayName"),
            AttributeMapping::simple(core, "title", "title"),
            AttributeMapping::simple(core, "preferredLanguage", "preferredLanguage"),
            AttributeMapping::canonical(core, "emails", vec![CanonicalValueMapping::value("work", "mail")]),
            AttributeMapping::canonical(
                core,
                "phoneNumbers",
                vec![
                    CanonicalValueMapping::value("work", "telephoneNumber"),
                    CanonicalValueMapping::value("mobile", "mobile"),
                    CanonicalValueMapping::value("home", "homePhone"),
                    CanonicalValueMapping::value("fax", "facsimileTelephoneNumber"),
                    CanonicalValueMapping::value("pager", "pager"),
                ],
            ),
            AttributeMapping::canonical(
                core,
                "addresses",
                vec![CanonicalValueMapping::complex(
                    "work",
                    vec![
                        SubAttributeMapping::new("formatted", "postalAddress"),
                        SubAttributeMapping::new("streetAddress", "street"),
                        SubAttributeMapping::new("locality", "l"),
                        SubAttributeMapping::new("region", "st"),
                        SubAttributeMapping::new("postalCode", "postalCode"),
                    ],
                )],
            ),
            AttributeMapping::simple(core, "x509Certificates", "userCertificate")
                .with_transformation(Transformation::Binary),
            AttributeMapping::simple(enterprise, "employeeNumber", "employeeNumber"),
            AttributeMapping::simple(enterprise, "organization", "o"),
            AttributeMapping::simple(enterprise, "department", "departmentNumber"),
            AttributeMapping::complex(enterprise, "manager", vec![SubAttributeMapping::new("managerId", "manager")]),
        ],
    }
}

/// Groups as groupOfUniqueNames entries below `ou=groups`
pub fn default_group_mapping(suffix: &str) -> ResourceMapping {
    ResourceMapping {
        resource: "Group".to_string(),
        endpoint: None,
        search_base: format!("ou=groups,{}", suffix),
        object_classes: vec!["top".to_string(), "groupOfUniqueNames".to_string()],
        filter_object_class: None,
        rdn_attribute: "cn".to_string(),
        attributes: vec![
            AttributeMapping::simple(SCHEMA_URI_CORE, "displayName", "cn"),
            AttributeMapping::simple(SCHEMA_URI_CORE, "members", "uniqueMember"),
        ],
    }
}

/// Compile every mapping against its built-in descriptor
pub fn build_mappers(mappings: &[ResourceMapping]) -> AppResult<Vec<ResourceMapper>> {
    mappings.iter().map(ResourceMapper::from_config).collect()
}
