use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use super::definitions::{SCHEMA_ATTRIBUTES_DESCRIPTOR, SCHEMA_DESCRIPTOR, SCHEMA_URI_CORE};
use super::descriptor::AttributeDescriptor;
use super::resolver::{AttributeDescriptorResolver, AttributeValueResolver};
use crate::error::{AppError, AppResult};
use crate::models::{ScimAttribute, ScimObject, SimpleValue};

type DescriptorIndex = HashMap<String, HashMap<String, Arc<AttributeDescriptor>>>;

/// How an undeclared attribute name is handled during resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMode {
    /// Undeclared attributes are an invalid-resource error
    Strict,
    /// Undeclared attributes resolve to an ad hoc multi-valued string descriptor
    Lenient,
}

impl ResolutionMode {
    pub fn from_strict_flag(strict: bool) -> Self {
        if strict {
            ResolutionMode::Strict
        } else {
            ResolutionMode::Lenient
        }
    }
}

/// Metadata describing one resource type and the attributes it may carry
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    name: String,
    description: String,
    schema: String,
    endpoint: String,
    attributes: Vec<Arc<AttributeDescriptor>>,
    index: OnceLock<DescriptorIndex>,
}

impl ResourceDescriptor {
    pub fn new(
        name: &str,
        description: &str,
        schema: &str,
        endpoint: &str,
        attributes: Vec<AttributeDescriptor>,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            schema: schema.to_string(),
            endpoint: endpoint.to_string(),
            attributes: attributes.into_iter().map(Arc::new).collect(),
            index: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Top-level attributes in declaration order
    pub fn attributes(&self) -> &[Arc<AttributeDescriptor>] {
        &self.attributes
    }

    /// Replace the declared attributes; the lookup index is rebuilt on next use
    pub fn set_attributes(&mut self, attributes: Vec<AttributeDescriptor>) {
        self.attributes = attributes.into_iter().map(Arc::new).collect();
        self.index = OnceLock::new();
    }

    /// Schemas contributing attributes: the resource's own schema first,
    /// then extension schemas in declaration order
    pub fn attribute_schemas(&self) -> Vec<&str> {
        let mut schemas = vec![self.schema.as_str()];
        for attribute in &self.attributes {
            if !schemas.iter().any(|s| s.eq_ignore_ascii_case(attribute.schema())) {
                schemas.push(attribute.schema());
            }
        }
        schemas
    }

    /// Declared descriptor for (schema, name), ignoring case
    pub fn find_attribute(&self, schema: &str, name: &str) -> Option<&Arc<AttributeDescriptor>> {
        self.index()
            .get(&schema.to_ascii_lowercase())?
            .get(&name.to_ascii_lowercase())
    }

    /// Resolve (schema, name) to a descriptor.
    ///
    /// Never alters the declared attributes: a lenient miss returns a fresh
    /// ad hoc descriptor.
    pub fn resolve(
        &self,
        schema: &str,
        name: &str,
        mode: ResolutionMode,
    ) -> AppResult<Arc<AttributeDescriptor>> {
        if let Some(descriptor) = self.find_attribute(schema, name) {
            return Ok(descriptor.clone());
        }
        match mode {
            ResolutionMode::Strict => Err(AppError::InvalidResource(format!(
                "attribute {}:{} is not defined for resource {}",
                schema, name, self.name
            ))),
            ResolutionMode::Lenient => Ok(Arc::new(AttributeDescriptor::ad_hoc(schema, name))),
        }
    }

    fn index(&self) -> &DescriptorIndex {
        self.index.get_or_init(|| {
            let mut index: DescriptorIndex = HashMap::new();
            for attribute in &self.attributes {
                index
                    .entry(attribute.schema().to_ascii_lowercase())
                    .or_default()
                    .insert(attribute.name().to_ascii_lowercase(), attribute.clone());
            }
            index
        })
    }

    /// Render this descriptor as a `Schema` resource for introspection
    pub fn to_schema_object(&self) -> AppResult<ScimObject> {
        let schema_resource = &*SCHEMA_DESCRIPTOR;
        let simple = |name: &str, value: &str| -> AppResult<ScimAttribute> {
            let descriptor = schema_resource.resolve(SCHEMA_URI_CORE, name, ResolutionMode::Strict)?;
            Ok(ScimAttribute::simple(descriptor, SimpleValue::from(value)))
        };

        let mut object = ScimObject::new(schema_resource.name());
        object.set_attribute(simple("id", &self.schema)?);
        object.set_attribute(simple("name", &self.name)?);
        object.set_attribute(simple("description", &self.description)?);
        object.set_attribute(simple("schema", &self.schema)?);
        object.set_attribute(simple("endpoint", &self.endpoint)?);

        let resolver = AttributeDescriptorResolver::new(false);
        let values = self
            .attributes
            .iter()
            .map(|a| resolver.from_instance(&SCHEMA_ATTRIBUTES_DESCRIPTOR, (**a).clone()))
            .collect::<AppResult<Vec<_>>>()?;
        object.set_attribute(ScimAttribute::plural(
            SCHEMA_ATTRIBUTES_DESCRIPTOR.clone(),
            values,
        ));
        Ok(object)
    }

    /// Rebuild a descriptor from a `Schema` resource
    pub fn from_schema_object(object: &ScimObject) -> AppResult<ResourceDescriptor> {
        let text = |name: &str| -> String {
            object
                .get_simple_value(SCHEMA_URI_CORE, name)
                .map(|v| v.string_value())
                .unwrap_or_default()
        };
        let resolver = AttributeDescriptorResolver::new(false);
        let attributes = match object.get_attribute(SCHEMA_URI_CORE, "attributes") {
            Some(attribute) => attribute
                .values()
                .iter()
                .map(|v| resolver.to_instance(v))
                .collect::<AppResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        Ok(ResourceDescriptor::new(
            &text("name"),
            &text("description"),
            &text("schema"),
            &text("endpoint"),
            attributes,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::definitions::{GROUP_DESCRIPTOR, SCHEMA_URI_ENTERPRISE_EXTENSION, USER_DESCRIPTOR};
    use crate::schema::DataType;

    #[test]
    fn test_resolution_is_case_insensitive() {
        let descriptor = USER_DESCRIPTOR
            .resolve("URN:SCIM:SCHEMAS:CORE:1.0", "USERNAME", ResolutionMode::Strict)
            .unwrap();
        assert_eq!(descriptor.name(), "userName");
    }

    #[test]
    fn test_strict_miss_is_invalid_resource() {
        let err = USER_DESCRIPTOR
            .resolve(SCHEMA_URI_CORE, "shoeSize", ResolutionMode::Strict)
            .unwrap_err();
        assert_eq!(err.status(), 400);
        assert!(matches!(err, AppError::InvalidResource(_)));
    }

    #[test]
    fn test_lenient_miss_synthesizes_without_mutating() {
        let descriptor = USER_DESCRIPTOR
            .resolve("urn:example:ext", "shoeSize", ResolutionMode::Lenient)
            .unwrap();
        assert!(descriptor.is_multi_valued());
        assert_eq!(descriptor.schema(), "urn:example:ext");
        assert!(USER_DESCRIPTOR.find_attribute("urn:example:ext", "shoeSize").is_none());
    }

    #[test]
    fn test_set_attributes_invalidates_index() {
        let mut descriptor = (**GROUP_DESCRIPTOR).clone();
        assert!(descriptor.find_attribute(SCHEMA_URI_CORE, "displayName").is_some());

        descriptor.set_attributes(vec![AttributeDescriptor::simple(
            "label",
            DataType::String,
            "",
            SCHEMA_URI_CORE,
            false,
            false,
            false,
        )]);
        assert!(descriptor.find_attribute(SCHEMA_URI_CORE, "displayName").is_none());
        assert!(descriptor.find_attribute(SCHEMA_URI_CORE, "LABEL").is_some());
    }

    #[test]
    fn test_attribute_schemas_order() {
        assert_eq!(
            USER_DESCRIPTOR.attribute_schemas(),
            vec![SCHEMA_URI_CORE, SCHEMA_URI_ENTERPRISE_EXTENSION]
        );
    }

    #[test]
    fn test_schema_introspection_round_trip() {
        let object = GROUP_DESCRIPTOR.to_schema_object().unwrap();
        assert_eq!(
            object.get_simple_value(SCHEMA_URI_CORE, "endpoint").unwrap().string_value(),
            "Groups"
        );

        let rebuilt = ResourceDescriptor::from_schema_object(&object).unwrap();
        assert_eq!(rebuilt.name(), "Group");
        assert_eq!(rebuilt.attributes().len(), GROUP_DESCRIPTOR.attributes().len());
        let members = rebuilt.find_attribute(SCHEMA_URI_CORE, "members").unwrap();
        assert!(members.is_multi_valued());
        assert!(members.sub_attribute("value").is_some());
        assert_eq!(
            members.sub_attribute("type").unwrap().canonical_values(),
            &["User", "Group"]
        );
    }
}
