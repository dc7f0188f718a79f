use super::attribute::ScimAttribute;
use super::value::SimpleValue;

#[derive(Debug, Clone, PartialEq)]
struct SchemaAttributes {
    schema: String,
    attributes: Vec<ScimAttribute>,
}

/// One resource instance: attributes grouped by schema URI.
///
/// Schemas keep their first-insertion order and attributes keep theirs, so a
/// resource built in descriptor order serializes in descriptor order.
/// Lookups by schema and by name are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScimObject {
    resource_name: String,
    schemas: Vec<SchemaAttributes>,
}

impl ScimObject {
    pub fn new(resource_name: impl Into<String>) -> Self {
        Self {
            resource_name: resource_name.into(),
            schemas: Vec::new(),
        }
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    /// Schemas that contribute at least one attribute
    pub fn schemas(&self) -> Vec<&str> {
        self.schemas.iter().map(|s| s.schema.as_str()).collect()
    }

    /// Attributes of one schema, in insertion order
    pub fn attributes(&self, schema: &str) -> &[ScimAttribute] {
        self.group(schema)
            .map(|g| g.attributes.as_slice())
            .unwrap_or(&[])
    }

    /// All attributes across schemas
    pub fn iter(&self) -> impl Iterator<Item = &ScimAttribute> {
        self.schemas.iter().flat_map(|s| s.attributes.iter())
    }

    pub fn get_attribute(&self, schema: &str, name: &str) -> Option<&ScimAttribute> {
        self.group(schema)?
            .attributes
            .iter()
            .find(|a| a.name().eq_ignore_ascii_case(name))
    }

    pub fn has_attribute(&self, schema: &str, name: &str) -> bool {
        self.get_attribute(schema, name).is_some()
    }

    /// Simple value of a singular attribute, if present
    pub fn get_simple_value(&self, schema: &str, name: &str) -> Option<&SimpleValue> {
        self.get_attribute(schema, name)?.value()?.as_simple()
    }

    /// Add an attribute; returns false if one with the same key already exists
    pub fn add_attribute(&mut self, attribute: ScimAttribute) -> bool {
        if self.has_attribute(attribute.schema(), attribute.name()) {
            return false;
        }
        self.group_mut(attribute.schema()).attributes.push(attribute);
        true
    }

    /// Add an attribute, replacing any existing one with the same key
    pub fn set_attribute(&mut self, attribute: ScimAttribute) {
        let group = self.group_mut(attribute.schema());
        match group
            .attributes
            .iter_mut()
            .find(|a| a.name().eq_ignore_ascii_case(attribute.name()))
        {
            Some(existing) => *existing = attribute,
            None => group.attributes.push(attribute),
        }
    }

    pub fn remove_attribute(&mut self, schema: &str, name: &str) -> bool {
        let Some(index) = self
            .schemas
            .iter()
            .position(|s| s.schema.eq_ignore_ascii_case(schema))
        else {
            return false;
        };
        let group = &mut self.schemas[index];
        let before = group.attributes.len();
        group.attributes.retain(|a| !a.name().eq_ignore_ascii_case(name));
        let removed = before != group.attributes.len();
        if group.attributes.is_empty() {
            self.schemas.remove(index);
        }
        removed
    }

    /// Keep only the attributes accepted by `keep`
    pub fn retain_attributes<F>(&mut self, mut keep: F)
    where
        F: FnMut(&ScimAttribute) -> bool,
    {
        for group in &mut self.schemas {
            group.attributes.retain(|a| keep(a));
        }
        self.schemas.retain(|g| !g.attributes.is_empty());
    }

    fn group(&self, schema: &str) -> Option<&SchemaAttributes> {
        self.schemas
            .iter()
            .find(|s| s.schema.eq_ignore_ascii_case(schema))
    }

    fn group_mut(&mut self, schema: &str) -> &mut SchemaAttributes {
        let index = match self
            .schemas
            .iter()
            .position(|s| s.schema.eq_ignore_ascii_case(schema))
        {
            Some(index) => index,
            None => {
                self.schemas.push(SchemaAttributes {
                    schema: schema.to_string(),
                    attributes: Vec::new(),
                });
                self.schemas.len() - 1
            }
        };
        &mut self.schemas[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::definitions::{SCHEMA_URI_CORE, SCHEMA_URI_ENTERPRISE_EXTENSION, USER_DESCRIPTOR};
    use crate::schema::ResolutionMode;

    fn attr(schema: &str, name: &str, value: &str) -> ScimAttribute {
        let descriptor = USER_DESCRIPTOR
            .resolve(schema, name, ResolutionMode::Strict)
            .unwrap();
        ScimAttribute::simple(descriptor, value)
    }

    #[test]
    fn test_add_does_not_overwrite() {
        let mut user = ScimObject::new("User");
        assert!(user.add_attribute(attr(SCHEMA_URI_CORE, "userName", "bjensen")));
        assert!(!user.add_attribute(attr(SCHEMA_URI_CORE, "userName", "other")));
        assert_eq!(
            user.get_simple_value(SCHEMA_URI_CORE, "USERNAME"),
            Some(&SimpleValue::String("bjensen".to_string()))
        );

        user.set_attribute(attr(SCHEMA_URI_CORE, "userName", "other"));
        assert_eq!(
            user.get_simple_value(SCHEMA_URI_CORE, "userName"),
            Some(&SimpleValue::String("other".to_string()))
        );
        assert_eq!(user.attributes(SCHEMA_URI_CORE).len(), 1);
    }

    #[test]
    fn test_schemas_and_removal() {
        let mut user = ScimObject::new("User");
        user.set_attribute(attr(SCHEMA_URI_CORE, "userName", "bjensen"));
        user.set_attribute(attr(SCHEMA_URI_ENTERPRISE_EXTENSION, "employeeNumber", "701984"));
        assert_eq!(user.schemas(), vec![SCHEMA_URI_CORE, SCHEMA_URI_ENTERPRISE_EXTENSION]);

        assert!(user.remove_attribute(SCHEMA_URI_ENTERPRISE_EXTENSION, "employeenumber"));
        assert!(!user.remove_attribute(SCHEMA_URI_ENTERPRISE_EXTENSION, "employeeNumber"));
        assert_eq!(user.schemas(), vec![SCHEMA_URI_CORE]);
        assert!(!user.has_attribute(SCHEMA_URI_CORE, "title"));
        assert!(user.get_attribute("urn:unknown", "userName").is_none());
    }
}
