use std::slice;
use std::sync::Arc;

use super::value::{ComplexValue, ScimValue, SimpleValue};
use crate::schema::AttributeDescriptor;

/// Cardinality-tagged values of an attribute
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValues {
    Singular(ScimValue),
    /// Ordered, duplicates allowed
    Plural(Vec<ScimValue>),
}

/// An attribute instance, bound to the descriptor that types its values
#[derive(Debug, Clone, PartialEq)]
pub struct ScimAttribute {
    descriptor: Arc<AttributeDescriptor>,
    values: AttributeValues,
}

impl ScimAttribute {
    pub fn singular(descriptor: Arc<AttributeDescriptor>, value: impl Into<ScimValue>) -> Self {
        Self {
            descriptor,
            values: AttributeValues::Singular(value.into()),
        }
    }

    pub fn plural(descriptor: Arc<AttributeDescriptor>, values: Vec<ScimValue>) -> Self {
        Self {
            descriptor,
            values: AttributeValues::Plural(values),
        }
    }

    /// Singular attribute holding one simple value
    pub fn simple(descriptor: Arc<AttributeDescriptor>, value: impl Into<SimpleValue>) -> Self {
        Self::singular(descriptor, ScimValue::Simple(value.into()))
    }

    /// Singular complex attribute built from sub-attributes
    pub fn complex(
        descriptor: Arc<AttributeDescriptor>,
        sub_attributes: impl IntoIterator<Item = ScimAttribute>,
    ) -> Self {
        let value: ComplexValue = sub_attributes.into_iter().collect();
        Self::singular(descriptor, ScimValue::Complex(value))
    }

    pub fn descriptor(&self) -> &Arc<AttributeDescriptor> {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn schema(&self) -> &str {
        self.descriptor.schema()
    }

    pub fn is_plural(&self) -> bool {
        matches!(self.values, AttributeValues::Plural(_))
    }

    /// The value of a singular attribute
    pub fn value(&self) -> Option<&ScimValue> {
        match &self.values {
            AttributeValues::Singular(v) => Some(v),
            AttributeValues::Plural(_) => None,
        }
    }

    /// All values; a singular attribute yields a one-element slice
    pub fn values(&self) -> &[ScimValue] {
        match &self.values {
            AttributeValues::Singular(v) => slice::from_ref(v),
            AttributeValues::Plural(vs) => vs,
        }
    }

    pub fn attribute_values(&self) -> &AttributeValues {
        &self.values
    }
}
