//! Attribute descriptors and normative sub-attribute synthesis

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{AppError, AppResult};

/// Data type of an attribute value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    String,
    Boolean,
    DateTime,
    Decimal,
    Integer,
    Binary,
    Complex,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Boolean => "boolean",
            DataType::DateTime => "dateTime",
            DataType::Decimal => "decimal",
            DataType::Integer => "integer",
            DataType::Binary => "binary",
            DataType::Complex => "complex",
        }
    }

    pub fn parse(s: &str) -> Option<DataType> {
        [
            DataType::String,
            DataType::Boolean,
            DataType::DateTime,
            DataType::Decimal,
            DataType::Integer,
            DataType::Binary,
            DataType::Complex,
        ]
        .into_iter()
        .find(|t| t.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable metadata for one attribute.
///
/// Two descriptors are equal when their schema URIs and names match,
/// ignoring ASCII case.
#[derive(Debug, Clone)]
pub struct AttributeDescriptor {
    schema: String,
    name: String,
    description: String,
    data_type: DataType,
    multi_valued: bool,
    read_only: bool,
    required: bool,
    case_exact: bool,
    canonical_values: Vec<String>,
    sub_attributes: Vec<Arc<AttributeDescriptor>>,
}

impl PartialEq for AttributeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.schema.eq_ignore_ascii_case(&other.schema) && self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl Eq for AttributeDescriptor {}

impl AttributeDescriptor {
    /// A singular attribute with a simple data type
    pub fn simple(
        name: &str,
        data_type: DataType,
        description: &str,
        schema: &str,
        read_only: bool,
        required: bool,
        case_exact: bool,
    ) -> Self {
        Self::unchecked(
            name,
            data_type,
            description,
            schema,
            false,
            read_only,
            required,
            case_exact,
            Vec::new(),
            Vec::new(),
        )
    }

    /// A singular complex attribute.
    ///
    /// Sub-attributes may not themselves be complex. The reserved `meta`
    /// attribute gains its normative sub-attributes.
    pub fn singular_complex(
        name: &str,
        description: &str,
        schema: &str,
        read_only: bool,
        required: bool,
        sub_attributes: Vec<AttributeDescriptor>,
    ) -> AppResult<Self> {
        check_sub_attributes(name, &sub_attributes)?;
        let mut descriptor = Self::unchecked(
            name,
            DataType::Complex,
            description,
            schema,
            false,
            read_only,
            required,
            false,
            Vec::new(),
            sub_attributes,
        );
        descriptor.inject_normative_sub_attributes();
        Ok(descriptor)
    }

    /// A multi-valued attribute.
    ///
    /// `data_type` is the element type; `Complex` elements carry only the
    /// declared sub-attributes plus the normative ones, other element types
    /// also gain a `value` sub-attribute of that type.
    #[allow(clippy::too_many_arguments)]
    pub fn multi_valued(
        name: &str,
        data_type: DataType,
        description: &str,
        schema: &str,
        read_only: bool,
        required: bool,
        case_exact: bool,
        canonical_values: &[&str],
        sub_attributes: Vec<AttributeDescriptor>,
    ) -> AppResult<Self> {
        check_sub_attributes(name, &sub_attributes)?;
        let mut descriptor = Self::unchecked(
            name,
            data_type,
            description,
            schema,
            true,
            read_only,
            required,
            case_exact,
            canonical_values.iter().map(|v| v.to_string()).collect(),
            sub_attributes,
        );
        descriptor.inject_normative_sub_attributes();
        Ok(descriptor)
    }

    /// Fallback for an undeclared attribute in lenient resolution:
    /// multi-valued with a single string `value` sub-attribute
    pub fn ad_hoc(schema: &str, name: &str) -> Self {
        let value = Self::simple("value", DataType::String, "", schema, false, false, false);
        Self::unchecked(
            name,
            DataType::String,
            "",
            schema,
            true,
            false,
            false,
            false,
            Vec::new(),
            vec![value],
        )
    }

    /// Builds a descriptor without validating or synthesizing sub-attributes.
    ///
    /// Only introspection descriptors, which describe attribute trees of
    /// arbitrary depth, are built this way.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn unchecked(
        name: &str,
        data_type: DataType,
        description: &str,
        schema: &str,
        multi_valued: bool,
        read_only: bool,
        required: bool,
        case_exact: bool,
        canonical_values: Vec<String>,
        sub_attributes: Vec<AttributeDescriptor>,
    ) -> Self {
        Self {
            schema: schema.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            data_type,
            multi_valued,
            read_only,
            required,
            case_exact,
            canonical_values,
            sub_attributes: sub_attributes.into_iter().map(Arc::new).collect(),
        }
    }

    /// Add the implicit sub-attributes a multi-valued or `meta` attribute
    /// carries. A sub-attribute already declared under the same name (any
    /// case) is kept as declared, so calling this repeatedly is a no-op.
    pub fn inject_normative_sub_attributes(&mut self) {
        let defaults = if self.multi_valued {
            self.multi_valued_defaults()
        } else if self.name.eq_ignore_ascii_case("meta") {
            meta_defaults(&self.schema)
        } else {
            return;
        };

        for default in defaults {
            if self.sub_attribute(&default.name).is_none() {
                self.sub_attributes.push(Arc::new(default));
            }
        }
    }

    fn multi_valued_defaults(&self) -> Vec<AttributeDescriptor> {
        let schema = self.schema.as_str();
        let mut type_attr = Self::simple(
            "type",
            DataType::String,
            "A label indicating the attribute's function",
            schema,
            false,
            false,
            false,
        );
        type_attr.canonical_values = self.canonical_values.clone();

        let mut defaults = vec![
            type_attr,
            Self::simple(
                "primary",
                DataType::Boolean,
                "A Boolean value indicating the preferred value",
                schema,
                false,
                false,
                false,
            ),
            Self::simple(
                "display",
                DataType::String,
                "A human readable name, primarily used for display purposes",
                schema,
                true,
                false,
                false,
            ),
            Self::simple(
                "operation",
                DataType::String,
                "The operation to perform on the value during a partial update",
                schema,
                false,
                false,
                false,
            ),
        ];
        if self.data_type != DataType::Complex {
            defaults.push(Self::simple(
                "value",
                self.data_type,
                "The attribute's significant value",
                schema,
                false,
                false,
                self.case_exact,
            ));
        }
        defaults
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn is_multi_valued(&self) -> bool {
        self.multi_valued
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_case_exact(&self) -> bool {
        self.case_exact
    }

    pub fn canonical_values(&self) -> &[String] {
        &self.canonical_values
    }

    /// Whether values of this attribute are complex in the value tree
    pub fn has_complex_values(&self) -> bool {
        self.data_type == DataType::Complex || !self.sub_attributes.is_empty()
    }

    pub fn sub_attributes(&self) -> &[Arc<AttributeDescriptor>] {
        &self.sub_attributes
    }

    pub fn sub_attribute(&self, name: &str) -> Option<&Arc<AttributeDescriptor>> {
        self.sub_attributes
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for AttributeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.schema, self.name)
    }
}

fn check_sub_attributes(parent: &str, sub_attributes: &[AttributeDescriptor]) -> AppResult<()> {
    if let Some(complex) = sub_attributes
        .iter()
        .find(|d| d.data_type == DataType::Complex)
    {
        return Err(AppError::InvalidArgument(format!(
            "complex attribute '{}' cannot be a sub-attribute of complex attribute '{}'",
            complex.name, parent
        )));
    }
    Ok(())
}

fn meta_defaults(schema: &str) -> Vec<AttributeDescriptor> {
    vec![
        AttributeDescriptor::simple(
            "created",
            DataType::DateTime,
            "The DateTime the Resource was added to the Service Provider",
            schema,
            true,
            false,
            false,
        ),
        AttributeDescriptor::simple(
            "lastModified",
            DataType::DateTime,
            "The most recent DateTime the details of this Resource were updated",
            schema,
            true,
            false,
            false,
        ),
        AttributeDescriptor::simple(
            "location",
            DataType::String,
            "The URI of the Resource being returned",
            schema,
            true,
            false,
            false,
        ),
        AttributeDescriptor::simple(
            "version",
            DataType::String,
            "The version of the Resource being returned",
            schema,
            true,
            false,
            false,
        ),
        AttributeDescriptor::unchecked(
            "attributes",
            DataType::String,
            "The names of the attributes to remove during a partial update",
            schema,
            true,
            false,
            false,
            false,
            Vec::new(),
            Vec::new(),
        ),
    ]
}
