//! Conversion between typed values and attribute value subtrees

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::descriptor::{AttributeDescriptor, DataType};
use crate::error::{AppError, AppResult};
use crate::models::{ComplexValue, ScimAttribute, ScimValue, SimpleValue};

/// Converts between a typed instance and its [`ScimValue`] representation.
///
/// `from_instance` is given the descriptor of the attribute that will own the
/// value, so the produced value is typed by that descriptor.
pub trait AttributeValueResolver<T> {
    fn to_instance(&self, value: &ScimValue) -> AppResult<T>;

    fn from_instance(&self, descriptor: &AttributeDescriptor, value: T) -> AppResult<ScimValue>;
}

pub struct StringResolver;
pub struct BooleanResolver;
pub struct DateTimeResolver;
pub struct IntegerResolver;
pub struct DecimalResolver;
pub struct BinaryResolver;

pub const STRING_RESOLVER: StringResolver = StringResolver;
pub const BOOLEAN_RESOLVER: BooleanResolver = BooleanResolver;
pub const DATETIME_RESOLVER: DateTimeResolver = DateTimeResolver;
pub const INTEGER_RESOLVER: IntegerResolver = IntegerResolver;
pub const DECIMAL_RESOLVER: DecimalResolver = DecimalResolver;
pub const BINARY_RESOLVER: BinaryResolver = BinaryResolver;

fn simple(value: &ScimValue) -> AppResult<&SimpleValue> {
    value
        .as_simple()
        .ok_or_else(|| AppError::InvalidResource("expected a simple value, found a complex value".to_string()))
}

/// Re-read a simple value as `data_type`
fn convert(value: &ScimValue, data_type: DataType) -> AppResult<SimpleValue> {
    let simple = simple(value)?;
    let already_typed = matches!(
        (data_type, simple),
        (DataType::Boolean, SimpleValue::Boolean(_))
            | (DataType::DateTime, SimpleValue::DateTime(_))
            | (DataType::Decimal, SimpleValue::Decimal(_))
            | (DataType::Integer, SimpleValue::Integer(_))
            | (DataType::Binary, SimpleValue::Binary(_))
            | (DataType::String, SimpleValue::String(_))
    );
    if already_typed {
        return Ok(simple.clone());
    }
    SimpleValue::parse(data_type, &simple.string_value())
}

/// Type `value` by the owning descriptor's data type
fn typed(descriptor: &AttributeDescriptor, value: SimpleValue) -> AppResult<ScimValue> {
    let data_type = descriptor.data_type();
    if data_type == DataType::Complex {
        return Err(AppError::InvalidResource(format!(
            "attribute '{}' is complex and cannot hold a simple value",
            descriptor.name()
        )));
    }
    convert(&ScimValue::Simple(value), data_type).map(ScimValue::Simple)
}

impl AttributeValueResolver<String> for StringResolver {
    fn to_instance(&self, value: &ScimValue) -> AppResult<String> {
        Ok(simple(value)?.string_value())
    }

    fn from_instance(&self, descriptor: &AttributeDescriptor, value: String) -> AppResult<ScimValue> {
        typed(descriptor, SimpleValue::String(value))
    }
}

impl AttributeValueResolver<bool> for BooleanResolver {
    fn to_instance(&self, value: &ScimValue) -> AppResult<bool> {
        match convert(value, DataType::Boolean)? {
            SimpleValue::Boolean(b) => Ok(b),
            other => Err(AppError::InvalidResource(format!("'{}' is not a boolean", other))),
        }
    }

    fn from_instance(&self, descriptor: &AttributeDescriptor, value: bool) -> AppResult<ScimValue> {
        typed(descriptor, SimpleValue::Boolean(value))
    }
}

impl AttributeValueResolver<DateTime<Utc>> for DateTimeResolver {
    fn to_instance(&self, value: &ScimValue) -> AppResult<DateTime<Utc>> {
        match convert(value, DataType::DateTime)? {
            SimpleValue::DateTime(dt) => Ok(dt),
            other => Err(AppError::InvalidResource(format!("'{}' is not a dateTime", other))),
        }
    }

    fn from_instance(
        &self,
        descriptor: &AttributeDescriptor,
        value: DateTime<Utc>,
    ) -> AppResult<ScimValue> {
        typed(descriptor, SimpleValue::DateTime(value))
    }
}

impl AttributeValueResolver<i64> for IntegerResolver {
    fn to_instance(&self, value: &ScimValue) -> AppResult<i64> {
        match convert(value, DataType::Integer)? {
            SimpleValue::Integer(i) => Ok(i),
            other => Err(AppError::InvalidResource(format!("'{}' is not an integer", other))),
        }
    }

    fn from_instance(&self, descriptor: &AttributeDescriptor, value: i64) -> AppResult<ScimValue> {
        typed(descriptor, SimpleValue::Integer(value))
    }
}

impl AttributeValueResolver<f64> for DecimalResolver {
    fn to_instance(&self, value: &ScimValue) -> AppResult<f64> {
        match convert(value, DataType::Decimal)? {
            SimpleValue::Decimal(d) => Ok(d),
            other => Err(AppError::InvalidResource(format!("'{}' is not a decimal", other))),
        }
    }

    fn from_instance(&self, descriptor: &AttributeDescriptor, value: f64) -> AppResult<ScimValue> {
        typed(descriptor, SimpleValue::Decimal(value))
    }
}

impl AttributeValueResolver<Vec<u8>> for BinaryResolver {
    fn to_instance(&self, value: &ScimValue) -> AppResult<Vec<u8>> {
        match convert(value, DataType::Binary)? {
            SimpleValue::Binary(bytes) => Ok(bytes),
            other => Err(AppError::InvalidResource(format!("'{}' is not binary", other))),
        }
    }

    fn from_instance(&self, descriptor: &AttributeDescriptor, value: Vec<u8>) -> AppResult<ScimValue> {
        typed(descriptor, SimpleValue::Binary(value))
    }
}

// Schema introspection: descriptors rendered as values of the `attributes`
// attribute of a `Schema` resource.

fn sub_descriptor(descriptor: &AttributeDescriptor, name: &str) -> AppResult<Arc<AttributeDescriptor>> {
    descriptor.sub_attribute(name).cloned().ok_or_else(|| {
        AppError::InvalidArgument(format!(
            "introspection attribute '{}' has no sub-attribute '{}'",
            descriptor.name(),
            name
        ))
    })
}

fn text_field(
    parent: &AttributeDescriptor,
    out: &mut ComplexValue,
    name: &str,
    value: &str,
) -> AppResult<()> {
    out.set(ScimAttribute::simple(sub_descriptor(parent, name)?, value));
    Ok(())
}

fn flag_field(
    parent: &AttributeDescriptor,
    out: &mut ComplexValue,
    name: &str,
    value: bool,
) -> AppResult<()> {
    out.set(ScimAttribute::simple(sub_descriptor(parent, name)?, value));
    Ok(())
}

fn canonical_field(
    parent: &AttributeDescriptor,
    out: &mut ComplexValue,
    values: &[String],
) -> AppResult<()> {
    if values.is_empty() {
        return Ok(());
    }
    out.set(ScimAttribute::plural(
        sub_descriptor(parent, "canonicalValues")?,
        values.iter().map(ScimValue::string).collect(),
    ));
    Ok(())
}

/// Fields shared by top-level and sub-attribute introspection
fn common_fields(
    parent: &AttributeDescriptor,
    attribute: &AttributeDescriptor,
) -> AppResult<ComplexValue> {
    let mut out = ComplexValue::new();
    text_field(parent, &mut out, "name", attribute.name())?;
    text_field(parent, &mut out, "type", attribute.data_type().as_str())?;
    flag_field(parent, &mut out, "multiValued", attribute.is_multi_valued())?;
    text_field(parent, &mut out, "description", attribute.description())?;
    flag_field(parent, &mut out, "readOnly", attribute.is_read_only())?;
    flag_field(parent, &mut out, "required", attribute.is_required())?;
    flag_field(parent, &mut out, "caseExact", attribute.is_case_exact())?;
    canonical_field(parent, &mut out, attribute.canonical_values())?;
    Ok(out)
}

struct IntrospectedFields {
    name: String,
    data_type: DataType,
    multi_valued: bool,
    description: String,
    read_only: bool,
    required: bool,
    case_exact: bool,
    canonical_values: Vec<String>,
}

fn read_fields(value: &ScimValue) -> AppResult<IntrospectedFields> {
    if !value.is_complex() {
        return Err(AppError::InvalidResource(
            "an attribute definition must be a complex value".to_string(),
        ));
    }
    let text = |name: &str| value.sub_value(name).map(|v| v.string_value());
    let flag = |name: &str| -> AppResult<bool> {
        match value.sub_attribute(name).and_then(|a| a.value()) {
            Some(v) => BOOLEAN_RESOLVER.to_instance(v),
            None => Ok(false),
        }
    };

    let name = text("name").ok_or_else(|| {
        AppError::InvalidResource("an attribute definition must have a name".to_string())
    })?;
    let data_type = match text("type") {
        Some(t) => DataType::parse(&t).ok_or_else(|| {
            AppError::InvalidResource(format!("attribute '{}' has unknown type '{}'", name, t))
        })?,
        None => DataType::String,
    };
    let canonical_values = value
        .sub_attribute("canonicalValues")
        .map(|a| {
            a.values()
                .iter()
                .map(|v| STRING_RESOLVER.to_instance(v))
                .collect::<AppResult<Vec<_>>>()
        })
        .transpose()?
        .unwrap_or_default();

    Ok(IntrospectedFields {
        data_type,
        multi_valued: flag("multiValued")?,
        description: text("description").unwrap_or_default(),
        read_only: flag("readOnly")?,
        required: flag("required")?,
        case_exact: flag("caseExact")?,
        canonical_values,
        name,
    })
}

/// Resolver for top-level attribute definitions.
///
/// With nesting allowed, sub-attribute definitions are handled by this same
/// resolver and may nest to any depth. Without nesting, they are handled by a
/// [`SubAttributeDescriptorResolver`] scoped to the parent's schema.
pub struct AttributeDescriptorResolver {
    allow_nesting: bool,
}

impl AttributeDescriptorResolver {
    pub fn new(allow_nesting: bool) -> Self {
        Self { allow_nesting }
    }
}

impl AttributeValueResolver<AttributeDescriptor> for AttributeDescriptorResolver {
    fn to_instance(&self, value: &ScimValue) -> AppResult<AttributeDescriptor> {
        let fields = read_fields(value)?;
        let schema = value
            .sub_value("schema")
            .map(|v| v.string_value())
            .unwrap_or_default();

        let sub_values: &[ScimValue] = value
            .sub_attribute("subAttributes")
            .map(|a| a.values())
            .unwrap_or(&[]);
        let sub_attributes = if self.allow_nesting {
            sub_values
                .iter()
                .map(|v| self.to_instance(v))
                .collect::<AppResult<Vec<_>>>()?
        } else {
            let sub_resolver = SubAttributeDescriptorResolver::new(&schema);
            sub_values
                .iter()
                .map(|v| sub_resolver.to_instance(v))
                .collect::<AppResult<Vec<_>>>()?
        };

        let canonical: Vec<&str> = fields.canonical_values.iter().map(String::as_str).collect();
        if fields.multi_valued {
            AttributeDescriptor::multi_valued(
                &fields.name,
                fields.data_type,
                &fields.description,
                &schema,
                fields.read_only,
                fields.required,
                fields.case_exact,
                &canonical,
                sub_attributes,
            )
        } else if fields.data_type == DataType::Complex {
            AttributeDescriptor::singular_complex(
                &fields.name,
                &fields.description,
                &schema,
                fields.read_only,
                fields.required,
                sub_attributes,
            )
        } else {
            Ok(AttributeDescriptor::unchecked(
                &fields.name,
                fields.data_type,
                &fields.description,
                &schema,
                false,
                fields.read_only,
                fields.required,
                fields.case_exact,
                fields.canonical_values,
                Vec::new(),
            ))
        }
    }

    fn from_instance(
        &self,
        descriptor: &AttributeDescriptor,
        value: AttributeDescriptor,
    ) -> AppResult<ScimValue> {
        let mut out = common_fields(descriptor, &value)?;
        text_field(descriptor, &mut out, "schema", value.schema())?;

        if !value.sub_attributes().is_empty() {
            let sub_attributes_descriptor = sub_descriptor(descriptor, "subAttributes")?;
            let elements = if self.allow_nesting {
                value
                    .sub_attributes()
                    .iter()
                    .map(|sub| self.from_instance(descriptor, (**sub).clone()))
                    .collect::<AppResult<Vec<_>>>()?
            } else {
                let sub_resolver = SubAttributeDescriptorResolver::new(value.schema());
                value
                    .sub_attributes()
                    .iter()
                    .map(|sub| sub_resolver.from_instance(&sub_attributes_descriptor, (**sub).clone()))
                    .collect::<AppResult<Vec<_>>>()?
            };
            out.set(ScimAttribute::plural(sub_attributes_descriptor, elements));
        }
        Ok(ScimValue::Complex(out))
    }
}

/// Resolver for sub-attribute definitions, which never nest and always
/// belong to a fixed schema
pub struct SubAttributeDescriptorResolver {
    schema: String,
}

impl SubAttributeDescriptorResolver {
    pub fn new(schema: &str) -> Self {
        Self {
            schema: schema.to_string(),
        }
    }
}

impl AttributeValueResolver<AttributeDescriptor> for SubAttributeDescriptorResolver {
    fn to_instance(&self, value: &ScimValue) -> AppResult<AttributeDescriptor> {
        let fields = read_fields(value)?;
        if fields.data_type == DataType::Complex {
            return Err(AppError::InvalidArgument(format!(
                "sub-attribute '{}' cannot be complex",
                fields.name
            )));
        }
        Ok(AttributeDescriptor::unchecked(
            &fields.name,
            fields.data_type,
            &fields.description,
            &self.schema,
            fields.multi_valued,
            fields.read_only,
            fields.required,
            fields.case_exact,
            fields.canonical_values,
            Vec::new(),
        ))
    }

    fn from_instance(
        &self,
        descriptor: &AttributeDescriptor,
        value: AttributeDescriptor,
    ) -> AppResult<ScimValue> {
        common_fields(descriptor, &value).map(ScimValue::Complex)
    }
}
