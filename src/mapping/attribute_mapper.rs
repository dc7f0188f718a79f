//! Per-attribute conversion between SCIM attributes and directory attributes

use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::transformation::Transformation;
use super::{AttributeMapping, CanonicalValueMapping, SubAttributeMapping};
use crate::backend::directory::{DirectoryFilter, Entry};
use crate::error::{AppError, AppResult};
use crate::models::{ComplexValue, ScimAttribute, ScimValue, SimpleValue};
use crate::parser::CompareOperator;
use crate::schema::{AttributeDescriptor, DataType};

/// Maps one SCIM attribute onto one or more directory attributes
pub trait AttributeMapper: Send + Sync + fmt::Debug {
    fn descriptor(&self) -> &Arc<AttributeDescriptor>;

    /// Directory attributes read and written by this mapper
    fn directory_attributes(&self) -> Vec<String>;

    /// Write the attribute's values into `entry`
    fn to_directory(&self, attribute: &ScimAttribute, entry: &mut Entry) -> AppResult<()>;

    /// Read the attribute from `entry`; `None` when the entry has no values for it
    fn to_scim(&self, entry: &Entry) -> AppResult<Option<ScimAttribute>>;

    /// Native filter for one comparison, or `None` when it cannot be
    /// expressed against the directory
    fn to_directory_filter(
        &self,
        op: CompareOperator,
        sub_attribute: Option<&str>,
        value: Option<&str>,
    ) -> AppResult<Option<DirectoryFilter>>;

    /// Directory attribute to sort on
    fn sort_attribute(&self, sub_attribute: Option<&str>) -> Option<String>;
}

/// Build the mapper matching the descriptor's shape
pub fn create_mapper(
    descriptor: Arc<AttributeDescriptor>,
    mapping: &AttributeMapping,
) -> AppResult<Box<dyn AttributeMapper>> {
    if descriptor.is_multi_valued() {
        if !mapping.canonical_values.is_empty() {
            return Ok(Box::new(CanonicalTypeMapper::new(descriptor, &mapping.canonical_values)?));
        }
        let Some(attribute) = &mapping.directory_attribute else {
            return Err(invalid_mapping(
                &descriptor,
                "a multi-valued attribute needs a directory attribute or canonical value mappings",
            ));
        };
        let value_descriptor = value_descriptor(&descriptor)?;
        return Ok(Box::new(PluralAttributeMapper {
            descriptor,
            value_descriptor,
            attribute: attribute.clone(),
            transformation: mapping.transformation,
        }));
    }

    if descriptor.has_complex_values() {
        if mapping.sub_attributes.is_empty() {
            return Err(invalid_mapping(&descriptor, "a complex attribute needs sub-attribute mappings"));
        }
        let sub_attributes = sub_mappings(&descriptor, &mapping.sub_attributes)?;
        return Ok(Box::new(ComplexAttributeMapper {
            descriptor,
            sub_attributes,
        }));
    }

    match &mapping.directory_attribute {
        Some(attribute) => Ok(Box::new(SimpleAttributeMapper {
            descriptor,
            attribute: attribute.clone(),
            transformation: mapping.transformation,
        })),
        None => Err(invalid_mapping(&descriptor, "no directory attribute given")),
    }
}

fn invalid_mapping(descriptor: &AttributeDescriptor, reason: &str) -> AppError {
    AppError::InvalidArgument(format!(
        "invalid mapping for attribute {}:{}: {}",
        descriptor.schema(),
        descriptor.name(),
        reason
    ))
}

fn value_descriptor(descriptor: &AttributeDescriptor) -> AppResult<Arc<AttributeDescriptor>> {
    descriptor
        .sub_attribute("value")
        .cloned()
        .ok_or_else(|| invalid_mapping(descriptor, "elements have no value sub-attribute"))
}

fn sub_mappings(descriptor: &AttributeDescriptor, mappings: &[SubAttributeMapping]) -> AppResult<Vec<SubMapping>> {
    mappings
        .iter()
        .map(|m| {
            let sub_descriptor = descriptor
                .sub_attribute(&m.name)
                .cloned()
                .ok_or_else(|| invalid_mapping(descriptor, &format!("unknown sub-attribute {}", m.name)))?;
            Ok(SubMapping {
                descriptor: sub_descriptor,
                attribute: m.directory_attribute.clone(),
                transformation: m.transformation,
            })
        })
        .collect()
}

/// Native filter for one comparison on one directory attribute
pub(crate) fn compare_filter(
    op: CompareOperator,
    attribute: &str,
    transformation: Transformation,
    value: Option<&str>,
) -> AppResult<Option<DirectoryFilter>> {
    if op == CompareOperator::Presence {
        return Ok(Some(DirectoryFilter::present(attribute)));
    }
    let Some(value) = value else {
        return Ok(None);
    };
    let filter = match op {
        CompareOperator::Contains => DirectoryFilter::contains(attribute, value),
        CompareOperator::StartsWith => DirectoryFilter::starts_with(attribute, value),
        _ => {
            let value = transformation.filter_value(value)?;
            let equality = DirectoryFilter::equality(attribute, &value);
            match op {
                CompareOperator::GreaterOrEqual => DirectoryFilter::GreaterOrEqual(attribute.to_string(), value),
                CompareOperator::LessOrEqual => DirectoryFilter::LessOrEqual(attribute.to_string(), value),
                CompareOperator::GreaterThan => DirectoryFilter::and(vec![
                    DirectoryFilter::GreaterOrEqual(attribute.to_string(), value),
                    DirectoryFilter::Not(Box::new(equality)),
                ]),
                CompareOperator::LessThan => DirectoryFilter::and(vec![
                    DirectoryFilter::LessOrEqual(attribute.to_string(), value),
                    DirectoryFilter::Not(Box::new(equality)),
                ]),
                _ => equality,
            }
        }
    };
    Ok(Some(filter))
}

/// OR of the comparisons that could be mapped; `None` if any could not
fn any_of(filters: Vec<Option<DirectoryFilter>>) -> Option<DirectoryFilter> {
    if filters.is_empty() {
        return None;
    }
    filters.into_iter().collect::<Option<Vec<_>>>().map(DirectoryFilter::or)
}

fn simple_value<'a>(attribute: &'a ScimAttribute, value: &'a ScimValue) -> AppResult<&'a SimpleValue> {
    value.as_simple().ok_or_else(|| {
        AppError::InvalidResource(format!("attribute {} expects a simple value", attribute.name()))
    })
}

#[derive(Debug)]
struct SubMapping {
    descriptor: Arc<AttributeDescriptor>,
    attribute: String,
    transformation: Transformation,
}

impl SubMapping {
    fn name(&self) -> &str {
        self.descriptor.name()
    }

    fn write(&self, complex: &ComplexValue, entry: &mut Entry) -> AppResult<()> {
        if self.descriptor.is_read_only() {
            return Ok(());
        }
        if let Some(sub) = complex.get(self.name()) {
            let value = sub
                .value()
                .ok_or_else(|| AppError::InvalidResource(format!("sub-attribute {} must be singular", self.name())))?;
            let value = simple_value(sub, value)?;
            entry.set_values(&self.attribute, vec![self.transformation.to_directory(value)?]);
        }
        Ok(())
    }

    fn read(&self, entry: &Entry) -> AppResult<Option<ScimAttribute>> {
        match entry.first_value(&self.attribute) {
            Some(text) => {
                let value = self.transformation.to_scim(self.descriptor.data_type(), text)?;
                Ok(Some(ScimAttribute::simple(self.descriptor.clone(), value)))
            }
            None => Ok(None),
        }
    }
}

/// Singular simple attribute stored in one directory attribute
#[derive(Debug)]
pub struct SimpleAttributeMapper {
    descriptor: Arc<AttributeDescriptor>,
    attribute: String,
    transformation: Transformation,
}

impl AttributeMapper for SimpleAttributeMapper {
    fn descriptor(&self) -> &Arc<AttributeDescriptor> {
        &self.descriptor
    }

    fn directory_attributes(&self) -> Vec<String> {
        vec![self.attribute.clone()]
    }

    fn to_directory(&self, attribute: &ScimAttribute, entry: &mut Entry) -> AppResult<()> {
        let value = attribute.value().ok_or_else(|| {
            AppError::InvalidResource(format!("attribute {} must be singular", attribute.name()))
        })?;
        let value = simple_value(attribute, value)?;
        entry.set_values(&self.attribute, vec![self.transformation.to_directory(value)?]);
        Ok(())
    }

    fn to_scim(&self, entry: &Entry) -> AppResult<Option<ScimAttribute>> {
        match entry.first_value(&self.attribute) {
            Some(text) => {
                let value = self.transformation.to_scim(self.descriptor.data_type(), text)?;
                Ok(Some(ScimAttribute::simple(self.descriptor.clone(), value)))
            }
            None => Ok(None),
        }
    }

    fn to_directory_filter(
        &self,
        op: CompareOperator,
        sub_attribute: Option<&str>,
        value: Option<&str>,
    ) -> AppResult<Option<DirectoryFilter>> {
        if sub_attribute.is_some() {
            return Ok(None);
        }
        compare_filter(op, &self.attribute, self.transformation, value)
    }

    fn sort_attribute(&self, sub_attribute: Option<&str>) -> Option<String> {
        match sub_attribute {
            None => Some(self.attribute.clone()),
            Some(_) => None,
        }
    }
}

/// Singular complex attribute, one directory attribute per sub-attribute
#[derive(Debug)]
pub struct ComplexAttributeMapper {
    descriptor: Arc<AttributeDescriptor>,
    sub_attributes: Vec<SubMapping>,
}

impl ComplexAttributeMapper {
    fn sub_mapping(&self, name: &str) -> Option<&SubMapping> {
        self.sub_attributes.iter().find(|s| s.name().eq_ignore_ascii_case(name))
    }
}

impl AttributeMapper for ComplexAttributeMapper {
    fn descriptor(&self) -> &Arc<AttributeDescriptor> {
        &self.descriptor
    }

    fn directory_attributes(&self) -> Vec<String> {
        self.sub_attributes.iter().map(|s| s.attribute.clone()).collect()
    }

    fn to_directory(&self, attribute: &ScimAttribute, entry: &mut Entry) -> AppResult<()> {
        let complex = attribute.value().and_then(ScimValue::as_complex).ok_or_else(|| {
            AppError::InvalidResource(format!("attribute {} expects a complex value", attribute.name()))
        })?;
        for sub in &self.sub_attributes {
            sub.write(complex, entry)?;
        }
        Ok(())
    }

    fn to_scim(&self, entry: &Entry) -> AppResult<Option<ScimAttribute>> {
        let mut subs = Vec::new();
        for sub in &self.sub_attributes {
            if let Some(attribute) = sub.read(entry)? {
                subs.push(attribute);
            }
        }
        if subs.is_empty() {
            return Ok(None);
        }
        Ok(Some(ScimAttribute::complex(self.descriptor.clone(), subs)))
    }

    fn to_directory_filter(
        &self,
        op: CompareOperator,
        sub_attribute: Option<&str>,
        value: Option<&str>,
    ) -> AppResult<Option<DirectoryFilter>> {
        match sub_attribute {
            Some(name) => match self.sub_mapping(name) {
                Some(sub) => compare_filter(op, &sub.attribute, sub.transformation, value),
                None => Ok(None),
            },
            None if op == CompareOperator::Presence => Ok(any_of(
                self.sub_attributes
                    .iter()
                    .map(|s| Some(DirectoryFilter::present(&s.attribute)))
                    .collect(),
            )),
            None => Ok(None),
        }
    }

    fn sort_attribute(&self, sub_attribute: Option<&str>) -> Option<String> {
        self.sub_mapping(sub_attribute?).map(|s| s.attribute.clone())
    }
}

/// Values of one canonical type of a plural attribute
#[derive(Debug)]
struct TypedValues {
    type_name: String,
    /// Directory attribute holding every `value` of this type
    value: Option<(String, Transformation)>,
    /// Sub-attributes of a single complex element of this type
    sub_attributes: Vec<SubMapping>,
}

impl TypedValues {
    fn mapping_for(&self, sub_attribute: &str) -> Option<(&str, Transformation)> {
        if sub_attribute.eq_ignore_ascii_case("value") {
            if let Some((attribute, transformation)) = &self.value {
                return Some((attribute, *transformation));
            }
        }
        self.sub_attributes
            .iter()
            .find(|s| s.name().eq_ignore_ascii_case(sub_attribute))
            .map(|s| (s.attribute.as_str(), s.transformation))
    }

    fn directory_attributes(&self) -> impl Iterator<Item = &str> {
        self.value
            .iter()
            .map(|(attribute, _)| attribute.as_str())
            .chain(self.sub_attributes.iter().map(|s| s.attribute.as_str()))
    }
}

/// Plural attribute whose elements are split by canonical type, e.g.
/// `emails[type=work]` in `mail` and `emails[type=home]` elsewhere
#[derive(Debug)]
pub struct CanonicalTypeMapper {
    descriptor: Arc<AttributeDescriptor>,
    type_descriptor: Arc<AttributeDescriptor>,
    value_descriptor: Option<Arc<AttributeDescriptor>>,
    types: Vec<TypedValues>,
}

impl CanonicalTypeMapper {
    fn new(descriptor: Arc<AttributeDescriptor>, mappings: &[CanonicalValueMapping]) -> AppResult<Self> {
        let type_descriptor = descriptor
            .sub_attribute("type")
            .cloned()
            .ok_or_else(|| invalid_mapping(&descriptor, "elements have no type sub-attribute"))?;
        let value_descriptor = descriptor.sub_attribute("value").cloned();

        let mut types = Vec::new();
        for mapping in mappings {
            let value = match (&mapping.directory_attribute, &value_descriptor) {
                (Some(attribute), Some(_)) => Some((attribute.clone(), mapping.transformation)),
                (Some(_), None) => {
                    return Err(invalid_mapping(&descriptor, "elements have no value sub-attribute"));
                }
                (None, _) => None,
            };
            let sub_attributes = sub_mappings(&descriptor, &mapping.sub_attributes)?;
            if value.is_none() && sub_attributes.is_empty() {
                return Err(invalid_mapping(
                    &descriptor,
                    &format!("type {} maps no directory attribute", mapping.type_name),
                ));
            }
            types.push(TypedValues {
                type_name: mapping.type_name.clone(),
                value,
                sub_attributes,
            });
        }
        Ok(Self {
            descriptor,
            type_descriptor,
            value_descriptor,
            types,
        })
    }

    fn type_of(element: &ScimValue) -> Option<String> {
        element.sub_value("type").map(SimpleValue::string_value)
    }

    /// Elements of the given type; untyped elements belong to the first type
    fn elements_of<'a>(&'a self, typed: &'a TypedValues, attribute: &'a ScimAttribute) -> impl Iterator<Item = &'a ScimValue> {
        let is_default = self
            .types
            .first()
            .is_some_and(|t| t.type_name == typed.type_name);
        attribute.values().iter().filter(move |element| match Self::type_of(element) {
            Some(type_name) => type_name.eq_ignore_ascii_case(&typed.type_name),
            None => is_default,
        })
    }

    fn element(&self, typed: &TypedValues, mut sub_attributes: Vec<ScimAttribute>) -> ScimValue {
        sub_attributes.push(ScimAttribute::simple(
            self.type_descriptor.clone(),
            typed.type_name.as_str(),
        ));
        ScimValue::Complex(sub_attributes.into_iter().collect())
    }
}

impl AttributeMapper for CanonicalTypeMapper {
    fn descriptor(&self) -> &Arc<AttributeDescriptor> {
        &self.descriptor
    }

    fn directory_attributes(&self) -> Vec<String> {
        self.types
            .iter()
            .flat_map(|t| t.directory_attributes())
            .map(str::to_string)
            .collect()
    }

    fn to_directory(&self, attribute: &ScimAttribute, entry: &mut Entry) -> AppResult<()> {
        for element in attribute.values() {
            if let Some(type_name) = Self::type_of(element) {
                if !self.types.iter().any(|t| t.type_name.eq_ignore_ascii_case(&type_name)) {
                    debug!(attribute = attribute.name(), type_name = %type_name, "dropping element of unmapped type");
                }
            }
        }

        for typed in &self.types {
            if let Some((directory_attribute, transformation)) = &typed.value {
                let mut values = Vec::new();
                for element in self.elements_of(typed, attribute) {
                    let value = match element {
                        ScimValue::Complex(_) => element.sub_value("value"),
                        ScimValue::Simple(simple) => Some(simple),
                    };
                    if let Some(value) = value {
                        values.push(transformation.to_directory(value)?);
                    }
                }
                entry.set_values(directory_attribute, values);
            }
            if !typed.sub_attributes.is_empty() {
                let element = self.elements_of(typed, attribute).find_map(ScimValue::as_complex);
                if let Some(complex) = element {
                    for sub in &typed.sub_attributes {
                        sub.write(complex, entry)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn to_scim(&self, entry: &Entry) -> AppResult<Option<ScimAttribute>> {
        let mut elements = Vec::new();
        for typed in &self.types {
            if let (Some((directory_attribute, transformation)), Some(value_descriptor)) =
                (&typed.value, &self.value_descriptor)
            {
                for text in entry.values(directory_attribute) {
                    let value = transformation.to_scim(value_descriptor.data_type(), text)?;
                    let value = ScimAttribute::simple(value_descriptor.clone(), value);
                    elements.push(self.element(typed, vec![value]));
                }
            }
            if !typed.sub_attributes.is_empty() {
                let mut subs = Vec::new();
                for sub in &typed.sub_attributes {
                    if let Some(attribute) = sub.read(entry)? {
                        subs.push(attribute);
                    }
                }
                if !subs.is_empty() {
                    elements.push(self.element(typed, subs));
                }
            }
        }
        if elements.is_empty() {
            return Ok(None);
        }
        Ok(Some(ScimAttribute::plural(self.descriptor.clone(), elements)))
    }

    fn to_directory_filter(
        &self,
        op: CompareOperator,
        sub_attribute: Option<&str>,
        value: Option<&str>,
    ) -> AppResult<Option<DirectoryFilter>> {
        let sub_attribute = sub_attribute.unwrap_or("value");
        if sub_attribute.eq_ignore_ascii_case("type") {
            let presence = |typed: &TypedValues| {
                DirectoryFilter::or(typed.directory_attributes().map(DirectoryFilter::present).collect())
            };
            return Ok(match (op, value) {
                (CompareOperator::Presence, _) => any_of(self.types.iter().map(|t| Some(presence(t))).collect()),
                (CompareOperator::Equality, Some(value)) => self
                    .types
                    .iter()
                    .find(|t| t.type_name.eq_ignore_ascii_case(value))
                    .map(presence),
                _ => None,
            });
        }

        let mut filters = Vec::new();
        for (attribute, transformation) in self.types.iter().filter_map(|t| t.mapping_for(sub_attribute)) {
            filters.push(compare_filter(op, attribute, transformation, value)?);
        }
        Ok(any_of(filters))
    }

    fn sort_attribute(&self, sub_attribute: Option<&str>) -> Option<String> {
        let sub_attribute = sub_attribute.unwrap_or("value");
        self.types
            .iter()
            .find_map(|t| t.mapping_for(sub_attribute))
            .map(|(attribute, _)| attribute.to_string())
    }
}

/// Plural attribute with every directory value becoming one element, e.g.
/// group `members` in `uniqueMember`
#[derive(Debug)]
pub struct PluralAttributeMapper {
    descriptor: Arc<AttributeDescriptor>,
    value_descriptor: Arc<AttributeDescriptor>,
    attribute: String,
    transformation: Transformation,
}

impl AttributeMapper for PluralAttributeMapper {
    fn descriptor(&self) -> &Arc<AttributeDescriptor> {
        &self.descriptor
    }

    fn directory_attributes(&self) -> Vec<String> {
        vec![self.attribute.clone()]
    }

    fn to_directory(&self, attribute: &ScimAttribute, entry: &mut Entry) -> AppResult<()> {
        let mut values = Vec::new();
        for element in attribute.values() {
            let value = match element {
                ScimValue::Simple(simple) => Some(simple),
                ScimValue::Complex(_) => element.sub_value("value"),
            };
            match value {
                Some(value) => values.push(self.transformation.to_directory(value)?),
                None => {
                    return Err(AppError::InvalidResource(format!(
                        "an element of attribute {} has no value",
                        attribute.name()
                    )))
                }
            }
        }
        entry.set_values(&self.attribute, values);
        Ok(())
    }

    fn to_scim(&self, entry: &Entry) -> AppResult<Option<ScimAttribute>> {
        let texts = entry.values(&self.attribute);
        if texts.is_empty() {
            return Ok(None);
        }
        let data_type = match self.value_descriptor.data_type() {
            DataType::Complex => DataType::String,
            other => other,
        };
        let elements = texts
            .iter()
            .map(|text| {
                let value = self.transformation.to_scim(data_type, text)?;
                let value = ScimAttribute::simple(self.value_descriptor.clone(), value);
                Ok(ScimValue::Complex(std::iter::once(value).collect()))
            })
            .collect::<AppResult<Vec<_>>>()?;
        Ok(Some(ScimAttribute::plural(self.descriptor.clone(), elements)))
    }

    fn to_directory_filter(
        &self,
        op: CompareOperator,
        sub_attribute: Option<&str>,
        value: Option<&str>,
    ) -> AppResult<Option<DirectoryFilter>> {
        match sub_attribute {
            Some(name) if !name.eq_ignore_ascii_case("value") => Ok(None),
            _ => compare_filter(op, &self.attribute, self.transformation, value),
        }
    }

    fn sort_attribute(&self, sub_attribute: Option<&str>) -> Option<String> {
        match sub_attribute {
            Some(name) if !name.eq_ignore_ascii_case("value") => None,
            _ => Some(self.attribute.clone()),
        }
    }
}
