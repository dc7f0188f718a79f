use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use std::fmt;

use super::attribute::ScimAttribute;
use crate::error::{AppError, AppResult};
use crate::schema::DataType;
use crate::utils::{format_scim_datetime, parse_scim_datetime};

/// A scalar attribute value.
///
/// The value is interpreted through the descriptor of the attribute that
/// owns it; the variant only records how it is held in memory.
#[derive(Debug, Clone, PartialEq)]
pub enum SimpleValue {
    String(String),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Decimal(f64),
    Integer(i64),
    Binary(Vec<u8>),
}

impl SimpleValue {
    /// Parse the textual form of a value for the given data type
    pub fn parse(data_type: DataType, text: &str) -> AppResult<SimpleValue> {
        let invalid = || {
            AppError::InvalidResource(format!(
                "'{}' is not a valid {} value",
                text, data_type
            ))
        };
        match data_type {
            DataType::String | DataType::Complex => Ok(SimpleValue::String(text.to_string())),
            DataType::Boolean => match text.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(SimpleValue::Boolean(true)),
                "false" => Ok(SimpleValue::Boolean(false)),
                _ => Err(invalid()),
            },
            DataType::DateTime => parse_scim_datetime(text)
                .map(SimpleValue::DateTime)
                .ok_or_else(invalid),
            DataType::Decimal => text
                .trim()
                .parse::<f64>()
                .map(SimpleValue::Decimal)
                .map_err(|_| invalid()),
            DataType::Integer => text
                .trim()
                .parse::<i64>()
                .map(SimpleValue::Integer)
                .map_err(|_| invalid()),
            DataType::Binary => STANDARD
                .decode(text.trim())
                .map(SimpleValue::Binary)
                .map_err(|_| invalid()),
        }
    }

    /// The canonical string rendering of this value
    pub fn string_value(&self) -> String {
        match self {
            SimpleValue::String(s) => s.clone(),
            SimpleValue::Boolean(b) => b.to_string(),
            SimpleValue::DateTime(dt) => format_scim_datetime(*dt),
            SimpleValue::Decimal(d) => d.to_string(),
            SimpleValue::Integer(i) => i.to_string(),
            SimpleValue::Binary(bytes) => STANDARD.encode(bytes),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SimpleValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for SimpleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.string_value())
    }
}

impl From<&str> for SimpleValue {
    fn from(value: &str) -> Self {
        SimpleValue::String(value.to_string())
    }
}

impl From<String> for SimpleValue {
    fn from(value: String) -> Self {
        SimpleValue::String(value)
    }
}

impl From<bool> for SimpleValue {
    fn from(value: bool) -> Self {
        SimpleValue::Boolean(value)
    }
}

/// A complex value: a set of sub-attributes keyed case-insensitively by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComplexValue {
    attributes: Vec<ScimAttribute>,
}

impl ComplexValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ScimAttribute> {
        self.attributes
            .iter()
            .find(|a| a.name().eq_ignore_ascii_case(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Add a sub-attribute; returns false when one with the same name exists
    pub fn add(&mut self, attribute: ScimAttribute) -> bool {
        if self.contains(attribute.name()) {
            return false;
        }
        self.attributes.push(attribute);
        true
    }

    /// Add or replace a sub-attribute
    pub fn set(&mut self, attribute: ScimAttribute) {
        match self
            .attributes
            .iter_mut()
            .find(|a| a.name().eq_ignore_ascii_case(attribute.name()))
        {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.attributes.len();
        self.attributes.retain(|a| !a.name().eq_ignore_ascii_case(name));
        before != self.attributes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScimAttribute> {
        self.attributes.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }
}

impl FromIterator<ScimAttribute> for ComplexValue {
    fn from_iter<I: IntoIterator<Item = ScimAttribute>>(iter: I) -> Self {
        let mut value = ComplexValue::new();
        for attribute in iter {
            value.set(attribute);
        }
        value
    }
}

/// One value of an attribute
#[derive(Debug, Clone, PartialEq)]
pub enum ScimValue {
    Simple(SimpleValue),
    Complex(ComplexValue),
}

impl ScimValue {
    pub fn string(value: impl Into<String>) -> Self {
        ScimValue::Simple(SimpleValue::String(value.into()))
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, ScimValue::Complex(_))
    }

    pub fn as_simple(&self) -> Option<&SimpleValue> {
        match self {
            ScimValue::Simple(v) => Some(v),
            ScimValue::Complex(_) => None,
        }
    }

    pub fn as_complex(&self) -> Option<&ComplexValue> {
        match self {
            ScimValue::Complex(v) => Some(v),
            ScimValue::Simple(_) => None,
        }
    }

    /// Sub-attribute of a complex value; always `None` for simple values
    pub fn sub_attribute(&self, name: &str) -> Option<&ScimAttribute> {
        self.as_complex().and_then(|c| c.get(name))
    }

    /// The simple value of a named sub-attribute of a complex value
    pub fn sub_value(&self, name: &str) -> Option<&SimpleValue> {
        self.sub_attribute(name)
            .and_then(|a| a.value())
            .and_then(|v| v.as_simple())
    }
}

impl From<SimpleValue> for ScimValue {
    fn from(value: SimpleValue) -> Self {
        ScimValue::Simple(value)
    }
}

impl From<ComplexValue> for ScimValue {
    fn from(value: ComplexValue) -> Self {
        ScimValue::Complex(value)
    }
}
