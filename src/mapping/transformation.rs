//! Value conversions between SCIM values and directory strings

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::SimpleValue;
use crate::schema::DataType;
use crate::utils::{format_generalized_time, parse_generalized_time, parse_scim_datetime};

/// How one attribute's values are written to and read from the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Transformation {
    /// Canonical string form, typed by the descriptor on the way back
    #[default]
    Default,
    /// `TRUE` / `FALSE`
    Boolean,
    /// `YYYYMMDDHHMMSS[.fff]Z`
    GeneralizedTime,
    /// Base64 text in the directory, raw bytes in SCIM
    Binary,
}

impl Transformation {
    /// SCIM value to the directory's string form
    pub fn to_directory(&self, value: &SimpleValue) -> AppResult<String> {
        match (self, value) {
            (Transformation::Boolean, SimpleValue::Boolean(b)) => Ok(boolean_text(*b).to_string()),
            (Transformation::Boolean, other) => {
                match SimpleValue::parse(DataType::Boolean, &other.string_value())? {
                    SimpleValue::Boolean(b) => Ok(boolean_text(b).to_string()),
                    _ => Err(invalid_value(other, "boolean")),
                }
            }
            (Transformation::GeneralizedTime, SimpleValue::DateTime(dt)) => Ok(format_generalized_time(*dt)),
            (Transformation::GeneralizedTime, other) => parse_scim_datetime(&other.string_value())
                .map(format_generalized_time)
                .ok_or_else(|| invalid_value(other, "dateTime")),
            (Transformation::Binary, SimpleValue::Binary(bytes)) => Ok(STANDARD.encode(bytes)),
            (Transformation::Binary, other) => {
                let text = other.string_value();
                STANDARD
                    .decode(text.trim())
                    .map(|_| text.trim().to_string())
                    .map_err(|_| invalid_value(other, "binary"))
            }
            (Transformation::Default, value) => Ok(value.string_value()),
        }
    }

    /// Directory string to a SCIM value of `data_type`
    pub fn to_scim(&self, data_type: DataType, value: &str) -> AppResult<SimpleValue> {
        match self {
            Transformation::GeneralizedTime => parse_generalized_time(value)
                .map(SimpleValue::DateTime)
                .ok_or_else(|| AppError::server(format!("directory value '{}' is not a generalized time", value))),
            Transformation::Binary => STANDARD
                .decode(value.trim())
                .map(SimpleValue::Binary)
                .map_err(|_| AppError::server(format!("directory value '{}' is not base64", value))),
            Transformation::Boolean => SimpleValue::parse(DataType::Boolean, value),
            Transformation::Default => SimpleValue::parse(data_type, value),
        }
    }

    /// A filter assertion value in the directory's form
    pub fn filter_value(&self, value: &str) -> AppResult<String> {
        match self {
            Transformation::Default | Transformation::Binary => Ok(value.to_string()),
            Transformation::Boolean => match value.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(boolean_text(true).to_string()),
                "false" => Ok(boolean_text(false).to_string()),
                _ => Err(AppError::BadRequest(format!("'{}' is not a boolean", value))),
            },
            Transformation::GeneralizedTime => parse_scim_datetime(value)
                .map(format_generalized_time)
                .ok_or_else(|| AppError::BadRequest(format!("'{}' is not a dateTime", value))),
        }
    }
}

fn boolean_text(value: bool) -> &'static str {
    if value {
        "TRUE"
    } else {
        "FALSE"
    }
}

fn invalid_value(value: &SimpleValue, expected: &str) -> AppError {
    AppError::InvalidResource(format!("'{}' is not a valid {} value", value, expected))
}
