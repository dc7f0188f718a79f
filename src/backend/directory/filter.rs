//! Native directory search filters

use std::cmp::Ordering;
use std::fmt;

use super::entry::{compare_values, Entry, OBJECT_CLASS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryFilter {
    And(Vec<DirectoryFilter>),
    Or(Vec<DirectoryFilter>),
    Not(Box<DirectoryFilter>),
    Equality(String, String),
    Substring {
        attribute: String,
        initial: Option<String>,
        any: Vec<String>,
        final_value: Option<String>,
    },
    GreaterOrEqual(String, String),
    LessOrEqual(String, String),
    Present(String),
}

impl DirectoryFilter {
    pub fn equality(attribute: &str, value: &str) -> Self {
        DirectoryFilter::Equality(attribute.to_string(), value.to_string())
    }

    pub fn present(attribute: &str) -> Self {
        DirectoryFilter::Present(attribute.to_string())
    }

    pub fn object_class(name: &str) -> Self {
        Self::equality(OBJECT_CLASS, name)
    }

    pub fn contains(attribute: &str, value: &str) -> Self {
        DirectoryFilter::Substring {
            attribute: attribute.to_string(),
            initial: None,
            any: vec![value.to_string()],
            final_value: None,
        }
    }

    pub fn starts_with(attribute: &str, value: &str) -> Self {
        DirectoryFilter::Substring {
            attribute: attribute.to_string(),
            initial: Some(value.to_string()),
            any: Vec::new(),
            final_value: None,
        }
    }

    /// AND of `filters`, collapsing a single element
    pub fn and(mut filters: Vec<DirectoryFilter>) -> Self {
        if filters.len() == 1 {
            return filters.remove(0);
        }
        DirectoryFilter::And(filters)
    }

    /// OR of `filters`, collapsing a single element
    pub fn or(mut filters: Vec<DirectoryFilter>) -> Self {
        if filters.len() == 1 {
            return filters.remove(0);
        }
        DirectoryFilter::Or(filters)
    }

    /// Evaluate against an entry with case-insensitive matching
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            DirectoryFilter::And(filters) => filters.iter().all(|f| f.matches(entry)),
            DirectoryFilter::Or(filters) => filters.iter().any(|f| f.matches(entry)),
            DirectoryFilter::Not(filter) => !filter.matches(entry),
            DirectoryFilter::Present(attribute) => entry.has_attribute(attribute),
            DirectoryFilter::Equality(attribute, value) => entry
                .values(attribute)
                .iter()
                .any(|v| compare_values(v, value) == Ordering::Equal),
            DirectoryFilter::GreaterOrEqual(attribute, value) => entry
                .values(attribute)
                .iter()
                .any(|v| compare_values(v, value) != Ordering::Less),
            DirectoryFilter::LessOrEqual(attribute, value) => entry
                .values(attribute)
                .iter()
                .any(|v| compare_values(v, value) != Ordering::Greater),
            DirectoryFilter::Substring {
                attribute,
                initial,
                any,
                final_value,
            } => entry
                .values(attribute)
                .iter()
                .any(|v| substring_matches(v, initial.as_deref(), any, final_value.as_deref())),
        }
    }
}

fn substring_matches(value: &str, initial: Option<&str>, any: &[String], final_value: Option<&str>) -> bool {
    let value = value.to_lowercase();
    let mut rest = value.as_str();
    if let Some(initial) = initial {
        let initial = initial.to_lowercase();
        let Some(stripped) = rest.strip_prefix(initial.as_str()) else {
            return false;
        };
        rest = stripped;
    }
    for part in any {
        let part = part.to_lowercase();
        let Some(index) = rest.find(part.as_str()) else {
            return false;
        };
        rest = &rest[index + part.len()..];
    }
    match final_value {
        Some(final_value) => rest.ends_with(final_value.to_lowercase().as_str()),
        None => true,
    }
}

/// Escape an assertion value for the string form of a filter
pub fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            other => escaped.push(other),
        }
    }
    escaped
}

impl fmt::Display for DirectoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectoryFilter::And(filters) | DirectoryFilter::Or(filters) => {
                let symbol = if matches!(self, DirectoryFilter::And(_)) { '&' } else { '|' };
                write!(f, "({}", symbol)?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                f.write_str(")")
            }
            DirectoryFilter::Not(filter) => write!(f, "(!{})", filter),
            DirectoryFilter::Equality(attribute, value) => {
                write!(f, "({}={})", attribute, escape_filter_value(value))
            }
            DirectoryFilter::GreaterOrEqual(attribute, value) => {
                write!(f, "({}>={})", attribute, escape_filter_value(value))
            }
            DirectoryFilter::LessOrEqual(attribute, value) => {
                write!(f, "({}<={})", attribute, escape_filter_value(value))
            }
            DirectoryFilter::Present(attribute) => write!(f, "({}=*)", attribute),
            DirectoryFilter::Substring {
                attribute,
                initial,
                any,
                final_value,
            } => {
                write!(f, "({}=", attribute)?;
                if let Some(initial) = initial {
                    f.write_str(&escape_filter_value(initial))?;
                }
                f.write_str("*")?;
                for part in any {
                    write!(f, "{}*", escape_filter_value(part))?;
                }
                if let Some(final_value) = final_value {
                    f.write_str(&escape_filter_value(final_value))?;
                }
                f.write_str(")")
            }
        }
    }
}
