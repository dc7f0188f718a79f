use std::fmt;

use crate::schema::SCHEMA_URI_CORE;

/// Comparison operators of the filter language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOperator {
    Equality,
    Contains,
    StartsWith,
    Presence,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
}

impl CompareOperator {
    const ALL: [CompareOperator; 8] = [
        CompareOperator::Equality,
        CompareOperator::Contains,
        CompareOperator::StartsWith,
        CompareOperator::Presence,
        CompareOperator::GreaterThan,
        CompareOperator::GreaterOrEqual,
        CompareOperator::LessThan,
        CompareOperator::LessOrEqual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOperator::Equality => "eq",
            CompareOperator::Contains => "co",
            CompareOperator::StartsWith => "sw",
            CompareOperator::Presence => "pr",
            CompareOperator::GreaterThan => "gt",
            CompareOperator::GreaterOrEqual => "ge",
            CompareOperator::LessThan => "lt",
            CompareOperator::LessOrEqual => "le",
        }
    }

    /// Operator keyword, ignoring case
    pub fn parse(keyword: &str) -> Option<CompareOperator> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(keyword))
    }

    pub fn takes_value(&self) -> bool {
        *self != CompareOperator::Presence
    }

    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            CompareOperator::GreaterThan
                | CompareOperator::GreaterOrEqual
                | CompareOperator::LessThan
                | CompareOperator::LessOrEqual
        )
    }
}

impl fmt::Display for CompareOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of an attribute, or of one sub-attribute of a complex attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributePath {
    pub schema: String,
    pub attribute: String,
    pub sub_attribute: Option<String>,
}

impl AttributePath {
    pub fn new(schema: &str, attribute: &str, sub_attribute: Option<&str>) -> Self {
        Self {
            schema: schema.to_string(),
            attribute: attribute.to_string(),
            sub_attribute: sub_attribute.map(str::to_string),
        }
    }

    /// Path in the core schema
    pub fn core(attribute: &str, sub_attribute: Option<&str>) -> Self {
        Self::new(SCHEMA_URI_CORE, attribute, sub_attribute)
    }

    /// Whether this path addresses (schema, attribute), ignoring case
    pub fn addresses(&self, schema: &str, attribute: &str) -> bool {
        self.schema.eq_ignore_ascii_case(schema) && self.attribute.eq_ignore_ascii_case(attribute)
    }

    /// Same path with a different sub-attribute
    pub fn with_sub_attribute(&self, sub_attribute: Option<&str>) -> Self {
        Self::new(&self.schema, &self.attribute, sub_attribute)
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.schema.eq_ignore_ascii_case(SCHEMA_URI_CORE) {
            write!(f, "{}:", self.schema)?;
        }
        f.write_str(&self.attribute)?;
        if let Some(sub) = &self.sub_attribute {
            write!(f, ".{}", sub)?;
        }
        Ok(())
    }
}

/// A parsed filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum ScimFilter {
    And(Vec<ScimFilter>),
    Or(Vec<ScimFilter>),
    Compare {
        op: CompareOperator,
        path: AttributePath,
        /// Absent only for `pr`
        value: Option<String>,
        quoted: bool,
    },
}

impl ScimFilter {
    pub fn compare(op: CompareOperator, path: AttributePath, value: &str) -> Self {
        ScimFilter::Compare {
            op,
            path,
            value: Some(value.to_string()),
            quoted: true,
        }
    }

    pub fn present(path: AttributePath) -> Self {
        ScimFilter::Compare {
            op: CompareOperator::Presence,
            path,
            value: None,
            quoted: false,
        }
    }

    /// Every attribute path referenced anywhere in the tree, in order of appearance
    pub fn attribute_paths(&self) -> Vec<&AttributePath> {
        let mut paths = Vec::new();
        self.collect_paths(&mut paths);
        paths
    }

    fn collect_paths<'a>(&'a self, paths: &mut Vec<&'a AttributePath>) {
        match self {
            ScimFilter::And(children) | ScimFilter::Or(children) => {
                for child in children {
                    child.collect_paths(paths);
                }
            }
            ScimFilter::Compare { path, .. } => paths.push(path),
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    f.write_str("'")?;
    for c in value.chars() {
        match c {
            '\'' => f.write_str("\\'")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            other => write!(f, "{}", other)?,
        }
    }
    f.write_str("'")
}

fn write_children(f: &mut fmt::Formatter<'_>, children: &[ScimFilter], keyword: &str) -> fmt::Result {
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", keyword)?;
        }
        match child {
            ScimFilter::Compare { .. } => write!(f, "{}", child)?,
            _ => write!(f, "({})", child)?,
        }
    }
    Ok(())
}

/// Serializes back into the filter grammar
impl fmt::Display for ScimFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScimFilter::And(children) => write_children(f, children, "and"),
            ScimFilter::Or(children) => write_children(f, children, "or"),
            ScimFilter::Compare {
                op,
                path,
                value,
                quoted,
            } => {
                write!(f, "{} {}", path, op)?;
                match value {
                    Some(value) if *quoted => {
                        f.write_str(" ")?;
                        write_quoted(f, value)
                    }
                    Some(value) => write!(f, " {}", value),
                    None => Ok(()),
                }
            }
        }
    }
}
