//! In-memory evaluation of a filter against a resource

use super::attribute::ScimAttribute;
use super::object::ScimObject;
use super::value::{ScimValue, SimpleValue};
use crate::parser::{CompareOperator, ScimFilter};

/// Whether `resource` satisfies `filter`.
///
/// Comparisons are scoped to the filter path's schema. Plural attributes
/// match when any element matches. Ordering operators never match here; they
/// are only evaluated by the directory.
pub fn matches(resource: &ScimObject, filter: &ScimFilter) -> bool {
    match filter {
        ScimFilter::And(children) => children.iter().all(|child| matches(resource, child)),
        ScimFilter::Or(children) => children.iter().any(|child| matches(resource, child)),
        ScimFilter::Compare { op, path, value, .. } => {
            let Some(attribute) = resource.get_attribute(&path.schema, &path.attribute) else {
                return false;
            };
            if !attribute.schema().eq_ignore_ascii_case(&path.schema) {
                return false;
            }
            matches_attribute(attribute, *op, path.sub_attribute.as_deref(), value.as_deref())
        }
    }
}

fn matches_attribute(
    attribute: &ScimAttribute,
    op: CompareOperator,
    sub_attribute: Option<&str>,
    value: Option<&str>,
) -> bool {
    let plural = attribute.is_plural();
    attribute
        .values()
        .iter()
        .any(|v| matches_value(v, plural, op, sub_attribute, value))
}

fn matches_value(
    candidate: &ScimValue,
    plural: bool,
    op: CompareOperator,
    sub_attribute: Option<&str>,
    value: Option<&str>,
) -> bool {
    match candidate {
        ScimValue::Complex(complex) => {
            // Elements of a plural attribute are addressed through `value`
            let target = sub_attribute.or(if plural { Some("value") } else { None });
            match target {
                Some(name) => complex
                    .get(name)
                    .is_some_and(|sub| matches_attribute(sub, op, None, value)),
                None => op == CompareOperator::Presence,
            }
        }
        ScimValue::Simple(simple) => match sub_attribute {
            Some(name) if !name.eq_ignore_ascii_case("value") => false,
            _ => compare_simple(simple, op, value),
        },
    }
}

fn compare_simple(candidate: &SimpleValue, op: CompareOperator, value: Option<&str>) -> bool {
    if op == CompareOperator::Presence {
        return true;
    }
    let Some(value) = value else {
        return false;
    };
    let candidate = candidate.string_value().to_lowercase();
    let value = value.to_lowercase();
    match op {
        CompareOperator::Equality => candidate == value,
        CompareOperator::Contains => candidate.contains(&value),
        CompareOperator::StartsWith => candidate.starts_with(&value),
        _ => false,
    }
}
