use crate::error::AppResult;
use crate::models::ScimObject;
use crate::parser::{parse_attribute_path, AttributePath, ScimFilter};
use crate::schema::SCHEMA_URI_CORE;

/// The `attributes` query parameter: which attributes a response carries
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttributeFilter {
    /// `None` returns every attribute
    attributes: Option<Vec<AttributePath>>,
}

impl AttributeFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only(attributes: Vec<AttributePath>) -> Self {
        Self {
            attributes: Some(attributes),
        }
    }

    /// Parse a comma-separated attribute list; an absent or blank list means all
    pub fn from_params(attributes: Option<&str>) -> AppResult<Self> {
        let paths = attributes
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(parse_attribute_path)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;
        Ok(match paths {
            Some(paths) if !paths.is_empty() => Self::only(paths),
            _ => Self::all(),
        })
    }

    pub fn is_all(&self) -> bool {
        self.attributes.is_none()
    }

    /// Whether the attribute is returned. `id` always is.
    pub fn is_requested(&self, schema: &str, name: &str) -> bool {
        match &self.attributes {
            None => true,
            Some(paths) => {
                (schema.eq_ignore_ascii_case(SCHEMA_URI_CORE) && name.eq_ignore_ascii_case("id"))
                    || paths.iter().any(|p| p.addresses(schema, name))
            }
        }
    }

    /// This selection widened by every attribute `filter` refers to
    pub fn with_filter_paths(&self, filter: &ScimFilter) -> Self {
        match &self.attributes {
            None => Self::all(),
            Some(paths) => {
                let mut paths = paths.clone();
                for path in filter.attribute_paths() {
                    if !paths.iter().any(|p| p.addresses(&path.schema, &path.attribute)) {
                        paths.push(path.with_sub_attribute(None));
                    }
                }
                Self::only(paths)
            }
        }
    }

    /// Drop the attributes this selection does not request
    pub fn apply_to_resource(&self, resource: &mut ScimObject) {
        if self.is_all() {
            return;
        }
        resource.retain_attributes(|a| self.is_requested(a.schema(), a.name()));
    }
}
