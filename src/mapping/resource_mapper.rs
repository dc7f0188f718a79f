use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use super::attribute_mapper::{compare_filter, create_mapper, AttributeMapper};
use super::transformation::Transformation;
use super::ResourceMapping;
use crate::backend::directory::entry::{
    escape_dn_value, is_within, normalize_dn, CREATE_TIMESTAMP, MODIFY_TIMESTAMP, OBJECT_CLASS,
};
use crate::backend::directory::{DirectoryFilter, Entry, Modification, SortKey};
use crate::error::{AppError, AppResult};
use crate::models::{ScimAttribute, ScimObject, SimpleValue};
use crate::parser::{AttributePath, CompareOperator, ScimFilter, SortSpec};
use crate::schema::{standard_descriptor, AttributeDescriptor, ResourceDescriptor, SCHEMA_URI_CORE};
use crate::utils::parse_generalized_time;

/// A translated search filter
#[derive(Debug, Clone, PartialEq)]
pub struct FilterTranslation {
    /// Native filter, always restricted to the resource's object class
    pub filter: DirectoryFilter,
    /// Part of the filter the directory could not apply, to be checked
    /// against each returned resource
    pub residual: Option<ScimFilter>,
}

impl FilterTranslation {
    pub fn is_complete(&self) -> bool {
        self.residual.is_none()
    }
}

/// Converts resources of one type to and from directory entries
#[derive(Debug)]
pub struct ResourceMapper {
    descriptor: Arc<ResourceDescriptor>,
    endpoint: String,
    search_base: String,
    object_classes: Vec<String>,
    filter_object_class: String,
    rdn_attribute: String,
    mappers: Vec<Box<dyn AttributeMapper>>,
}

fn is_core(descriptor: &AttributeDescriptor, name: &str) -> bool {
    descriptor.schema().eq_ignore_ascii_case(SCHEMA_URI_CORE) && descriptor.name().eq_ignore_ascii_case(name)
}

/// Directory attribute holding a `meta` sub-attribute
fn meta_attribute(sub_attribute: &str) -> Option<&'static str> {
    if sub_attribute.eq_ignore_ascii_case("created") {
        Some(CREATE_TIMESTAMP)
    } else if sub_attribute.eq_ignore_ascii_case("lastModified") {
        Some(MODIFY_TIMESTAMP)
    } else {
        None
    }
}

impl ResourceMapper {
    /// Mapper for a built-in resource named by `mapping.resource`
    pub fn from_config(mapping: &ResourceMapping) -> AppResult<Self> {
        let descriptor = standard_descriptor(&mapping.resource)
            .ok_or_else(|| AppError::Configuration(format!("unknown resource '{}'", mapping.resource)))?;
        Self::new(descriptor, mapping)
    }

    pub fn new(descriptor: Arc<ResourceDescriptor>, mapping: &ResourceMapping) -> AppResult<Self> {
        let invalid = |reason: String| AppError::InvalidArgument(format!("mapping for {}: {}", mapping.resource, reason));
        if mapping.search_base.trim().is_empty() {
            return Err(invalid("the search base is empty".to_string()));
        }
        if mapping.object_classes.is_empty() {
            return Err(invalid("no object classes given".to_string()));
        }
        if mapping.rdn_attribute.trim().is_empty() {
            return Err(invalid("no RDN attribute given".to_string()));
        }

        let mut seen = HashSet::new();
        let mut mappers = Vec::with_capacity(mapping.attributes.len());
        for attribute in &mapping.attributes {
            let attribute_descriptor = descriptor
                .find_attribute(&attribute.schema, &attribute.name)
                .cloned()
                .ok_or_else(|| invalid(format!("unknown attribute {}:{}", attribute.schema, attribute.name)))?;
            if is_core(&attribute_descriptor, "id") || is_core(&attribute_descriptor, "meta") {
                return Err(invalid(format!("attribute {} is maintained by the directory", attribute.name)));
            }
            let key = (
                attribute_descriptor.schema().to_ascii_lowercase(),
                attribute_descriptor.name().to_ascii_lowercase(),
            );
            if !seen.insert(key) {
                return Err(invalid(format!("attribute {} is mapped twice", attribute.name)));
            }
            mappers.push(create_mapper(attribute_descriptor, attribute)?);
        }

        let filter_object_class = mapping
            .filter_object_class
            .clone()
            .or_else(|| mapping.object_classes.last().cloned())
            .unwrap_or_default();

        let endpoint = match &mapping.endpoint {
            Some(endpoint) if endpoint.trim().is_empty() => return Err(invalid("the endpoint is empty".to_string())),
            Some(endpoint) => endpoint.clone(),
            None => descriptor.endpoint().to_string(),
        };

        Ok(Self {
            descriptor,
            endpoint,
            search_base: mapping.search_base.clone(),
            object_classes: mapping.object_classes.clone(),
            filter_object_class,
            rdn_attribute: mapping.rdn_attribute.clone(),
            mappers,
        })
    }

    pub fn descriptor(&self) -> &Arc<ResourceDescriptor> {
        &self.descriptor
    }

    pub fn resource_name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn search_base(&self) -> &str {
        &self.search_base
    }

    pub fn object_class_filter(&self) -> DirectoryFilter {
        DirectoryFilter::object_class(&self.filter_object_class)
    }

    /// Whether `dn` names an entry this mapper manages
    pub fn is_in_scope(&self, dn: &str) -> bool {
        is_within(dn, &self.search_base) && normalize_dn(dn) != normalize_dn(&self.search_base)
    }

    fn mapper(&self, schema: &str, name: &str) -> Option<&dyn AttributeMapper> {
        self.mappers
            .iter()
            .find(|m| {
                let d = m.descriptor();
                d.schema().eq_ignore_ascii_case(schema) && d.name().eq_ignore_ascii_case(name)
            })
            .map(|m| m.as_ref())
    }

    /// Directory attributes to fetch for the attributes `requested` accepts.
    ///
    /// The timestamps behind `meta` are always included.
    pub fn directory_attributes<F>(&self, requested: F) -> Vec<String>
    where
        F: Fn(&AttributeDescriptor) -> bool,
    {
        let mut seen = HashSet::new();
        let mut attributes = Vec::new();
        let mapped = self
            .mappers
            .iter()
            .filter(|m| requested(m.descriptor()))
            .flat_map(|m| m.directory_attributes());
        for attribute in mapped.chain([CREATE_TIMESTAMP.to_string(), MODIFY_TIMESTAMP.to_string()]) {
            if seen.insert(attribute.to_ascii_lowercase()) {
                attributes.push(attribute);
            }
        }
        attributes
    }

    /// Directory attributes an update may change
    pub fn writable_attributes(&self) -> Vec<String> {
        self.mappers
            .iter()
            .filter(|m| !m.descriptor().is_read_only())
            .flat_map(|m| m.directory_attributes())
            .collect()
    }

    /// Translate a filter into a native filter ANDed with the object class
    pub fn to_directory_filter(&self, filter: &ScimFilter) -> AppResult<FilterTranslation> {
        let (translated, residual) = self.translate(filter)?;
        let mut parts = vec![self.object_class_filter()];
        parts.extend(translated);
        Ok(FilterTranslation {
            filter: DirectoryFilter::and(parts),
            residual,
        })
    }

    /// The native filter for what can be translated, and the rest.
    ///
    /// Under AND the untranslated children are the residual. An OR is kept
    /// whole as the residual once any branch is not fully translated, and
    /// sends nothing to the directory if a branch has no translation at all.
    fn translate(&self, filter: &ScimFilter) -> AppResult<(Option<DirectoryFilter>, Option<ScimFilter>)> {
        match filter {
            ScimFilter::And(children) => {
                let mut parts = Vec::new();
                let mut residuals = Vec::new();
                for child in children {
                    let (translated, residual) = self.translate(child)?;
                    parts.extend(translated);
                    residuals.extend(residual);
                }
                let translated = (!parts.is_empty()).then(|| DirectoryFilter::and(parts));
                let residual = match residuals.len() {
                    0 => None,
                    1 => residuals.pop(),
                    _ => Some(ScimFilter::And(residuals)),
                };
                Ok((translated, residual))
            }
            ScimFilter::Or(children) => {
                let mut parts = Vec::new();
                let mut complete = true;
                for child in children {
                    match self.translate(child)? {
                        (Some(translated), residual) => {
                            complete &= residual.is_none();
                            parts.push(translated);
                        }
                        // One unmappable branch could match anything
                        (None, _) => return Ok((None, Some(filter.clone()))),
                    }
                }
                let residual = (!complete).then(|| filter.clone());
                Ok((Some(DirectoryFilter::or(parts)), residual))
            }
            ScimFilter::Compare { op, path, value, .. } => {
                let translated = self.translate_compare(*op, path, value.as_deref())?;
                if translated.is_some() {
                    return Ok((translated, None));
                }
                debug!(path = %path, op = %op, "filter component left for in-memory evaluation");
                Ok((None, Some(filter.clone())))
            }
        }
    }

    fn translate_compare(
        &self,
        op: CompareOperator,
        path: &AttributePath,
        value: Option<&str>,
    ) -> AppResult<Option<DirectoryFilter>> {
        if path.addresses(SCHEMA_URI_CORE, "meta") {
            return match path.sub_attribute.as_deref().and_then(meta_attribute) {
                Some(attribute) => compare_filter(op, attribute, Transformation::GeneralizedTime, value),
                None => Ok(None),
            };
        }
        match self.mapper(&path.schema, &path.attribute) {
            Some(mapper) => mapper.to_directory_filter(op, path.sub_attribute.as_deref(), value),
            None => Ok(None),
        }
    }

    /// Sort key for a sort request, or `None` if the path is not mapped
    pub fn sort_key(&self, sort: &SortSpec) -> Option<SortKey> {
        let path = &sort.path;
        let attribute = if path.addresses(SCHEMA_URI_CORE, "meta") {
            path.sub_attribute.as_deref().and_then(meta_attribute).map(str::to_string)
        } else {
            self.mapper(&path.schema, &path.attribute)?
                .sort_attribute(path.sub_attribute.as_deref())
        }?;
        Some(SortKey::new(&attribute, sort.order.is_descending()))
    }

    /// Key giving paged results a stable order when no sort was requested
    pub fn default_sort_key(&self) -> SortKey {
        SortKey::new(&self.rdn_attribute, false)
    }

    /// Build the entry to add for a new resource
    pub fn to_entry(&self, resource: &ScimObject) -> AppResult<Entry> {
        self.to_entry_under(resource, &self.search_base)
    }

    /// Build the entry for `resource` named under `parent`, which may be any
    /// container at or below the search base
    pub fn to_entry_under(&self, resource: &ScimObject, parent: &str) -> AppResult<Entry> {
        for attribute in self.descriptor.attributes() {
            if attribute.is_required()
                && !attribute.is_read_only()
                && !resource.has_attribute(attribute.schema(), attribute.name())
            {
                return Err(AppError::InvalidResource(format!(
                    "required attribute {} is missing",
                    attribute.name()
                )));
            }
        }

        let mut entry = Entry::new("");
        entry.set_values(OBJECT_CLASS, self.object_classes.clone());
        for mapper in &self.mappers {
            let descriptor = mapper.descriptor();
            if descriptor.is_read_only() {
                continue;
            }
            if let Some(attribute) = resource.get_attribute(descriptor.schema(), descriptor.name()) {
                mapper.to_directory(attribute, &mut entry)?;
            }
        }

        let rdn_value = entry
            .first_value(&self.rdn_attribute)
            .ok_or_else(|| {
                AppError::InvalidResource(format!(
                    "no value for {} to name the entry by",
                    self.rdn_attribute
                ))
            })?
            .to_string();
        entry.dn = format!(
            "{}={},{}",
            self.rdn_attribute,
            escape_dn_value(&rdn_value),
            parent
        );
        Ok(entry)
    }

    /// Build the resource for an entry, in declared attribute order.
    ///
    /// The id is the entry's DN. `meta.location` is only set when a base URI
    /// is known.
    pub fn to_resource(&self, entry: &Entry, base_uri: Option<&str>) -> AppResult<ScimObject> {
        let mut resource = ScimObject::new(self.descriptor.name());
        for attribute in self.descriptor.attributes() {
            if is_core(attribute, "id") {
                resource.set_attribute(ScimAttribute::simple(attribute.clone(), entry.dn.as_str()));
            } else if is_core(attribute, "meta") {
                if let Some(meta) = self.meta(attribute, entry, base_uri) {
                    resource.set_attribute(meta);
                }
            } else if let Some(mapper) = self.mapper(attribute.schema(), attribute.name()) {
                if let Some(value) = mapper.to_scim(entry)? {
                    resource.set_attribute(value);
                }
            }
        }
        Ok(resource)
    }

    fn meta(
        &self,
        descriptor: &Arc<AttributeDescriptor>,
        entry: &Entry,
        base_uri: Option<&str>,
    ) -> Option<ScimAttribute> {
        let mut subs = Vec::new();
        let timestamps = [("created", CREATE_TIMESTAMP), ("lastModified", MODIFY_TIMESTAMP)];
        for (name, directory_attribute) in timestamps {
            let value = entry.first_value(directory_attribute).and_then(parse_generalized_time);
            if let (Some(value), Some(sub)) = (value, descriptor.sub_attribute(name)) {
                subs.push(ScimAttribute::simple(sub.clone(), SimpleValue::DateTime(value)));
            }
        }
        let location = base_uri.and_then(|base| location(base, self.endpoint(), &entry.dn));
        if let (Some(location), Some(sub)) = (location, descriptor.sub_attribute("location")) {
            subs.push(ScimAttribute::simple(sub.clone(), location));
        }
        if subs.is_empty() {
            return None;
        }
        Some(ScimAttribute::complex(descriptor.clone(), subs))
    }

    /// Modifications turning `current` into `desired`.
    ///
    /// Only mapped, writable attributes are compared. Renaming an entry is
    /// not supported.
    pub fn modifications(&self, current: &Entry, desired: &Entry) -> AppResult<Vec<Modification>> {
        if normalize_dn(&current.dn) != normalize_dn(&desired.dn) {
            return Err(AppError::Forbidden(format!(
                "the update would rename '{}' to '{}'",
                current.dn, desired.dn
            )));
        }
        Ok(current.diff(desired, &self.writable_attributes()))
    }
}

/// `<base>/<endpoint>/<id>` with the id percent-encoded as one segment
fn location(base_uri: &str, endpoint: &str, id: &str) -> Option<String> {
    let mut url = Url::parse(base_uri).ok()?;
    url.path_segments_mut().ok()?.pop_if_empty().push(endpoint).push(id);
    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{default_group_mapping, default_user_mapping};
    use crate::models::ScimValue;
    use crate::parser::{parse_filter, SortOrder};
    use crate::schema::{ResolutionMode, SCHEMA_URI_ENTERPRISE_EXTENSION, USER_DESCRIPTOR};

    fn users() -> ResourceMapper {
        ResourceMapper::from_config(&default_user_mapping("dc=example,dc=com")).unwrap()
    }

    fn attribute(schema: &str, name: &str, value: &str) -> ScimAttribute {
        let descriptor = USER_DESCRIPTOR.resolve(schema, name, ResolutionMode::Strict).unwrap();
        ScimAttribute::simple(descriptor, value)
    }

    fn bjensen() -> ScimObject {
        let mut user = ScimObject::new("User");
        user.set_attribute(attribute(SCHEMA_URI_CORE, "userName", "bjensen"));
        user.set_attribute(attribute(SCHEMA_URI_CORE, "title", "Tour Guide"));
        user.set_attribute(attribute(SCHEMA_URI_ENTERPRISE_EXTENSION, "employeeNumber", "701984"));
        user
    }

    fn translate(filter: &str) -> FilterTranslation {
        users().to_directory_filter(&parse_filter(filter).unwrap()).unwrap()
    }

    #[test]
    fn test_filter_translation() {
        let t = translate("userName eq 'bjensen'");
        assert!(t.is_complete());
        assert_eq!(t.filter.to_string(), "(&(objectClass=inetOrgPerson)(uid=bjensen))");

        let t = translate("(userName eq 'bjensen') and title pr");
        assert_eq!(
            t.filter.to_string(),
            "(&(objectClass=inetOrgPerson)(&(uid=bjensen)(title=*)))"
        );

        let t = translate("meta.lastModified gt '2024-01-01T00:00:00Z'");
        assert_eq!(
            t.filter.to_string(),
            "(&(objectClass=inetOrgPerson)(&(modifyTimestamp>=20240101000000.000Z)(!(modifyTimestamp=20240101000000.000Z))))"
        );
    }

    #[test]
    fn test_partial_translation() {
        let t = translate("title eq 'Boss' and nickName eq 'Babs'");
        assert_eq!(t.filter.to_string(), "(&(objectClass=inetOrgPerson)(title=Boss))");
        assert_eq!(t.residual, Some(parse_filter("nickName eq 'Babs'").unwrap()));

        let t = translate("title eq 'Boss' or nickName eq 'Babs'");
        assert_eq!(t.filter, DirectoryFilter::object_class("inetOrgPerson"));
        assert_eq!(t.residual, Some(parse_filter("title eq 'Boss' or nickName eq 'Babs'").unwrap()));
    }

    #[test]
    fn test_ordering_applied_by_the_directory_is_not_residual() {
        let t = translate("meta.created gt '2000-01-01T00:00:00Z' and (userName eq 'alice' or nickName pr)");
        assert_eq!(
            t.filter.to_string(),
            "(&(objectClass=inetOrgPerson)(&(createTimestamp>=20000101000000.000Z)(!(createTimestamp=20000101000000.000Z))))"
        );
        assert_eq!(t.residual, Some(parse_filter("userName eq 'alice' or nickName pr").unwrap()));

        let t = translate("nickName pr and title pr");
        assert_eq!(t.filter.to_string(), "(&(objectClass=inetOrgPerson)(title=*))");
        assert_eq!(t.residual, Some(parse_filter("nickName pr").unwrap()));
    }

    #[test]
    fn test_entry_round_trip() {
        let mapper = users();
        let entry = mapper.to_entry(&bjensen()).unwrap();
        assert_eq!(entry.dn, "uid=bjensen,ou=people,dc=example,dc=com");
        assert_eq!(entry.values(OBJECT_CLASS).len(), 4);
        assert_eq!(entry.first_value("employeeNumber"), Some("701984"));

        let stored = entry
            .clone()
            .with_attribute(CREATE_TIMESTAMP, ["20240102030405.000Z"])
            .with_attribute(MODIFY_TIMESTAMP, ["20240102030405.000Z"]);
        let resource = mapper.to_resource(&stored, Some("https://example.com/scim/v1")).unwrap();
        assert_eq!(
            resource.get_simple_value(SCHEMA_URI_CORE, "id"),
            Some(&SimpleValue::from("uid=bjensen,ou=people,dc=example,dc=com"))
        );
        let meta = resource.get_attribute(SCHEMA_URI_CORE, "meta").unwrap().value().unwrap();
        assert!(matches!(meta.sub_value("created"), Some(SimpleValue::DateTime(_))));
        let location = meta.sub_value("location").unwrap().string_value();
        assert!(location.starts_with("https://example.com/scim/v1/Users/uid="));
        assert_eq!(resource.schemas(), vec![SCHEMA_URI_CORE, SCHEMA_URI_ENTERPRISE_EXTENSION]);
        let names: Vec<&str> = resource.attributes(SCHEMA_URI_CORE).iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["id", "meta", "userName", "title"]);
    }

    #[test]
    fn test_required_attribute_and_rdn() {
        let mapper = ResourceMapper::from_config(&default_group_mapping("dc=example,dc=com")).unwrap();
        let err = mapper.to_entry(&ScimObject::new("Group")).unwrap_err();
        assert_eq!(err.status(), 400);

        let mut user = bjensen();
        user.remove_attribute(SCHEMA_URI_CORE, "userName");
        assert_eq!(users().to_entry(&user).unwrap_err().status(), 400);
    }

    #[test]
    fn test_modifications() {
        let mapper = users();
        let current = mapper.to_entry(&bjensen()).unwrap();
        assert!(mapper.modifications(&current, &current.clone()).unwrap().is_empty());

        let mut changed = bjensen();
        changed.set_attribute(attribute(SCHEMA_URI_CORE, "title", "Manager"));
        changed.remove_attribute(SCHEMA_URI_ENTERPRISE_EXTENSION, "employeeNumber");
        let desired = mapper.to_entry(&changed).unwrap();
        let modifications = mapper.modifications(&current, &desired).unwrap();
        assert_eq!(
            modifications,
            vec![
                Modification::replace("title", vec!["Manager".to_string()]),
                Modification::delete("employeeNumber", vec![]),
            ]
        );

        let mut renamed = bjensen();
        renamed.set_attribute(attribute(SCHEMA_URI_CORE, "userName", "barbara"));
        let desired = mapper.to_entry(&renamed).unwrap();
        assert_eq!(mapper.modifications(&current, &desired).unwrap_err().status(), 403);
    }

    #[test]
    fn test_sort_keys_and_scope() {
        let mapper = users();
        let sort = SortSpec::new(AttributePath::core("name", Some("familyName")), SortOrder::Descending);
        assert_eq!(mapper.sort_key(&sort), Some(SortKey::new("sn", true)));
        let sort = SortSpec::new(AttributePath::core("nickName", None), SortOrder::Ascending);
        assert!(mapper.sort_key(&sort).is_none());
        assert_eq!(mapper.default_sort_key(), SortKey::new("uid", false));

        assert!(mapper.is_in_scope("uid=x,ou=People,dc=example,dc=com"));
        assert!(!mapper.is_in_scope("ou=people,dc=example,dc=com"));
        assert!(!mapper.is_in_scope("cn=x,ou=groups,dc=example,dc=com"));
    }

    #[test]
    fn test_endpoint_override() {
        let mut mapping = default_user_mapping("dc=example,dc=com");
        mapping.endpoint = Some("Staff".to_string());
        let mapper = ResourceMapper::from_config(&mapping).unwrap();
        assert_eq!(mapper.endpoint(), "Staff");
        assert_eq!(mapper.resource_name(), "User");

        let entry = mapper.to_entry(&bjensen()).unwrap().with_attribute(CREATE_TIMESTAMP, ["20240102030405Z"]);
        let resource = mapper.to_resource(&entry, Some("https://example.com/scim/")).unwrap();
        let meta = resource.get_attribute(SCHEMA_URI_CORE, "meta").unwrap().value().unwrap();
        let location = meta.sub_value("location").unwrap().string_value();
        assert!(location.starts_with("https://example.com/scim/Staff/uid="), "{location}");

        mapping.endpoint = Some(" ".to_string());
        assert!(matches!(ResourceMapper::from_config(&mapping), Err(AppError::InvalidArgument(_))));
    }

    #[test]
    fn test_group_members() {
        let mapper = ResourceMapper::from_config(&default_group_mapping("dc=example,dc=com")).unwrap();
        let entry = Entry::new("cn=admins,ou=groups,dc=example,dc=com")
            .with_attribute("cn", ["admins"])
            .with_attribute("uniqueMember", ["uid=a,ou=people,dc=example,dc=com", "uid=b,ou=people,dc=example,dc=com"]);
        let group = mapper.to_resource(&entry, None).unwrap();
        let members = group.get_attribute(SCHEMA_URI_CORE, "members").unwrap();
        assert_eq!(members.values().len(), 2);
        assert!(matches!(members.values()[0], ScimValue::Complex(_)));
        assert!(group.get_attribute(SCHEMA_URI_CORE, "meta").is_none());
    }
}
