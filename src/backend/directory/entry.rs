//! Directory entries, modifications and DN handling

use std::cmp::Ordering;
use std::collections::HashSet;

use super::request::SortKey;

/// Operational attributes maintained by the directory itself
pub const CREATE_TIMESTAMP: &str = "createTimestamp";
pub const MODIFY_TIMESTAMP: &str = "modifyTimestamp";
pub const ENTRY_UUID: &str = "entryUUID";
pub const OBJECT_CLASS: &str = "objectClass";

pub const OPERATIONAL_ATTRIBUTES: [&str; 3] = [CREATE_TIMESTAMP, MODIFY_TIMESTAMP, ENTRY_UUID];

pub fn is_operational(name: &str) -> bool {
    OPERATIONAL_ATTRIBUTES
        .iter()
        .any(|a| a.eq_ignore_ascii_case(name))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirAttribute {
    pub name: String,
    pub values: Vec<String>,
}

impl DirAttribute {
    pub fn new(name: &str, values: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            values,
        }
    }

    /// Same values regardless of order
    fn same_values(&self, other: &DirAttribute) -> bool {
        let mut mine: Vec<&String> = self.values.iter().collect();
        let mut theirs: Vec<&String> = other.values.iter().collect();
        mine.sort();
        theirs.sort();
        mine == theirs
    }
}

/// A directory entry: a DN and attributes keyed case-insensitively by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub dn: String,
    attributes: Vec<DirAttribute>,
}

impl Entry {
    pub fn new(dn: &str) -> Self {
        Self {
            dn: dn.to_string(),
            attributes: Vec::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with_attribute<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_values(name, values.into_iter().map(Into::into).collect());
        self
    }

    pub fn attributes(&self) -> &[DirAttribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&DirAttribute> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    pub fn values(&self, name: &str) -> &[String] {
        self.attribute(name).map(|a| a.values.as_slice()).unwrap_or(&[])
    }

    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.values(name).first().map(String::as_str)
    }

    /// Replace all values of an attribute; an empty list removes it
    pub fn set_values(&mut self, name: &str, values: Vec<String>) {
        if values.is_empty() {
            self.remove_attribute(name);
            return;
        }
        match self
            .attributes
            .iter_mut()
            .find(|a| a.name.eq_ignore_ascii_case(name))
        {
            Some(existing) => existing.values = values,
            None => self.attributes.push(DirAttribute::new(name, values)),
        }
    }

    /// Append values not already present
    pub fn add_values(&mut self, name: &str, values: Vec<String>) {
        match self
            .attributes
            .iter_mut()
            .find(|a| a.name.eq_ignore_ascii_case(name))
        {
            Some(existing) => {
                for value in values {
                    if !existing.values.contains(&value) {
                        existing.values.push(value);
                    }
                }
            }
            None if !values.is_empty() => self.attributes.push(DirAttribute::new(name, values)),
            None => {}
        }
    }

    /// Remove some values; the attribute goes away when none are left
    pub fn remove_values(&mut self, name: &str, values: &[String]) {
        if let Some(existing) = self
            .attributes
            .iter_mut()
            .find(|a| a.name.eq_ignore_ascii_case(name))
        {
            existing.values.retain(|v| !values.contains(v));
        }
        self.attributes.retain(|a| !a.values.is_empty());
    }

    pub fn remove_attribute(&mut self, name: &str) -> bool {
        let before = self.attributes.len();
        self.attributes.retain(|a| !a.name.eq_ignore_ascii_case(name));
        before != self.attributes.len()
    }

    /// Copy restricted to the requested attributes.
    ///
    /// An empty list or `*` selects every user attribute, `+` every
    /// operational attribute; named attributes are always included.
    pub fn project(&self, requested: &[String]) -> Entry {
        let all_user = requested.is_empty() || requested.iter().any(|r| r == "*");
        let all_operational = requested.iter().any(|r| r == "+");
        let attributes = self
            .attributes
            .iter()
            .filter(|a| {
                let operational = is_operational(&a.name);
                (all_user && !operational)
                    || (all_operational && operational)
                    || requested.iter().any(|r| r.eq_ignore_ascii_case(&a.name))
            })
            .cloned()
            .collect();
        Entry {
            dn: self.dn.clone(),
            attributes,
        }
    }

    /// Modifications turning `self` into `desired`.
    ///
    /// Only attributes in `scope` (case-insensitive) are compared. A
    /// changed or new attribute becomes one replace; an attribute missing
    /// from `desired` becomes one delete. Identical entries yield nothing.
    pub fn diff(&self, desired: &Entry, scope: &[String]) -> Vec<Modification> {
        let mut seen = HashSet::new();
        let mut modifications = Vec::new();
        for name in scope {
            if !seen.insert(name.to_ascii_lowercase()) {
                continue;
            }
            match (self.attribute(name), desired.attribute(name)) {
                (Some(current), Some(wanted)) if current.same_values(wanted) => {}
                (_, Some(wanted)) => modifications.push(Modification::replace(&wanted.name, wanted.values.clone())),
                (Some(current), None) => modifications.push(Modification::delete(&current.name, Vec::new())),
                (None, None) => {}
            }
        }
        modifications
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModificationType {
    Add,
    Delete,
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    pub mod_type: ModificationType,
    pub attribute: String,
    /// For a delete, empty means every value
    pub values: Vec<String>,
}

impl Modification {
    pub fn add(attribute: &str, values: Vec<String>) -> Self {
        Self {
            mod_type: ModificationType::Add,
            attribute: attribute.to_string(),
            values,
        }
    }

    pub fn delete(attribute: &str, values: Vec<String>) -> Self {
        Self {
            mod_type: ModificationType::Delete,
            attribute: attribute.to_string(),
            values,
        }
    }

    pub fn replace(attribute: &str, values: Vec<String>) -> Self {
        Self {
            mod_type: ModificationType::Replace,
            attribute: attribute.to_string(),
            values,
        }
    }
}

/// Compare two attribute values: numerically when both are integers,
/// otherwise as case-insensitive strings
pub fn compare_values(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.to_lowercase().cmp(&b.to_lowercase()),
    }
}

/// Sort entries by the given keys. Entries lacking a key's attribute
/// sort after those that have it, whatever the direction.
///
/// A key compares numerically only when every entry's value for it is an
/// integer, so one ordering holds for the whole sort.
pub fn sort_entries(entries: &mut [Entry], keys: &[SortKey]) {
    let numeric: Vec<bool> = keys
        .iter()
        .map(|key| {
            entries
                .iter()
                .filter_map(|e| e.first_value(&key.attribute))
                .all(|v| v.parse::<i64>().is_ok())
        })
        .collect();
    entries.sort_by(|a, b| {
        for (key, numeric) in keys.iter().zip(&numeric) {
            let ordering = match (a.first_value(&key.attribute), b.first_value(&key.attribute)) {
                (Some(x), Some(y)) => {
                    let ordering = if *numeric {
                        compare_values(x, y)
                    } else {
                        x.to_lowercase().cmp(&y.to_lowercase())
                    };
                    if key.reverse {
                        ordering.reverse()
                    } else {
                        ordering
                    }
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

const DN_SPECIAL: [char; 8] = [',', '+', '"', '\\', '<', '>', ';', '='];

/// Escape a value for use in an RDN
pub fn escape_dn_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        let leading = i == 0 && (c == ' ' || c == '#');
        let trailing = i + 1 == value.chars().count() && c == ' ';
        if DN_SPECIAL.contains(&c) || leading || trailing {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn unescape_dn_value(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                unescaped.push(next);
            }
        } else {
            unescaped.push(c);
        }
    }
    unescaped
}

/// Split a DN into its RDN components, honouring backslash escapes
pub fn split_dn(dn: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in dn.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            ',' => {
                parts.push(dn[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = dn[start..].trim();
    if !last.is_empty() || !parts.is_empty() {
        parts.push(last);
    }
    parts
}

/// Canonical form used to compare DNs: lowercased, no spaces around separators
pub fn normalize_dn(dn: &str) -> String {
    split_dn(dn)
        .into_iter()
        .map(|rdn| match rdn.split_once('=') {
            Some((attr, value)) => format!("{}={}", attr.trim(), value.trim()),
            None => rdn.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
        .to_lowercase()
}

/// The RDN attribute name and unescaped value
pub fn rdn(dn: &str) -> Option<(String, String)> {
    let first = *split_dn(dn).first()?;
    let (attr, value) = first.split_once('=')?;
    Some((attr.trim().to_string(), unescape_dn_value(value.trim())))
}

pub fn parent_dn(dn: &str) -> Option<String> {
    let parts = split_dn(dn);
    if parts.len() < 2 {
        return None;
    }
    Some(parts[1..].join(","))
}

/// Whether `dn` equals `base` or lies below it
pub fn is_within(dn: &str, base: &str) -> bool {
    let dn = normalize_dn(dn);
    let base = normalize_dn(base);
    if base.is_empty() || dn == base {
        return true;
    }
    dn.ends_with(&format!(",{}", base))
}
