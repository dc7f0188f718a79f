//! In-process directory
//!
//! A thread-safe, in-memory directory implementing the operations and
//! controls the mapping engine uses. It serves as the embedded backend and,
//! through [`ConnectionFactory`], as the target of a pooled backend in tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;
use uuid::Uuid;

use super::directory::entry::{
    is_operational, normalize_dn, parent_dn, rdn, sort_entries, CREATE_TIMESTAMP, ENTRY_UUID, MODIFY_TIMESTAMP,
    OBJECT_CLASS, OPERATIONAL_ATTRIBUTES,
};
use super::directory::request::{OID_POST_READ, OID_PROXIED_AUTHORIZATION, OID_SERVER_SIDE_SORT, OID_VIRTUAL_LIST_VIEW};
use super::directory::{
    AddRequest, DeleteRequest, DirectoryError, DirectoryResult, Entry, ModificationType, ModifyRequest,
    OperationResult, ResultCode, SearchRequest, SearchResult, SearchScope, VlvResponse, WithControls,
};
use super::pool::ConnectionFactory;
use super::{BackendCapabilities, BackendType, DirectoryBackend, RequestContext, RequestInterface};
use crate::error::AppResult;
use crate::utils::current_generalized_time;

const ALL_CONTROLS: [&str; 4] = [
    OID_SERVER_SIDE_SORT,
    OID_VIRTUAL_LIST_VIEW,
    OID_POST_READ,
    OID_PROXIED_AUTHORIZATION,
];

struct DirectoryState {
    /// Keyed by normalized DN
    entries: RwLock<BTreeMap<String, Entry>>,
    supported_controls: Vec<String>,
    capabilities: BackendCapabilities,
    authorization_ids: Mutex<Vec<String>>,
    connections_opened: AtomicUsize,
}

#[derive(Clone)]
pub struct EmbeddedDirectory {
    state: Arc<DirectoryState>,
}

impl Default for EmbeddedDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddedDirectory {
    /// An empty directory supporting every control
    pub fn new() -> Self {
        Self::with_supported_controls(&ALL_CONTROLS)
    }

    /// An empty directory advertising only the given control OIDs
    pub fn with_supported_controls(oids: &[&str]) -> Self {
        let supported_controls: Vec<String> = oids.iter().map(|o| o.to_string()).collect();
        let capabilities = BackendCapabilities::from_supported_controls(supported_controls.as_slice());
        Self {
            state: Arc::new(DirectoryState {
                entries: RwLock::new(BTreeMap::new()),
                supported_controls,
                capabilities,
                authorization_ids: Mutex::new(Vec::new()),
                connections_opened: AtomicUsize::new(0),
            }),
        }
    }

    /// Store an entry without checking its parent, e.g. a naming context
    pub fn load_entry(&self, entry: Entry) -> DirectoryResult<()> {
        let key = normalize_dn(&entry.dn);
        let mut entries = self.write();
        if entries.contains_key(&key) {
            return Err(DirectoryError::new(
                ResultCode::EntryAlreadyExists,
                format!("entry '{}' already exists", entry.dn),
            ));
        }
        entries.insert(key, with_operational_attributes(entry));
        Ok(())
    }

    /// Full stored entry, operational attributes included
    pub fn entry(&self, dn: &str) -> Option<Entry> {
        self.read().get(&normalize_dn(dn)).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Proxied authorization identities received, oldest first
    pub fn authorization_ids(&self) -> Vec<String> {
        self.authorizations().clone()
    }

    pub fn connections_opened(&self) -> usize {
        self.state.connections_opened.load(Ordering::Relaxed)
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Entry>> {
        self.state.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Entry>> {
        self.state.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    fn authorizations(&self) -> MutexGuard<'_, Vec<String>> {
        self.state.authorization_ids.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_controls<R: WithControls>(&self, request: &R) -> DirectoryResult<()> {
        for control in request.controls() {
            if !self.state.supported_controls.iter().any(|o| o == control.oid()) {
                return Err(DirectoryError::new(
                    ResultCode::UnwillingToPerform,
                    format!("unsupported critical control {}", control.oid()),
                ));
            }
        }
        if let Some(id) = request.proxied_authorization() {
            if !id.starts_with("dn:") && !id.starts_with("u:") {
                return Err(DirectoryError::new(
                    ResultCode::ProtocolError,
                    format!("malformed authorization identity '{}'", id),
                ));
            }
            self.authorizations().push(id.to_string());
        }
        Ok(())
    }

    fn root_dse_entry(&self, entries: &BTreeMap<String, Entry>) -> Entry {
        let naming_contexts: Vec<String> = entries
            .iter()
            .filter(|(key, _)| match parent_dn(key) {
                Some(parent) => !entries.contains_key(&parent),
                None => true,
            })
            .map(|(_, e)| e.dn.clone())
            .collect();
        Entry::new("")
            .with_attribute(OBJECT_CLASS, ["top", "ds-root-dse"])
            .with_attribute("supportedControl", self.state.supported_controls.clone())
            .with_attribute("namingContexts", naming_contexts)
            .with_attribute("vendorName", ["scim-gateway embedded directory"])
    }
}

fn with_operational_attributes(mut entry: Entry) -> Entry {
    let now = current_generalized_time();
    if !entry.has_attribute(CREATE_TIMESTAMP) {
        entry.set_values(CREATE_TIMESTAMP, vec![now.clone()]);
    }
    if !entry.has_attribute(MODIFY_TIMESTAMP) {
        entry.set_values(MODIFY_TIMESTAMP, vec![now]);
    }
    if !entry.has_attribute(ENTRY_UUID) {
        entry.set_values(ENTRY_UUID, vec![Uuid::new_v4().to_string()]);
    }
    entry
}

fn in_scope(key: &str, base: &str, scope: SearchScope) -> bool {
    match scope {
        SearchScope::Base => key == base,
        SearchScope::OneLevel => parent_dn(key).as_deref() == Some(base),
        SearchScope::Subtree => key == base || key.ends_with(&format!(",{}", base)),
    }
}

/// RDN values must stay on the entry
fn check_rdn(entry: &Entry) -> DirectoryResult<()> {
    if let Some((attribute, value)) = rdn(&entry.dn) {
        if !entry.values(&attribute).iter().any(|v| v.eq_ignore_ascii_case(&value)) {
            return Err(DirectoryError::new(
                ResultCode::NotAllowedOnRdn,
                format!("value '{}' of RDN attribute {} cannot be removed", value, attribute),
            ));
        }
    }
    Ok(())
}

impl RequestInterface for EmbeddedDirectory {
    fn search(&self, request: &SearchRequest) -> DirectoryResult<SearchResult> {
        self.check_controls(request)?;
        let entries = self.read();

        if request.base_dn.is_empty() && request.scope == SearchScope::Base {
            let root = self.root_dse_entry(&entries);
            return Ok(SearchResult {
                entries: vec![root.project(&request.attributes)],
                ..SearchResult::default()
            });
        }

        let base = normalize_dn(&request.base_dn);
        if !entries.contains_key(&base) {
            return Err(DirectoryError::no_such_object(&request.base_dn));
        }

        let mut matched: Vec<Entry> = entries
            .iter()
            .filter(|(key, _)| in_scope(key, &base, request.scope))
            .filter(|(_, e)| request.filter.matches(e))
            .map(|(_, e)| e.clone())
            .collect();
        drop(entries);

        if let Some(keys) = request.sort_keys() {
            sort_entries(&mut matched, keys);
        }

        let mut result = SearchResult::default();
        if let Some(vlv) = request.vlv() {
            if request.sort_keys().is_none() {
                return Err(DirectoryError::new(
                    ResultCode::SortControlMissing,
                    "a virtual list view request requires a server-side sort request",
                ));
            }
            let content_count = matched.len();
            let target = vlv.target_offset.max(1);
            let start = target.saturating_sub(vlv.before_count).max(1);
            let end = (target + vlv.after_count).min(content_count);
            matched = if start <= end {
                matched.drain(start - 1..end).collect()
            } else {
                Vec::new()
            };
            result.vlv_response = Some(VlvResponse {
                target_position: target,
                content_count,
            });
        }

        if request.size_limit > 0 && matched.len() > request.size_limit {
            matched.truncate(request.size_limit);
            result.size_limit_exceeded = true;
        }

        debug!(
            base = %request.base_dn,
            filter = %request.filter,
            returned = matched.len(),
            "embedded search"
        );
        result.entries = matched.iter().map(|e| e.project(&request.attributes)).collect();
        Ok(result)
    }

    fn add(&self, request: &AddRequest) -> DirectoryResult<OperationResult> {
        self.check_controls(request)?;
        let mut entry = request.entry.clone();
        let key = normalize_dn(&entry.dn);
        let mut entries = self.write();

        if entries.contains_key(&key) {
            return Err(DirectoryError::new(
                ResultCode::EntryAlreadyExists,
                format!("entry '{}' already exists", entry.dn),
            ));
        }
        if let Some(parent) = parent_dn(&key) {
            if !entries.contains_key(&parent) {
                return Err(DirectoryError::new(
                    ResultCode::NoSuchObject,
                    format!("parent of entry '{}' does not exist", entry.dn),
                ));
            }
        }
        if !entry.has_attribute(OBJECT_CLASS) {
            return Err(DirectoryError::new(
                ResultCode::ObjectClassViolation,
                format!("entry '{}' has no object class", entry.dn),
            ));
        }
        if let Some((attribute, value)) = rdn(&entry.dn) {
            entry.add_values(&attribute, vec![value]);
        }
        for name in OPERATIONAL_ATTRIBUTES {
            entry.remove_attribute(name);
        }

        let stored = with_operational_attributes(entry);
        let post_read = request.post_read().map(|attributes| stored.project(attributes));
        entries.insert(key, stored);
        Ok(OperationResult { post_read })
    }

    fn modify(&self, request: &ModifyRequest) -> DirectoryResult<OperationResult> {
        self.check_controls(request)?;
        let key = normalize_dn(&request.dn);
        let mut entries = self.write();
        let current = entries
            .get(&key)
            .ok_or_else(|| DirectoryError::no_such_object(&request.dn))?;

        let mut updated = current.clone();
        for modification in &request.modifications {
            let name = modification.attribute.as_str();
            if is_operational(name) {
                return Err(DirectoryError::new(
                    ResultCode::ConstraintViolation,
                    format!("attribute {} is not user-modifiable", name),
                ));
            }
            match modification.mod_type {
                ModificationType::Add => updated.add_values(name, modification.values.clone()),
                ModificationType::Replace => updated.set_values(name, modification.values.clone()),
                ModificationType::Delete => {
                    if !updated.has_attribute(name) {
                        return Err(DirectoryError::new(
                            ResultCode::NoSuchAttribute,
                            format!("entry '{}' has no attribute {}", request.dn, name),
                        ));
                    }
                    if modification.values.is_empty() {
                        updated.remove_attribute(name);
                    } else {
                        updated.remove_values(name, &modification.values);
                    }
                }
            }
        }
        check_rdn(&updated)?;
        if !updated.has_attribute(OBJECT_CLASS) {
            return Err(DirectoryError::new(
                ResultCode::ObjectClassViolation,
                "the objectClass attribute cannot be removed",
            ));
        }
        if &updated != current {
            updated.set_values(MODIFY_TIMESTAMP, vec![current_generalized_time()]);
        }

        let post_read = request.post_read().map(|attributes| updated.project(attributes));
        entries.insert(key, updated);
        Ok(OperationResult { post_read })
    }

    fn delete(&self, request: &DeleteRequest) -> DirectoryResult<OperationResult> {
        self.check_controls(request)?;
        let key = normalize_dn(&request.dn);
        let mut entries = self.write();
        if !entries.contains_key(&key) {
            return Err(DirectoryError::no_such_object(&request.dn));
        }
        let child_suffix = format!(",{}", key);
        if entries.keys().any(|k| k.ends_with(&child_suffix)) {
            return Err(DirectoryError::new(
                ResultCode::NotAllowedOnNonLeaf,
                format!("entry '{}' has subordinate entries", request.dn),
            ));
        }
        entries.remove(&key);
        Ok(OperationResult::default())
    }
}

impl DirectoryBackend for EmbeddedDirectory {
    fn request_interface(&self, _context: &RequestContext) -> AppResult<Box<dyn RequestInterface + '_>> {
        Ok(Box::new(self.clone()))
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.state.capabilities
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Embedded
    }
}

impl ConnectionFactory for EmbeddedDirectory {
    fn connect(&self) -> DirectoryResult<Box<dyn RequestInterface + Send>> {
        self.state.connections_opened.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(self.clone()))
    }
}
