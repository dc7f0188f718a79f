use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::attribute_filter::AttributeFilter;
use crate::backend::directory::entry::{parent_dn, sort_entries};
use crate::backend::directory::{
    AddRequest, Control, DeleteRequest, Entry, ModifyRequest, SearchRequest, SearchScope, VlvRequest, WithControls,
};
use crate::backend::{DirectoryBackend, RequestContext, RequestInterface};
use crate::error::{AppError, AppResult, ResourceRef};
use crate::logging::access_log;
use crate::mapping::{FilterTranslation, ResourceMapper};
use crate::models::{matches, ScimObject};
use crate::parser::{parse_filter, CompareOperator, PageSpec, ScimFilter, SortSpec};
use crate::registry::SnapshotTable;
use crate::schema::{ResolutionMode, ResourceDescriptor, SCHEMA_URI_CORE};

/// Name the service's own backend is registered under
pub const DEFAULT_BACKEND: &str = "default";

/// Service-wide settings
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Prefix for `meta.location`; no location is reported without it
    pub base_uri: Option<String>,
    pub max_results: usize,
    pub strict: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            base_uri: None,
            max_results: 100,
            strict: true,
        }
    }
}

/// Raw query parameters of a list request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    pub filter: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub start_index: Option<i64>,
    pub count: Option<i64>,
    pub attributes: Option<String>,
}

/// A parsed list request
#[derive(Debug, Clone, Default)]
pub struct GetResourcesRequest {
    pub filter: Option<ScimFilter>,
    pub sort: Option<SortSpec>,
    pub page: Option<PageSpec>,
    pub attributes: AttributeFilter,
}

impl GetResourcesRequest {
    pub fn with_filter(mut self, filter: ScimFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_page(mut self, page: PageSpec) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_attributes(mut self, attributes: AttributeFilter) -> Self {
        self.attributes = attributes;
        self
    }
}

/// One page of a list response
#[derive(Debug, Clone)]
pub struct Resources {
    pub resources: Vec<ScimObject>,
    pub total_results: usize,
    pub start_index: usize,
}

impl Resources {
    fn empty() -> Self {
        Self {
            resources: Vec::new(),
            total_results: 0,
            start_index: 1,
        }
    }

    pub fn items_per_page(&self) -> usize {
        self.resources.len()
    }
}

struct MapperBinding {
    mapper: ResourceMapper,
    backend: String,
}

/// CRUD and query operations for every registered resource endpoint
pub struct ResourceService {
    backends: SnapshotTable<dyn DirectoryBackend>,
    mappers: SnapshotTable<MapperBinding>,
    max_results: AtomicUsize,
    base_uri: Option<String>,
    resolution: ResolutionMode,
}

impl ResourceService {
    pub fn new(backend: Arc<dyn DirectoryBackend>, settings: ServiceSettings) -> Self {
        let backends = SnapshotTable::new();
        backends.insert(DEFAULT_BACKEND, backend);
        Self {
            backends,
            mappers: SnapshotTable::new(),
            max_results: AtomicUsize::new(settings.max_results),
            base_uri: settings.base_uri,
            resolution: ResolutionMode::from_strict_flag(settings.strict),
        }
    }

    pub fn register_backend(&self, name: &str, backend: Arc<dyn DirectoryBackend>) {
        info!(backend = name, backend_type = ?backend.backend_type(), "Registered directory backend");
        self.backends.insert(name, backend);
    }

    /// Serve the mapper's endpoint from the default backend, replacing any
    /// earlier registration of the same endpoint
    pub fn register_mapper(&self, mapper: ResourceMapper) {
        self.bind(mapper, DEFAULT_BACKEND);
    }

    /// Serve the mapper's endpoint from a named backend
    pub fn register_mapper_with_backend(&self, mapper: ResourceMapper, backend: &str) -> AppResult<()> {
        if !self.backends.contains(backend) {
            return Err(AppError::InvalidArgument(format!("no backend named '{}'", backend)));
        }
        self.bind(mapper, backend);
        Ok(())
    }

    fn bind(&self, mapper: ResourceMapper, backend: &str) {
        let endpoint = mapper.endpoint().to_string();
        info!(endpoint = %endpoint, search_base = mapper.search_base(), backend, "Registered resource mapper");
        let binding = MapperBinding {
            mapper,
            backend: backend.to_string(),
        };
        self.mappers.insert(&endpoint, Arc::new(binding));
    }

    pub fn unregister_mapper(&self, endpoint: &str) -> bool {
        self.mappers.remove(endpoint).is_some()
    }

    /// Registered endpoints, lowercased and sorted
    pub fn endpoints(&self) -> Vec<String> {
        self.mappers.keys()
    }

    pub fn max_results(&self) -> usize {
        self.max_results.load(Ordering::Relaxed)
    }

    pub fn set_max_results(&self, max_results: usize) {
        self.max_results.store(max_results, Ordering::Relaxed);
    }

    pub fn resolution_mode(&self) -> ResolutionMode {
        self.resolution
    }

    fn binding(&self, endpoint: &str) -> AppResult<(Arc<MapperBinding>, Arc<dyn DirectoryBackend>)> {
        let binding = self
            .mappers
            .get(endpoint)
            .ok_or_else(|| AppError::UnsupportedOperation(format!("no resource is served at '{}'", endpoint)))?;
        let backend = self.backends.get(&binding.backend).ok_or_else(|| {
            AppError::Configuration(format!("backend '{}' of endpoint '{}' is gone", binding.backend, endpoint))
        })?;
        Ok((binding, backend))
    }

    pub fn resource_descriptor(&self, endpoint: &str) -> AppResult<Arc<ResourceDescriptor>> {
        Ok(self.binding(endpoint)?.0.mapper.descriptor().clone())
    }

    /// The endpoint's resource descriptor as a `Schema` resource
    pub fn get_schema(&self, endpoint: &str) -> AppResult<ScimObject> {
        self.resource_descriptor(endpoint)?.to_schema_object()
    }

    /// Parse list query parameters against the current result limit
    pub fn parse_query(&self, params: &QueryParams) -> AppResult<GetResourcesRequest> {
        let filter = params.filter.as_deref().map(parse_filter).transpose()?;
        Ok(GetResourcesRequest {
            filter,
            sort: SortSpec::from_params(params.sort_by.as_deref(), params.sort_order.as_deref())?,
            page: PageSpec::from_params(params.start_index, params.count, self.max_results()),
            attributes: AttributeFilter::from_params(params.attributes.as_deref())?,
        })
    }

    pub fn get_resource(
        &self,
        context: &RequestContext,
        endpoint: &str,
        id: &str,
        attributes: &AttributeFilter,
    ) -> AppResult<ScimObject> {
        let (binding, backend) = self.binding(endpoint)?;
        let mapper = &binding.mapper;
        let started = Instant::now();
        let result = self
            .in_scope(mapper, endpoint, id)
            .and_then(|_| {
                let directory = backend.request_interface(context)?;
                read_entry(&*directory, mapper, id, attributes)?
                    .ok_or_else(|| not_found(endpoint, id))
            })
            .and_then(|entry| self.convert(mapper, &entry, attributes));
        access_log("read", endpoint, result.as_ref().map(|_| 1), started.elapsed());
        result
    }

    pub fn get_resources(
        &self,
        context: &RequestContext,
        endpoint: &str,
        request: &GetResourcesRequest,
    ) -> AppResult<Resources> {
        let (binding, backend) = self.binding(endpoint)?;
        let started = Instant::now();
        let result = self.search(context, &binding.mapper, &*backend, request);
        access_log(
            "search",
            endpoint,
            result.as_ref().map(|r| r.items_per_page()),
            started.elapsed(),
        );
        result
    }

    fn search(
        &self,
        context: &RequestContext,
        mapper: &ResourceMapper,
        backend: &dyn DirectoryBackend,
        request: &GetResourcesRequest,
    ) -> AppResult<Resources> {
        self.check_paths(mapper, request)?;

        if let Some(id) = request.filter.as_ref().and_then(id_lookup) {
            debug!(id, "Identifier filter, reading the entry directly");
            if !mapper.is_in_scope(id) {
                return Ok(Resources::empty());
            }
            let directory = backend.request_interface(context)?;
            let entry = match read_entry(&*directory, mapper, id, &request.attributes) {
                Ok(entry) => entry,
                Err(AppError::NotFound(_)) => None,
                Err(e) => return Err(e),
            };
            let resources = entry
                .map(|e| self.convert(mapper, &e, &request.attributes))
                .transpose()?
                .into_iter()
                .collect::<Vec<_>>();
            return Ok(Resources {
                total_results: resources.len(),
                start_index: 1,
                resources,
            });
        }

        let translation = match &request.filter {
            Some(filter) => mapper.to_directory_filter(filter)?,
            None => FilterTranslation {
                filter: mapper.object_class_filter(),
                residual: None,
            },
        };
        let sort_key = match &request.sort {
            Some(sort) => Some(
                mapper
                    .sort_key(sort)
                    .ok_or_else(|| AppError::BadRequest(format!("cannot sort by {}", sort.path)))?,
            ),
            None if request.page.is_some() => Some(mapper.default_sort_key()),
            None => None,
        };
        let fetch = match &request.filter {
            Some(filter) => request.attributes.with_filter_paths(filter),
            None => request.attributes.clone(),
        };

        let capabilities = backend.capabilities();
        let page = request.page.filter(|p| p.count > 0);
        let use_vlv = page.is_some() && translation.is_complete() && capabilities.can_page();
        let sort_in_directory = sort_key.is_some() && capabilities.server_side_sort;
        debug!(
            filter = %translation.filter,
            complete = translation.is_complete(),
            vlv = use_vlv,
            server_side_sort = sort_in_directory,
            "Built directory search"
        );

        let mut search = SearchRequest::new(mapper.search_base(), SearchScope::Subtree, translation.filter)
            .with_attributes(mapper.directory_attributes(|d| fetch.is_requested(d.schema(), d.name())));
        if let (true, Some(key)) = (sort_in_directory, &sort_key) {
            search.add_control(Control::ServerSideSort(vec![key.clone()]));
        }
        if let (true, Some(page)) = (use_vlv, page) {
            search.add_control(Control::VirtualListView(VlvRequest::window(page.start_index, page.count)));
        }

        let directory = backend.request_interface(context)?;
        let result = directory.search(&search)?;
        drop(directory);
        let vlv_response = result.vlv_response;
        let mut entries = result.entries;
        if let (false, Some(key)) = (sort_in_directory, &sort_key) {
            sort_entries(&mut entries, std::slice::from_ref(key));
        }

        let mut resources = entries
            .iter()
            .map(|entry| mapper.to_resource(entry, self.base_uri.as_deref()))
            .collect::<AppResult<Vec<_>>>()?;
        if let Some(residual) = &translation.residual {
            let before = resources.len();
            resources.retain(|resource| matches(resource, residual));
            debug!(before, after = resources.len(), residual = %residual, "Re-checked untranslated filter in memory");
        }

        let (total_results, start_index, mut resources) = match (use_vlv, vlv_response, request.page) {
            (true, Some(vlv), Some(page)) => {
                resources.truncate(page.count);
                (vlv.content_count, vlv.target_position.max(1), resources)
            }
            (true, None, _) => {
                warn!("Directory ignored the virtual list view request");
                let total = resources.len();
                (total, 1, resources)
            }
            (_, _, Some(page)) => {
                let window: Vec<_> = resources
                    .into_iter()
                    .skip(page.start_index.saturating_sub(1))
                    .take(page.count)
                    .collect();
                (window.len(), 1, window)
            }
            (_, _, None) => {
                resources.truncate(self.max_results());
                (resources.len(), 1, resources)
            }
        };

        for resource in &mut resources {
            request.attributes.apply_to_resource(resource);
        }
        Ok(Resources {
            resources,
            total_results,
            start_index,
        })
    }

    /// Reject filter and sort paths the schema does not declare, in strict mode
    fn check_paths(&self, mapper: &ResourceMapper, request: &GetResourcesRequest) -> AppResult<()> {
        let descriptor = mapper.descriptor();
        let filter_paths = request.filter.iter().flat_map(|f| f.attribute_paths());
        let sort_paths = request.sort.iter().map(|s| &s.path);
        for path in filter_paths.chain(sort_paths) {
            descriptor.resolve(&path.schema, &path.attribute, self.resolution)?;
        }
        Ok(())
    }

    pub fn post_resource(
        &self,
        context: &RequestContext,
        endpoint: &str,
        resource: &ScimObject,
        attributes: &AttributeFilter,
    ) -> AppResult<ScimObject> {
        let (binding, backend) = self.binding(endpoint)?;
        let mapper = &binding.mapper;
        let started = Instant::now();
        let result = mapper.to_entry(resource).and_then(|entry| {
            let dn = entry.dn.clone();
            let directory = backend.request_interface(context)?;
            let mut request = AddRequest::new(entry);
            let read_back = mapper.directory_attributes(|d| attributes.is_requested(d.schema(), d.name()));
            if backend.capabilities().post_read {
                request.add_control(Control::PostRead(read_back));
            }
            let result = directory.add(&request)?;
            info!(dn = %dn, "Added entry");
            let stored = match result.post_read {
                Some(entry) => entry,
                None => read_entry(&*directory, mapper, &dn, attributes)?.ok_or_else(|| not_found(endpoint, &dn))?,
            };
            self.convert(mapper, &stored, attributes)
        });
        access_log("add", endpoint, result.as_ref().map(|_| 1), started.elapsed());
        result
    }

    /// Replace a resource's writable attributes with those of `resource`.
    ///
    /// Only the difference is sent to the directory; nothing is written when
    /// the entry already matches.
    pub fn put_resource(
        &self,
        context: &RequestContext,
        endpoint: &str,
        id: &str,
        resource: &ScimObject,
        attributes: &AttributeFilter,
    ) -> AppResult<ScimObject> {
        let (binding, backend) = self.binding(endpoint)?;
        let mapper = &binding.mapper;
        let started = Instant::now();
        let result = self.in_scope(mapper, endpoint, id).and_then(|_| {
            let directory = backend.request_interface(context)?;
            let current =
                read_entry(&*directory, mapper, id, &AttributeFilter::all())?.ok_or_else(|| not_found(endpoint, id))?;
            // the entry keeps its container, which may sit below the search base
            let parent = parent_dn(&current.dn).unwrap_or_else(|| mapper.search_base().to_string());
            let desired = mapper.to_entry_under(resource, &parent)?;
            let modifications = mapper.modifications(&current, &desired)?;
            if modifications.is_empty() {
                debug!(dn = %current.dn, "Entry already up to date");
                return self.convert(mapper, &current, attributes);
            }

            let mut request = ModifyRequest::new(&current.dn, modifications);
            let read_back = mapper.directory_attributes(|d| attributes.is_requested(d.schema(), d.name()));
            if backend.capabilities().post_read {
                request.add_control(Control::PostRead(read_back));
            }
            let result = directory.modify(&request)?;
            info!(dn = %current.dn, changes = request.modifications.len(), "Modified entry");
            let stored = match result.post_read {
                Some(entry) => entry,
                None => read_entry(&*directory, mapper, &current.dn, attributes)?
                    .ok_or_else(|| not_found(endpoint, id))?,
            };
            self.convert(mapper, &stored, attributes)
        });
        access_log("modify", endpoint, result.as_ref().map(|_| 1), started.elapsed());
        result
    }

    pub fn delete_resource(&self, context: &RequestContext, endpoint: &str, id: &str) -> AppResult<()> {
        let (binding, backend) = self.binding(endpoint)?;
        let started = Instant::now();
        let result = self.in_scope(&binding.mapper, endpoint, id).and_then(|_| {
            let directory = backend.request_interface(context)?;
            directory.delete(&DeleteRequest::new(id)).map_err(|e| {
                if e.code.is_not_found() {
                    not_found(endpoint, id)
                } else {
                    AppError::from(e)
                }
            })?;
            info!(dn = id, "Deleted entry");
            Ok(())
        });
        access_log("delete", endpoint, result.as_ref().map(|_| 1), started.elapsed());
        result
    }

    fn in_scope(&self, mapper: &ResourceMapper, endpoint: &str, id: &str) -> AppResult<()> {
        if mapper.is_in_scope(id) {
            Ok(())
        } else {
            Err(not_found(endpoint, id))
        }
    }

    fn convert(&self, mapper: &ResourceMapper, entry: &Entry, attributes: &AttributeFilter) -> AppResult<ScimObject> {
        let mut resource = mapper.to_resource(entry, self.base_uri.as_deref())?;
        attributes.apply_to_resource(&mut resource);
        Ok(resource)
    }
}

fn not_found(endpoint: &str, id: &str) -> AppError {
    AppError::NotFound(ResourceRef { resource: endpoint, id }.to_string())
}

/// The DN of an `id eq '<dn>'` filter
fn id_lookup(filter: &ScimFilter) -> Option<&str> {
    match filter {
        ScimFilter::Compare {
            op: CompareOperator::Equality,
            path,
            value: Some(value),
            ..
        } if path.addresses(SCHEMA_URI_CORE, "id") && path.sub_attribute.is_none() => Some(value),
        _ => None,
    }
}

/// Read one entry of the mapper's type by DN; `None` if the entry exists
/// but is of another type
fn read_entry(
    directory: &dyn RequestInterface,
    mapper: &ResourceMapper,
    dn: &str,
    attributes: &AttributeFilter,
) -> AppResult<Option<Entry>> {
    let request = SearchRequest::new(dn, SearchScope::Base, mapper.object_class_filter())
        .with_attributes(mapper.directory_attributes(|d| attributes.is_requested(d.schema(), d.name())));
    Ok(directory.search(&request)?.entries.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::directory::entry::OBJECT_CLASS;
    use crate::backend::EmbeddedDirectory;
    use crate::mapping::{default_user_mapping, ResourceMapper};
    use crate::parser::{AttributePath, SortOrder};

    fn service() -> (EmbeddedDirectory, ResourceService) {
        let directory = EmbeddedDirectory::new();
        for (dn, class) in [("dc=example,dc=com", "domain"), ("ou=people,dc=example,dc=com", "organizationalUnit")] {
            directory
                .load_entry(Entry::new(dn).with_attribute(OBJECT_CLASS, ["top", class]))
                .unwrap();
        }
        for (uid, title) in [("alice", "Engineer"), ("bob", "Manager"), ("carol", "Engineer")] {
            directory
                .load_entry(
                    Entry::new(&format!("uid={},ou=people,dc=example,dc=com", uid))
                        .with_attribute(OBJECT_CLASS, ["top", "person", "organizationalPerson", "inetOrgPerson"])
                        .with_attribute("uid", [uid])
                        .with_attribute("title", [title]),
                )
                .unwrap();
        }
        let service = ResourceService::new(Arc::new(directory.clone()), ServiceSettings::default());
        service.register_mapper(ResourceMapper::from_config(&default_user_mapping("dc=example,dc=com")).unwrap());
        (directory, service)
    }

    fn user_names(resources: &Resources) -> Vec<String> {
        resources
            .resources
            .iter()
            .filter_map(|r| r.get_simple_value(SCHEMA_URI_CORE, "userName"))
            .map(|v| v.string_value())
            .collect()
    }

    #[test]
    fn test_unknown_endpoint_is_unsupported() {
        let (_, service) = service();
        let err = service
            .get_resources(&RequestContext::anonymous(), "Printers", &GetResourcesRequest::default())
            .unwrap_err();
        assert_eq!(err.status(), 501);
    }

    #[test]
    fn test_id_filter_reads_entry() {
        let (_, service) = service();
        let request = service
            .parse_query(&QueryParams {
                filter: Some("id eq 'uid=bob,ou=people,dc=example,dc=com'".to_string()),
                ..Default::default()
            })
            .unwrap();
        let found = service.get_resources(&RequestContext::anonymous(), "Users", &request).unwrap();
        assert_eq!(user_names(&found), vec!["bob"]);

        let missing = GetResourcesRequest::default()
            .with_filter(parse_filter("id eq 'uid=zed,ou=people,dc=example,dc=com'").unwrap());
        let found = service.get_resources(&RequestContext::anonymous(), "Users", &missing).unwrap();
        assert_eq!(found.total_results, 0);
    }

    #[test]
    fn test_sorted_search() {
        let (_, service) = service();
        let request = GetResourcesRequest::default()
            .with_filter(parse_filter("title eq 'engineer'").unwrap())
            .with_sort(SortSpec::new(AttributePath::core("userName", None), SortOrder::Descending));
        let found = service.get_resources(&RequestContext::anonymous(), "Users", &request).unwrap();
        assert_eq!(user_names(&found), vec!["carol", "alice"]);
        assert_eq!(found.start_index, 1);
    }

    #[test]
    fn test_strict_paths() {
        let (_, service) = service();
        let request = GetResourcesRequest::default().with_filter(parse_filter("shoeSize eq '9'").unwrap());
        let err = service
            .get_resources(&RequestContext::anonymous(), "Users", &request)
            .unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn test_max_results() {
        let (_, service) = service();
        service.set_max_results(2);
        let found = service
            .get_resources(&RequestContext::anonymous(), "Users", &GetResourcesRequest::default())
            .unwrap();
        assert_eq!(found.items_per_page(), 2);
        assert_eq!(found.total_results, 2);

        let request = service
            .parse_query(&QueryParams {
                count: Some(50),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(request.page.map(|p| p.count), Some(2));
    }

    #[test]
    fn test_named_backend() {
        let (_, service) = service();
        let mapper = ResourceMapper::from_config(&default_user_mapping("dc=example,dc=com")).unwrap();
        assert!(service.register_mapper_with_backend(mapper, "replica").is_err());

        service.register_backend("replica", Arc::new(EmbeddedDirectory::new()));
        let mapper = ResourceMapper::from_config(&default_user_mapping("dc=example,dc=com")).unwrap();
        service.register_mapper_with_backend(mapper, "replica").unwrap();
        let err = service
            .get_resources(&RequestContext::anonymous(), "Users", &GetResourcesRequest::default())
            .unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[test]
    fn test_schema_introspection() {
        let (_, service) = service();
        let schema = service.get_schema("users").unwrap();
        assert_eq!(
            schema.get_simple_value(SCHEMA_URI_CORE, "endpoint").map(|v| v.string_value()),
            Some("Users".to_string())
        );
        assert!(service.unregister_mapper("Users"));
        assert_eq!(service.get_schema("Users").unwrap_err().status(), 501);
    }
}
