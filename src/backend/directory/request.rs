//! Directory requests, results and controls

use super::entry::{Entry, Modification};
use super::filter::DirectoryFilter;

pub const OID_SERVER_SIDE_SORT: &str = "1.2.840.113556.1.4.473";
pub const OID_VIRTUAL_LIST_VIEW: &str = "2.16.840.1.113730.3.4.9";
pub const OID_POST_READ: &str = "1.3.6.1.1.13.2";
pub const OID_PROXIED_AUTHORIZATION: &str = "2.16.840.1.113730.3.4.18";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub attribute: String,
    pub reverse: bool,
}

impl SortKey {
    pub fn new(attribute: &str, reverse: bool) -> Self {
        Self {
            attribute: attribute.to_string(),
            reverse,
        }
    }
}

/// Virtual list view request by offset; `target_offset` is 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlvRequest {
    pub before_count: usize,
    pub after_count: usize,
    pub target_offset: usize,
    /// Client's estimate of the list size; 0 when unknown
    pub content_count: usize,
}

impl VlvRequest {
    /// Window of `count` entries starting at `start_index`
    pub fn window(start_index: usize, count: usize) -> Self {
        Self {
            before_count: 0,
            after_count: count.saturating_sub(1),
            target_offset: start_index.max(1),
            content_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlvResponse {
    pub target_position: usize,
    pub content_count: usize,
}

/// Request controls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    ServerSideSort(Vec<SortKey>),
    VirtualListView(VlvRequest),
    /// Attributes of the entry to return after a write
    PostRead(Vec<String>),
    /// Authorization identity, e.g. `dn:uid=admin,dc=example,dc=com`
    ProxiedAuthorization(String),
}

impl Control {
    pub fn oid(&self) -> &'static str {
        match self {
            Control::ServerSideSort(_) => OID_SERVER_SIDE_SORT,
            Control::VirtualListView(_) => OID_VIRTUAL_LIST_VIEW,
            Control::PostRead(_) => OID_POST_READ,
            Control::ProxiedAuthorization(_) => OID_PROXIED_AUTHORIZATION,
        }
    }
}

fn find_control<'a, T>(controls: &'a [Control], pick: impl Fn(&'a Control) -> Option<T>) -> Option<T> {
    controls.iter().find_map(pick)
}

/// Shared accessors for requests carrying controls
pub trait WithControls {
    fn controls(&self) -> &[Control];
    fn controls_mut(&mut self) -> &mut Vec<Control>;

    fn sort_keys(&self) -> Option<&[SortKey]> {
        find_control(self.controls(), |c| match c {
            Control::ServerSideSort(keys) => Some(keys.as_slice()),
            _ => None,
        })
    }

    fn vlv(&self) -> Option<&VlvRequest> {
        find_control(self.controls(), |c| match c {
            Control::VirtualListView(vlv) => Some(vlv),
            _ => None,
        })
    }

    fn post_read(&self) -> Option<&[String]> {
        find_control(self.controls(), |c| match c {
            Control::PostRead(attributes) => Some(attributes.as_slice()),
            _ => None,
        })
    }

    fn proxied_authorization(&self) -> Option<&str> {
        find_control(self.controls(), |c| match c {
            Control::ProxiedAuthorization(id) => Some(id.as_str()),
            _ => None,
        })
    }

    fn add_control(&mut self, control: Control) {
        self.controls_mut().push(control);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Base,
    OneLevel,
    Subtree,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub base_dn: String,
    pub scope: SearchScope,
    pub filter: DirectoryFilter,
    /// Empty means all user attributes
    pub attributes: Vec<String>,
    /// 0 means no limit
    pub size_limit: usize,
    pub controls: Vec<Control>,
}

impl SearchRequest {
    pub fn new(base_dn: &str, scope: SearchScope, filter: DirectoryFilter) -> Self {
        Self {
            base_dn: base_dn.to_string(),
            scope,
            filter,
            attributes: Vec::new(),
            size_limit: 0,
            controls: Vec::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: Vec<String>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_size_limit(mut self, size_limit: usize) -> Self {
        self.size_limit = size_limit;
        self
    }

    pub fn with_control(mut self, control: Control) -> Self {
        self.controls.push(control);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    pub entries: Vec<Entry>,
    pub vlv_response: Option<VlvResponse>,
    /// More entries matched than the size limit allowed
    pub size_limit_exceeded: bool,
}

impl SearchResult {
    pub fn vlv_response(&self) -> Option<&VlvResponse> {
        self.vlv_response.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddRequest {
    pub entry: Entry,
    pub controls: Vec<Control>,
}

impl AddRequest {
    pub fn new(entry: Entry) -> Self {
        Self {
            entry,
            controls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModifyRequest {
    pub dn: String,
    pub modifications: Vec<Modification>,
    pub controls: Vec<Control>,
}

impl ModifyRequest {
    pub fn new(dn: &str, modifications: Vec<Modification>) -> Self {
        Self {
            dn: dn.to_string(),
            modifications,
            controls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRequest {
    pub dn: String,
    pub controls: Vec<Control>,
}

impl DeleteRequest {
    pub fn new(dn: &str) -> Self {
        Self {
            dn: dn.to_string(),
            controls: Vec::new(),
        }
    }
}

macro_rules! impl_with_controls {
    ($($request:ty),*) => {
        $(
            impl WithControls for $request {
                fn controls(&self) -> &[Control] {
                    &self.controls
                }

                fn controls_mut(&mut self) -> &mut Vec<Control> {
                    &mut self.controls
                }
            }
        )*
    };
}

impl_with_controls!(SearchRequest, AddRequest, ModifyRequest, DeleteRequest);

/// Outcome of a write operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationResult {
    /// Entry as read after the write, when a post-read control was sent
    pub post_read: Option<Entry>,
}
