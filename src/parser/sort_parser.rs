use crate::error::AppResult;
use crate::parser::filter_parser::{parse_attribute_path, AttributePath};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn from_str(s: &str) -> SortOrder {
        match s.to_lowercase().as_str() {
            "descending" | "desc" => SortOrder::Descending,
            _ => SortOrder::Ascending, // Default to ascending
        }
    }

    pub fn is_descending(&self) -> bool {
        *self == SortOrder::Descending
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub path: AttributePath,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn new(path: AttributePath, order: SortOrder) -> Self {
        SortSpec { path, order }
    }

    /// Parse the sortBy and sortOrder parameters
    pub fn from_params(sort_by: Option<&str>, sort_order: Option<&str>) -> AppResult<Option<SortSpec>> {
        let Some(sort_by) = sort_by.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        let path = parse_attribute_path(sort_by)?;
        let order = sort_order
            .map(SortOrder::from_str)
            .unwrap_or(SortOrder::Ascending);
        Ok(Some(SortSpec::new(path, order)))
    }
}

/// A window over the result set: `start_index` is 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpec {
    pub start_index: usize,
    pub count: usize,
}

impl PageSpec {
    /// Parse the startIndex and count parameters.
    ///
    /// Returns `None` when neither is given. A start index below 1 is
    /// treated as 1, a negative count as 0; a missing count means
    /// `max_results`, and a count is never larger than that.
    pub fn from_params(start_index: Option<i64>, count: Option<i64>, max_results: usize) -> Option<PageSpec> {
        if start_index.is_none() && count.is_none() {
            return None;
        }
        let start_index = start_index.unwrap_or(1).max(1) as usize;
        let count = count
            .map(|c| c.max(0) as usize)
            .unwrap_or(max_results)
            .min(max_results);
        Some(PageSpec { start_index, count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SCHEMA_URI_ENTERPRISE_EXTENSION;

    #[test]
    fn test_sort_order_from_str() {
        assert_eq!(SortOrder::from_str("ascending"), SortOrder::Ascending);
        assert_eq!(SortOrder::from_str("DESCENDING"), SortOrder::Descending);
        assert_eq!(SortOrder::from_str("desc"), SortOrder::Descending);
        assert_eq!(SortOrder::from_str("invalid"), SortOrder::Ascending); // Default
    }

    #[test]
    fn test_sort_spec_from_params() {
        let spec = SortSpec::from_params(Some("name.familyName"), Some("descending"))
            .unwrap()
            .unwrap();
        assert_eq!(spec.path, AttributePath::core("name", Some("familyName")));
        assert_eq!(spec.order, SortOrder::Descending);

        let spec = SortSpec::from_params(
            Some("urn:scim:schemas:extension:enterprise:1.0:employeeNumber"),
            None,
        )
        .unwrap()
        .unwrap();
        assert_eq!(spec.path.schema, SCHEMA_URI_ENTERPRISE_EXTENSION);
        assert_eq!(spec.order, SortOrder::Ascending); // Default

        assert!(SortSpec::from_params(None, Some("descending")).unwrap().is_none());
        assert_eq!(SortSpec::from_params(Some("a b"), None).unwrap_err().status(), 400);
    }

    #[test]
    fn test_page_spec_from_params() {
        assert_eq!(PageSpec::from_params(None, None, 100), None);
        assert_eq!(
            PageSpec::from_params(Some(21), Some(10), 100),
            Some(PageSpec { start_index: 21, count: 10 })
        );
        assert_eq!(
            PageSpec::from_params(Some(0), None, 100),
            Some(PageSpec { start_index: 1, count: 100 })
        );
        assert_eq!(
            PageSpec::from_params(None, Some(500), 100),
            Some(PageSpec { start_index: 1, count: 100 })
        );
    }
}
