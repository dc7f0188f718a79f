pub mod filter_operator;
pub mod filter_parser;
pub mod sort_parser;

pub use filter_operator::{AttributePath, CompareOperator, ScimFilter};
pub use filter_parser::{parse_attribute_path, parse_filter, FilterParseError};
pub use sort_parser::{PageSpec, SortOrder, SortSpec};
