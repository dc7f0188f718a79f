//! In-memory attribute value tree for one resource instance

pub mod attribute;
pub mod filter_match;
pub mod object;
pub mod value;

pub use attribute::{AttributeValues, ScimAttribute};
pub use filter_match::matches;
pub use object::ScimObject;
pub use value::{ComplexValue, ScimValue, SimpleValue};
