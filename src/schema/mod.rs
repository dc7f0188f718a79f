pub mod definitions;
pub mod descriptor;
pub mod resolver;
pub mod resource_descriptor;

pub use definitions::{
    standard_descriptor, GROUP_DESCRIPTOR, SCHEMA_URI_CORE, SCHEMA_URI_ENTERPRISE_EXTENSION, USER_DESCRIPTOR,
};
pub use descriptor::{AttributeDescriptor, DataType};
pub use resolver::{
    AttributeDescriptorResolver, AttributeValueResolver, SubAttributeDescriptorResolver, BINARY_RESOLVER,
    BOOLEAN_RESOLVER, DATETIME_RESOLVER, DECIMAL_RESOLVER, INTEGER_RESOLVER, STRING_RESOLVER,
};
pub use resource_descriptor::{ResolutionMode, ResourceDescriptor};
