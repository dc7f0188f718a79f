use std::fmt;
use thiserror::Error;

/// Directory operation result codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Success,
    OperationsError,
    ProtocolError,
    TimeLimitExceeded,
    SizeLimitExceeded,
    NoSuchAttribute,
    UndefinedAttributeType,
    ConstraintViolation,
    AttributeOrValueExists,
    NoSuchObject,
    InvalidDnSyntax,
    InsufficientAccessRights,
    Busy,
    Unavailable,
    UnwillingToPerform,
    /// A virtual list view request arrived without a sort request
    SortControlMissing,
    ObjectClassViolation,
    NotAllowedOnNonLeaf,
    NotAllowedOnRdn,
    EntryAlreadyExists,
    Other,
    /// Client side: the server could not be reached
    ConnectError,
    /// Client side: no connection became available in time
    Timeout,
}

impl ResultCode {
    /// Numeric code; client-side codes use the 0x5x range
    pub fn code(&self) -> i32 {
        match self {
            ResultCode::Success => 0,
            ResultCode::OperationsError => 1,
            ResultCode::ProtocolError => 2,
            ResultCode::TimeLimitExceeded => 3,
            ResultCode::SizeLimitExceeded => 4,
            ResultCode::NoSuchAttribute => 16,
            ResultCode::UndefinedAttributeType => 17,
            ResultCode::ConstraintViolation => 19,
            ResultCode::AttributeOrValueExists => 20,
            ResultCode::NoSuchObject => 32,
            ResultCode::InvalidDnSyntax => 34,
            ResultCode::InsufficientAccessRights => 50,
            ResultCode::Busy => 51,
            ResultCode::Unavailable => 52,
            ResultCode::UnwillingToPerform => 53,
            ResultCode::SortControlMissing => 60,
            ResultCode::ObjectClassViolation => 65,
            ResultCode::NotAllowedOnNonLeaf => 66,
            ResultCode::NotAllowedOnRdn => 67,
            ResultCode::EntryAlreadyExists => 68,
            ResultCode::Other => 80,
            ResultCode::ConnectError => 91,
            ResultCode::Timeout => 85,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResultCode::Success => "success",
            ResultCode::OperationsError => "operations error",
            ResultCode::ProtocolError => "protocol error",
            ResultCode::TimeLimitExceeded => "time limit exceeded",
            ResultCode::SizeLimitExceeded => "size limit exceeded",
            ResultCode::NoSuchAttribute => "no such attribute",
            ResultCode::UndefinedAttributeType => "undefined attribute type",
            ResultCode::ConstraintViolation => "constraint violation",
            ResultCode::AttributeOrValueExists => "attribute or value exists",
            ResultCode::NoSuchObject => "no such object",
            ResultCode::InvalidDnSyntax => "invalid DN syntax",
            ResultCode::InsufficientAccessRights => "insufficient access rights",
            ResultCode::Busy => "busy",
            ResultCode::Unavailable => "unavailable",
            ResultCode::UnwillingToPerform => "unwilling to perform",
            ResultCode::SortControlMissing => "sort control missing",
            ResultCode::ObjectClassViolation => "object class violation",
            ResultCode::NotAllowedOnNonLeaf => "not allowed on non-leaf",
            ResultCode::NotAllowedOnRdn => "not allowed on RDN",
            ResultCode::EntryAlreadyExists => "entry already exists",
            ResultCode::Other => "other",
            ResultCode::ConnectError => "connect error",
            ResultCode::Timeout => "timeout",
        }
    }

    /// Codes meaning the target entry does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResultCode::NoSuchObject)
    }

    /// Codes after which a pooled connection should not be reused
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ResultCode::ConnectError | ResultCode::Unavailable | ResultCode::ProtocolError
        )
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// A failed directory operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} [{code}]")]
pub struct DirectoryError {
    pub code: ResultCode,
    pub message: String,
}

impl DirectoryError {
    pub fn new(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn no_such_object(dn: &str) -> Self {
        Self::new(ResultCode::NoSuchObject, format!("entry '{}' does not exist", dn))
    }
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;
