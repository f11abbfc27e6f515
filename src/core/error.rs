use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlexError {
    #[error("Malformed data in flex column '{column}': {reason}")]
    MalformedColumnData { column: String, reason: String },

    #[error("Accessor '{name}' on '{owner}' collides with {conflict}")]
    AccessorNameCollision {
        owner: String,
        name: String,
        conflict: String,
    },

    #[error("Field '{field}' is declared more than once in flex column '{column}'")]
    DuplicateField { column: String, field: String },

    #[error("Flex column '{column}' is declared more than once on '{owner}'")]
    DuplicateColumn { owner: String, column: String },

    #[error("Member '{name}' is declared more than once on '{owner}'")]
    DuplicateMember { owner: String, name: String },

    #[error("Invalid {kind} name '{name}'")]
    InvalidIdentifier { kind: &'static str, name: String },

    #[error("Method '{method}' not found on '{owner}'")]
    MethodNotFound { owner: String, method: String },

    #[error("Method '{method}' on '{owner}' is private")]
    MethodNotAccessible { owner: String, method: String },

    #[error("Field '{field}' is not declared in flex column '{column}'")]
    UndeclaredField { column: String, field: String },

    #[error("Flex column '{column}' is not declared on '{owner}'")]
    UnknownColumn { owner: String, column: String },

    #[error("Attribute '{attribute}' is not declared on '{owner}'")]
    UnknownAttribute { owner: String, attribute: String },

    #[error("Method '{method}' expects {expected} argument(s), got {actual}")]
    ArgumentCount {
        method: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid argument for '{method}': {reason}")]
    InvalidArgument { method: String, reason: String },

    #[error("Flex column '{column}' serializes to {length} bytes, limit is {limit}")]
    ColumnTooLong {
        column: String,
        length: usize,
        limit: usize,
    },

    #[error("Record {id} not found in table '{table}'")]
    RecordNotFound { table: String, id: u64 },

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, FlexError>;

impl<T> From<std::sync::PoisonError<T>> for FlexError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for FlexError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl FlexError {
    pub(crate) fn malformed(column: &str, reason: impl Into<String>) -> Self {
        Self::MalformedColumnData {
            column: column.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn method_not_found(owner: &str, method: &str) -> Self {
        Self::MethodNotFound {
            owner: owner.to_string(),
            method: method.to_string(),
        }
    }

    /// True for the two errors produced when a method cannot be called on the
    /// ordinary call path.
    pub fn is_no_method(&self) -> bool {
        matches!(
            self,
            Self::MethodNotFound { .. } | Self::MethodNotAccessible { .. }
        )
    }
}
