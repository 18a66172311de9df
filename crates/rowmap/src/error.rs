//! Error types for rowmap

use thiserror::Error;

/// Result type alias for rowmap operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for builder and store operations
#[derive(Debug, Error)]
pub enum OrmError {
    /// Unknown query type name
    #[error("Invalid query type: '{0}'")]
    InvalidQueryType(String),

    /// SELECT, UPDATE or INSERT built without any fields
    #[error("Empty field list for table '{0}'")]
    EmptyFieldList(String),

    /// Condition value unusable with its comparator (e.g. empty IN list)
    #[error("Malformed value for '{column}': {message}")]
    MalformedValue { column: String, message: String },

    /// Descriptor does not mark the field readable
    #[error("Field '{field}' on '{entity}' is not readable")]
    FieldNotReadable { entity: String, field: String },

    /// Descriptor does not mark the field writable
    #[error("Field '{field}' on '{entity}' is not writable")]
    FieldNotWritable { entity: String, field: String },

    /// The loaded row carries no such column
    #[error("Unknown field '{0}'")]
    UnknownField(String),

    /// Value of the wrong shape, or a reference assigned the wrong entity type
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    /// A row whose presence is required does not exist
    ///
    /// Plain lookups report a miss as `Ok(None)` instead; this variant is for
    /// places where absence is fatal, such as resolving a reference field or
    /// reloading a freshly inserted row.
    #[error("No row for '{entity}' with key {key}")]
    RowNotFound { entity: String, key: String },

    /// A batch fetch requested more rows than the query matched
    #[error("Expected {expected} rows, got {got}")]
    InsufficientRows { expected: usize, got: usize },

    /// Entity type name not registered in the schema
    #[error("Unknown entity type: '{0}'")]
    UnknownEntity(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Wraps underlying backend errors (bad statement, lost connection, ...)
    #[error("Connection error: {0}")]
    Connection(String),
}

impl OrmError {
    /// Create a malformed-value error for a specific column
    pub fn malformed_value(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedValue {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a type mismatch error
    pub fn type_mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Create a row-not-found error
    pub fn row_not_found(entity: impl Into<String>, key: impl ToString) -> Self {
        Self::RowNotFound {
            entity: entity.into(),
            key: key.to_string(),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Check if this is a connection error
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Check if this is a row-not-found error
    pub fn is_row_not_found(&self) -> bool {
        matches!(self, Self::RowNotFound { .. })
    }

    /// Check if this is an insufficient-rows error
    pub fn is_insufficient_rows(&self) -> bool {
        matches!(self, Self::InsufficientRows { .. })
    }

    /// Check if this is a descriptor policy violation (readable/writable)
    pub fn is_policy_violation(&self) -> bool {
        matches!(
            self,
            Self::FieldNotReadable { .. } | Self::FieldNotWritable { .. }
        )
    }
}

impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
