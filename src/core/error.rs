use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DbError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Schema '{0}' not found")]
    SchemaNotFound(String),

    #[error("Column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Could not obtain lock: {0}")]
    LockNotAvailable(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("current transaction is aborted, commands ignored until end of transaction block")]
    TransactionAborted,

    #[error("I/O error: {0}")]
    IoError(String),

    /// The subsystem cannot start: unsupported host context or missing managing schema.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A template definition uses a clause global temporary tables do not support.
    #[error("Invalid template definition: {0}")]
    Definition(String),

    /// DDL on a template that is materialized in the current session.
    #[error("{0}")]
    StateConflict(String),

    #[error("Global temporary table '{0}' is already registered")]
    DuplicateTemplate(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of errors, mirroring how callers are expected to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Configuration,
    Definition,
    StateConflict,
    Internal,
    Host,
}

impl DbError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Configuration(_) => ErrorClass::Configuration,
            Self::Definition(_) => ErrorClass::Definition,
            Self::StateConflict(_) => ErrorClass::StateConflict,
            Self::DuplicateTemplate(_) | Self::Internal(_) => ErrorClass::Internal,
            _ => ErrorClass::Host,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.class() == ErrorClass::Internal
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<sqlparser::parser::ParserError> for DbError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        Self::ParseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(
            DbError::Definition("fk".into()).class(),
            ErrorClass::Definition
        );
        assert_eq!(
            DbError::StateConflict("in use".into()).class(),
            ErrorClass::StateConflict
        );
        assert!(DbError::DuplicateTemplate("t".into()).is_internal());
        assert_eq!(DbError::TableNotFound("t".into()).class(), ErrorClass::Host);
    }
}
