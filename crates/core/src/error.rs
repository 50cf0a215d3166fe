use thiserror::Error;

/// Errors raised while loading the static configuration tables.
///
/// These only surface at process start; once the tables are loaded every
/// transform in this crate is total.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid JSON in {table} table: {message}")]
    InvalidJson { table: String, message: String },

    #[error("Status table entry '{0}' must be an object of process-type → label")]
    InvalidStatusEntry(String),

    #[error("Status table entry '{0}' must end with a \"default\" key")]
    MissingDefault(String),

    #[error("Field schema is missing output attribute '{0}'")]
    MissingAttribute(String),

    #[error("Field schema declares undeclared output attribute '{0}'")]
    UnknownAttribute(String),

    #[error("Field schema declares output attribute '{0}' more than once")]
    DuplicateAttribute(String),
}
