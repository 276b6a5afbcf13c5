/// A statement could not be composed from the given inputs.
///
/// Raised before anything is sent to the server.
#[derive(Debug, thiserror::Error)]
pub enum StatementError {
    #[error("Missing required identifier: {0}")]
    EmptyIdentifier(&'static str),

    #[error("Malformed identifier: {0:?}")]
    MalformedIdentifier(String),

    #[error("Invalid setting '{name}': {reason}")]
    InvalidSetting { name: String, reason: &'static str },

    #[error("Column '{column}' is claimed by more than one convert rule")]
    OverlappingRules { column: String },

    #[error("Convert rule names column '{column}' which is not part of the target table")]
    UnknownColumn { column: String },

    #[error("Column '{column}' is renamed to '{source_name}' which is claimed by a convert rule")]
    RenameCollision { column: String, source_name: String },

    #[error("Source file column alias '{alias}' is claimed by a convert rule")]
    AliasCollision { alias: String },

    #[error("Expression template for column '{column}' does not reference {{column}}")]
    TemplateWithoutColumn { column: String },

    #[error("Target table {0} has no columns")]
    NoColumns(String),
}

/// Executing a statement failed, or its result had an unexpected shape.
///
/// Server reported errors are passed through unchanged.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Klickhouse(#[from] klickhouse::KlickhouseError),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Parameter '{0}' is referenced but not bound")]
    UnboundParameter(String),

    #[error("Unexpected row shape reading {model}: {reason}")]
    UnexpectedRow { model: &'static str, reason: String },

    #[error("{kind} '{name}' not found after creation")]
    NotFound { kind: &'static str, name: String },
}

/// An endpoint descriptor or connection string is incomplete or invalid.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("{descriptor} is missing mandatory field '{field}'")]
    MissingField {
        descriptor: &'static str,
        field: &'static str,
    },

    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("{0}")]
    Static(&'static str),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}

#[derive(Debug, thiserror::Error)]
pub enum ChadminError {
    #[error(transparent)]
    Statement(#[from] StatementError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl From<klickhouse::KlickhouseError> for ChadminError {
    fn from(value: klickhouse::KlickhouseError) -> Self {
        ChadminError::Execution(value.into())
    }
}

pub type Result<T, E = ChadminError> = std::result::Result<T, E>;
