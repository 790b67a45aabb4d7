use thiserror::Error;

use crate::state::SyncState;

/// Structural problem in a raw schema document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaParseError {
    #[error("missing required field '{field}' at {path}")]
    MissingField { path: String, field: &'static str },

    #[error("invalid '{field}' at {path}: {message}")]
    InvalidField {
        path: String,
        field: &'static str,
        message: String,
    },

    #[error("dangling reference at {path}: {message}")]
    DanglingReference { path: String, message: String },

    #[error("duplicate definition of {0}")]
    Duplicate(String),
}

/// Raw annotation value that a codec cannot turn into its structured form.
///
/// Recovered locally: the editor falls back to opaque JSON editing and the
/// stored value is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("{path}: expected {expected}")]
    UnexpectedShape { path: String, expected: &'static str },

    #[error("{path}: unknown {what} '{name}'")]
    UnresolvedReference {
        path: String,
        what: &'static str,
        name: String,
    },

    #[error("{path}: {message}")]
    Invalid { path: String, message: String },

    #[error("re-encoding does not reproduce the stored document")]
    Lossy,
}

impl DecodeError {
    pub(crate) fn shape(path: &str, expected: &'static str) -> Self {
        Self::UnexpectedShape {
            path: display_path(path),
            expected,
        }
    }

    pub(crate) fn unresolved(path: &str, what: &'static str, name: impl Into<String>) -> Self {
        Self::UnresolvedReference {
            path: display_path(path),
            what,
            name: name.into(),
        }
    }

    pub(crate) fn invalid(path: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            path: display_path(path),
            message: message.into(),
        }
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

/// Rejected structured edit. The document is unchanged when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("unknown context '{0}'")]
    UnknownContext(String),

    #[error("context '{0}' already exists")]
    DuplicateContext(String),

    #[error("context '{0}' is an alias of another context")]
    AliasContext(String),

    #[error("index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("invalid entry: {0}")]
    InvalidEntry(String),

    #[error("source key must not be empty")]
    EmptySourceKey,

    #[error("source key '{0}' is reserved or already defined")]
    SourceKeyTaken(String),

    #[error("unknown source key '{0}'")]
    UnknownSourceKey(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("schema parse error: {0}")]
    SchemaParse(#[from] SchemaParseError),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("invalid document: {0}")]
    InvalidDocument(#[from] DecodeError),

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SyncState,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not connected to a catalog")]
    NotConnected,

    #[error("remote failure: {0}")]
    Remote(String),
}

impl EngineError {
    /// Stable code for logs and editor status lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SchemaParse(_) => "SCHEMA_PARSE",
            Self::InvalidTarget(_) => "INVALID_TARGET",
            Self::InvalidDocument(_) => "INVALID_DOCUMENT",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::NotConnected => "NOT_CONNECTED",
            Self::Remote(_) => "REMOTE_FAILURE",
        }
    }

    /// Whether the same call may succeed later without any caller-side change.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::InvalidState { .. } | Self::Remote(_))
    }
}
