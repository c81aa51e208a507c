use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The store client handle is missing, closed or otherwise unusable.
    #[error("store is not initialized")]
    NotInitialized,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{}", invalid_identifier_message(.index, .found))]
    InvalidIdentifier {
        index: Option<usize>,
        found: &'static str,
    },

    #[error("{}", type_mismatch_message(.index, .message))]
    TypeMismatch {
        index: Option<usize>,
        message: String,
    },

    #[error("no such entity: {0}")]
    NoSuchEntity(String),

    #[error("Cursor decode error: {0}")]
    CursorDecode(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NoSuchEntity(_))
    }

    /// Attaches a sequence position to a type error raised for a single item.
    pub fn at_index(self, position: usize) -> Self {
        match self {
            Self::InvalidIdentifier { found, .. } => Self::InvalidIdentifier {
                index: Some(position),
                found,
            },
            Self::TypeMismatch { message, .. } => Self::TypeMismatch {
                index: Some(position),
                message,
            },
            other => other,
        }
    }
}

fn invalid_identifier_message(index: &Option<usize>, found: &str) -> String {
    match index {
        Some(i) => format!("invalid ID type at index {}: {}", i, found),
        None => format!("invalid ID type: {}", found),
    }
}

fn type_mismatch_message(index: &Option<usize>, message: &str) -> String {
    match index {
        Some(i) => format!("Type mismatch at index {}: {}", i, message),
        None => format!("Type mismatch: {}", message),
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
