//! Error types for descriptor declaration, document assembly, loading and validation.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building a JSON:API document.
///
/// All variants are fatal to the current `serialize` call; no partial
/// document is ever returned.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("{message}")]
    AmbiguousCollection { message: String },

    #[error("'{segment}' is not a valid include.{}", suggestion_suffix(.suggestion))]
    InvalidInclude {
        segment: String,
        suggestion: Option<String>,
    },

    #[error("no descriptor registered for '{key}'")]
    DescriptorNotFound { key: String },

    #[error("descriptor for '{expected}' applied to an object of '{found}'")]
    DescriptorMismatch { expected: String, found: String },

    #[error("cannot serialize attribute '{name}': {source}")]
    Attribute {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(name) => format!(" Did you mean '{}'?", name),
        None => String::new(),
    }
}

/// Errors raised while declaring descriptors, before any document is rendered.
#[derive(Debug, Error)]
pub enum DeclarationError {
    #[error("'{name}' is reserved and cannot be declared as an attribute of '{type_name}'")]
    ReservedName { type_name: String, name: String },

    #[error("descriptor for '{type_name}' has no id accessor")]
    MissingId { type_name: String },

    #[error("relationship targets undeclared kind '{kind}'")]
    UnknownKind { kind: String },
}

/// Errors while loading JSON inputs (data, schema config, documents).
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// Errors during document validation.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("invalid document schema: {message}")]
    InvalidSchema { message: String },

    #[error("document failed validation with {} error(s)", errors.len())]
    Invalid { errors: Vec<Violation> },
}

/// Single validation failure with path context.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Violation {
    /// JSON Pointer (RFC 6901) to the offending member.
    pub path: String,
    /// Human-readable error message.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl SerializeError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

impl DeclarationError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. } | LoadError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            LoadError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}

impl ValidateError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ValidateError::InvalidSchema { .. } => 2,
            ValidateError::Invalid { .. } => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_include_message_without_suggestion() {
        let err = SerializeError::InvalidInclude {
            segment: "fake-attr".into(),
            suggestion: None,
        };
        assert_eq!(err.to_string(), "'fake-attr' is not a valid include.");
    }

    #[test]
    fn invalid_include_message_with_suggestion() {
        let err = SerializeError::InvalidInclude {
            segment: "long_comments".into(),
            suggestion: Some("long-comments".into()),
        };
        assert_eq!(
            err.to_string(),
            "'long_comments' is not a valid include. Did you mean 'long-comments'?"
        );
    }

    #[test]
    fn load_error_exit_codes() {
        let err = LoadError::FileNotFound {
            path: PathBuf::from("data.json"),
        };
        assert_eq!(err.exit_code(), 3);

        let err = LoadError::InvalidConfig {
            message: "types must be an object".into(),
        };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn validate_error_exit_codes() {
        let err = ValidateError::Invalid {
            errors: vec![Violation {
                path: "/data".into(),
                message: "missing type".into(),
            }],
        };
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn violation_display() {
        let err = Violation {
            path: "/included/0/type".into(),
            message: "expected string, got number".into(),
        };
        assert_eq!(err.to_string(), "/included/0/type: expected string, got number");
    }
}
