//! Error types for the runtime core

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Runtime error
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Allocation failure; the container involved is left in its prior state
    #[error("out of memory while allocating {what}")]
    OutOfMemory { what: &'static str },

    /// Mutation of a frozen module or dictionary
    #[error("'{name}' is frozen and cannot be modified")]
    Frozen { name: String },

    /// Status-style failure for removal of a missing key or value
    #[error("no such entry: {key}")]
    NotFound { key: String },

    /// IO error while opening or closing a file value
    #[error("IO error: {message}")]
    Io { message: String },

    /// Value of the wrong kind handed to a typed operation
    #[error("type error: {message}")]
    Type { message: String },
}

impl RuntimeError {
    pub fn out_of_memory(what: &'static str) -> Self {
        Self::OutOfMemory { what }
    }

    pub fn frozen(name: impl Into<String>) -> Self {
        Self::Frozen { name: name.into() }
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn io_error(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for RuntimeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = RuntimeError::out_of_memory("dictionary entry");
        assert_eq!(e.to_string(), "out of memory while allocating dictionary entry");

        let e = RuntimeError::frozen("os");
        assert_eq!(e.to_string(), "'os' is frozen and cannot be modified");

        let e = RuntimeError::not_found("x");
        assert_eq!(e.to_string(), "no such entry: x");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e: RuntimeError = io.into();
        assert!(matches!(e, RuntimeError::Io { .. }));
    }
}
