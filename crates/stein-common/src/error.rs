//! Common error types for the Stein ecosystem.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`SteinError`].
pub type SteinResult<T> = Result<T, SteinError>;

/// Common errors across the Stein ecosystem.
///
/// Every property operation resolves to exactly one of these kinds or
/// success; there is no unwinding path through the engine.
#[derive(Error, Diagnostic, Debug)]
pub enum SteinError {
    /// Parse failure or semantically out-of-range value.
    #[error("Invalid value: {message}")]
    #[diagnostic(code(stein::invalid_value))]
    InvalidValue {
        /// What was wrong, including the offending fragment.
        message: String,
    },

    /// Operation not allowed in the container's current state.
    #[error("Invalid state: {message}")]
    #[diagnostic(code(stein::invalid_state))]
    InvalidState {
        /// The rejected operation and state.
        message: String,
    },

    /// Unknown property name or bad index.
    #[error("Invalid property: {message}")]
    #[diagnostic(
        code(stein::invalid_property),
        help("Use ListProperties to enumerate supported names")
    )]
    InvalidProperty {
        /// The unknown name or subscript.
        message: String,
    },

    /// The client principal lacks rights for this operation.
    #[error("Permission denied: {message}")]
    #[diagnostic(code(stein::permission))]
    Permission {
        /// The denied operation.
        message: String,
    },

    /// Not supported on this host, or refused at runtime.
    #[error("Not supported: {message}")]
    #[diagnostic(code(stein::not_supported))]
    NotSupported {
        /// The unsupported feature or property.
        message: String,
    },

    /// A tree-wide resource would be overcommitted.
    #[error("Resource not available: {message}")]
    #[diagnostic(code(stein::resource_not_available))]
    ResourceNotAvailable {
        /// Requested amount and the bound it violates.
        message: String,
    },

    /// I/O error from a collaborator.
    #[error("I/O error: {0}")]
    #[diagnostic(code(stein::io))]
    Io(#[from] std::io::Error),

    /// Internal error (should not happen).
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(stein::unknown),
        help("This is a bug in the stein daemon, please report it")
    )]
    Unknown {
        /// The error message.
        message: String,
    },
}

impl SteinError {
    /// Shorthand for [`SteinError::InvalidValue`].
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::InvalidValue {
            message: message.into(),
        }
    }

    /// Shorthand for [`SteinError::InvalidState`].
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Shorthand for [`SteinError::InvalidProperty`].
    pub fn invalid_property(message: impl Into<String>) -> Self {
        Self::InvalidProperty {
            message: message.into(),
        }
    }

    /// Shorthand for [`SteinError::Permission`].
    pub fn permission(message: impl Into<String>) -> Self {
        Self::Permission {
            message: message.into(),
        }
    }

    /// Shorthand for [`SteinError::NotSupported`].
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported {
            message: message.into(),
        }
    }

    /// Shorthand for [`SteinError::ResourceNotAvailable`].
    pub fn resource_not_available(message: impl Into<String>) -> Self {
        Self::ResourceNotAvailable {
            message: message.into(),
        }
    }

    /// Shorthand for [`SteinError::Unknown`].
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    /// True for the parse-failure kind.
    #[must_use]
    pub fn is_invalid_value(&self) -> bool {
        matches!(self, Self::InvalidValue { .. })
    }

    /// True for the state-guard kind.
    #[must_use]
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }

    /// True for the permission kind.
    #[must_use]
    pub fn is_permission(&self) -> bool {
        matches!(self, Self::Permission { .. })
    }

    /// True for the not-supported kind.
    #[must_use]
    pub fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SteinError::invalid_value("Bad value unit: 10x");
        assert_eq!(err.to_string(), "Invalid value: Bad value unit: 10x");
        assert!(err.is_invalid_value());
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SteinError = io_err.into();
        assert!(matches!(err, SteinError::Io(_)));
    }

    #[test]
    fn kind_predicates() {
        assert!(SteinError::invalid_state("Cannot change property in runtime").is_invalid_state());
        assert!(SteinError::permission("not your container").is_permission());
        assert!(SteinError::not_supported("no ambient capabilities").is_not_supported());
    }
}
