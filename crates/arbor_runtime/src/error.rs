//! Error taxonomy shared by the registry, the executor and resolvers.
//!
//! Every failure that can reach a caller is eventually turned into a
//! [`FieldError`], the wire representation carrying a message, the result
//! path and an [`ErrorKind`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Classification of errors leaving the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed query or variables; execution never starts.
    ValidationError,
    /// A caller-supplied argument failed domain validation.
    UserInputError,
    /// Missing or invalid credentials.
    AuthenticationError,
    /// The requested resource does not exist.
    NotFoundError,
    /// An external dependency failed.
    UpstreamError,
    /// Anything unexpected.
    InternalError,
}

impl ErrorKind {
    /// Returns the name used on the wire.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "ValidationError",
            Self::UserInputError => "UserInputError",
            Self::AuthenticationError => "AuthenticationError",
            Self::NotFoundError => "NotFoundError",
            Self::UpstreamError => "UpstreamError",
            Self::InternalError => "InternalError",
        }
    }

    /// Returns true for kinds whose detail must not reach callers verbatim.
    pub const fn is_sensitive(&self) -> bool {
        matches!(self, Self::AuthenticationError | Self::InternalError)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl From<String> for PathSegment {
    fn from(s: String) -> Self {
        Self::Field(s)
    }
}

impl From<&str> for PathSegment {
    fn from(s: &str) -> Self {
        Self::Field(s.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => f.write_str(name),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// A field error, as delivered in the `errors` list of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    /// The error message.
    pub message: String,
    /// The path to the field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,
    /// The error classification.
    pub kind: ErrorKind,
    /// Structured detail, e.g. which argument was invalid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<IndexMap<String, Value>>,
}

impl FieldError {
    /// Creates a new field error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            kind,
            extensions: None,
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }

    /// Adds a path to the error.
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = Some(path);
        self
    }

    /// Adds an extension.
    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extensions
            .get_or_insert_with(IndexMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Gets an extension value.
    pub fn extension(&self, key: &str) -> Option<&Value> {
        self.extensions.as_ref().and_then(|ext| ext.get(key))
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let Some(path) = &self.path {
            let joined: Vec<String> = path.iter().map(ToString::to_string).collect();
            write!(f, " at {}", joined.join("."))?;
        }
        Ok(())
    }
}

impl std::error::Error for FieldError {}

/// Error raised by a resolver or a loader.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolverError {
    /// Field not found on the parent value.
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// Missing required argument.
    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    /// Argument parse error.
    #[error("Failed to parse argument '{0}': {1}")]
    ArgumentParseError(String, String),

    /// An argument was well-formed but failed domain validation.
    #[error("{message}")]
    UserInput { argument: String, message: String },

    /// Missing or invalid credentials.
    #[error("{0}")]
    Unauthenticated(String),

    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// External dependency failure.
    #[error("Upstream request failed: {0}")]
    Upstream(String),

    /// Null value for non-nullable field.
    #[error("Null value for non-nullable field: {0}")]
    NullValue(String),

    /// Custom error.
    #[error("{0}")]
    Custom(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResolverError {
    /// Creates a user input error for the given argument.
    pub fn user_input(argument: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UserInput {
            argument: argument.into(),
            message: message.into(),
        }
    }

    /// Creates an upstream error.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingArgument(_) | Self::ArgumentParseError(..) | Self::UserInput { .. } => {
                ErrorKind::UserInputError
            }
            Self::Unauthenticated(_) => ErrorKind::AuthenticationError,
            Self::NotFound(_) => ErrorKind::NotFoundError,
            Self::Upstream(_) => ErrorKind::UpstreamError,
            Self::FieldNotFound(_) | Self::NullValue(_) | Self::Custom(_) | Self::Internal(_) => {
                ErrorKind::InternalError
            }
        }
    }

    /// Returns the argument this error refers to, if any.
    pub fn argument(&self) -> Option<&str> {
        match self {
            Self::MissingArgument(arg) | Self::ArgumentParseError(arg, _) => Some(arg),
            Self::UserInput { argument, .. } => Some(argument),
            _ => None,
        }
    }

    /// Converts into a wire error located at `path`.
    pub fn into_field_error(self, path: Vec<PathSegment>) -> FieldError {
        let mut error = FieldError::new(self.kind(), self.to_string()).with_path(path);
        if let Some(argument) = self.argument() {
            error = error.with_extension("argumentName", argument);
        }
        error
    }
}

impl From<ResolverError> for FieldError {
    fn from(error: ResolverError) -> Self {
        let mut field_error = FieldError::new(error.kind(), error.to_string());
        if let Some(argument) = error.argument() {
            field_error = field_error.with_extension("argumentName", argument);
        }
        field_error
    }
}

/// A scalar codec refused a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{scalar} cannot represent value: {message}")]
pub struct ScalarCoercionError {
    pub scalar: String,
    pub message: String,
}

impl ScalarCoercionError {
    /// Creates a new coercion error.
    pub fn new(scalar: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            scalar: scalar.into(),
            message: message.into(),
        }
    }
}

/// An abstract type could not be mapped onto one of its concrete types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeResolutionError {
    #[error("Abstract type '{abstract_type}' could not resolve a concrete type: {reason}")]
    AmbiguousOrUnresolvedType {
        abstract_type: String,
        reason: String,
    },
}

impl TypeResolutionError {
    pub(crate) fn unresolved(abstract_type: &str, reason: impl Into<String>) -> Self {
        Self::AmbiguousOrUnresolvedType {
            abstract_type: abstract_type.to_string(),
            reason: reason.into(),
        }
    }
}

/// Registry construction or lookup failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("Unknown type '{0}'")]
    UnknownType(String),

    #[error("Type '{0}' is not an interface or union")]
    NotAbstract(String),

    #[error("Abstract type '{0}' has no discriminator")]
    MissingDiscriminator(String),

    #[error("Scalar '{0}' has no codec")]
    MissingScalarCodec(String),

    #[error("Union '{union}' member '{member}' is not an object type")]
    InvalidUnionMember { union: String, member: String },

    #[error("Type '{object}' does not satisfy interface '{interface}': {reason}")]
    InterfaceNotSatisfied {
        object: String,
        interface: String,
        reason: String,
    },

    #[error("Field '{type_name}.{field}' refers to unknown type '{target}'")]
    UnknownFieldType {
        type_name: String,
        field: String,
        target: String,
    },

    #[error("Root type '{0}' must be an object type")]
    InvalidRootType(String),

    #[error("Schema has no {0} root type")]
    MissingRootType(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolver_error_kinds() {
        assert_eq!(
            ResolverError::user_input("input", "bad").kind(),
            ErrorKind::UserInputError
        );
        assert_eq!(
            ResolverError::Unauthenticated("no token".into()).kind(),
            ErrorKind::AuthenticationError
        );
        assert_eq!(
            ResolverError::upstream("503").kind(),
            ErrorKind::UpstreamError
        );
        assert_eq!(
            ResolverError::Custom("boom".into()).kind(),
            ErrorKind::InternalError
        );
    }

    #[test]
    fn test_into_field_error_carries_argument() {
        let error = ResolverError::user_input("input", "Form arguments invalid")
            .into_field_error(vec!["userInputError".into()]);

        assert_eq!(error.kind, ErrorKind::UserInputError);
        assert_eq!(error.message, "Form arguments invalid");
        assert_eq!(error.extension("argumentName"), Some(&Value::from("input")));
        assert_eq!(error.path, Some(vec![PathSegment::from("userInputError")]));
    }

    #[test]
    fn test_field_error_serialization() {
        let error = FieldError::new(ErrorKind::UpstreamError, "movies API returned 503")
            .with_path(vec!["movies".into(), 1usize.into(), "title".into()]);
        let json = serde_json::to_value(&error).unwrap();

        assert_eq!(json["kind"], "UpstreamError");
        assert_eq!(json["path"], serde_json::json!(["movies", 1, "title"]));
        assert!(json.get("extensions").is_none());
    }

    #[test]
    fn test_field_error_display() {
        let error = FieldError::internal("oops").with_path(vec!["a".into(), 0usize.into()]);
        assert_eq!(error.to_string(), "[InternalError] oops at a.0");
    }
}
