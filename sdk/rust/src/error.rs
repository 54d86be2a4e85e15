//! Error policy and SDK errors.
//!
//! [`ErrorPolicy`] is applied to every response before it leaves the
//! server. It has two hooks:
//!
//! - `rewrite` decides what (if anything) is handed to the [`ErrorReporter`].
//!   It never changes what the caller sees.
//! - `format` reshapes the caller-visible error.
//!
//! The default policy keeps `AuthenticationError`s out of reports and masks
//! the detail of `AuthenticationError` and `InternalError`.

use arbor_runtime::{ErrorKind, FieldError, Response, SchemaError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Message shown to callers in place of sensitive detail.
pub const MASKED_MESSAGE: &str = "Internal server error";

/// Sink for errors leaving the system.
pub trait ErrorReporter: Send + Sync {
    /// Reports one error.
    fn report(&self, error: &FieldError);
}

/// Reports errors as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &FieldError) {
        tracing::error!(
            kind = %error.kind,
            path = ?error.path,
            message = %error.message,
            "request error"
        );
    }
}

/// Produces the reported copy of an error; `None` suppresses the report.
pub type RewriteFn = Arc<dyn Fn(&FieldError) -> Option<FieldError> + Send + Sync>;

/// Produces the caller-visible form of an error.
pub type FormatFn = Arc<dyn Fn(FieldError) -> FieldError + Send + Sync>;

/// Classifies, reports and reshapes errors before they leave the server.
#[derive(Clone)]
pub struct ErrorPolicy {
    rewrite: RewriteFn,
    format: FormatFn,
    reporter: Arc<dyn ErrorReporter>,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorPolicy").finish_non_exhaustive()
    }
}

impl ErrorPolicy {
    /// Starts building a policy from the defaults.
    pub fn builder() -> ErrorPolicyBuilder {
        ErrorPolicyBuilder::default()
    }

    /// A policy that reports everything and shows every error verbatim.
    pub fn passthrough() -> Self {
        Self::builder()
            .rewrite(|error| Some(error.clone()))
            .format(|error| error)
            .build()
    }

    /// Reports and formats one error.
    pub fn apply_error(&self, error: FieldError) -> FieldError {
        if let Some(reported) = (self.rewrite)(&error) {
            self.reporter.report(&reported);
        }
        (self.format)(error)
    }

    /// Applies the policy to every error of a response.
    pub fn apply(&self, mut response: Response) -> Response {
        response.errors = std::mem::take(&mut response.errors)
            .into_iter()
            .map(|error| self.apply_error(error))
            .collect();
        response
    }
}

/// Builder for [`ErrorPolicy`].
#[derive(Default)]
pub struct ErrorPolicyBuilder {
    rewrite: Option<RewriteFn>,
    format: Option<FormatFn>,
    reporter: Option<Arc<dyn ErrorReporter>>,
}

impl ErrorPolicyBuilder {
    /// Sets the rewrite hook.
    pub fn rewrite<F>(mut self, f: F) -> Self
    where
        F: Fn(&FieldError) -> Option<FieldError> + Send + Sync + 'static,
    {
        self.rewrite = Some(Arc::new(f));
        self
    }

    /// Sets the format hook.
    pub fn format<F>(mut self, f: F) -> Self
    where
        F: Fn(FieldError) -> FieldError + Send + Sync + 'static,
    {
        self.format = Some(Arc::new(f));
        self
    }

    /// Sets the reporter.
    pub fn reporter(mut self, reporter: impl ErrorReporter + 'static) -> Self {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    /// Builds the policy.
    pub fn build(self) -> ErrorPolicy {
        ErrorPolicy {
            rewrite: self.rewrite.unwrap_or_else(|| Arc::new(suppress_authentication)),
            format: self.format.unwrap_or_else(|| Arc::new(mask_sensitive)),
            reporter: self.reporter.unwrap_or_else(|| Arc::new(TracingReporter)),
        }
    }
}

/// Default rewrite hook: authentication failures are not reported.
pub fn suppress_authentication(error: &FieldError) -> Option<FieldError> {
    (error.kind != ErrorKind::AuthenticationError).then(|| error.clone())
}

/// Default format hook: sensitive kinds lose their message and extensions.
pub fn mask_sensitive(mut error: FieldError) -> FieldError {
    if error.kind.is_sensitive() {
        error.message = MASKED_MESSAGE.to_string();
        error.extensions = None;
    }
    error
}

/// Typed error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    /// Invalid configuration value.
    ConfigError,
    /// No type registry was supplied.
    NoSchema,
    /// The registry is inconsistent with the server setup.
    SchemaError,
    /// A subscription source is missing or misconfigured.
    SubscriptionError,
    /// Anything unexpected.
    InternalError,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigError => "CONFIG_ERROR",
            Self::NoSchema => "NO_SCHEMA",
            Self::SchemaError => "SCHEMA_ERROR",
            Self::SubscriptionError => "SUBSCRIPTION_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SDK setup error.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("[{code}] {message}")]
pub struct SdkError {
    /// Typed error code.
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
    /// Extension data for debugging.
    pub extensions: Option<HashMap<String, serde_json::Value>>,
}

impl SdkError {
    /// Creates a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            extensions: None,
        }
    }

    /// Adds extension data.
    pub fn with_extension(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.extensions
                .get_or_insert_with(HashMap::new)
                .insert(key.into(), v);
        }
        self
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl From<SchemaError> for SdkError {
    fn from(error: SchemaError) -> Self {
        Self::new(ErrorCode::SchemaError, error.to_string())
    }
}

/// Type alias for SDK results.
pub type SdkResult<T> = std::result::Result<T, SdkError>;

/// Result extension for mapping errors with context.
pub trait ResultExt<T> {
    /// Maps the error to an SdkError with the given code.
    fn map_sdk_err(self, code: ErrorCode) -> SdkResult<T>;

    /// Maps the error to an SdkError with the given code and message.
    fn map_sdk_err_with(self, code: ErrorCode, message: impl Into<String>) -> SdkResult<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn map_sdk_err(self, code: ErrorCode) -> SdkResult<T> {
        self.map_err(|e| SdkError::new(code, e.to_string()))
    }

    fn map_sdk_err_with(self, code: ErrorCode, message: impl Into<String>) -> SdkResult<T> {
        self.map_err(|e| {
            SdkError::new(code, message).with_extension("original_error", e.to_string())
        })
    }
}
