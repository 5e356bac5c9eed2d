use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// The kind of error that occurred.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The arguments are not a JSON object, or do not fit the input type.
    InvalidArguments,
    /// The arguments break the declared parameter schema.
    SchemaViolation,
    /// No tool with the requested name is registered.
    UnknownTool,
    /// The underlying data source failed.
    UpstreamError,
}

impl ErrorKind {
    /// Returns the snake case identifier of this kind.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArguments => "invalid_arguments",
            ErrorKind::SchemaViolation => "schema_violation",
            ErrorKind::UnknownTool => "unknown_tool",
            ErrorKind::UpstreamError => "upstream_error",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Describes a tool call error.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Error {
    kind: ErrorKind,
    reason: Option<String>,
}

impl Error {
    /// Creates a new error with the `InvalidArguments` kind.
    #[inline]
    pub fn invalid_arguments() -> Self {
        Self::new(ErrorKind::InvalidArguments)
    }

    /// Creates a new error with the `SchemaViolation` kind.
    #[inline]
    pub fn schema_violation() -> Self {
        Self::new(ErrorKind::SchemaViolation)
    }

    /// Creates a new error with the `UnknownTool` kind.
    #[inline]
    pub fn unknown_tool() -> Self {
        Self::new(ErrorKind::UnknownTool)
    }

    /// Creates a new error with the `UpstreamError` kind.
    #[inline]
    pub fn upstream_error() -> Self {
        Self::new(ErrorKind::UpstreamError)
    }

    #[inline]
    fn new(kind: ErrorKind) -> Self {
        Self { kind, reason: None }
    }

    /// Attaches a reason to the error.
    #[inline]
    pub fn with_reason<S: Into<String>>(self, reason: S) -> Self {
        Self {
            kind: self.kind,
            reason: Some(reason.into()),
        }
    }

    /// Returns the kind of this error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the reason for the error.
    #[inline]
    pub fn reason(&self) -> Cow<'_, str> {
        match self.reason.as_deref() {
            Some(reason) => Cow::Borrowed(reason),
            None => Cow::Owned(self.kind.as_str().replace('_', " ")),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.reason())
    }
}

impl StdError for Error {}
