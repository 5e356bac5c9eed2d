use serde_json::{Value, json};

use super::Error;

/// The outcome of one tool invocation.
///
/// Every outcome, failures included, is rendered into the same JSON
/// envelope and handed back to the model as a `tool` message.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolResult {
    /// The tool ran and produced data.
    Success {
        /// The operation (tool) name.
        operation: String,
        /// The payload returned by the tool.
        data: Value,
    },
    /// The call was rejected or the tool failed.
    Failure {
        /// The operation (tool) name, when known.
        operation: Option<String>,
        /// What went wrong.
        error: Error,
    },
}

impl ToolResult {
    /// Creates a success result.
    #[inline]
    pub fn success<S: Into<String>>(operation: S, data: Value) -> Self {
        ToolResult::Success {
            operation: operation.into(),
            data,
        }
    }

    /// Creates a failure result.
    #[inline]
    pub fn failure(operation: Option<String>, error: Error) -> Self {
        ToolResult::Failure { operation, error }
    }

    /// Returns `true` for a success result.
    #[inline]
    pub fn is_ok(&self) -> bool {
        matches!(self, ToolResult::Success { .. })
    }

    /// Returns the error of a failure result.
    #[inline]
    pub fn error(&self) -> Option<&Error> {
        match self {
            ToolResult::Success { .. } => None,
            ToolResult::Failure { error, .. } => Some(error),
        }
    }

    /// Renders the `{ok, operation, data}` / `{ok, operation, error}`
    /// envelope.
    pub fn to_envelope(&self) -> Value {
        match self {
            ToolResult::Success { operation, data } => json!({
                "ok": true,
                "operation": operation,
                "data": data,
            }),
            ToolResult::Failure { operation, error } => json!({
                "ok": false,
                "operation": operation,
                "error": {
                    "type": error.kind(),
                    "message": error.reason(),
                },
            }),
        }
    }

    /// Renders the envelope as the content of a `tool` message.
    #[inline]
    pub fn to_content(&self) -> String {
        self.to_envelope().to_string()
    }
}
