use std::error::Error as StdError;
use std::fmt::{self, Display};

const MAX_OUTPUT_SNIPPET: usize = 200;

/// The kind of a [`BridgeFailure`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BridgeFailureKind {
    /// The process could not be started.
    Spawn,
    /// Talking to the process over its pipes failed.
    Io,
    /// The process ran past the configured timeout and was killed.
    Timeout,
    /// The process exited unsuccessfully without a usable envelope.
    ProcessFailure,
    /// The process output matches neither envelope shape.
    MalformedResponse,
}

impl BridgeFailureKind {
    /// Returns the snake case identifier of this kind.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeFailureKind::Spawn => "bridge_spawn_error",
            BridgeFailureKind::Io => "bridge_io_error",
            BridgeFailureKind::Timeout => "bridge_timeout",
            BridgeFailureKind::ProcessFailure => "bridge_process_failure",
            BridgeFailureKind::MalformedResponse => "malformed_response",
        }
    }
}

impl Display for BridgeFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed bridge invocation, with whatever the process left behind.
#[derive(Clone, Debug)]
pub struct BridgeFailure {
    kind: BridgeFailureKind,
    message: String,
    status: Option<i32>,
    stdout: String,
    stderr: String,
}

impl BridgeFailure {
    pub(crate) fn new(
        kind: BridgeFailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub(crate) fn with_output(
        mut self,
        status: Option<i32>,
        stdout: String,
        stderr: String,
    ) -> Self {
        self.status = status;
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    /// Returns the kind of this failure.
    #[inline]
    pub fn kind(&self) -> BridgeFailureKind {
        self.kind
    }

    /// Returns the exit code, if the process exited normally.
    #[inline]
    pub fn status(&self) -> Option<i32> {
        self.status
    }

    /// Returns the captured standard output.
    #[inline]
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Returns the captured standard error.
    #[inline]
    pub fn stderr(&self) -> &str {
        &self.stderr
    }
}

impl Display for BridgeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            let snippet: String =
                stderr.chars().take(MAX_OUTPUT_SNIPPET).collect();
            write!(f, " (stderr: {snippet})")?;
        }
        Ok(())
    }
}

impl StdError for BridgeFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let failure = BridgeFailure::new(
            BridgeFailureKind::ProcessFailure,
            "process exited with status 3",
        )
        .with_output(Some(3), String::new(), "Traceback ...\n".to_owned());
        assert_eq!(
            failure.to_string(),
            "bridge_process_failure: process exited with status 3 \
             (stderr: Traceback ...)"
        );

        let failure = BridgeFailure::new(
            BridgeFailureKind::Timeout,
            "timed out after 0.1s",
        );
        assert_eq!(
            failure.to_string(),
            "bridge_timeout: timed out after 0.1s"
        );
    }
}
