//! A narrow subprocess boundary to the data-fetch service.
//!
//! Every call spawns one process, writes a single `{"operation", "params"}`
//! document to its standard input, closes it, and reads back one envelope
//! from its standard output.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod config;
mod envelope;
mod error;

use std::io::{self, ErrorKind as IoErrorKind};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;

pub use config::BridgeConfig;
pub use envelope::Envelope;
pub use error::{BridgeFailure, BridgeFailureKind};

/// Invokes operations of the data-fetch service, one process per call.
#[derive(Clone, Debug)]
pub struct Bridge {
    config: Arc<BridgeConfig>,
}

impl Bridge {
    /// Creates a bridge with the given configuration.
    #[inline]
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Returns the configuration of this bridge.
    #[inline]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Runs `operation` with `params` and returns the parsed envelope.
    ///
    /// A failure envelope is a successful invocation; only problems with
    /// the process itself or its output are reported as [`BridgeFailure`].
    pub async fn invoke(
        &self,
        operation: &str,
        params: Value,
    ) -> Result<Envelope, BridgeFailure> {
        let config = &self.config;
        let request =
            json!({"operation": operation, "params": params}).to_string();

        let mut command = Command::new(&config.program);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }

        debug!("invoking bridge operation {operation}");
        let mut child = command.spawn().map_err(|err| {
            BridgeFailure::new(
                BridgeFailureKind::Spawn,
                format!(
                    "failed to start `{}`: {err}",
                    config.program.to_string_lossy()
                ),
            )
        })?;
        let mut stdin = child.stdin.take().ok_or_else(|| {
            BridgeFailure::new(BridgeFailureKind::Io, "stdin is not captured")
        })?;

        let write_request = async move {
            let result = stdin.write_all(request.as_bytes()).await;
            // Dropping stdin closes the pipe and signals end of input.
            drop(stdin);
            match result {
                // The service may answer without reading its input.
                Err(err) if err.kind() == IoErrorKind::BrokenPipe => Ok(()),
                other => other,
            }
        };
        let (Some(mut stdout), Some(mut stderr)) =
            (child.stdout.take(), child.stderr.take())
        else {
            return Err(BridgeFailure::new(
                BridgeFailureKind::Io,
                "output is not captured",
            ));
        };

        // Output read before a timeout stays in these buffers.
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();
        let run = async {
            let (written, read_stdout, read_stderr, status) = tokio::join!(
                write_request,
                stdout.read_to_end(&mut stdout_buf),
                stderr.read_to_end(&mut stderr_buf),
                child.wait(),
            );
            written.and(read_stdout).and(read_stderr).and(status)
        };
        let result = timeout(config.timeout, run).await;
        let stdout = String::from_utf8_lossy(&stdout_buf).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_buf).into_owned();

        match result {
            Ok(Ok(status)) => {
                interpret_output(operation, status, stdout, stderr)
            }
            Ok(Err(err)) => Err(io_failure(err)),
            Err(_) => {
                // `kill_on_drop` kills the child when it goes out of scope.
                warn!(
                    "bridge operation {operation} timed out after {:?}",
                    config.timeout
                );
                Err(BridgeFailure::new(
                    BridgeFailureKind::Timeout,
                    format!(
                        "`{operation}` timed out after {:.1}s",
                        config.timeout.as_secs_f64()
                    ),
                )
                .with_output(None, stdout, stderr))
            }
        }
    }
}

#[inline]
fn io_failure(err: io::Error) -> BridgeFailure {
    BridgeFailure::new(
        BridgeFailureKind::Io,
        format!("failed to communicate with the process: {err}"),
    )
}

fn interpret_output(
    operation: &str,
    exit_status: ExitStatus,
    stdout: String,
    stderr: String,
) -> Result<Envelope, BridgeFailure> {
    let status = exit_status.code();
    trace!(
        "bridge operation {operation} exited with {:?}, {} bytes of output",
        status,
        stdout.len()
    );

    // The service exits non-zero alongside a failure envelope.
    if let Some(envelope) = Envelope::parse(&stdout) {
        return Ok(envelope);
    }

    let failure = if exit_status.success() {
        BridgeFailure::new(
            BridgeFailureKind::MalformedResponse,
            format!("`{operation}` produced output matching no envelope"),
        )
    } else {
        let message = match status {
            Some(code) => format!("`{operation}` exited with status {code}"),
            None => format!("`{operation}` was terminated by a signal"),
        };
        BridgeFailure::new(BridgeFailureKind::ProcessFailure, message)
    };
    Err(failure.with_output(status, stdout, stderr))
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn script_bridge(script: &str) -> Bridge {
        Bridge::new(BridgeConfig::new("sh").with_args(["-c", script]))
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let bridge = script_bridge(concat!(
            "req=$(cat); ",
            r#"printf '{"ok":true,"operation":"echo","data":%s}\n' "$req""#,
        ));
        let envelope = bridge
            .invoke("get_ticker_fast_info", json!({"ticker": "AAPL"}))
            .await
            .unwrap();
        assert_eq!(
            envelope,
            Envelope::Success {
                operation: "echo".to_owned(),
                data: json!({
                    "operation": "get_ticker_fast_info",
                    "params": {"ticker": "AAPL"}
                }),
            }
        );
    }

    #[tokio::test]
    async fn test_invoke_failure_envelope_with_nonzero_exit() {
        let bridge = script_bridge(concat!(
            "cat >/dev/null\n",
            r#"echo '{"ok":false,"operation":"get_ticker_news","#,
            r#""error":{"type":"ValueError","message":"bad ticker"}}'"#,
            "\nexit 1",
        ));
        let envelope = bridge
            .invoke("get_ticker_news", json!({"ticker": "???"}))
            .await
            .unwrap();
        assert_eq!(
            envelope,
            Envelope::Failure {
                operation: Some("get_ticker_news".to_owned()),
                error_type: "ValueError".to_owned(),
                message: "bad ticker".to_owned(),
            }
        );
    }

    #[tokio::test]
    async fn test_invoke_ignores_unread_input() {
        let bridge = script_bridge(
            r#"echo '{"ok":true,"operation":"list_operations","data":[]}'"#,
        );
        let envelope =
            bridge.invoke("list_operations", json!({})).await.unwrap();
        assert!(envelope.is_ok());
    }

    #[tokio::test]
    async fn test_invoke_timeout() {
        let bridge = Bridge::new(
            BridgeConfig::new("sh")
                .with_args(["-c", "sleep 5"])
                .with_timeout(Duration::from_millis(100)),
        );
        let started = Instant::now();
        let failure = bridge
            .invoke("download_price_history", json!({"tickers": "AAPL"}))
            .await
            .unwrap_err();
        assert_eq!(failure.kind(), BridgeFailureKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_invoke_timeout_keeps_partial_output() {
        let bridge = Bridge::new(
            BridgeConfig::new("sh")
                .with_args([
                    "-c",
                    "cat >/dev/null; echo '{\"partial\"'; \
                     echo 'Traceback: stuck in fetch' >&2; sleep 5",
                ])
                .with_timeout(Duration::from_millis(500)),
        );
        let failure = bridge
            .invoke("get_ticker_news", json!({"ticker": "AAPL"}))
            .await
            .unwrap_err();
        assert_eq!(failure.kind(), BridgeFailureKind::Timeout);
        assert_eq!(failure.status(), None);
        assert_eq!(failure.stdout(), "{\"partial\"\n");
        assert_eq!(failure.stderr(), "Traceback: stuck in fetch\n");
        assert!(
            failure
                .to_string()
                .ends_with("(stderr: Traceback: stuck in fetch)")
        );
    }

    #[tokio::test]
    async fn test_invoke_in_working_dir() {
        let dir = std::env::temp_dir();
        let bridge = Bridge::new(
            BridgeConfig::new("sh")
                .with_args([
                    "-c",
                    concat!(
                        "cat >/dev/null; printf ",
                        r#"'{"ok":true,"operation":"pwd","data":"%s"}' "#,
                        r#""$(pwd -P)""#,
                    ),
                ])
                .with_working_dir(&dir),
        );
        let envelope = bridge.invoke("pwd", json!({})).await.unwrap();
        let Envelope::Success { data, .. } = envelope else {
            panic!("expected a success envelope");
        };
        assert_eq!(
            data,
            json!(dir.canonicalize().unwrap().to_string_lossy())
        );
    }

    #[tokio::test]
    async fn test_invoke_process_failure() {
        let bridge = script_bridge("cat >/dev/null; echo boom >&2; exit 3");
        let failure = bridge.invoke("x", json!({})).await.unwrap_err();
        assert_eq!(failure.kind(), BridgeFailureKind::ProcessFailure);
        assert_eq!(failure.status(), Some(3));
        assert_eq!(failure.stderr(), "boom\n");
    }

    #[tokio::test]
    async fn test_invoke_malformed_response() {
        let bridge = script_bridge("cat >/dev/null; echo not json");
        let failure = bridge.invoke("x", json!({})).await.unwrap_err();
        assert_eq!(failure.kind(), BridgeFailureKind::MalformedResponse);
        assert_eq!(failure.status(), Some(0));
        assert_eq!(failure.stdout(), "not json\n");
    }

    #[tokio::test]
    async fn test_invoke_spawn_failure() {
        let bridge =
            Bridge::new(BridgeConfig::new("/nonexistent/finchat-service"));
        let failure = bridge.invoke("x", json!({})).await.unwrap_err();
        assert_eq!(failure.kind(), BridgeFailureKind::Spawn);
    }
}
