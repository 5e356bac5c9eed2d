//! A model provider for OpenRouter and other OpenAI-compatible
//! chat-completion APIs.

#[macro_use]
extern crate tracing;

mod config;
mod content;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use finchat_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelRequest,
};
use mime::Mime;
use reqwest::{Client, StatusCode, header};

pub use config::{OpenRouterConfig, OpenRouterConfigBuilder};
pub use content::normalize_content;
use io::{Chunks, Sse};
use proto::{ApiError, ChatCompletion};
pub use response::OpenRouterResponse;

const MAX_BODY_SNIPPET: usize = 400;

/// Error type for [`OpenRouterProvider`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
    status: Option<u16>,
    body: Option<String>,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
            status: None,
            body: None,
        }
    }

    fn from_status(status: StatusCode, body: String) -> Self {
        let snippet = snippet(&body);
        let kind = if status == StatusCode::TOO_MANY_REQUESTS {
            ErrorKind::RateLimitExceeded
        } else {
            ErrorKind::Http
        };
        Self {
            message: format!("{status}: {snippet}"),
            kind,
            status: Some(status.as_u16()),
            body: Some(snippet),
        }
    }

    fn from_api_error(err: ApiError) -> Self {
        let status = err
            .code
            .as_ref()
            .and_then(|code| {
                code.as_u64()
                    .or_else(|| code.as_str().and_then(|s| s.parse().ok()))
            })
            .and_then(|code| u16::try_from(code).ok());
        let kind = match status {
            Some(429) => ErrorKind::RateLimitExceeded,
            Some(_) => ErrorKind::Http,
            None => ErrorKind::Other,
        };
        let message = err.message.unwrap_or_else(|| "unknown error".to_owned());
        Self {
            message: match status {
                Some(status) => format!("provider error {status}: {message}"),
                None => format!("provider error: {message}"),
            },
            kind,
            status,
            body: None,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    fn status(&self) -> Option<u16> {
        self.status
    }

    #[inline]
    fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}

/// OpenRouter (OpenAI-compatible) model provider.
#[derive(Clone, Debug)]
pub struct OpenRouterProvider {
    client: Client,
    config: Arc<OpenRouterConfig>,
}

impl OpenRouterProvider {
    /// Creates a new `OpenRouterProvider` with the given configuration.
    pub fn new(config: OpenRouterConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .build()
            .map_err(|err| {
                Error::new(
                    format!("failed to create HTTP client: {err}"),
                    ErrorKind::Other,
                )
            })?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    /// Returns the configuration of this provider.
    #[inline]
    pub fn config(&self) -> &OpenRouterConfig {
        &self.config
    }
}

impl ModelProvider for OpenRouterProvider {
    type Error = Error;
    type Response = OpenRouterResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let body = proto::create_request(req, &self.config);
        let accept = if self.config.streaming {
            "text/event-stream"
        } else {
            "application/json"
        };
        let mut builder = self
            .client
            .post(self.config.endpoint())
            .bearer_auth(&self.config.api_key)
            .header(header::ACCEPT, accept)
            .json(&body);
        for (name, value) in &self.config.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let resp_fut = builder.send();

        async move {
            let resp = resp_fut.await.map_err(|err| {
                Error::new(
                    format!("request failed: {err}"),
                    ErrorKind::Transport,
                )
            })?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                warn!("completion request failed with {status}");
                return Err(Error::from_status(status, body));
            }

            let is_event_stream = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<Mime>().ok())
                .map(|m| {
                    m.type_() == mime::TEXT && m.subtype() == "event-stream"
                })
                .unwrap_or(false);
            if is_event_stream {
                // Here we got a successful streaming response.
                let chunks = Chunks::from_response(resp);
                return Ok(OpenRouterResponse::from_sse(Sse::new(chunks)));
            }

            // Providers that ignore `stream` answer with a plain completion.
            debug!("reading a non-streamed completion");
            let bytes = resp.bytes().await.map_err(|err| {
                Error::new(
                    format!("failed to read response body: {err}"),
                    ErrorKind::Transport,
                )
            })?;
            let completion = serde_json::from_slice::<ChatCompletion>(&bytes)
                .map_err(|err| {
                    let mut error = Error::new(
                        format!("non-JSON response (status {status}): {err}"),
                        ErrorKind::MalformedResponse,
                    );
                    error.status = Some(status.as_u16());
                    error.body =
                        Some(snippet(&String::from_utf8_lossy(&bytes)));
                    error
                })?;
            OpenRouterResponse::from_completion(completion)
        }
    }
}

#[inline]
fn snippet(body: &str) -> String {
    body.chars().take(MAX_BODY_SNIPPET).collect()
}
