use std::fmt::{self, Debug, Formatter};
use std::time::Duration;

const DEFAULT_MODEL: &str = "openai/gpt-5";
const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Builder for [`OpenRouterConfig`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct OpenRouterConfigBuilder {
    api_key: String,
    model: Option<String>,
    base_url: Option<String>,
    streaming: bool,
    timeout: Option<Duration>,
    headers: Vec<(String, String)>,
}

impl OpenRouterConfigBuilder {
    /// Creates a builder with the given API key.
    #[inline]
    pub fn with_api_key<S: Into<String>>(api_key: S) -> Self {
        Self {
            api_key: api_key.into(),
            model: None,
            base_url: None,
            streaming: true,
            timeout: None,
            headers: vec![],
        }
    }

    /// Sets the model to use.
    #[inline]
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets a custom base URL. The `/chat/completions` path is appended
    /// to it.
    #[inline]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Enables or disables server-sent event streaming. Enabled by default.
    #[inline]
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Sets the connect and read timeout of each request.
    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Adds an extra header, e.g. `HTTP-Referer` or `X-Title` for
    /// OpenRouter app attribution.
    #[inline]
    pub fn with_header<K: Into<String>, V: Into<String>>(
        mut self,
        name: K,
        value: V,
    ) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> OpenRouterConfig {
        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        OpenRouterConfig {
            api_key: self.api_key,
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            base_url: base_url.trim_end_matches('/').to_owned(),
            streaming: self.streaming,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            headers: self.headers,
        }
    }
}

impl Debug for OpenRouterConfigBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRouterConfigBuilder")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("streaming", &self.streaming)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Configuration for the OpenRouter provider.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct OpenRouterConfig {
    pub(crate) api_key: String,
    pub(crate) model: String,
    pub(crate) base_url: String,
    pub(crate) streaming: bool,
    pub(crate) timeout: Duration,
    pub(crate) headers: Vec<(String, String)>,
}

impl OpenRouterConfig {
    /// Returns the model identifier.
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the full chat-completions endpoint.
    #[inline]
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl Debug for OpenRouterConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRouterConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("streaming", &self.streaming)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
