use std::sync::Arc;

use finchat_model::ModelProvider;

use super::{Agent, AgentEvent, RetryPolicy};
use crate::model_client::ModelClient;
use crate::tool::{Registry, Tool};

const DEFAULT_MAX_TURNS: usize = 16;

/// [`Agent`] builder.
pub struct AgentBuilder {
    pub(crate) model_client: ModelClient,
    pub(crate) registry: Registry,
    pub(crate) max_turns: usize,
    pub(crate) retry_policy: RetryPolicy,
    pub(crate) on_delta: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    pub(crate) on_event: Option<Box<dyn Fn(AgentEvent) + Send + Sync>>,
}

impl AgentBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            registry: Registry::new(),
            max_turns: DEFAULT_MAX_TURNS,
            retry_policy: RetryPolicy::default(),
            on_delta: None,
            on_event: None,
        }
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.registry.add_tool(tool);
        self
    }

    /// Sets the maximum number of completion calls in one run.
    #[inline]
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Sets how rate-limited completion calls are retried.
    #[inline]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Attaches a callback receiving assistant text as it streams in.
    #[inline]
    pub fn on_delta(
        mut self,
        on_delta: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.on_delta = Some(Arc::new(on_delta));
        self
    }

    /// Attaches a callback receiving progress events.
    #[inline]
    pub fn on_event(
        mut self,
        on_event: impl Fn(AgentEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_event = Some(Box::new(on_event));
        self
    }

    /// Builds the agent.
    #[inline]
    pub fn build(self) -> Agent {
        Agent::from_builder(self)
    }
}
