use finchat_bridge::Bridge;
use finchat_core::{
    Agent, AgentBuilder, AgentEvent, Error, RetryPolicy, Transcript,
};
use finchat_model::ModelProvider;

use crate::tools::*;

/// The system prompt used when none is given.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a finance assistant. \
Provide concise market context and only call tools when the user explicitly \
asks for specific data points. Prefer summarising using high-level trends \
over fetching ticker-by-ticker statistics unless a detailed lookup is \
necessary.";

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    agent_builder: AgentBuilder,
    system_prompt: String,
    transcript: Option<Transcript>,
}

impl SessionBuilder {
    /// Creates a session builder with a specified model provider.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
    ) -> Self {
        let agent_builder = AgentBuilder::with_model_provider(provider);
        Self {
            agent_builder,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
            transcript: None,
        }
    }

    /// Registers the financial tools, all backed by `bridge`.
    pub fn with_bridge(mut self, bridge: Bridge) -> Self {
        self.agent_builder = self
            .agent_builder
            .with_tool(PriceHistoryTool::new(bridge.clone()))
            .with_tool(TickerTool::fast_info(bridge.clone()))
            .with_tool(TickerTool::summary(bridge.clone()))
            .with_tool(TickerNewsTool::new(bridge.clone()))
            .with_tool(TickerTool::fundamentals(bridge));
        self
    }

    /// Sets the system prompt for a new conversation.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Resumes a saved conversation instead of starting a new one. The
    /// system prompt is then taken from the transcript.
    #[inline]
    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = Some(transcript);
        self
    }

    /// Sets the maximum number of completion calls per message.
    #[inline]
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.agent_builder = self.agent_builder.with_max_turns(max_turns);
        self
    }

    /// Sets how rate-limited completion calls are retried.
    #[inline]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.agent_builder = self.agent_builder.with_retry_policy(retry_policy);
        self
    }

    /// Attaches a callback to be invoked with assistant text as it streams.
    #[inline]
    pub fn on_delta(
        mut self,
        on_delta: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.agent_builder = self.agent_builder.on_delta(on_delta);
        self
    }

    /// Attaches a callback to be invoked on completion and tool progress.
    #[inline]
    pub fn on_event(
        mut self,
        on_event: impl Fn(AgentEvent) + Send + Sync + 'static,
    ) -> Self {
        self.agent_builder = self.agent_builder.on_event(on_event);
        self
    }

    /// Builds a new session.
    pub fn build(self) -> Session {
        let system_prompt = self.system_prompt;
        let transcript = self
            .transcript
            .unwrap_or_else(|| Transcript::with_system_prompt(system_prompt));
        Session {
            agent: self.agent_builder.build(),
            transcript,
        }
    }
}

/// A chat session, like a window that displays messages and has a input box.
///
/// The session owns the conversation transcript and a fully configured
/// agent, and is basically a wrapper around [`Agent`].
pub struct Session {
    agent: Agent,
    transcript: Transcript,
}

impl Session {
    /// Sends a message and waits for the final answer.
    ///
    /// A failed message leaves the transcript as it was before the call,
    /// so the conversation can go on.
    pub async fn send_message(
        &mut self,
        message: &str,
    ) -> Result<String, Error> {
        let mut transcript = self.transcript.clone();
        transcript.push_user(message);
        let answer = self.agent.run(&mut transcript).await?;
        self.transcript = transcript;
        Ok(answer)
    }

    /// Returns the conversation so far.
    #[inline]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Returns the underlying agent.
    #[inline]
    pub fn agent(&self) -> &Agent {
        &self.agent
    }
}
