mod builder;
mod retry;
mod state;
#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use backoff::future::retry_notify;
use finchat_model::{
    AssistantMessage, ErrorKind as ModelErrorKind, ModelFinishReason,
    ModelProviderError, ModelRequest, ModelTool, ToolCallRequest,
    ToolCallResult,
};
use tracing::Instrument;

pub use builder::AgentBuilder;
pub use retry::RetryPolicy;
use state::LoopState;
pub use state::AgentEvent;

use crate::Error;
use crate::model_client::{ModelClient, ModelClientResponse};
use crate::tool::Registry;
use crate::transcript::Transcript;

/// Drives one conversation from a user turn to the final answer.
///
/// The agent itself holds no conversation state, so one agent can run
/// several independent transcripts at the same time.
pub struct Agent {
    model_client: ModelClient,
    registry: Registry,
    definitions: Vec<ModelTool>,
    max_turns: usize,
    retry_policy: RetryPolicy,
    on_delta: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    on_event: Option<Box<dyn Fn(AgentEvent) + Send + Sync>>,
}

impl Agent {
    fn from_builder(builder: AgentBuilder) -> Self {
        let AgentBuilder {
            model_client,
            registry,
            max_turns,
            retry_policy,
            on_delta,
            on_event,
        } = builder;

        Self {
            model_client,
            definitions: registry.definitions(),
            registry,
            max_turns,
            retry_policy,
            on_delta,
            on_event,
        }
    }

    /// Returns the registered tools.
    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns the maximum number of completion calls in one run.
    #[inline]
    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Runs the conversation until the assistant replies without tool
    /// calls, and returns that reply.
    ///
    /// The transcript should end with a user message. Every assistant
    /// reply and tool result is appended to it, so on error it holds
    /// everything exchanged so far.
    pub async fn run(
        &self,
        transcript: &mut Transcript,
    ) -> Result<String, Error> {
        let mut turn = 0;
        let mut state = LoopState::AwaitingModel;
        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    if turn >= self.max_turns {
                        warn!("no final answer after {turn} turns");
                        return Err(Error::TurnLimitExceeded {
                            max_turns: self.max_turns,
                        });
                    }
                    turn += 1;
                    self.await_model(transcript, turn)
                        .instrument(debug_span!("completion", turn))
                        .await?
                }
                LoopState::DispatchingTools(calls) => {
                    self.dispatch_tools(transcript, turn, calls)
                        .instrument(debug_span!("tools", turn))
                        .await;
                    LoopState::AwaitingModel
                }
                LoopState::Done(answer) => return Ok(answer),
            };
        }
    }

    async fn await_model(
        &self,
        transcript: &mut Transcript,
        turn: usize,
    ) -> Result<LoopState, Error> {
        let req = ModelRequest {
            messages: transcript.messages().to_vec(),
            tools: self.definitions.clone(),
        };
        let started = Instant::now();
        let ModelClientResponse {
            content,
            mut tool_calls,
            finish_reason,
        } = self.complete(&req).await?;

        if finish_reason == Some(ModelFinishReason::Length) {
            warn!("the reply was cut off by the output token limit");
        }
        dedup_call_ids(&mut tool_calls, turn);
        self.emit(AgentEvent::CompletionFinished {
            turn,
            elapsed: started.elapsed(),
            tool_calls: tool_calls.len(),
        });

        transcript.push_assistant(AssistantMessage {
            content: content.clone(),
            tool_calls: tool_calls.clone(),
        });
        if tool_calls.is_empty() {
            Ok(LoopState::Done(content))
        } else {
            debug!("model requested {} tool calls", tool_calls.len());
            Ok(LoopState::DispatchingTools(tool_calls))
        }
    }

    async fn complete(
        &self,
        req: &ModelRequest,
    ) -> Result<ModelClientResponse, Error> {
        let send = move || {
            let on_delta = self.on_delta.clone();
            self.model_client.send_request(req, move |delta| {
                if let Some(on_delta) = &on_delta {
                    on_delta(&delta);
                }
            })
        };

        let backoff = match &self.retry_policy {
            RetryPolicy::Never => return send().await.map_err(Error::Model),
            RetryPolicy::Backoff(backoff) => backoff.clone(),
        };
        retry_notify(
            backoff,
            move || async move {
                send().await.map_err(|err| {
                    if err.kind() == ModelErrorKind::RateLimitExceeded {
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
            },
            |err: Box<dyn ModelProviderError>, wait: Duration| {
                warn!("{err}, retrying in {wait:?}");
            },
        )
        .await
        .map_err(Error::Model)
    }

    async fn dispatch_tools(
        &self,
        transcript: &mut Transcript,
        turn: usize,
        calls: Vec<ToolCallRequest>,
    ) {
        // Strictly sequential: each result is appended before the next
        // call starts.
        for call in calls {
            let started = Instant::now();
            let result =
                self.registry.execute(&call.name, &call.arguments).await;
            let elapsed = started.elapsed();

            transcript.push_tool_result(ToolCallResult {
                id: call.id.clone(),
                name: call.name.clone(),
                content: result.to_content(),
            });
            self.emit(AgentEvent::ToolFinished {
                turn,
                id: call.id,
                name: call.name,
                arguments: call.arguments,
                result,
                elapsed,
            });
        }
    }

    #[inline]
    fn emit(&self, event: AgentEvent) {
        if let Some(on_event) = &self.on_event {
            on_event(event);
        }
    }
}

/// Makes call identifiers unique within one assistant turn, since each
/// tool message must answer exactly one call.
fn dedup_call_ids(calls: &mut [ToolCallRequest], turn: usize) {
    let mut seen = HashSet::new();
    for (idx, call) in calls.iter_mut().enumerate() {
        if call.id.is_empty() || !seen.insert(call.id.clone()) {
            let mut id = format!("call_{turn}_{idx}");
            let mut suffix = 0;
            // The model may already use the generated form.
            while !seen.insert(id.clone()) {
                suffix += 1;
                id = format!("call_{turn}_{idx}_{suffix}");
            }
            warn!(
                "replacing duplicate tool call id `{}` with `{id}`",
                call.id
            );
            call.id = id;
        }
    }
}
