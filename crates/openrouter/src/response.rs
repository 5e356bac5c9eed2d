use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use finchat_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    ToolCallRequest,
};
use pin_project_lite::pin_project;

use crate::Error;
use crate::content::normalize_content;
use crate::io::{Sse, SseError};
use crate::proto::{ChatCompletion, ChatCompletionChunk, ToolCall};

struct PartialState {
    sse: Sse,
    received_payload: bool,
    tool_calls: Vec<ToolCall>,
    finish_reason: Option<ModelFinishReason>,
    // Tool calls are only emitted after the stream ends, since their
    // arguments arrive in fragments and may be patched until the last chunk.
    pending_tool_calls: VecDeque<ToolCallRequest>,
    // This field will be cleared after the response returns the complete event.
    pending_finish_reason: Option<ModelFinishReason>,
    done: bool,
}

impl PartialState {
    fn apply_chunk(&mut self, chunk: ChatCompletionChunk) -> Option<String> {
        let choice = chunk.choices.into_iter().next()?;
        let mut message_delta = None;

        if let Some(delta) = choice.delta {
            if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
                message_delta = Some(content);
            }
            for tool_call in delta.tool_calls.into_iter().flatten() {
                self.merge_tool_call(tool_call);
            }
        }
        if let Some(finish_reason) = choice.finish_reason {
            self.finish_reason = Some(parse_finish_reason(&finish_reason));
        }

        message_delta
    }

    fn merge_tool_call(&mut self, mut tool_call: ToolCall) {
        let index = tool_call.index.unwrap_or(self.tool_calls.len() as u32);
        tool_call.index = Some(index);

        let Some(partial_tool_call) = self
            .tool_calls
            .iter_mut()
            .find(|t| t.index == Some(index))
        else {
            self.tool_calls.push(tool_call);
            return;
        };
        // Patch the partial tool call.
        if let Some(id) = tool_call.id.filter(|id| !id.is_empty()) {
            partial_tool_call.id = Some(id);
        }
        if let Some(ty) = tool_call.r#type {
            partial_tool_call.r#type = Some(ty);
        }
        if let Some(function) = tool_call.function {
            match partial_tool_call.function {
                Some(ref mut partial_func) => {
                    if let Some(name) = function.name.filter(|n| !n.is_empty())
                    {
                        partial_func.name = Some(name);
                    }
                    if let Some(arguments) = function.arguments {
                        partial_func
                            .arguments
                            .get_or_insert_default()
                            .push_str(&arguments);
                    }
                }
                None => partial_tool_call.function = Some(function),
            }
        }
    }

    fn finish(&mut self) -> Result<(), Error> {
        if !self.received_payload {
            return Err(Error::new(
                "empty streaming response received",
                ErrorKind::MalformedResponse,
            ));
        }
        let mut tool_calls = std::mem::take(&mut self.tool_calls);
        tool_calls.sort_by_key(|t| t.index);
        self.pending_tool_calls = tool_calls
            .into_iter()
            .enumerate()
            .map(|(position, call)| call.into_request(position))
            .collect();
        self.pending_finish_reason = Some(self.finish_reason.unwrap_or(
            if self.pending_tool_calls.is_empty() {
                ModelFinishReason::Stop
            } else {
                ModelFinishReason::ToolCalls
            },
        ));
        self.done = true;
        Ok(())
    }
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    pub struct OpenRouterResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
        buffered: VecDeque<ModelResponseEvent>,
    }
}

impl OpenRouterResponse {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            received_payload: false,
            tool_calls: Default::default(),
            finish_reason: None,
            pending_tool_calls: Default::default(),
            pending_finish_reason: None,
            done: false,
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
            buffered: VecDeque::new(),
        }
    }

    /// Builds a response from a non-streamed completion body.
    pub fn from_completion(completion: ChatCompletion) -> Result<Self, Error> {
        if let Some(err) = completion.error {
            return Err(Error::from_api_error(err));
        }
        let Some(choice) = completion.choices.into_iter().next() else {
            return Err(Error::new(
                "response did not include any choices",
                ErrorKind::MalformedResponse,
            ));
        };

        let mut buffered = VecDeque::new();
        let content = normalize_content(&choice.message.content);
        if !content.is_empty() {
            buffered.push_back(ModelResponseEvent::MessageDelta(content));
        }
        let tool_calls = choice.message.tool_calls.unwrap_or_default();
        let has_tool_calls = !tool_calls.is_empty();
        for (position, call) in tool_calls.into_iter().enumerate() {
            buffered.push_back(ModelResponseEvent::ToolCall(
                call.into_request(position),
            ));
        }
        let finish_reason = match choice.finish_reason.as_deref() {
            Some(reason) => parse_finish_reason(reason),
            None if has_tool_calls => ModelFinishReason::ToolCalls,
            None => ModelFinishReason::Stop,
        };
        buffered.push_back(ModelResponseEvent::Completed(finish_reason));

        Ok(Self {
            next_event_fut: None,
            buffered,
        })
    }
}

impl ModelResponse for OpenRouterResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            // Either a buffered response, or the stream has been exhausted.
            return Poll::Ready(Ok(this.buffered.pop_front()));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future for
        // the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(mut partial_state: PartialState) -> NextEvent {
    loop {
        // The order of events is important. Always emit message deltas first,
        // then pending tool calls, and finally the finish reason.
        if partial_state.done {
            let pending = &mut partial_state.pending_tool_calls;
            if let Some(tool_call) = pending.pop_front() {
                return Ok((
                    Some(ModelResponseEvent::ToolCall(tool_call)),
                    partial_state,
                ));
            }
            if let Some(reason) = partial_state.pending_finish_reason.take() {
                return Ok((
                    Some(ModelResponseEvent::Completed(reason)),
                    partial_state,
                ));
            }
            return Ok((None, partial_state));
        }

        let sse_event = match partial_state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                partial_state.finish()?;
                continue;
            }
            Err(SseError::InvalidPayload) => {
                return Err(Error::new(
                    "invalid event stream payload",
                    ErrorKind::MalformedResponse,
                ));
            }
            Err(SseError::ChunksError(err)) => {
                return Err(Error::new(
                    format!("event stream broken: {}", err.0),
                    ErrorKind::Transport,
                ));
            }
        };
        trace!("got sse event: {sse_event}");
        if sse_event == "[DONE]" {
            partial_state.finish()?;
            continue;
        }

        let chunk = serde_json::from_str::<ChatCompletionChunk>(&sse_event)
            .map_err(|err| {
                Error::new(
                    format!("invalid completion chunk: {err}"),
                    ErrorKind::MalformedResponse,
                )
            })?;
        if let Some(err) = chunk.error {
            return Err(Error::from_api_error(err));
        }
        partial_state.received_payload = true;

        if let Some(message_delta) = partial_state.apply_chunk(chunk) {
            return Ok((
                Some(ModelResponseEvent::MessageDelta(message_delta)),
                partial_state,
            ));
        }
    }
}

#[inline]
fn parse_finish_reason(reason: &str) -> ModelFinishReason {
    match reason {
        "tool_calls" | "function_call" => ModelFinishReason::ToolCalls,
        "length" => ModelFinishReason::Length,
        _ => ModelFinishReason::Stop,
    }
}
