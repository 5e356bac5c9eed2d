use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;

use finchat_model::{
    ModelFinishReason, ModelProvider, ModelProviderError, ModelRequest,
    ModelResponse, ModelResponseEvent, ToolCallRequest,
};
use tracing::Instrument;

type SendRequestResult =
    Result<ModelClientResponse, Box<dyn ModelProviderError>>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
#[rustfmt::skip]
type HandlerFn = Arc<
    dyn Fn(&ModelRequest, Box<dyn Fn(String) + Send + 'static>)
        -> BoxedSendRequestFuture + Send + Sync
>;

/// A wrapper around a model provider that provides a type-erased
/// interface for the other modules.
#[derive(Clone)]
pub(crate) struct ModelClient {
    handler_fn: HandlerFn,
}

impl ModelClient {
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req, on_delta| {
            trace!("sending a request with {} messages", req.messages.len());
            let fut = provider.send_request(req);
            Box::pin(
                async move {
                    let resp_or_err = fut.await;
                    handle_response::<P>(resp_or_err, on_delta).await
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self { handler_fn }
    }

    /// Sends a request and drains the response into one reply.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when this operation is cancelled.
    #[inline]
    pub async fn send_request(
        &self,
        req: &ModelRequest,
        on_delta: impl Fn(String) + Send + 'static,
    ) -> SendRequestResult {
        (self.handler_fn)(req, Box::new(on_delta)).await
    }
}

/// A completely received response from the model client.
#[derive(Clone, Debug, Default)]
pub(crate) struct ModelClientResponse {
    /// The concatenated text deltas.
    pub content: String,
    /// Tool calls requested by the model, in emission order.
    pub tool_calls: Vec<ToolCallRequest>,
    /// The reason the model finished generating.
    pub finish_reason: Option<ModelFinishReason>,
}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
    on_delta: Box<dyn Fn(String) + Send + 'static>,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err}");
            return Err(Box::new(err));
        }
    };

    let mut response = ModelClientResponse::default();
    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await;
        let event = match event_or_err {
            Ok(Some(event)) => event,
            // Drained.
            Ok(None) => break,
            Err(err) => {
                error!("got an error while streaming: {err}");
                return Err(Box::new(err));
            }
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(msg) => {
                response.content.push_str(&msg);
                on_delta(msg);
            }
            ModelResponseEvent::ToolCall(req) => {
                response.tool_calls.push(req);
            }
            ModelResponseEvent::Completed(reason) => {
                response.finish_reason = Some(reason);
            }
        }
    }

    trace!("finished a request");
    Ok(response)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use finchat_model::{ErrorKind, ModelMessage};
    use finchat_test_model::{PresetEvent, PresetResponse, TestModelProvider};

    use super::*;

    fn request() -> ModelRequest {
        ModelRequest {
            messages: vec![ModelMessage::user("Hi")],
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_assistant_turn(PresetResponse::with_events([
            PresetEvent::MessageDelta("Let me ".to_owned()),
            PresetEvent::MessageDelta("check.".to_owned()),
            PresetEvent::tool_call("call_1", "get_ticker_summary", "{}"),
        ]));
        let model_client = ModelClient::new(model_provider);

        for _ in 0..3 {
            let deltas = Arc::new(Mutex::new(vec![]));
            let resp = model_client
                .send_request(&request(), {
                    let deltas = Arc::clone(&deltas);
                    move |delta| deltas.lock().unwrap().push(delta)
                })
                .await
                .unwrap();
            assert_eq!(resp.content, "Let me check.");
            assert_eq!(resp.tool_calls.len(), 1);
            assert_eq!(resp.finish_reason, Some(ModelFinishReason::ToolCalls));
            assert_eq!(*deltas.lock().unwrap(), ["Let me ", "check."]);
        }
    }

    #[tokio::test]
    async fn test_error_handling() {
        let model_provider = TestModelProvider::default();
        let model_client = ModelClient::new(model_provider);
        let result = model_client.send_request(&request(), |_| {}).await;
        let Err(err) = result else {
            panic!("expected an error");
        };
        assert_eq!(err.kind(), ErrorKind::Other);
    }
}
