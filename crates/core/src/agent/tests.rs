use std::future::ready;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use finchat_model::{
    ErrorKind as ModelErrorKind, ModelMessage, ToolCallRequest,
};
use finchat_test_model::{PresetEvent, PresetResponse, TestModelProvider};
use serde::Deserialize;
use serde_json::{Value, json};

use super::dedup_call_ids;
use crate::tool::{Error as ToolError, Tool};
use crate::{AgentBuilder, AgentEvent, Error, RetryPolicy, Transcript};

#[derive(Deserialize)]
struct PriceHistoryInput {
    tickers: String,
    period: Option<String>,
}

struct PriceHistoryTool {
    schema: Value,
}

impl PriceHistoryTool {
    fn new() -> Self {
        Self {
            schema: json!({
                "type": "object",
                "properties": {
                    "tickers": {"type": "string"},
                    "period": {"type": "string", "enum": ["5d", "1mo", "1y"]}
                },
                "required": ["tickers"],
                "additionalProperties": false
            }),
        }
    }
}

impl Tool for PriceHistoryTool {
    type Input = PriceHistoryInput;

    fn name(&self) -> &str {
        "download_price_history"
    }

    fn description(&self) -> &str {
        "Downloads OHLCV history."
    }

    fn parameter_schema(&self) -> &Value {
        &self.schema
    }

    fn execute(
        &self,
        input: PriceHistoryInput,
    ) -> impl Future<Output = Result<Value, ToolError>> + Send + 'static {
        ready(Ok(json!({
            "tickers": input.tickers,
            "period": input.period,
            "rows": [{"Date": "2024-05-01", "Close": 169.3}]
        })))
    }
}

struct QuoteTool {
    schema: Value,
}

impl QuoteTool {
    fn new() -> Self {
        Self {
            schema: json!({
                "type": "object",
                "properties": {"ticker": {"type": "string"}},
                "required": ["ticker"]
            }),
        }
    }
}

#[derive(Deserialize)]
struct QuoteInput {
    ticker: String,
}

impl Tool for QuoteTool {
    type Input = QuoteInput;

    fn name(&self) -> &str {
        "get_ticker_fast_info"
    }

    fn description(&self) -> &str {
        "Quick quote."
    }

    fn parameter_schema(&self) -> &Value {
        &self.schema
    }

    fn execute(
        &self,
        input: QuoteInput,
    ) -> impl Future<Output = Result<Value, ToolError>> + Send + 'static {
        async move {
            if input.ticker == "SLOW" {
                // What a tool reports when its data service hangs.
                tokio::time::sleep(Duration::from_millis(5)).await;
                return Err(ToolError::upstream_error().with_reason(
                    "bridge_timeout: `get_ticker_fast_info` \
                     timed out after 0.0s",
                ));
            }
            Ok(json!({"ticker": input.ticker, "lastPrice": 100.0}))
        }
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::Backoff(
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(1))
            .with_max_interval(Duration::from_millis(5))
            .with_max_elapsed_time(Some(Duration::from_secs(5)))
            .build(),
    )
}

fn new_transcript(prompt: &str) -> Transcript {
    let mut transcript =
        Transcript::with_system_prompt("You are a finance assistant.");
    transcript.push_user(prompt);
    transcript
}

fn tool_contents(transcript: &Transcript) -> Vec<(String, Value)> {
    transcript
        .messages()
        .iter()
        .filter_map(|msg| match msg {
            ModelMessage::Tool(result) => Some((
                result.id.clone(),
                serde_json::from_str(&result.content).unwrap(),
            )),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_plain_answer() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(PresetResponse::with_events([
        PresetEvent::MessageDelta("2 + 2 ".to_owned()),
        PresetEvent::MessageDelta("= 4".to_owned()),
    ]));

    let deltas = Arc::new(Mutex::new(String::new()));
    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_tool(PriceHistoryTool::new())
        .on_delta({
            let deltas = Arc::clone(&deltas);
            move |delta| deltas.lock().unwrap().push_str(delta)
        })
        .build();

    let mut transcript = new_transcript("What is 2+2?");
    let answer = agent.run(&mut transcript).await.unwrap();
    assert_eq!(answer, "2 + 2 = 4");
    assert_eq!(*deltas.lock().unwrap(), "2 + 2 = 4");
    assert_eq!(transcript.len(), 3);
    assert_eq!(transcript.last_assistant_text(), Some("2 + 2 = 4"));

    let requests = model_provider.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[0].tools[0].name, "download_price_history");
}

#[tokio::test]
async fn test_price_history_round() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(PresetResponse::with_events([
        PresetEvent::tool_call(
            "call_1",
            "download_price_history",
            r#"{"tickers":"AAPL","period":"1mo"}"#,
        ),
    ]));
    model_provider.add_assistant_turn(PresetResponse::with_text(
        "AAPL closed at 169.30 on May 1.",
    ));

    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_tool(PriceHistoryTool::new())
        .build();
    let mut transcript = new_transcript("How did AAPL trade last month?");
    let answer = agent.run(&mut transcript).await.unwrap();
    assert_eq!(answer, "AAPL closed at 169.30 on May 1.");

    let requests = model_provider.requests();
    assert_eq!(requests.len(), 2);
    // The second request carries the tool result.
    let ModelMessage::Tool(result) = &requests[1].messages[3] else {
        panic!("expected a tool message");
    };
    assert_eq!(result.id, "call_1");
    assert_eq!(result.name, "download_price_history");
    assert_eq!(
        serde_json::from_str::<Value>(&result.content).unwrap(),
        json!({
            "ok": true,
            "operation": "download_price_history",
            "data": {
                "tickers": "AAPL",
                "period": "1mo",
                "rows": [{"Date": "2024-05-01", "Close": 169.3}]
            }
        })
    );
    assert_eq!(transcript.len(), 5);
}

#[tokio::test]
async fn test_schema_violation_is_reported_to_the_model() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(PresetResponse::with_events([
        PresetEvent::tool_call(
            "call_1",
            "get_ticker_fast_info",
            r#"{"ticker": 123}"#,
        ),
    ]));
    model_provider.add_assistant_turn(PresetResponse::with_text(
        "Sorry, I passed a bad ticker.",
    ));

    let agent = AgentBuilder::with_model_provider(model_provider)
        .with_tool(QuoteTool::new())
        .build();
    let mut transcript = new_transcript("Quote 123");
    let answer = agent.run(&mut transcript).await.unwrap();
    assert_eq!(answer, "Sorry, I passed a bad ticker.");

    let results = tool_contents(&transcript);
    assert_eq!(results.len(), 1);
    let envelope = &results[0].1;
    assert_eq!(envelope["ok"], json!(false));
    assert_eq!(envelope["operation"], json!("get_ticker_fast_info"));
    assert_eq!(envelope["error"]["type"], json!("schema_violation"));
    assert!(
        envelope["error"]["message"]
            .as_str()
            .unwrap()
            .contains("ticker")
    );
}

#[tokio::test]
async fn test_upstream_timeout_does_not_abort() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(PresetResponse::with_events([
        PresetEvent::tool_call(
            "call_1",
            "get_ticker_fast_info",
            r#"{"ticker":"SLOW"}"#,
        ),
    ]));
    model_provider.add_assistant_turn(PresetResponse::with_text(
        "The data service is not responding right now.",
    ));

    let agent = AgentBuilder::with_model_provider(model_provider)
        .with_tool(QuoteTool::new())
        .build();
    let mut transcript = new_transcript("Quote SLOW");
    let answer = agent.run(&mut transcript).await.unwrap();
    assert_eq!(answer, "The data service is not responding right now.");

    let results = tool_contents(&transcript);
    assert_eq!(results[0].1["error"]["type"], json!("upstream_error"));
    assert!(
        results[0].1["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("bridge_timeout")
    );
}

#[tokio::test]
async fn test_tool_results_follow_call_order() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(PresetResponse::with_events([
        PresetEvent::MessageDelta("Checking both.".to_owned()),
        PresetEvent::tool_call(
            "call_a",
            "get_ticker_fast_info",
            r#"{"ticker":"AAPL"}"#,
        ),
        PresetEvent::tool_call("call_b", "get_weather", r#"{"city":"Paris"}"#),
        PresetEvent::tool_call(
            "call_c",
            "get_ticker_fast_info",
            r#"{"ticker":"MSFT"}"#,
        ),
    ]));
    model_provider.add_assistant_turn(PresetResponse::with_text("Done."));

    let events = Arc::new(Mutex::new(vec![]));
    let agent = AgentBuilder::with_model_provider(model_provider)
        .with_tool(QuoteTool::new())
        .on_event({
            let events = Arc::clone(&events);
            move |event| events.lock().unwrap().push(event)
        })
        .build();
    let mut transcript = new_transcript("Compare AAPL and MSFT");
    agent.run(&mut transcript).await.unwrap();

    let results = tool_contents(&transcript);
    let ids: Vec<_> = results.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, ["call_a", "call_b", "call_c"]);
    assert_eq!(results[0].1["data"]["ticker"], json!("AAPL"));
    assert_eq!(results[1].1["error"]["type"], json!("unknown_tool"));
    assert_eq!(results[2].1["data"]["ticker"], json!("MSFT"));

    // Tool messages directly follow the assistant message requesting them.
    let roles: Vec<_> =
        transcript.messages().iter().map(|m| m.role()).collect();
    assert_eq!(
        roles,
        ["system", "user", "assistant", "tool", "tool", "tool", "assistant"]
    );

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 5);
    assert!(matches!(
        events[0],
        AgentEvent::CompletionFinished { turn: 1, tool_calls: 3, .. }
    ));
    assert!(matches!(
        &events[2],
        AgentEvent::ToolFinished { turn: 1, name, result, .. }
            if name == "get_weather" && !result.is_ok()
    ));
    assert!(matches!(
        events[4],
        AgentEvent::CompletionFinished { turn: 2, tool_calls: 0, .. }
    ));
}

#[tokio::test]
async fn test_duplicate_call_ids_are_made_unique() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(PresetResponse::with_events([
        PresetEvent::tool_call(
            "dup",
            "get_ticker_fast_info",
            r#"{"ticker":"A"}"#,
        ),
        PresetEvent::tool_call(
            "dup",
            "get_ticker_fast_info",
            r#"{"ticker":"B"}"#,
        ),
    ]));
    model_provider.add_assistant_turn(PresetResponse::with_text("ok"));

    let agent = AgentBuilder::with_model_provider(model_provider)
        .with_tool(QuoteTool::new())
        .build();
    let mut transcript = new_transcript("Quote A and B");
    agent.run(&mut transcript).await.unwrap();

    let results = tool_contents(&transcript);
    assert_eq!(results[0].0, "dup");
    assert_eq!(results[1].0, "call_1_1");
    // The saved transcript reloads cleanly.
    let json = transcript.to_json().unwrap();
    assert_eq!(Transcript::from_json(&json).unwrap(), transcript);
}

#[tokio::test]
async fn test_generated_call_id_does_not_collide() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(PresetResponse::with_events([
        PresetEvent::tool_call(
            "call_1_1",
            "get_ticker_fast_info",
            r#"{"ticker":"A"}"#,
        ),
        PresetEvent::tool_call("", "get_ticker_fast_info", r#"{"ticker":"B"}"#),
    ]));
    model_provider.add_assistant_turn(PresetResponse::with_text("ok"));

    let agent = AgentBuilder::with_model_provider(model_provider)
        .with_tool(QuoteTool::new())
        .build();
    let mut transcript = new_transcript("Quote A and B");
    agent.run(&mut transcript).await.unwrap();

    let results = tool_contents(&transcript);
    assert_eq!(results[0].0, "call_1_1");
    assert_eq!(results[1].0, "call_1_1_1");
    let json = transcript.to_json().unwrap();
    assert_eq!(Transcript::from_json(&json).unwrap(), transcript);
}

#[test]
fn test_dedup_call_ids() {
    let call = |id: &str| ToolCallRequest {
        id: id.to_owned(),
        name: "get_ticker_fast_info".to_owned(),
        arguments: "{}".to_owned(),
    };
    let mut calls = vec![
        call("call_2_1"),
        call("call_2_1_1"),
        call(""),
        call("x"),
        call("x"),
    ];
    dedup_call_ids(&mut calls, 2);

    let ids: Vec<_> = calls.iter().map(|call| call.id.as_str()).collect();
    assert_eq!(ids, ["call_2_1", "call_2_1_1", "call_2_2", "x", "call_2_4"]);
}

#[tokio::test]
async fn test_turn_limit() {
    let mut model_provider = TestModelProvider::default();
    for idx in 0..4 {
        model_provider.add_assistant_turn(PresetResponse::with_events([
            PresetEvent::tool_call(
                format!("call_{idx}"),
                "get_ticker_fast_info",
                r#"{"ticker":"AAPL"}"#,
            ),
        ]));
    }

    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_tool(QuoteTool::new())
        .with_max_turns(2)
        .build();
    let mut transcript = new_transcript("Loop forever");
    let err = agent.run(&mut transcript).await.unwrap_err();
    assert!(matches!(err, Error::TurnLimitExceeded { max_turns: 2 }));
    assert_eq!(err.kind_str(), "turn_limit_exceeded");
    assert_eq!(model_provider.requests().len(), 2);
    // Both rounds are kept: 2 assistant and 2 tool messages.
    assert_eq!(transcript.len(), 6);
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(
        PresetResponse::with_text("Eventually.").with_failures(2),
    );

    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_retry_policy(fast_retry())
        .build();
    let mut transcript = new_transcript("Hi");
    let answer = agent.run(&mut transcript).await.unwrap();
    assert_eq!(answer, "Eventually.");
    assert_eq!(model_provider.requests().len(), 3);
    assert_eq!(transcript.len(), 3);
}

#[tokio::test]
async fn test_rate_limit_without_retry() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(
        PresetResponse::with_text("never").with_failures(1),
    );

    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_retry_policy(RetryPolicy::Never)
        .build();
    let mut transcript = new_transcript("Hi");
    let err = agent.run(&mut transcript).await.unwrap_err();
    assert_eq!(
        err.model_error_kind(),
        Some(ModelErrorKind::RateLimitExceeded)
    );
    assert_eq!(err.model_error().and_then(|err| err.status()), Some(429));
    assert_eq!(model_provider.requests().len(), 1);
    // No assistant message is appended for a failed call.
    assert_eq!(transcript.len(), 2);
}

#[tokio::test]
async fn test_other_provider_errors_are_fatal() {
    // An empty script fails with a non-retryable error.
    let model_provider = TestModelProvider::default();
    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_retry_policy(fast_retry())
        .build();
    let mut transcript = new_transcript("Hi");
    let err = agent.run(&mut transcript).await.unwrap_err();
    assert_eq!(err.model_error_kind(), Some(ModelErrorKind::Other));
    assert_eq!(model_provider.requests().len(), 1);
}

#[tokio::test]
async fn test_independent_transcripts() {
    let mut model_provider = TestModelProvider::default();
    model_provider.set_delay(Duration::from_millis(2));
    model_provider.add_assistant_turn(PresetResponse::with_events([
        PresetEvent::tool_call(
            "call_1",
            "get_ticker_fast_info",
            r#"{"ticker":"AAPL"}"#,
        ),
    ]));
    model_provider.add_assistant_turn(PresetResponse::with_text("Done."));

    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_tool(QuoteTool::new())
        .build();
    let mut first = new_transcript("Quote AAPL");
    let mut second = new_transcript("Quote AAPL again");
    let (a, b) = tokio::join!(agent.run(&mut first), agent.run(&mut second));
    assert_eq!(a.unwrap(), "Done.");
    assert_eq!(b.unwrap(), "Done.");
    assert_eq!(first.len(), 5);
    assert_eq!(second.len(), 5);
    assert_eq!(model_provider.requests().len(), 4);
}
