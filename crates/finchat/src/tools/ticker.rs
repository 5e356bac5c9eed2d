use finchat_bridge::Bridge;
use finchat_core::tool::{Error as ToolError, Tool};
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::call_bridge;

/// Arguments of [`TickerTool`].
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TickerParameters {
    #[schemars(description = "Ticker symbol (e.g., AAPL).")]
    ticker: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TickerOperation {
    FastInfo,
    Summary,
    Fundamentals,
}

impl TickerOperation {
    fn name(self) -> &'static str {
        match self {
            TickerOperation::FastInfo => "get_ticker_fast_info",
            TickerOperation::Summary => "get_ticker_summary",
            TickerOperation::Fundamentals => "get_ticker_fundamentals",
        }
    }

    fn description(self) -> &'static str {
        match self {
            TickerOperation::FastInfo => {
                "Return Yahoo Finance fast_info snapshot for a ticker."
            }
            TickerOperation::Summary => {
                "Return a condensed company profile and key statistics \
                 for a ticker."
            }
            TickerOperation::Fundamentals => {
                "Return income statement, balance sheet and cash flow \
                 highlights for a ticker."
            }
        }
    }
}

/// A single-ticker lookup: fast info, summary or fundamentals.
pub struct TickerTool {
    bridge: Bridge,
    operation: TickerOperation,
    parameter_schema: Value,
}

impl TickerTool {
    fn with_operation(bridge: Bridge, operation: TickerOperation) -> Self {
        TickerTool {
            bridge,
            operation,
            parameter_schema: schema_for!(TickerParameters).to_value(),
        }
    }

    /// `get_ticker_fast_info`.
    #[inline]
    pub fn fast_info(bridge: Bridge) -> Self {
        Self::with_operation(bridge, TickerOperation::FastInfo)
    }

    /// `get_ticker_summary`.
    #[inline]
    pub fn summary(bridge: Bridge) -> Self {
        Self::with_operation(bridge, TickerOperation::Summary)
    }

    /// `get_ticker_fundamentals`.
    #[inline]
    pub fn fundamentals(bridge: Bridge) -> Self {
        Self::with_operation(bridge, TickerOperation::Fundamentals)
    }
}

impl Tool for TickerTool {
    type Input = TickerParameters;

    fn name(&self) -> &str {
        self.operation.name()
    }

    fn description(&self) -> &str {
        self.operation.description()
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: TickerParameters,
    ) -> impl Future<Output = Result<Value, ToolError>> + Send + 'static {
        let bridge = self.bridge.clone();
        let operation = self.operation.name();
        async move { call_bridge(bridge, operation, &input).await }
    }
}

/// Arguments of [`TickerNewsTool`].
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TickerNewsParameters {
    #[schemars(description = "Ticker symbol (e.g., AAPL).")]
    ticker: String,
    #[schemars(description = "Maximum number of articles to return.")]
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<u32>,
}

/// A tool for fetching recent news articles about a ticker.
pub struct TickerNewsTool {
    bridge: Bridge,
    parameter_schema: Value,
}

impl TickerNewsTool {
    /// Creates a new news tool backed by `bridge`.
    #[inline]
    pub fn new(bridge: Bridge) -> Self {
        TickerNewsTool {
            bridge,
            parameter_schema: schema_for!(TickerNewsParameters).to_value(),
        }
    }
}

impl Tool for TickerNewsTool {
    type Input = TickerNewsParameters;

    fn name(&self) -> &str {
        "get_ticker_news"
    }

    fn description(&self) -> &str {
        "Return recent news articles for a ticker."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: TickerNewsParameters,
    ) -> impl Future<Output = Result<Value, ToolError>> + Send + 'static {
        let bridge = self.bridge.clone();
        async move { call_bridge(bridge, "get_ticker_news", &input).await }
    }
}
