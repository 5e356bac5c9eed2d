use finchat_bridge::Bridge;
use finchat_core::tool::{Error as ToolError, Tool};
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::call_bridge;

/// Yahoo range shorthands.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Period {
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "5d")]
    FiveDays,
    #[serde(rename = "1mo")]
    OneMonth,
    #[serde(rename = "3mo")]
    ThreeMonths,
    #[serde(rename = "6mo")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "2y")]
    TwoYears,
    #[serde(rename = "5y")]
    FiveYears,
    #[serde(rename = "10y")]
    TenYears,
    #[serde(rename = "ytd")]
    YearToDate,
    #[serde(rename = "max")]
    Max,
}

/// Bar intervals.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "2m")]
    TwoMinutes,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "60m")]
    SixtyMinutes,
    #[serde(rename = "90m")]
    NinetyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "5d")]
    FiveDays,
    #[serde(rename = "1wk")]
    OneWeek,
    #[serde(rename = "1mo")]
    OneMonth,
    #[serde(rename = "3mo")]
    ThreeMonths,
}

/// Arguments of [`PriceHistoryTool`].
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PriceHistoryParameters {
    #[schemars(description = "Ticker symbol (single symbol supported).")]
    tickers: String,
    #[schemars(
        description = "Optional Yahoo range shorthand (e.g., 1mo, 6mo, 2y)."
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    period: Option<Period>,
    #[schemars(description = "Data interval (default 1d).")]
    #[serde(skip_serializing_if = "Option::is_none")]
    interval: Option<Interval>,
    #[schemars(description = "Optional start date (YYYY-MM-DD).")]
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<String>,
    #[schemars(description = "Optional end date (YYYY-MM-DD).")]
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<String>,
    #[schemars(description = "Include dividends and splits.")]
    #[serde(skip_serializing_if = "Option::is_none")]
    actions: Option<bool>,
    #[schemars(description = "Override the auto_adjust flag.")]
    #[serde(skip_serializing_if = "Option::is_none")]
    auto_adjust: Option<bool>,
    #[schemars(description = "Include pre/post-market data when available.")]
    #[serde(skip_serializing_if = "Option::is_none")]
    prepost: Option<bool>,
}

impl PriceHistoryParameters {
    fn check_dates(&self) -> Result<(), ToolError> {
        for (field, date) in [("start", &self.start), ("end", &self.end)] {
            if let Some(date) = date {
                if !is_iso_date(date) {
                    return Err(ToolError::invalid_arguments().with_reason(
                        format!("`{field}` must be YYYY-MM-DD, got `{date}`"),
                    ));
                }
            }
        }
        if self.tickers.trim().is_empty() {
            return Err(ToolError::invalid_arguments()
                .with_reason("`tickers` must not be empty"));
        }
        Ok(())
    }
}

/// A tool for fetching OHLCV price history.
pub struct PriceHistoryTool {
    bridge: Bridge,
    parameter_schema: Value,
}

impl PriceHistoryTool {
    /// Creates a new price history tool backed by `bridge`.
    #[inline]
    pub fn new(bridge: Bridge) -> Self {
        PriceHistoryTool {
            bridge,
            parameter_schema: schema_for!(PriceHistoryParameters).to_value(),
        }
    }
}

impl Tool for PriceHistoryTool {
    type Input = PriceHistoryParameters;

    fn name(&self) -> &str {
        "download_price_history"
    }

    fn description(&self) -> &str {
        "Fetch OHLCV price history for one ticker via yfinance.download."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: PriceHistoryParameters,
    ) -> impl Future<Output = Result<Value, ToolError>> + Send + 'static {
        let bridge = self.bridge.clone();
        async move {
            input.check_dates()?;
            call_bridge(bridge, "download_price_history", &input).await
        }
    }
}

fn is_iso_date(date: &str) -> bool {
    let bytes = date.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(idx, b)| match idx {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

#[cfg(test)]
mod tests {
    use finchat_core::tool::{ErrorKind, Registry, schema};
    use serde_json::json;

    use super::*;
    use crate::tools::test_support::echo_bridge;

    #[test]
    fn test_schema_accepts_model_arguments() {
        let tool = PriceHistoryTool::new(echo_bridge());
        let schema = tool.parameter_schema();
        assert!(
            schema::validate(
                schema,
                &json!({"tickers": "AAPL", "period": "1mo", "interval": "1wk"})
            )
            .is_ok()
        );
        assert!(
            schema::validate(schema, &json!({"tickers": "AAPL", "start": null}))
                .is_ok()
        );

        let instance = json!({"tickers": "AAPL", "period": "2mo"});
        let err = schema::validate(schema, &instance).unwrap_err();
        assert_eq!(err.path(), "period");
        let instance = json!({"tickers": "AAPL", "limit": 5});
        let err = schema::validate(schema, &instance).unwrap_err();
        assert!(err.to_string().contains("limit"));
        assert!(schema::validate(schema, &json!({"period": "1mo"})).is_err());
    }

    #[test]
    fn test_iso_date() {
        assert!(is_iso_date("2024-05-01"));
        assert!(!is_iso_date("2024-5-1"));
        assert!(!is_iso_date("May 1st"));
        assert!(!is_iso_date("2024/05/01"));
    }

    #[tokio::test]
    async fn test_forwards_present_parameters_only() {
        let mut registry = Registry::new();
        registry.add_tool(PriceHistoryTool::new(echo_bridge()));

        let result = registry
            .execute(
                "download_price_history",
                r#"{"tickers":"AAPL","period":"1mo","actions":true}"#,
            )
            .await;
        assert!(result.is_ok());
        assert_eq!(
            result.to_envelope()["data"],
            json!({
                "operation": "download_price_history",
                "params": {"tickers": "AAPL", "period": "1mo", "actions": true}
            })
        );
    }

    #[tokio::test]
    async fn test_rejects_bad_dates() {
        let mut registry = Registry::new();
        registry.add_tool(PriceHistoryTool::new(echo_bridge()));

        let result = registry
            .execute(
                "download_price_history",
                r#"{"tickers":"AAPL","start":"last week"}"#,
            )
            .await;
        let err = result.error().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
        assert!(err.reason().contains("start"));
    }
}
