//! The financial-data tools that models can use.
//!
//! Every tool forwards its validated arguments to the data-fetch service
//! through a [`Bridge`], using the tool name as the operation name.

mod price_history;
mod ticker;

use finchat_bridge::{Bridge, Envelope};
use finchat_core::tool::Error as ToolError;
use serde::Serialize;
use serde_json::Value;

pub use price_history::{
    Interval, Period, PriceHistoryParameters, PriceHistoryTool,
};
pub use ticker::{
    TickerNewsParameters, TickerNewsTool, TickerParameters, TickerTool,
};

/// Sends one operation to the data-fetch service and unwraps its envelope.
async fn call_bridge<P: Serialize>(
    bridge: Bridge,
    operation: &str,
    params: &P,
) -> Result<Value, ToolError> {
    let params = serde_json::to_value(params).map_err(|err| {
        ToolError::invalid_arguments().with_reason(err.to_string())
    })?;

    match bridge.invoke(operation, params).await {
        Ok(Envelope::Success { data, .. }) => Ok(data),
        Ok(Envelope::Failure {
            error_type,
            message,
            ..
        }) => Err(ToolError::upstream_error()
            .with_reason(format!("{error_type}: {message}"))),
        Err(failure) => {
            warn!("`{operation}` failed: {failure}");
            Err(ToolError::upstream_error().with_reason(failure.to_string()))
        }
    }
}
