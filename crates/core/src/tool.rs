//! Tool call supports.

mod error;
mod object;
mod registry;
mod result;
pub mod schema;

use serde::de::DeserializeOwned;
use serde_json::Value;

pub use error::{Error, ErrorKind};
pub use registry::Registry;
pub use result::ToolResult;

/// A tool that can be called by the model.
///
/// Implementations of this trait should be stateless, and may not maintain any
/// internal state.
///
/// Arguments reach [`execute`](Self::execute) only after they parsed as a
/// JSON object, passed the [`parameter_schema`](Self::parameter_schema)
/// and deserialized into [`Input`](Self::Input). Failures of the data source
/// should be reported as [`Error::upstream_error`].
pub trait Tool: Send + Sync + 'static {
    /// The type of input that the tool accepts.
    type Input: DeserializeOwned;

    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the parameter schema of the tool.
    fn parameter_schema(&self) -> &Value;

    /// Executes the tool with the given input, producing the `data` of a
    /// success envelope.
    ///
    /// This method must return a future that is fully independent of `self`,
    /// and the future should be cancellation safe.
    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = Result<Value, Error>> + Send + 'static;
}
