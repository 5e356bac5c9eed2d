use std::time::Duration;

use finchat_model::ToolCallRequest;

use crate::tool::ToolResult;

/// Where a conversation run currently is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum LoopState {
    /// The transcript is ready for the next completion call.
    AwaitingModel,
    /// The last assistant turn requested these tools.
    DispatchingTools(Vec<ToolCallRequest>),
    /// The assistant answered without tool calls.
    Done(String),
}

/// Progress notifications emitted while a conversation runs.
#[derive(Clone, Debug)]
pub enum AgentEvent {
    /// A completion call has been fully received.
    CompletionFinished {
        /// The 1-based turn number.
        turn: usize,
        /// Time spent on the call, retries included.
        elapsed: Duration,
        /// Number of tool calls the reply carries.
        tool_calls: usize,
    },
    /// A tool call has been dispatched and its result appended.
    ToolFinished {
        /// The turn that requested the tool.
        turn: usize,
        /// The tool call identifier.
        id: String,
        /// The tool name.
        name: String,
        /// The raw arguments as emitted by the model.
        arguments: String,
        /// The outcome handed back to the model.
        result: ToolResult,
        /// Time spent running the tool.
        elapsed: Duration,
    },
}
