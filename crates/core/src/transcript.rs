//! The conversation history exchanged with the model.

use std::collections::HashSet;
use std::error::Error as StdError;
use std::fmt::{self, Display};

use finchat_model::{AssistantMessage, ModelMessage, ToolCallResult};
use serde::{Deserialize, Serialize};

/// The ordered messages of one conversation.
///
/// A transcript only grows. Assistant replies and tool results are
/// appended by [`Agent::run`](crate::Agent::run); callers add the system
/// prompt and user turns.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<ModelMessage>,
}

impl Transcript {
    /// Creates an empty transcript.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transcript seeded with a system message.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(prompt: S) -> Self {
        Self {
            messages: vec![ModelMessage::system(prompt)],
        }
    }

    /// Appends a user message.
    #[inline]
    pub fn push_user<S: Into<String>>(&mut self, content: S) {
        self.messages.push(ModelMessage::user(content));
    }

    #[inline]
    pub(crate) fn push_assistant(&mut self, msg: AssistantMessage) {
        self.messages.push(ModelMessage::Assistant(msg));
    }

    #[inline]
    pub(crate) fn push_tool_result(&mut self, result: ToolCallResult) {
        self.messages.push(ModelMessage::Tool(result));
    }

    /// Returns all messages in order.
    #[inline]
    pub fn messages(&self) -> &[ModelMessage] {
        &self.messages
    }

    /// Returns the number of messages.
    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if the transcript has no messages.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns the text of the last assistant message, if any.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|msg| match msg {
            ModelMessage::Assistant(assistant) => {
                Some(assistant.content.as_str())
            }
            _ => None,
        })
    }

    /// Serializes the transcript into pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self).map_err(Error::Json)
    }

    /// Loads a transcript saved by [`to_json`](Self::to_json).
    ///
    /// Every tool message must answer a distinct tool call of the
    /// assistant message before it.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let transcript: Self = serde_json::from_str(json).map_err(Error::Json)?;
        transcript.check_tool_results()?;
        Ok(transcript)
    }

    fn check_tool_results(&self) -> Result<(), Error> {
        let mut open_calls: HashSet<&str> = HashSet::new();
        for msg in &self.messages {
            match msg {
                ModelMessage::Assistant(assistant) => {
                    open_calls = assistant
                        .tool_calls
                        .iter()
                        .map(|call| call.id.as_str())
                        .collect();
                }
                ModelMessage::Tool(result) => {
                    if !open_calls.remove(result.id.as_str()) {
                        return Err(Error::UnmatchedToolResult(
                            result.id.clone(),
                        ));
                    }
                }
                _ => open_calls.clear(),
            }
        }
        Ok(())
    }
}

/// Error type for loading and saving a [`Transcript`].
#[derive(Debug)]
pub enum Error {
    /// The JSON document is invalid.
    Json(serde_json::Error),
    /// A tool message references no pending tool call.
    UnmatchedToolResult(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Json(err) => write!(f, "invalid transcript: {err}"),
            Error::UnmatchedToolResult(id) => {
                write!(f, "tool result `{id}` matches no pending tool call")
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Json(err) => Some(err),
            Error::UnmatchedToolResult(_) => None,
        }
    }
}
