use std::error::Error as StdError;
use std::fmt::{self, Display};

use finchat_model::{ErrorKind as ModelErrorKind, ModelProviderError};

/// Error type for a conversation run.
///
/// Only problems that stop the conversation end up here. Tool failures
/// are handed back to the model instead.
#[derive(Debug)]
pub enum Error {
    /// The completion request failed and could not be retried.
    Model(Box<dyn ModelProviderError>),
    /// The model kept requesting tools for too many turns.
    TurnLimitExceeded {
        /// The configured maximum number of completion calls.
        max_turns: usize,
    },
}

impl Error {
    /// Returns the snake case identifier of this error.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Error::Model(err) => err.kind().as_str(),
            Error::TurnLimitExceeded { .. } => "turn_limit_exceeded",
        }
    }

    /// Returns the underlying provider error, if any.
    #[inline]
    pub fn model_error(&self) -> Option<&dyn ModelProviderError> {
        match self {
            Error::Model(err) => Some(err.as_ref()),
            Error::TurnLimitExceeded { .. } => None,
        }
    }

    /// Returns the provider error kind, if any.
    #[inline]
    pub fn model_error_kind(&self) -> Option<ModelErrorKind> {
        self.model_error().map(|err| err.kind())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Model(err) => {
                write!(f, "model request failed ({}): {err}", err.kind())
            }
            Error::TurnLimitExceeded { max_turns } => write!(
                f,
                "turn_limit_exceeded: no final answer after {max_turns} turns"
            ),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Model(err) => Some(err.as_ref()),
            Error::TurnLimitExceeded { .. } => None,
        }
    }
}
