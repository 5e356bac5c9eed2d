//! Core logic including the conversation loop, the transcript and tool
//! execution.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod agent;
mod error;
mod model_client;
pub mod tool;
pub mod transcript;

pub use agent::{Agent, AgentBuilder, AgentEvent, RetryPolicy};
pub use error::Error;
pub use transcript::Transcript;
