//! An abstraction layer for chat-completion providers.
//!
//! This crate establishes an unified protocol for the conversation loop to
//! interact with chat-completion endpoints, so that the loop can switch
//! between a real provider and a scripted one without modifying the core
//! codebase.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
