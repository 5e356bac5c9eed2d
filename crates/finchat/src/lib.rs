//! A finance chat assistant that lets an OpenRouter model look up market
//! data through a set of tools.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library to bring the assistant into your own host apps.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod session;
pub mod tools;
pub mod trace;

pub use session::{DEFAULT_SYSTEM_PROMPT, Session, SessionBuilder};

/// Re-exports of [`finchat_core`] crate.
pub mod core {
    pub use finchat_core::*;
}
