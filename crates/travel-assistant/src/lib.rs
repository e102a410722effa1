//! A travel assistant that answers questions about weather, currencies and
//! attractions, and double-checks its answers before they are final.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library to bring the assistant into your own host apps.

#![deny(missing_docs)]

#[allow(unused_imports)]
#[macro_use]
extern crate tracing;

pub mod config;
pub mod prompts;
mod session;
pub mod tools;

pub use config::{AppConfig, ConfigError};
pub use session::{Session, SessionBuilder};

/// Re-exports of [`travel_assistant_core`] crate.
pub mod core {
    pub use travel_assistant_core::*;
}
