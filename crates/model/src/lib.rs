//! Provider-neutral protocol for talking to LLMs.
//!
//! This crate establishes the vocabulary shared by the travel assistant
//! and the model providers it can run on: requests with a system
//! instruction, messages, tools and an optional response schema, and
//! responses as a sequence of polled events.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod chunk;
mod error;
mod opaque;
mod provider;
mod request;
mod response;

pub use chunk::*;
pub use error::*;
pub use opaque::*;
pub use provider::*;
pub use request::*;
pub use response::*;
