//! Core logic of the travel assistant: conversation types, history
//! building, the model gateway with its tool loop, answer streaming,
//! verification and turn orchestration.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

pub mod conversation;
pub mod gateway;
pub mod history;
mod model_client;
mod orchestrator;
pub mod streaming;
pub mod tool;
pub mod verifier;

pub use conversation::{Exchange, Transcript};
pub use gateway::{Gateway, GatewayBuilder, GatewayError, GenerationConfig};
pub use orchestrator::*;
pub use verifier::{VerificationVerdict, Verifier};
