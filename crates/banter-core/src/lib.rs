//! Response decision and prompt assembly pipeline for banter.
//!
//! This crate holds the engine's brain: the policy that decides whether to
//! engage with a message, the budget-constrained history windowing that
//! builds each prompt, the repetition throttle that stops the backend from
//! echoing itself, and the orchestrator that streams replies back sentence
//! by sentence. Platform adapters and backend clients live elsewhere and
//! are reached only through the traits in [`ports`].

pub mod decide;
pub mod engine;
pub mod image;
pub mod ports;
pub mod prompt;
pub mod repetition;
pub mod sanitize;
pub mod stats;
pub mod template;
