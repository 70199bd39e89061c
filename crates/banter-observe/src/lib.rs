//! Tracing initialization for banter.

pub mod tracing_setup;
