//! Shared domain types for banter.
//!
//! This crate defines the data shapes used across the workspace: platform
//! messages, response decisions, configuration, and error taxonomies. It
//! never depends on any other banter crate.

pub mod config;
pub mod decision;
pub mod error;
pub mod message;
