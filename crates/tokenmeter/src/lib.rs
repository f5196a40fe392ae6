//! tokenmeter — estimate LLM token usage, context overflow, and cost.
//!
//! The crate is organised around one core: a model catalog ([`config`],
//! [`model`]), a set of tokenizer adapters behind a common trait
//! ([`tokenize`]), and the [`service::TokenService`] that every front-end
//! (CLI and HTTP) delegates to.

pub mod config;
pub mod model;
pub mod server;
pub mod service;
pub mod tokenize;
