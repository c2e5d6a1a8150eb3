//! jqurl library
//!
//! Fetches a JSON document from the first of several candidate URLs that
//! answers with one, retrying round-robin with a pause between passes and an
//! optional per-user disk cache, then evaluates a jq query over it.
//! The binary is a thin wrapper; the modules are public for integration tests.

pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod fetch;
pub mod output;
pub mod query;
pub mod retry;

pub use error::Error;
