//! # Arsenal Library
//!
//! The HTTP server, CLI and configuration behind the `arsenal` binary,
//! exposed as a library for integration tests.

pub mod api;
pub mod cli;
pub mod config;

pub use arsenal_core;
