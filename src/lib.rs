//! AUTOSELLER — pump.fun dev-wallet exit bot
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod chain;
pub mod engine;
pub mod storage;
pub mod dashboard;
