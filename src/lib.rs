//! DICEPOT — group dice-wager round engine.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod error;
pub mod ports;
pub mod engine;
pub mod storage;
pub mod dashboard;
