//! SNIPER: launch discovery, admission and position-lifecycle engine.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod venues;
pub mod strategy;
pub mod engine;
pub mod storage;
