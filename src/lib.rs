//! DEXARB: cross-DEX arbitrage detection core
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod providers;
pub mod exchanges;
pub mod engine;
pub mod storage;
