//! Interview session engine
//!
//! Runs candidate code against test cases in a sandbox, scores its quality
//! with static heuristics and drives tiered hints for concurrent interview
//! sessions served over WebSocket.

pub mod analyzer;
pub mod catalog;
pub mod compiler;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod executor;
pub mod feedback;
pub mod hints;
pub mod languages;
pub mod runner;
pub mod server;
pub mod session;
pub mod store;
pub mod toolchain;
