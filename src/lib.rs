//! Client for a local media optimisation service.
//!
//! A run resolves the requested items, submits them as one batch over a local
//! socket, then (unless fire-and-forget) tracks per-item progress and results
//! until every item has resolved.

pub mod aggregator;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod input;
pub mod ipc;
pub mod logging;
pub mod model;
pub mod output;
pub mod progress;
pub mod service;
pub mod session;
pub mod summary;
