//! Core library for the triangular-arbitrage project.
//!
//! Detection (`arbitrage`) is pure and synchronous; everything that talks to
//! the exchange goes through the traits in `cex`, so the scan loop and the
//! execution engine can be driven by the live client, the simulated gateway
//! or the in-crate mocks.

pub mod arbitrage;
pub mod cex;
pub mod config;
pub mod errors;
pub mod executor;
pub mod models;
pub mod scanner;
pub mod storage;
pub mod utils;
