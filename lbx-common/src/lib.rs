//! # LBX Common Library
//!
//! Shared code for the leaderboard extraction crates:
//! - Error type used at configuration and I/O boundaries
//! - TOML configuration loading and config path resolution
//! - Tracing subscriber initialisation

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
