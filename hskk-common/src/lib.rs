//! # HSKK Common Library
//!
//! Shared code for the HSKK scoring services:
//! - Common error type
//! - TOML bootstrap configuration and config-file resolution

pub mod config;
pub mod error;

pub use error::{Error, Result};
