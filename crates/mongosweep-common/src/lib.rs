//! Common utilities for mongosweep
//!
//! This crate provides the shared error type used across all mongosweep crates.

pub mod error;

pub use error::{Result, SweepError};
