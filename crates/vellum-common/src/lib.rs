//! # vellum-common
//!
//! Common error types and constants for VellumDB.
//!
//! This crate provides the foundational abstractions used across all
//! VellumDB components:
//!
//! - **Errors**: the unified [`Error`] enum and the [`Result`] alias
//! - **Constants**: reserved names and key-space limits

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constants;
pub mod error;

pub use error::{Error, Result};
