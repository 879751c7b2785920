//! # vellum-core
//!
//! Value model, documents, field paths and the order-preserving binary
//! codec for VellumDB.
//!
//! This crate implements:
//! - [`Value`]: the tagged union of all types storable in a document
//! - [`Document`]: an insertion-ordered collection of named values
//! - [`Path`]: a dotted path locating a sub-value inside a document
//! - [`encoding`]: the order-preserving codec used for keys and rows

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod document;
pub mod encoding;
pub mod path;
pub mod value;

pub use document::Document;
pub use path::{Path, Segment};
pub use value::{Value, ValueType};
