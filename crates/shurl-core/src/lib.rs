//! Core types and traits for the shurl link store.
//!
//! This crate holds the [`Link`] record, the [`LinkStore`] contract shared by
//! every storage engine, the [`Tokenizer`] contract and the diagnostic
//! [`Context`] / [`Error`] model threaded through all of them.

pub mod context;
pub mod error;
pub mod link;
pub mod store;
pub mod tokenizer;

pub use context::{Context, Operations};
pub use error::{truncate, BoxError, Cause, Error, Kind, Result, Severity};
pub use link::Link;
pub use store::{Created, LinkStore};
pub use tokenizer::{Tokenizer, TokenizerError};
