//! Link service and command-line front end.
//!
//! [`LinkService`] combines a [`LinkStore`](shurl_core::LinkStore) with a
//! [`Tokenizer`](shurl_core::Tokenizer) and owns the business rules neither
//! of them knows about: URL validation, access gating on redirects and the
//! compensating delete when a fresh id cannot be encoded.

pub mod error;
pub mod service;

pub use error::CompensationFailed;
pub use service::{LinkService, TokenCreated};
