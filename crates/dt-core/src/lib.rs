//! Core types and trait definitions for the community tracker.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Storage backends implement [`store::CommunityStore`]; the HTTP layer and
//! the server binary depend only on that abstraction.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod document;
pub mod error;
pub mod group;
pub mod list;
pub mod name_index;
pub mod notify;
pub mod person;
pub mod rule;
pub mod store;

pub use error::{Error, Result};
