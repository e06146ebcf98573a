//! Shared primitives for the Physalia channel-codec workspace.
//!
//! `physalia-core` provides the foundation the other Physalia crates build on:
//!
//! - **Error types** — [`PhysaliaError`] and [`Result`] for structured error handling
//! - **Log-space arithmetic** — the [`logspace`] helpers used by every probability model

pub mod error;
pub mod logspace;

pub use error::{PhysaliaError, Result};
