//! Core types shared across the updater.
//!
//! Currently this is the error taxonomy and its user-facing rendering; see
//! [`error`].

pub mod error;

pub use error::{CatalogError, ErrorContext, UpdateError, user_friendly_error};
