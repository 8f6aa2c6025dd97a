//! Utility modules shared across the updater.

pub mod progress;

pub use progress::{ProgressBar, ProgressStyle};
