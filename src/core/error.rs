//! Error handling for the updater
//!
//! Two layers, the same way the rest of the crate is split:
//! - [`CatalogError`] and [`UpdateError`] are strongly-typed `thiserror` enums
//!   returned by the library.
//! - [`ErrorContext`] wraps any failure that reaches the CLI with a
//!   user-facing message, optional details and an actionable suggestion.
//!
//! # Error Categories
//!
//! - **Network-class**: [`UpdateError::CatalogList`], [`UpdateError::CatalogRead`],
//!   [`UpdateError::CatalogDownload`]. The coordinator recovers from these
//!   locally and only reports them when the user asked for the check.
//! - **Local state**: [`UpdateError::VersionMarker`], [`UpdateError::Config`].
//! - **Install phase**: [`UpdateError::Extraction`], [`UpdateError::Delete`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use kiosk_updater::core::{ErrorContext, user_friendly_error};
//!
//! fn run() -> anyhow::Result<()> {
//!     anyhow::bail!("boom")
//! }
//!
//! if let Err(e) = run() {
//!     let ctx = user_friendly_error(e);
//!     ctx.display();
//! }
//! ```

use colored::Colorize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a [`RemoteCatalog`](crate::catalog::RemoteCatalog) implementation.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The HTTP transport failed (DNS, TLS, timeout, connection reset).
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The requested key does not exist in the catalog.
    #[error("key '{key}' not found in catalog")]
    MissingKey { key: String },

    /// The listing response could not be understood.
    #[error("invalid catalog listing: {reason}")]
    InvalidListing { reason: String },

    /// Local filesystem failure while reading or writing catalog data.
    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CatalogError {
    /// Builds an [`CatalogError::Io`] for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// The main error type for update operations.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// Listing remote keys failed.
    #[error("Failed to list update catalog")]
    CatalogList(#[source] CatalogError),

    /// Reading a remote text key failed.
    #[error("Failed to read '{key}' from update catalog")]
    CatalogRead {
        key: String,
        #[source]
        source: CatalogError,
    },

    /// Downloading the patch archive failed.
    #[error("Failed to download '{key}'")]
    CatalogDownload {
        key: String,
        #[source]
        source: CatalogError,
    },

    /// The local version marker is missing or unreadable.
    #[error("Cannot read version marker {}", path.display())]
    VersionMarker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Extracting the archive over the install directory failed.
    #[error("Failed to extract {} into {}: {reason}", archive.display(), destination.display())]
    Extraction {
        archive: PathBuf,
        destination: PathBuf,
        reason: String,
    },

    /// The downloaded archive could not be removed after extraction.
    #[error("Failed to delete downloaded archive {}", path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {message}")]
    Config { message: String },

}

impl UpdateError {
    /// Whether this failure is transient and network-class.
    ///
    /// Network-class failures are swallowed for automatic checks.
    pub const fn is_network(&self) -> bool {
        matches!(
            self,
            Self::CatalogList(_) | Self::CatalogRead { .. } | Self::CatalogDownload { .. }
        )
    }

    /// Whether this failure happened while touching the install directory.
    pub const fn is_install_phase(&self) -> bool {
        matches!(self, Self::Extraction { .. } | Self::Delete { .. })
    }
}

/// Error context wrapper that adds a suggestion and details to a failure.
#[derive(Debug)]
pub struct ErrorContext {
    /// The primary error message shown to the user.
    pub message: String,
    /// Optional suggestion for resolving the error.
    pub suggestion: Option<String>,
    /// Optional additional details about the error.
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors.
    ///
    /// Error message is red and bold, details yellow, suggestion green.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with a suggestion when the
/// failure is recognised.
///
/// Walks the whole `anyhow` chain so errors wrapped in `.context(...)` are
/// still matched.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    for cause in error.chain() {
        if let Some(update_error) = cause.downcast_ref::<UpdateError>() {
            return context_for_update_error(update_error, &error);
        }

        if let Some(toml_error) = cause.downcast_ref::<toml::de::Error>() {
            return ErrorContext::new(format!("{error:#}"))
                .with_details(toml_error.message().to_string())
                .with_suggestion("Fix the configuration file syntax or run `kiosk-updater config --init`");
        }

        if let Some(io_error) = cause.downcast_ref::<std::io::Error>()
            && io_error.kind() == std::io::ErrorKind::PermissionDenied
        {
            return ErrorContext::new(format!("{error:#}")).with_suggestion(
                "Check that the updater can write to the install directory (run it as the kiosk user)",
            );
        }
    }

    ErrorContext::new(format!("{error:#}"))
}

fn context_for_update_error(update_error: &UpdateError, error: &anyhow::Error) -> ErrorContext {
    let ctx = ErrorContext::new(format!("{error:#}"));
    match update_error {
        UpdateError::CatalogList(_)
        | UpdateError::CatalogRead { .. }
        | UpdateError::CatalogDownload { .. } => {
            ctx.with_suggestion("Please check your internet connection and the catalog URL")
        }
        UpdateError::VersionMarker { path, .. } => ctx
            .with_details(format!("Expected the installed version on the first line of {}", path.display()))
            .with_suggestion("Pass --install-path or set install_path in the configuration"),
        UpdateError::Extraction { .. } | UpdateError::Delete { .. } => ctx
            .with_details("The install directory may be partially updated")
            .with_suggestion("Run `kiosk-updater check` again once the companion process has exited"),
        UpdateError::Config { .. } => {
            ctx.with_suggestion("Run `kiosk-updater config` to inspect the effective configuration")
        }
    }
}
