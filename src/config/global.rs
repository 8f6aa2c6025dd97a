//! Updater configuration file.
//!
//! The configuration lives in a single TOML file that the kiosk image ships
//! next to the application or in the user's config directory:
//!
//! - **Linux**: `~/.config/kiosk-updater/config.toml`
//! - **macOS**: `~/Library/Application Support/kiosk-updater/config.toml`
//! - **Windows**: `%APPDATA%\kiosk-updater\config.toml`
//!
//! The location can be overridden with `--config` or the
//! `KIOSK_UPDATER_CONFIG` environment variable. Every field has a default,
//! so a missing file yields a usable (if disabled) configuration.
//!
//! ```toml
//! product_name = "Touch+ software"
//! install_path = "~/touch-plus"
//!
//! [update]
//! enabled = true
//! check_interval = 3600
//!
//! [catalog]
//! type = "http"
//! url = "https://touch-plus.s3.amazonaws.com"
//!
//! [companion]
//! process_name = "daemon_plus"
//! ipc_dir = "/tmp/touch-plus-ipc"
//! ```

use crate::constants::{CONFIG_PATH_ENV, DEFAULT_COMPANION_PROCESS, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::updater::config::UpdateConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

fn default_product_name() -> String {
    "The application".to_string()
}

const fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

/// Top-level updater configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdaterConfig {
    /// Name used in user-facing notifications ("A new version of X is available").
    #[serde(default = "default_product_name")]
    pub product_name: String,

    /// Install directory of the running application.
    ///
    /// When absent, the directory containing the updater executable is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_path: Option<String>,

    /// Timeout applied to every catalog request, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Update timing and behaviour.
    #[serde(default)]
    pub update: UpdateConfig,

    /// Where updates are published.
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Companion process that must exit before installing.
    #[serde(default)]
    pub companion: CompanionConfig,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            product_name: default_product_name(),
            install_path: None,
            request_timeout: default_request_timeout(),
            update: UpdateConfig::default(),
            catalog: CatalogConfig::default(),
            companion: CompanionConfig::default(),
        }
    }
}

/// Location of the update catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CatalogConfig {
    /// S3-compatible bucket reachable over HTTP(S).
    Http {
        /// Bucket endpoint, e.g. `https://bucket.s3.amazonaws.com`.
        url: String,
    },
    /// Directory mirror whose relative paths are the keys.
    Local {
        /// Root directory of the mirror. `~` is expanded.
        path: String,
    },
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self::Http {
            url: "http://localhost:9000/updates".to_string(),
        }
    }
}

impl CatalogConfig {
    /// Human-readable location for status output.
    #[must_use]
    pub fn location(&self) -> &str {
        match self {
            Self::Http { url } => url,
            Self::Local { path } => path,
        }
    }
}

fn default_process_name() -> String {
    DEFAULT_COMPANION_PROCESS.to_string()
}

fn default_ipc_dir() -> String {
    std::env::temp_dir().join("kiosk-updater-ipc").to_string_lossy().into_owned()
}

/// Companion process settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompanionConfig {
    /// Name the companion listens under.
    #[serde(default = "default_process_name")]
    pub process_name: String,

    /// Directory used for file-drop signals. `~` is expanded.
    #[serde(default = "default_ipc_dir")]
    pub ipc_dir: String,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            process_name: default_process_name(),
            ipc_dir: default_ipc_dir(),
        }
    }
}

impl UpdaterConfig {
    /// Load from the default location, falling back to defaults when the
    /// file does not exist.
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Load from `path` if given, otherwise from [`Self::default_path`].
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            tracing::debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration from {}", path.display()))
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write configuration to {}", path.display()))
    }

    /// Default configuration file path.
    ///
    /// `KIOSK_UPDATER_CONFIG` takes precedence over the platform config dir.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine configuration directory"))?;

        Ok(config_dir.join("kiosk-updater").join("config.toml"))
    }

    /// Resolve the install directory.
    ///
    /// `override_path` (from the command line) wins over the file; without
    /// either, the directory of the running executable is used.
    pub fn resolve_install_path(&self, override_path: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = override_path {
            return Ok(path.to_path_buf());
        }

        if let Some(path) = &self.install_path {
            return expand_path(path);
        }

        let exe = std::env::current_exe().context("Failed to locate the running executable")?;
        exe.parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| anyhow::anyhow!("Executable {} has no parent directory", exe.display()))
    }

    /// Companion IPC directory with `~` expanded.
    pub fn ipc_dir(&self) -> Result<PathBuf> {
        expand_path(&self.companion.ipc_dir)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Example configuration written by `kiosk-updater config --init`.
    #[must_use]
    pub fn init_example() -> Self {
        Self {
            product_name: "Touch+ software".to_string(),
            install_path: Some("~/touch-plus".to_string()),
            catalog: CatalogConfig::Http {
                url: "https://touch-plus.s3.amazonaws.com".to_string(),
            },
            update: UpdateConfig {
                enabled: true,
                ..UpdateConfig::default()
            },
            ..Self::default()
        }
    }
}

/// Expand `~` and environment variables in a configured path.
pub fn expand_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path)
        .with_context(|| format!("Failed to expand path '{path}'"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = UpdaterConfig::load_with_optional(Some(temp.path().join("absent.toml")))
            .await
            .unwrap();
        assert_eq!(config, UpdaterConfig::default());
        assert!(!config.update.enabled);
    }

    #[tokio::test]
    async fn test_save_load_roundtrip_of_example() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        let config = UpdaterConfig::init_example();
        config.save_to(&path).await.unwrap();

        let loaded = UpdaterConfig::load_from(&path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_partial_file_fills_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        tokio::fs::write(
            &path,
            r#"
[catalog]
type = "local"
path = "/srv/mirror"

[update]
enabled = true
"#,
        )
        .await
        .unwrap();

        let config = UpdaterConfig::load_from(&path).await.unwrap();
        assert_eq!(
            config.catalog,
            CatalogConfig::Local {
                path: "/srv/mirror".to_string()
            }
        );
        assert!(config.update.enabled);
        assert_eq!(config.update.check_interval, 3600);
        assert_eq!(config.companion.process_name, "daemon_plus");
        assert_eq!(config.request_timeout, 30);
    }

    #[tokio::test]
    async fn test_invalid_toml_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        tokio::fs::write(&path, "update = [").await.unwrap();

        let err = UpdaterConfig::load_from(&path).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse configuration"));
    }

    #[test]
    fn test_install_path_override_wins() {
        let config = UpdaterConfig {
            install_path: Some("/opt/app".to_string()),
            ..UpdaterConfig::default()
        };
        let resolved = config.resolve_install_path(Some(Path::new("/tmp/other"))).unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/other"));

        let resolved = config.resolve_install_path(None).unwrap();
        assert_eq!(resolved, PathBuf::from("/opt/app"));
    }

    #[test]
    #[serial]
    fn test_tilde_is_expanded() {
        let expanded = expand_path("~/kiosk").unwrap();
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.ends_with("kiosk"));
    }

    #[test]
    #[serial]
    fn test_environment_variable_is_expanded() {
        const VAR: &str = "KIOSK_UPDATER_TEST_ROOT";
        // SAFETY: every test that touches the environment is serialized.
        unsafe { std::env::set_var(VAR, "/srv/kiosk") };
        let expanded = expand_path("$KIOSK_UPDATER_TEST_ROOT/ipc");
        unsafe { std::env::remove_var(VAR) };

        assert_eq!(expanded.unwrap(), PathBuf::from("/srv/kiosk/ipc"));
    }

    #[test]
    #[serial]
    fn test_unset_variable_is_an_error() {
        assert!(expand_path("$KIOSK_UPDATER_UNSET_FOR_TESTS/ipc").is_err());
    }
}
