//! Store configuration and factory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use reviewmark_core::memory::MemoryStore;
use reviewmark_core::traits::ReviewStore;

use crate::file::FileStore;
use crate::http::{HttpStore, DEFAULT_TIMEOUT_SECS};

/// Which record store backs the engine.
///
/// Note: Custom Debug impl masks the API token to prevent accidental exposure in logs.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    Http {
        base_url: String,
        #[serde(default)]
        api_token: Option<String>,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    File {
        #[serde(default = "default_store_root")]
        root: PathBuf,
    },
    /// Non-persistent; useful for dry runs.
    Memory,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreConfig::Http {
                base_url,
                api_token,
                timeout_secs,
            } => f
                .debug_struct("Http")
                .field("base_url", base_url)
                .field("api_token", &api_token.as_ref().map(|_| "***"))
                .field("timeout_secs", timeout_secs)
                .finish(),
            StoreConfig::File { root } => f.debug_struct("File").field("root", root).finish(),
            StoreConfig::Memory => f.write_str("Memory"),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::File {
            root: default_store_root(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
fn default_store_root() -> PathBuf {
    PathBuf::from("./reviewmark-data")
}
fn default_autosave_quiet_ms() -> u64 {
    1500
}
fn default_roster_poll_secs() -> u64 {
    5
}

/// Top-level reviewmark configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewmarkConfig {
    #[serde(default)]
    pub store: StoreConfig,
    /// Owner of the rubrics this user pushes and submits against.
    #[serde(default)]
    pub coordinator_id: Option<String>,
    /// Quiet period before an edited rubric is autosaved.
    #[serde(default = "default_autosave_quiet_ms")]
    pub autosave_quiet_ms: u64,
    /// Roster refresh interval.
    #[serde(default = "default_roster_poll_secs")]
    pub roster_poll_secs: u64,
}

impl Default for ReviewmarkConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            coordinator_id: None,
            autosave_quiet_ms: default_autosave_quiet_ms(),
            roster_poll_secs: default_roster_poll_secs(),
        }
    }
}

impl ReviewmarkConfig {
    pub fn autosave_quiet(&self) -> Duration {
        Duration::from_millis(self.autosave_quiet_ms)
    }

    pub fn roster_interval(&self) -> Duration {
        Duration::from_secs(self.roster_poll_secs.max(1))
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let value = std::env::var(&result[start + 2..start + end]).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
    }
    result
}

fn resolve_store_config(config: StoreConfig) -> StoreConfig {
    match config {
        StoreConfig::Http {
            base_url,
            api_token,
            timeout_secs,
        } => StoreConfig::Http {
            base_url: resolve_env_vars(&base_url),
            api_token: api_token.map(|t| resolve_env_vars(&t)),
            timeout_secs,
        },
        StoreConfig::File { root } => StoreConfig::File {
            root: PathBuf::from(resolve_env_vars(&root.to_string_lossy())),
        },
        StoreConfig::Memory => StoreConfig::Memory,
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `reviewmark.toml` in the current directory
/// 2. `~/.config/reviewmark/config.toml`
///
/// Environment variable overrides: `REVIEWMARK_BASE_URL`, `REVIEWMARK_API_TOKEN`.
pub fn load_config() -> Result<ReviewmarkConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ReviewmarkConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("reviewmark.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|dir| dir.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            let config = toml::from_str::<ReviewmarkConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded config");
            config
        }
        None => ReviewmarkConfig::default(),
    };

    apply_env_overrides(
        &mut config,
        std::env::var("REVIEWMARK_BASE_URL").ok(),
        std::env::var("REVIEWMARK_API_TOKEN").ok(),
    );
    config.store = resolve_store_config(config.store);

    Ok(config)
}

/// A base URL override switches any store to HTTP; a token override only
/// applies to an HTTP store.
fn apply_env_overrides(
    config: &mut ReviewmarkConfig,
    base_url: Option<String>,
    api_token: Option<String>,
) {
    if let Some(url) = base_url {
        match &mut config.store {
            StoreConfig::Http { base_url, .. } => *base_url = url,
            other => {
                *other = StoreConfig::Http {
                    base_url: url,
                    api_token: None,
                    timeout_secs: default_timeout_secs(),
                }
            }
        }
    }
    if let (Some(token), StoreConfig::Http { api_token, .. }) = (api_token, &mut config.store) {
        *api_token = Some(token);
    }
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("reviewmark"))
}

/// Create a store instance from its configuration.
pub fn create_store(config: &StoreConfig) -> Result<Box<dyn ReviewStore>> {
    match config {
        StoreConfig::Http {
            base_url,
            api_token,
            timeout_secs,
        } => Ok(Box::new(HttpStore::new(
            base_url,
            api_token.clone(),
            *timeout_secs,
        )?)),
        StoreConfig::File { root } => Ok(Box::new(FileStore::new(root.clone()))),
        StoreConfig::Memory => Ok(Box::new(MemoryStore::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_REVIEWMARK_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_REVIEWMARK_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_REVIEWMARK_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env_vars("no refs"), "no refs");
        std::env::remove_var("_REVIEWMARK_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = ReviewmarkConfig::default();
        assert_eq!(config.autosave_quiet(), Duration::from_millis(1500));
        assert_eq!(config.roster_interval(), Duration::from_secs(5));
        assert!(matches!(config.store, StoreConfig::File { .. }));
    }

    #[test]
    fn parse_http_config() {
        let toml_str = r#"
coordinator_id = "coord-01"
roster_poll_secs = 10

[store]
type = "http"
base_url = "https://reviews.example.edu/api"
api_token = "secret-token"
"#;
        let config: ReviewmarkConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.coordinator_id.as_deref(), Some("coord-01"));
        assert_eq!(config.autosave_quiet_ms, 1500);
        assert_eq!(config.roster_poll_secs, 10);
        match &config.store {
            StoreConfig::Http { timeout_secs, .. } => assert_eq!(*timeout_secs, 30),
            other => panic!("expected http store, got {other:?}"),
        }
    }

    #[test]
    fn debug_masks_token() {
        let config = StoreConfig::Http {
            base_url: "https://x".into(),
            api_token: Some("secret-token".into()),
            timeout_secs: 30,
        };
        let shown = format!("{config:?}");
        assert!(!shown.contains("secret-token"));
        assert!(shown.contains("***"));
    }

    #[test]
    fn env_overrides() {
        let mut config = ReviewmarkConfig::default();
        apply_env_overrides(&mut config, None, Some("ignored".into()));
        assert!(matches!(config.store, StoreConfig::File { .. }));

        apply_env_overrides(
            &mut config,
            Some("https://override".into()),
            Some("tok".into()),
        );
        assert_eq!(
            config.store,
            StoreConfig::Http {
                base_url: "https://override".into(),
                api_token: Some("tok".into()),
                timeout_secs: 30,
            }
        );
    }

    #[test]
    fn load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviewmark.toml");
        std::fs::write(&path, "[store]\ntype = \"memory\"\n").unwrap();

        let config = load_config_from(Some(&path)).unwrap();
        // REVIEWMARK_BASE_URL in the test environment would switch this to http
        if std::env::var("REVIEWMARK_BASE_URL").is_err() {
            assert_eq!(config.store, StoreConfig::Memory);
        }
        assert!(load_config_from(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn create_each_store() {
        assert_eq!(create_store(&StoreConfig::Memory).unwrap().name(), "memory");
        let dir = tempfile::tempdir().unwrap();
        let file = StoreConfig::File {
            root: dir.path().to_path_buf(),
        };
        assert_eq!(create_store(&file).unwrap().name(), "file");
        let http = StoreConfig::Http {
            base_url: "http://localhost:8080".into(),
            api_token: None,
            timeout_secs: 5,
        };
        assert_eq!(create_store(&http).unwrap().name(), "http");
    }
}
