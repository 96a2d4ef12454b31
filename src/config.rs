use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::GridnotesError;

/// Config file read when `GRIDNOTES_CONFIG` is not set.
pub const DEFAULT_CONFIG_FILE: &str = "gridnotes.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding the log and lock files.
    pub data_dir: PathBuf,
    pub log_file: String,
    pub lock_file: String,
    /// Address the comment server binds to.
    pub listen: String,
    /// Give up acquiring the store lock after this long and report busy.
    pub lock_timeout_ms: u64,
    /// Longest accepted request line.
    pub max_request_bytes: usize,
    /// Base URL for issue references in comments, e.g.
    /// `https://issues.example.com/browse/`. Unset leaves references as text.
    pub issue_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            log_file: "comments.log".to_string(),
            lock_file: ".lock".to_string(),
            listen: "127.0.0.1:7878".to_string(),
            lock_timeout_ms: 5000,
            max_request_bytes: 1024 * 1024,
            issue_url: None,
        }
    }
}

impl Config {
    /// Defaults, then the TOML file (if present), then the environment.
    pub fn load() -> Result<Self, GridnotesError> {
        let path = env::var("GRIDNOTES_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let mut config = if Path::new(&path).exists() {
            Self::from_file(Path::new(&path))?
        } else {
            tracing::debug!("no config file at {path}, using defaults");
            Self::default()
        };
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, GridnotesError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| GridnotesError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, GridnotesError> {
        toml::from_str(text).map_err(|e| GridnotesError::Config(e.to_string()))
    }

    /// Override fields from environment variables. `lookup` is `env::var` in
    /// production and a map in tests.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), GridnotesError> {
        if let Some(dir) = lookup("GRIDNOTES_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(listen) = lookup("GRIDNOTES_LISTEN") {
            self.listen = listen;
        }
        if let Some(ms) = lookup("GRIDNOTES_LOCK_TIMEOUT_MS") {
            self.lock_timeout_ms = ms.trim().parse().map_err(|_| {
                GridnotesError::Config(format!("GRIDNOTES_LOCK_TIMEOUT_MS is not a number: {ms}"))
            })?;
        }
        if let Some(url) = lookup("GRIDNOTES_ISSUE_URL") {
            self.issue_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if self.lock_timeout_ms == 0 {
            tracing::warn!("lock_timeout_ms is 0, every contended request will report busy");
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, GridnotesError> {
        self.listen
            .parse()
            .map_err(|e| GridnotesError::Config(format!("bad listen address {}: {e}", self.listen)))
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(&self.log_file)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join(&self.lock_file)
    }
}
