//! Configuration: an optional TOML file plus environment overrides.
//!
//! ```toml
//! [corpus]
//! root = "./reading"
//!
//! [server]
//! bind = "127.0.0.1:3000"
//! max_upload_bytes = 52428800
//! mode = "production"
//!
//! [proxy]
//! upstream = "http://127.0.0.1:8000"
//! ```
//!
//! Environment variables win over the file:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `DOCSHELF_CORPUS_DIR` | `corpus.root` |
//! | `DOCS_URL` | `corpus.root`, when `DOCSHELF_CORPUS_DIR` is unset |
//! | `DOCSHELF_BIND` | `server.bind` |
//! | `DOCSHELF_ENV` | `server.mode` |
//! | `RAG_SERVICE_URL` | `proxy.upstream` |

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const ENV_CORPUS_DIR: &str = "DOCSHELF_CORPUS_DIR";
/// Older name for [`ENV_CORPUS_DIR`], still honoured by deployments.
pub const ENV_CORPUS_DIR_ALIAS: &str = "DOCS_URL";
pub const ENV_BIND: &str = "DOCSHELF_BIND";
pub const ENV_MODE: &str = "DOCSHELF_ENV";
pub const ENV_UPSTREAM: &str = "RAG_SERVICE_URL";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("./reading")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default)]
    pub mode: RunMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
            mode: RunMode::default(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}
fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

/// Controls how much of an internal error reaches the client.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Production,
    Development,
}

impl RunMode {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(RunMode::Production),
            "development" | "dev" | "test" => Ok(RunMode::Development),
            other => bail!(
                "Unknown run mode: '{}'. Must be production or development.",
                other
            ),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProxyConfig {
    /// Base URL of the question-answering service. `/ask` is disabled when unset.
    #[serde(default)]
    pub upstream: Option<String>,
}

impl Config {
    /// Applies environment overrides through `lookup`, so tests need not touch
    /// the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let root = lookup(ENV_CORPUS_DIR)
            .filter(|v| !v.is_empty())
            .or_else(|| lookup(ENV_CORPUS_DIR_ALIAS).filter(|v| !v.is_empty()));
        if let Some(root) = root {
            self.corpus.root = PathBuf::from(root);
        }
        if let Some(bind) = lookup(ENV_BIND).filter(|v| !v.is_empty()) {
            self.server.bind = bind;
        }
        if let Some(mode) = lookup(ENV_MODE).filter(|v| !v.is_empty()) {
            self.server.mode = RunMode::parse(&mode)?;
        }
        if let Some(upstream) = lookup(ENV_UPSTREAM).filter(|v| !v.is_empty()) {
            self.proxy.upstream = Some(upstream);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.server.bind.trim().is_empty() {
            bail!("server.bind must not be empty");
        }
        if self.server.max_upload_bytes == 0 {
            bail!("server.max_upload_bytes must be > 0");
        }
        if self.corpus.root.as_os_str().is_empty() {
            bail!("corpus.root must not be empty");
        }
        if let Some(upstream) = &self.proxy.upstream {
            if !(upstream.starts_with("http://") || upstream.starts_with("https://")) {
                bail!("proxy.upstream must be an http(s) URL, got '{}'", upstream);
            }
        }
        Ok(())
    }
}

/// Loads the config file (when given), then the process environment.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => parse_config_file(path)?,
        None => Config::default(),
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

fn parse_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content).with_context(|| "Failed to parse config file")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_file() {
        let config = Config::default();
        assert_eq!(config.corpus.root, PathBuf::from("./reading"));
        assert_eq!(config.server.bind, "127.0.0.1:3000");
        assert_eq!(config.server.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(config.server.mode, RunMode::Production);
        assert!(config.proxy.upstream.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn file_sections_are_optional() {
        let config: Config = toml::from_str("[server]\nmode = \"development\"\n").unwrap();
        assert_eq!(config.server.mode, RunMode::Development);
        assert_eq!(config.server.bind, "127.0.0.1:3000");
        assert_eq!(config.corpus.root, PathBuf::from("./reading"));
    }

    #[test]
    fn env_overrides_file() {
        let mut config: Config = toml::from_str("[corpus]\nroot = \"/srv/docs\"\n").unwrap();
        config
            .apply_env(env(&[
                (ENV_CORPUS_DIR, "/data/reading"),
                (ENV_MODE, "development"),
                (ENV_UPSTREAM, "http://rag:8000"),
            ]))
            .unwrap();
        assert_eq!(config.corpus.root, PathBuf::from("/data/reading"));
        assert_eq!(config.server.mode, RunMode::Development);
        assert_eq!(config.proxy.upstream.as_deref(), Some("http://rag:8000"));
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env(env(&[(ENV_CORPUS_DIR, "")])).unwrap();
        assert_eq!(config.corpus.root, PathBuf::from("./reading"));
    }

    #[test]
    fn docs_url_sets_corpus_root() {
        let mut config = Config::default();
        config
            .apply_env(env(&[(ENV_CORPUS_DIR_ALIAS, "/srv/docs")]))
            .unwrap();
        assert_eq!(config.corpus.root, PathBuf::from("/srv/docs"));
    }

    #[test]
    fn corpus_dir_wins_over_docs_url() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                (ENV_CORPUS_DIR, "/srv/primary"),
                (ENV_CORPUS_DIR_ALIAS, "/srv/legacy"),
            ]))
            .unwrap();
        assert_eq!(config.corpus.root, PathBuf::from("/srv/primary"));

        let mut config = Config::default();
        config
            .apply_env(env(&[(ENV_CORPUS_DIR, ""), (ENV_CORPUS_DIR_ALIAS, "/srv/legacy")]))
            .unwrap();
        assert_eq!(config.corpus.root, PathBuf::from("/srv/legacy"));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[(ENV_MODE, "staging")]))
            .unwrap_err();
        assert!(err.to_string().contains("Unknown run mode"));
    }

    #[test]
    fn upstream_must_be_http() {
        let mut config = Config::default();
        config.proxy.upstream = Some("ftp://rag".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_upload_limit_is_rejected() {
        let mut config = Config::default();
        config.server.max_upload_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config(Some(Path::new("/nonexistent/docshelf.toml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/docshelf.toml"));
    }
}
