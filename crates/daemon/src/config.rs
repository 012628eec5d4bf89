// Daemon configuration.
//
// Loaded from `~/.atelier/config.toml`, then overridden by environment
// variables: `ATELIER_ROOT`, `ATELIER_BIND`, `ATELIER_TOKENS` (comma
// separated). Missing or unparsable files fall back to defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root directory for Atelier global state: `~/.atelier/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".atelier"))
}

/// Path to the global config file: `~/.atelier/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Parent directory under which every workspace lives.
    pub workspaces_root: PathBuf,
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Accepted bearer tokens. Empty means auth is disabled.
    pub auth_tokens: Vec<String>,
    /// Per-workspace event replay ring capacity.
    pub ring_capacity: usize,
    /// Watcher debounce window in milliseconds.
    pub debounce_ms: u64,
    /// Watcher sweep interval in milliseconds.
    pub sweep_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let workspaces_root =
            global_dir().map(|d| d.join("workspaces")).unwrap_or_else(|| PathBuf::from("workspaces"));
        Self {
            workspaces_root,
            bind_addr: "127.0.0.1:8080".into(),
            auth_tokens: Vec::new(),
            ring_capacity: 200,
            debounce_ms: 200,
            sweep_ms: 100,
        }
    }
}

impl Config {
    /// Load from `~/.atelier/config.toml` and apply environment overrides.
    pub fn load() -> Self {
        let mut config = global_config_path()
            .and_then(|p| Self::load_from(&p).ok())
            .unwrap_or_default();
        config.apply_env_overrides();
        config
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("ATELIER_ROOT") {
            if !root.is_empty() {
                self.workspaces_root = PathBuf::from(root);
            }
        }
        if let Ok(bind) = std::env::var("ATELIER_BIND") {
            if !bind.is_empty() {
                self.bind_addr = bind;
            }
        }
        if let Ok(tokens) = std::env::var("ATELIER_TOKENS") {
            let parsed: Vec<String> = tokens
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
            if !parsed.is_empty() {
                self.auth_tokens = parsed;
            }
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_sensible() {
        let cfg = Config::default();
        assert_eq!(cfg.bind_addr, "127.0.0.1:8080");
        assert!(cfg.auth_tokens.is_empty());
        assert_eq!(cfg.ring_capacity, 200);
        assert_eq!(cfg.debounce_ms, 200);
        assert_eq!(cfg.sweep_ms, 100);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg: Config = toml::from_str("bind_addr = \"0.0.0.0:9000\"").unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:9000");
        assert_eq!(cfg.ring_capacity, 200);
    }

    #[test]
    fn load_from_parses_full_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
workspaces_root = "/data/workspaces"
bind_addr = "127.0.0.1:7000"
auth_tokens = ["secret-a", "secret-b"]
ring_capacity = 500
debounce_ms = 300
sweep_ms = 50
"#,
        )
        .unwrap();

        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.workspaces_root, PathBuf::from("/data/workspaces"));
        assert_eq!(cfg.auth_tokens, vec!["secret-a", "secret-b"]);
        assert_eq!(cfg.ring_capacity, 500);
        assert_eq!(cfg.debounce_ms, 300);
    }

    #[test]
    fn load_from_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load_from(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn token_env_parsing_splits_on_commas() {
        let mut cfg = Config::default();
        // Exercise the parsing path directly rather than mutating process env.
        let parsed: Vec<String> = "a, b,,c"
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();
        cfg.auth_tokens = parsed;
        assert_eq!(cfg.auth_tokens, vec!["a", "b", "c"]);
    }
}
