//! Configuration loading with multi-layer merge

use crate::memory::SeedSet;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level entity-memory configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Listening socket for `serve`
    #[serde(default)]
    pub server: ServerConfig,

    /// Backing file
    #[serde(default)]
    pub store: StoreConfig,

    /// Where client commands send requests
    #[serde(default)]
    pub client: ClientConfig,

    /// Bootstrap data for `init` and `POST /memory/initialize`.
    /// Replaces the built-in project seed when present.
    #[serde(default)]
    pub seed: Option<SeedSet>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allow cross-origin browser calls
    #[serde(default = "default_true")]
    pub cors: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// JSON file path; `~` is expanded
    #[serde(default = "default_store_path")]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default = "default_url")]
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3100
}

fn default_true() -> bool {
    true
}

fn default_store_path() -> String {
    "memory.json".to_string()
}

fn default_url() -> String {
    format!("http://localhost:{}", default_port())
}

fn default_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors: true,
        }
    }
}

impl ServerConfig {
    /// `host:port` for binding
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl StoreConfig {
    /// The store path with `~` expanded
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).into_owned())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            timeout: default_timeout(),
        }
    }
}

/// Values given on the command line; these beat every file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub file: Option<PathBuf>,
    pub url: Option<String>,
}

impl MemoryConfig {
    /// Load configuration from the standard hierarchy
    ///
    /// Load order (later overrides earlier):
    /// 1. Built-in defaults
    /// 2. ~/.config/entity-memory/config.toml
    /// 3. .entity-memory/config.toml (project)
    /// 4. `explicit`, if given (must exist)
    pub fn load(project_dir: Option<&Path>, explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        // Load user config
        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                let user_config = Self::load_file(&user_config_path)
                    .with_context(|| format!("loading {}", user_config_path.display()))?;
                config.merge(user_config);
            }
        }

        // Load project config
        let project_config_path = project_dir
            .map(|p| p.join(".entity-memory/config.toml"))
            .unwrap_or_else(|| PathBuf::from(".entity-memory/config.toml"));

        if project_config_path.exists() {
            let project_config = Self::load_file(&project_config_path)
                .with_context(|| format!("loading {}", project_config_path.display()))?;
            config.merge(project_config);
        }

        if let Some(path) = explicit {
            let explicit_config = Self::load_file(path)?;
            config.merge(explicit_config);
        }

        tracing::debug!(?config, "Configuration loaded");
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Get the user config path (~/.config/entity-memory/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("entity-memory/config.toml"))
    }

    /// Merge another config into this one (other takes precedence for any
    /// value it sets away from the default)
    pub fn merge(&mut self, other: Self) {
        let defaults = Self::default();

        if other.server.host != defaults.server.host {
            self.server.host = other.server.host;
        }
        if other.server.port != defaults.server.port {
            self.server.port = other.server.port;
        }
        if !other.server.cors {
            self.server.cors = false;
        }

        if other.store.path != defaults.store.path {
            self.store.path = other.store.path;
        }

        if other.client.url != defaults.client.url {
            self.client.url = other.client.url;
        }
        if other.client.timeout != defaults.client.timeout {
            self.client.timeout = other.client.timeout;
        }

        if other.seed.is_some() {
            self.seed = other.seed;
        }
    }

    /// Apply command-line values. A port without a url also points the
    /// client at that port on localhost.
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(port) = overrides.port {
            self.server.port = port;
            if overrides.url.is_none() {
                self.client.url = format!("http://localhost:{}", port);
            }
        }
        if let Some(ref file) = overrides.file {
            self.store.path = file.to_string_lossy().into_owned();
        }
        if let Some(ref url) = overrides.url {
            self.client.url = url.clone();
        }
    }

    /// Seed set in effect: configured, or the built-in project seed
    pub fn seed_set(&self) -> SeedSet {
        self.seed.clone().unwrap_or_default()
    }

    /// Check values serde can't; reports every problem at once
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.host.trim().is_empty() {
            errors.push("server.host must not be empty".to_string());
        }
        if self.store.path.trim().is_empty() {
            errors.push("store.path must not be empty".to_string());
        }
        if !(self.client.url.starts_with("http://") || self.client.url.starts_with("https://")) {
            errors.push(format!(
                "client.url '{}' must start with http:// or https://",
                self.client.url
            ));
        }
        if self.client.timeout == 0 {
            errors.push("client.timeout must be at least 1 second".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
