// Copyright 2025 Runlens Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Runlens Server Configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    /// HTTP API listen address (e.g., "127.0.0.1:47700")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Enable CORS (the dashboard is usually served from another origin)
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            enable_cors: default_enable_cors(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory holding one subdirectory per run, each with a
    /// metrics.json
    #[serde(default = "default_metrics_dir")]
    pub metrics_dir: PathBuf,

    /// Seconds to serve a loaded snapshot before re-reading from disk
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            metrics_dir: default_metrics_dir(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:47700".to_string()
}

fn default_enable_cors() -> bool {
    true
}

fn default_metrics_dir() -> PathBuf {
    PathBuf::from("./metrics-data")
}

fn default_cache_ttl_secs() -> u64 {
    30
}

impl ServerConfig {
    /// Load configuration from a TOML file, or defaults when no file is
    /// given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("parsing config file {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.server
            .listen_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid listen address `{}`", self.server.listen_addr))?;
        Ok(())
    }
}
