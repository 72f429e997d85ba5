//! Client configuration: built-in defaults, then an optional JSON file, then
//! command-line flags.

use crate::ipc::{REQUEST_ENDPOINT, RESPONSE_ENDPOINT};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "optimise-cli";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Directory holding the service sockets.
    pub socket_dir: PathBuf,
    pub request_endpoint: String,
    pub response_endpoint: String,
    /// Upper bound for the synchronous submission reply.
    #[serde(with = "humantime_serde")]
    pub submit_timeout: Duration,
    /// Upper bound for waiting on every item to resolve; `None` waits forever.
    #[serde(with = "humantime_serde")]
    pub wait_timeout: Option<Duration>,
    /// Command started once when the service cannot be reached.
    pub service_command: Option<Vec<String>>,
    /// Grace period after launching the service before checking again.
    #[serde(with = "humantime_serde")]
    pub launch_settle: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_dir: default_socket_dir(),
            request_endpoint: REQUEST_ENDPOINT.to_string(),
            response_endpoint: RESPONSE_ENDPOINT.to_string(),
            submit_timeout: Duration::from_secs(30),
            wait_timeout: Some(Duration::from_secs(60 * 60)),
            service_command: None,
            launch_settle: Duration::from_secs(1),
        }
    }
}

fn default_socket_dir() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.json"))
}

impl ClientConfig {
    /// Load `path`, or the default config file when it exists, or the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(Self::default()),
            },
        };
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("read config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }
}
