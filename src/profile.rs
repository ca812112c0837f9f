//! Connection profile storage
//!
//! Lets the command-line front end keep its connection settings on disk.
//! Location: `~/.resilient-sftp/profile.json`, overridable with `--config`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::config::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_TIMEOUT_SECS};
use crate::sftp::{RetryConfig, SftpClientBuilder};

/// Profile loading errors
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("Failed to determine home directory")]
    NoHomeDir,

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid profile {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("No private key configured")]
    NoPrivateKey,
}

/// Connection settings stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    /// Remote host address
    #[serde(default = "default_host")]
    pub host: String,

    /// SSH port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username; the current OS user when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Path to the private key file, `~/` is expanded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<PathBuf>,

    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for ConnectionProfile {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: None,
            private_key_path: None,
            timeout_secs: default_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

/// `~/.resilient-sftp/profile.json`
pub fn default_profile_path() -> Result<PathBuf, ProfileError> {
    dirs::home_dir()
        .map(|home| home.join(".resilient-sftp").join("profile.json"))
        .ok_or(ProfileError::NoHomeDir)
}

impl ConnectionProfile {
    /// Read a profile file.
    pub async fn load(path: &Path) -> Result<Self, ProfileError> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|source| ProfileError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        serde_json::from_str(&contents).map_err(|source| ProfileError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read `path` when given, otherwise the default profile.
    ///
    /// A missing default profile yields the built-in defaults; a missing
    /// explicit one is an error.
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, ProfileError> {
        if let Some(path) = path {
            return Self::load(path).await;
        }

        let path = default_profile_path()?;
        match fs::try_exists(&path).await {
            Ok(true) => Self::load(&path).await,
            _ => {
                tracing::debug!("No profile at {}, using defaults", path.display());
                Ok(Self::default())
            }
        }
    }

    /// Read the configured private key file.
    pub async fn read_private_key(&self) -> Result<Vec<u8>, ProfileError> {
        let path = self
            .private_key_path
            .as_deref()
            .map(expand_home)
            .ok_or(ProfileError::NoPrivateKey)?;

        fs::read(&path)
            .await
            .map_err(|source| ProfileError::Io { path, source })
    }

    /// Start a client builder from this profile. The key is supplied
    /// separately.
    pub fn builder(&self) -> SftpClientBuilder {
        let builder = SftpClientBuilder::new()
            .host(self.host.clone())
            .port(self.port)
            .connect_timeout(Duration::from_secs(self.timeout_secs))
            .retry(self.retry.clone());

        match &self.username {
            Some(username) => builder.username(username.clone()),
            None => builder,
        }
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
