//! Client configuration

use std::fmt;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::sftp::RetryConfig;

/// Raw private key bytes, wiped from memory on drop.
#[derive(Clone)]
pub struct Credential(Zeroizing<Vec<u8>>);

impl Credential {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(key.into()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential([REDACTED; {} bytes])", self.0.len())
    }
}

/// Everything an [`SftpClient`](crate::sftp::SftpClient) needs to connect.
///
/// Immutable once the client is built.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Remote host address
    pub host: String,

    /// SSH port
    pub port: u16,

    /// Username for authentication
    pub username: String,

    /// Private key for public-key authentication
    pub credential: Credential,

    /// TCP connect plus SSH handshake timeout
    pub connect_timeout: Duration,

    pub retry: RetryConfig,
}

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 22;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
