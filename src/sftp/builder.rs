//! Builder for [`SftpClient`]

use std::sync::Arc;
use std::time::Duration;

use super::client::SftpClient;
use super::error::ClientError;
use super::executor::{ConnectTarget, OperationExecutor};
use super::retry::RetryConfig;
use crate::config::{ClientConfig, Credential, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_TIMEOUT_SECS};
use crate::ssh::{RusshSessionProvider, SessionProvider};

/// Assembles an [`SftpClient`].
///
/// Only the private key is mandatory. Host defaults to `localhost`, port to
/// 22 and username to the current OS user.
///
/// ```no_run
/// # async fn run() -> Result<(), resilient_sftp::sftp::ClientError> {
/// let key = std::fs::read("/home/me/.ssh/id_ed25519").unwrap_or_default();
/// let sftp = resilient_sftp::sftp_client()
///     .host("files.example.com")
///     .username("me")
///     .private_key(key)
///     .build()?;
///
/// for name in sftp.list_directory(".").await? {
///     println!("{}", name);
/// }
/// # Ok(())
/// # }
/// ```
pub struct SftpClientBuilder {
    host: String,
    port: u16,
    username: Option<String>,
    credential: Option<Credential>,
    provider: Option<Arc<dyn SessionProvider>>,
    connect_timeout: Duration,
    retry: RetryConfig,
}

impl SftpClientBuilder {
    pub fn new() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: None,
            credential: None,
            provider: None,
            connect_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryConfig::default(),
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Raw private key bytes (OpenSSH or PEM, unencrypted).
    pub fn private_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.credential = Some(Credential::new(key));
        self
    }

    /// Use `provider` for sessions instead of the russh one.
    pub fn provider(mut self, provider: Arc<dyn SessionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn build(self) -> Result<SftpClient, ClientError> {
        if self.host.is_empty() {
            return Err(ClientError::invalid("Host must not be empty"));
        }
        let credential = match self.credential {
            Some(credential) if !credential.is_empty() => credential,
            _ => return Err(ClientError::invalid("Private key must be provided")),
        };

        let provider = match self.provider {
            Some(provider) => provider,
            None => {
                let provider =
                    RusshSessionProvider::from_key_bytes(credential.as_bytes(), self.connect_timeout)
                        .map_err(|e| ClientError::invalid(format!("Unusable private key: {}", e)))?;
                Arc::new(provider) as Arc<dyn SessionProvider>
            }
        };

        let config = ClientConfig {
            host: self.host,
            port: self.port,
            username: self.username.unwrap_or_else(whoami::username),
            credential,
            connect_timeout: self.connect_timeout,
            retry: self.retry,
        };

        let executor = OperationExecutor::new(
            ConnectTarget {
                host: config.host.clone(),
                port: config.port,
                username: config.username.clone(),
            },
            provider,
            config.retry.clone(),
        );

        Ok(SftpClient::new(config, executor))
    }
}

impl Default for SftpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
