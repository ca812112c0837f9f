//! SSH session provider backed by russh

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::ssh_key::HashAlg;
use russh::keys::{PrivateKey, PublicKey};
use russh::Disconnect;
use tracing::{debug, info};

use super::channel::RusshSftpChannel;
use super::error::SshError;
use super::provider::{ChannelKind, Session, SessionProvider, SftpChannel};

/// Creates russh sessions that authenticate with one in-memory private key.
pub struct RusshSessionProvider {
    key: Arc<PrivateKey>,
    connect_timeout: Duration,
}

impl RusshSessionProvider {
    /// Parse an OpenSSH/PEM private key held in memory.
    ///
    /// Encrypted keys are not supported; the key is never written to disk.
    pub fn from_key_bytes(key: &[u8], connect_timeout: Duration) -> Result<Self, SshError> {
        let pem = std::str::from_utf8(key)
            .map_err(|e| SshError::KeyError(format!("Private key is not valid UTF-8: {}", e)))?;
        let key = russh::keys::decode_secret_key(pem, None)?;

        Ok(Self {
            key: Arc::new(key),
            connect_timeout,
        })
    }
}

#[async_trait]
impl SessionProvider for RusshSessionProvider {
    async fn get_session(
        &self,
        username: &str,
        host: &str,
        port: u16,
    ) -> Result<Box<dyn Session>, SshError> {
        Ok(Box::new(RusshSession {
            username: username.to_string(),
            host: host.to_string(),
            port,
            key: self.key.clone(),
            connect_timeout: self.connect_timeout,
            handle: None,
        }))
    }
}

/// One SSH connection. `handle` is `None` until [`Session::connect`] succeeds.
pub struct RusshSession {
    username: String,
    host: String,
    port: u16,
    key: Arc<PrivateKey>,
    connect_timeout: Duration,
    handle: Option<Handle<ClientHandler>>,
}

#[async_trait]
impl Session for RusshSession {
    async fn connect(&mut self) -> Result<(), SshError> {
        info!("Connecting to SSH server at {}:{}", self.host, self.port);

        let ssh_config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        };
        let handler = ClientHandler::new(self.host.clone(), self.port);

        let mut handle = tokio::time::timeout(
            self.connect_timeout,
            client::connect(
                Arc::new(ssh_config),
                (self.host.as_str(), self.port),
                handler,
            ),
        )
        .await
        .map_err(|_| SshError::Timeout("Connection timed out".to_string()))?
        .map_err(|e| SshError::ConnectionFailed(e.to_string()))?;

        debug!("SSH handshake completed");

        let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
        let authenticated = handle
            .authenticate_publickey(
                &self.username,
                PrivateKeyWithHashAlg::new(self.key.clone(), hash_alg),
            )
            .await
            .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?;

        if !authenticated.success() {
            return Err(SshError::AuthenticationFailed(
                "Authentication rejected by server".to_string(),
            ));
        }

        info!("SSH authentication successful for {}", self.username);
        self.handle = Some(handle);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle
                .disconnect(Disconnect::ByApplication, "", "en")
                .await
            {
                debug!("Ignoring error while disconnecting session: {}", e);
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_closed())
    }

    async fn open_channel(&mut self, kind: ChannelKind) -> Result<Box<dyn SftpChannel>, SshError> {
        let handle = self.handle.as_ref().ok_or(SshError::Disconnected)?;
        debug!("Opening {} channel on {}:{}", kind.as_str(), self.host, self.port);

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::ChannelError(e.to_string()))?;

        Ok(Box::new(RusshSftpChannel::new(channel)))
    }
}

/// russh callbacks for a client connection.
///
/// Host keys are accepted without consulting known_hosts; the fingerprint is
/// logged so it can be audited.
pub struct ClientHandler {
    host: String,
    port: u16,
}

impl ClientHandler {
    pub fn new(host: String, port: u16) -> Self {
        Self { host, port }
    }
}

impl client::Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        info!(
            "Accepting host key for {}:{} (fingerprint: {})",
            self.host,
            self.port,
            server_public_key.fingerprint(HashAlg::Sha256)
        );
        Ok(true)
    }
}
