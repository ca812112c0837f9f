//! Session and channel capabilities
//!
//! The client never talks to an SSH stack directly. It asks a
//! [`SessionProvider`] for a [`Session`], opens short-lived [`SftpChannel`]s
//! on it and drives file operations through them. The russh-backed
//! implementation lives in [`super::client`]; tests plug in in-memory fakes.

use std::path::Path;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use super::error::SshError;
use crate::sftp::SftpError;

/// Byte stream of a remote file being downloaded.
pub type RemoteReader = Pin<Box<dyn AsyncRead + Send>>;

/// Kind of channel requested from a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Sftp,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Sftp => "sftp",
        }
    }
}

/// A single entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub filename: String,
}

impl DirEntry {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
        }
    }
}

/// Produces unconnected sessions for a user on a host.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn get_session(
        &self,
        username: &str,
        host: &str,
        port: u16,
    ) -> Result<Box<dyn Session>, SshError>;
}

/// An SSH session over which channels are opened.
#[async_trait]
pub trait Session: Send {
    async fn connect(&mut self) -> Result<(), SshError>;

    /// Best-effort; implementations swallow their own failures.
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Open a channel. The returned channel still needs [`SftpChannel::connect`].
    async fn open_channel(&mut self, kind: ChannelKind) -> Result<Box<dyn SftpChannel>, SshError>;
}

/// A channel carrying SFTP requests.
#[async_trait]
pub trait SftpChannel: Send {
    async fn connect(&mut self) -> Result<(), SshError>;

    /// Best-effort; implementations swallow their own failures.
    async fn disconnect(&mut self);

    /// Upload the local file at `local_path` to `remote_path`.
    async fn put(&mut self, local_path: &Path, remote_path: &str) -> Result<(), SftpError>;

    async fn get(&mut self, remote_path: &str) -> Result<RemoteReader, SftpError>;

    async fn ls(&mut self, dir: &str) -> Result<Vec<DirEntry>, SftpError>;

    async fn rename(&mut self, from: &str, to: &str) -> Result<(), SftpError>;

    async fn rm(&mut self, path: &str) -> Result<(), SftpError>;
}
