//! SFTP channel over a russh session channel

use std::path::Path;

use async_trait::async_trait;
use russh::client::Msg;
use russh::Channel;
use russh_sftp::client::SftpSession;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use super::error::SshError;
use super::provider::{DirEntry, RemoteReader, SftpChannel};
use crate::sftp::SftpError;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// A session channel that becomes an SFTP session once connected.
pub struct RusshSftpChannel {
    channel: Option<Channel<Msg>>,
    sftp: Option<SftpSession>,
}

impl RusshSftpChannel {
    pub fn new(channel: Channel<Msg>) -> Self {
        Self {
            channel: Some(channel),
            sftp: None,
        }
    }

    fn sftp(&self) -> Result<&SftpSession, SftpError> {
        self.sftp
            .as_ref()
            .ok_or_else(|| SftpError::ChannelError("SFTP channel is not connected".to_string()))
    }
}

#[async_trait]
impl SftpChannel for RusshSftpChannel {
    async fn connect(&mut self) -> Result<(), SshError> {
        let channel = self
            .channel
            .take()
            .ok_or_else(|| SshError::ChannelError("Channel already connected".to_string()))?;

        channel.request_subsystem(true, "sftp").await.map_err(|e| {
            SshError::SubsystemNotAvailable(format!("Failed to request SFTP subsystem: {}", e))
        })?;

        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| SshError::SubsystemNotAvailable(e.to_string()))?;

        self.sftp = Some(sftp);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(sftp) = self.sftp.take() {
            if let Err(e) = sftp.close().await {
                debug!("Ignoring error while closing SFTP channel: {}", e);
            }
        }
        self.channel = None;
    }

    async fn put(&mut self, local_path: &Path, remote_path: &str) -> Result<(), SftpError> {
        let mut local = tokio::fs::File::open(local_path)
            .await
            .map_err(SftpError::LocalIo)?;
        let mut remote = self.sftp()?.create(remote_path).await?;

        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        loop {
            let n = local.read(&mut buffer).await.map_err(SftpError::LocalIo)?;
            if n == 0 {
                break;
            }
            remote
                .write_all(&buffer[..n])
                .await
                .map_err(|e| SftpError::TransferError(format!("Failed to write: {}", e)))?;
        }

        remote
            .shutdown()
            .await
            .map_err(|e| SftpError::TransferError(format!("Failed to close file: {}", e)))?;
        Ok(())
    }

    async fn get(&mut self, remote_path: &str) -> Result<RemoteReader, SftpError> {
        let file = self.sftp()?.open(remote_path).await?;
        Ok(Box::pin(file))
    }

    async fn ls(&mut self, dir: &str) -> Result<Vec<DirEntry>, SftpError> {
        let read_dir = self.sftp()?.read_dir(dir).await?;
        Ok(read_dir
            .map(|entry| DirEntry::new(entry.file_name()))
            .collect())
    }

    async fn rename(&mut self, from: &str, to: &str) -> Result<(), SftpError> {
        self.sftp()?.rename(from, to).await?;
        Ok(())
    }

    async fn rm(&mut self, path: &str) -> Result<(), SftpError> {
        self.sftp()?.remove_file(path).await?;
        Ok(())
    }
}
