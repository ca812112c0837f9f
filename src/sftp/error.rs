//! SFTP Error types

use thiserror::Error;

use crate::ssh::SshError;

/// Failure of a single remote operation on an open channel.
#[derive(Error, Debug)]
pub enum SftpError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("SFTP protocol error: {0}")]
    ProtocolError(String),

    #[error("Transfer error: {0}")]
    TransferError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Reading or writing the local side of a transfer failed.
    #[error("Local IO error: {0}")]
    LocalIo(#[source] std::io::Error),
}

impl From<russh_sftp::client::error::Error> for SftpError {
    fn from(err: russh_sftp::client::error::Error) -> Self {
        use russh_sftp::client::error::Error as Inner;
        use russh_sftp::protocol::StatusCode;

        match err {
            Inner::Status(status) => match status.status_code {
                StatusCode::NoSuchFile => SftpError::FileNotFound(status.error_message),
                StatusCode::PermissionDenied => SftpError::PermissionDenied(status.error_message),
                StatusCode::NoConnection | StatusCode::ConnectionLost => {
                    SftpError::ChannelError(status.error_message)
                }
                _ => SftpError::ProtocolError(status.error_message),
            },
            Inner::Timeout => SftpError::ChannelError("request timed out".to_string()),
            other => SftpError::ProtocolError(other.to_string()),
        }
    }
}

/// Coarse classification of [`ClientError`] for callers that branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    Connection,
    Operation,
}

/// The only error type returned by [`SftpClient`](super::SftpClient).
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Connection(#[from] SshError),

    #[error("SFTP operation failed: {0}")]
    Operation(#[from] SftpError),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ClientError::Connection(_) => ErrorKind::Connection,
            ClientError::Operation(_) => ErrorKind::Operation,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ClientError::InvalidArgument(msg.into())
    }
}
