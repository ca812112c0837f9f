//! Resilient SFTP - remote file operations that behave as if they were local
//!
//! Built on `russh` and `russh-sftp`. Each task gets its own SSH session,
//! every operation runs on a fresh SFTP channel, broken channels trigger one
//! reconnect and failed operations are retried.

pub mod config;
pub mod profile;
pub mod sftp;
pub mod ssh;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ClientConfig, Credential};
pub use sftp::{ClientError, ErrorKind, RetryConfig, SftpClient, SftpClientBuilder};

/// Start building an [`SftpClient`].
pub fn sftp_client() -> SftpClientBuilder {
    SftpClientBuilder::new()
}
