//! Units of work executed on an SFTP channel
//!
//! Each facade call becomes one [`SftpOp`]. An op may be run more than once
//! on the same channel when an attempt fails, so any progress it must not
//! repeat is kept in the op itself.

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use super::error::SftpError;
use crate::ssh::SftpChannel;

const DOWNLOAD_BUFFER_SIZE: usize = 64 * 1024;

/// An operation run against an open channel.
#[async_trait]
pub trait SftpOp: Send {
    type Output: Send;

    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    async fn run(&mut self, channel: &mut dyn SftpChannel) -> Result<Self::Output, SftpError>;
}

pub struct Upload {
    pub local_file: PathBuf,
    pub destination: String,
}

#[async_trait]
impl SftpOp for Upload {
    type Output = ();

    fn name(&self) -> &'static str {
        "upload"
    }

    async fn run(&mut self, channel: &mut dyn SftpChannel) -> Result<(), SftpError> {
        info!(
            "Uploading file [{}] to [{}]",
            self.local_file.display(),
            self.destination
        );
        channel.put(&self.local_file, &self.destination).await
    }
}

/// Lists entry names, dropping the `.` and `..` pseudo-entries.
pub struct ListDirectory {
    pub dir: String,
}

#[async_trait]
impl SftpOp for ListDirectory {
    type Output = Vec<String>;

    fn name(&self) -> &'static str {
        "list directory"
    }

    async fn run(&mut self, channel: &mut dyn SftpChannel) -> Result<Vec<String>, SftpError> {
        debug!("Listing directory [{}]", self.dir);
        let filenames: Vec<String> = channel
            .ls(&self.dir)
            .await?
            .into_iter()
            .map(|entry| entry.filename)
            .filter(|name| name != "." && name != "..")
            .collect();
        debug!("Found: {:?}", filenames);
        Ok(filenames)
    }
}

/// Streams a remote file into `target`, recreating it on every attempt.
pub struct Download {
    pub remote_path: String,
    pub target: PathBuf,
}

#[async_trait]
impl SftpOp for Download {
    type Output = PathBuf;

    fn name(&self) -> &'static str {
        "download"
    }

    async fn run(&mut self, channel: &mut dyn SftpChannel) -> Result<PathBuf, SftpError> {
        debug!(
            "Downloading remote file [{}] into local [{}]",
            self.remote_path,
            self.target.display()
        );

        let mut reader = channel.get(&self.remote_path).await?;
        let mut file = tokio::fs::File::create(&self.target)
            .await
            .map_err(SftpError::LocalIo)?;

        let mut buffer = vec![0u8; DOWNLOAD_BUFFER_SIZE];
        loop {
            let n = reader.read(&mut buffer).await.map_err(|e| {
                SftpError::TransferError(format!("Failed to read {}: {}", self.remote_path, e))
            })?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n])
                .await
                .map_err(SftpError::LocalIo)?;
        }
        file.flush().await.map_err(SftpError::LocalIo)?;

        Ok(self.target.clone())
    }
}

pub struct Rename {
    pub from: String,
    pub to: String,
}

#[async_trait]
impl SftpOp for Rename {
    type Output = ();

    fn name(&self) -> &'static str {
        "move"
    }

    async fn run(&mut self, channel: &mut dyn SftpChannel) -> Result<(), SftpError> {
        debug!("Move [{}] to [{}]", self.from, self.to);
        channel.rename(&self.from, &self.to).await
    }
}

/// Removes one file. Directories are not handled.
pub struct Remove {
    pub path: String,
}

#[async_trait]
impl SftpOp for Remove {
    type Output = ();

    fn name(&self) -> &'static str {
        "delete"
    }

    async fn run(&mut self, channel: &mut dyn SftpChannel) -> Result<(), SftpError> {
        debug!("Delete [{}]", self.path);
        channel.rm(&self.path).await
    }
}

/// Removes a set of files, each at most once per success.
///
/// Paths leave `pending` only after their removal succeeds, so a retry
/// resumes with what is left, including the path whose removal failed.
pub struct RemoveAll {
    pending: HashSet<String>,
}

impl RemoveAll {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pending: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn pending(&self) -> &HashSet<String> {
        &self.pending
    }
}

#[async_trait]
impl SftpOp for RemoveAll {
    type Output = ();

    fn name(&self) -> &'static str {
        "bulk delete"
    }

    async fn run(&mut self, channel: &mut dyn SftpChannel) -> Result<(), SftpError> {
        debug!("Deleting [{}] files", self.pending.len());
        let batch: Vec<String> = self.pending.iter().cloned().collect();
        for path in batch {
            channel.rm(&path).await?;
            self.pending.remove(&path);
        }
        debug!("Files successfully deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeServer;

    #[test]
    fn test_remove_all_deduplicates() {
        let op = RemoveAll::new(["a", "a", "b"]);
        assert_eq!(op.pending().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_all_keeps_failed_path_pending() {
        let server = FakeServer::new();
        server.add_file("1", b"x");
        server.add_file("2", b"x");
        server.fail_rm_once("2");
        let mut channel = server.raw_channel();

        let mut op = RemoveAll::new(["1", "2"]);
        let first = op.run(channel.as_mut()).await;

        assert!(first.is_err());
        assert!(op.pending().contains("2"));

        op.run(channel.as_mut()).await.unwrap();
        assert!(op.pending().is_empty());
        assert_eq!(server.removed().iter().filter(|p| *p == "1").count(), 1);
        assert_eq!(server.removed().iter().filter(|p| *p == "2").count(), 2);
    }

    #[tokio::test]
    async fn test_list_directory_filters_pseudo_entries() {
        let server = FakeServer::new();
        server.add_file("dir/first", b"1");
        server.add_file("dir/second", b"2");
        server.include_pseudo_entries(true);
        let mut channel = server.raw_channel();

        let mut op = ListDirectory { dir: "dir".into() };
        let names = op.run(channel.as_mut()).await.unwrap();

        assert_eq!(names, vec!["first".to_string(), "second".to_string()]);
    }
}
