//! SFTP client facade
//!
//! Remote file operations that behave as if they were local and reliable.
//! Every call goes through the [`OperationExecutor`], so sessions are created
//! on demand, broken channels are replaced and flaky operations retried.

use std::future::Future;
use std::path::{Path, PathBuf};

use super::builder::SftpClientBuilder;
use super::error::ClientError;
use super::executor::OperationExecutor;
use super::ops::{Download, ListDirectory, Remove, RemoveAll, Rename, Upload};
use super::path_utils::{download_target, upload_destination};
use crate::config::ClientConfig;

/// Resilient SFTP client.
///
/// The client can be shared between tasks (wrap it in an `Arc`). Each task
/// gets its own SSH session; calls made from one task run one after another.
/// Spawn tasks through [`SftpClient::scoped`] so their session is closed when
/// they finish:
///
/// ```no_run
/// # async fn run(sftp: std::sync::Arc<resilient_sftp::SftpClient>) {
/// let worker = sftp.clone();
/// let names = tokio::spawn(sftp.scoped(async move {
///     worker.list_directory("incoming").await
/// }))
/// .await;
/// # }
/// ```
pub struct SftpClient {
    config: ClientConfig,
    executor: OperationExecutor,
}

impl SftpClient {
    pub(crate) fn new(config: ClientConfig, executor: OperationExecutor) -> Self {
        Self { config, executor }
    }

    pub fn builder() -> SftpClientBuilder {
        SftpClientBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect the calling task. An existing session is disconnected and
    /// replaced.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.executor.connect().await
    }

    /// Disconnect the calling task's session, if it has one.
    pub async fn disconnect(&self) {
        self.executor.disconnect().await
    }

    pub async fn is_connected(&self) -> bool {
        self.executor.is_connected().await
    }

    /// Run `fut` with a session of its own that is disconnected when `fut`
    /// completes or is dropped.
    ///
    /// Without a scope, a task's session stays open until [`disconnect`] or
    /// [`disconnect_all`] is called.
    ///
    /// [`disconnect`]: SftpClient::disconnect
    /// [`disconnect_all`]: SftpClient::disconnect_all
    pub fn scoped<F: Future>(&self, fut: F) -> impl Future<Output = F::Output> {
        self.executor.scoped(fut)
    }

    /// Disconnect the sessions of all tasks, e.g. on shutdown.
    pub async fn disconnect_all(&self) {
        self.executor.disconnect_all().await
    }

    /// Number of tasks currently holding a session.
    pub async fn active_sessions(&self) -> usize {
        self.executor.active_sessions().await
    }

    /// Upload `file` into `remote_dir`, keeping its file name.
    ///
    /// `remote_dir` must not be empty; use `.` for the remote working
    /// directory.
    pub async fn upload(&self, file: impl AsRef<Path>, remote_dir: &str) -> Result<(), ClientError> {
        require_remote_dir(remote_dir)?;
        let file = file.as_ref();
        let destination = upload_destination(file, remote_dir)?;

        self.executor
            .execute(Upload {
                local_file: absolute(file),
                destination,
            })
            .await
    }

    /// Names of the entries in `remote_dir`, in server order, without `.`
    /// and `..`.
    pub async fn list_directory(&self, remote_dir: &str) -> Result<Vec<String>, ClientError> {
        require_remote_dir(remote_dir)?;

        self.executor
            .execute(ListDirectory {
                dir: remote_dir.to_string(),
            })
            .await
    }

    /// Download `remote_path` into a directory or to an explicit file.
    ///
    /// When `local_destination` is an existing directory the file keeps the
    /// last segment of `remote_path` as its name. Returns the local path
    /// written.
    pub async fn download(
        &self,
        remote_path: &str,
        local_destination: impl AsRef<Path>,
    ) -> Result<PathBuf, ClientError> {
        let target = download_target(remote_path, local_destination.as_ref());

        self.executor
            .execute(Download {
                remote_path: remote_path.to_string(),
                target,
            })
            .await
    }

    /// Rename or move a remote file.
    pub async fn rename(&self, from: &str, to: &str) -> Result<(), ClientError> {
        self.executor
            .execute(Rename {
                from: from.to_string(),
                to: to.to_string(),
            })
            .await
    }

    /// Delete one remote file. Directories are not deleted.
    pub async fn delete(&self, remote_file: &str) -> Result<(), ClientError> {
        self.executor
            .execute(Remove {
                path: remote_file.to_string(),
            })
            .await
    }

    /// Delete several remote files in one operation.
    ///
    /// Duplicates are removed once. Files deleted before a failure stay
    /// deleted; a retry only resubmits the ones left.
    pub async fn delete_all<I, S>(&self, remote_files: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.executor.execute(RemoveAll::new(remote_files)).await
    }
}

fn require_remote_dir(remote_dir: &str) -> Result<(), ClientError> {
    if remote_dir.is_empty() {
        return Err(ClientError::invalid("Remote dir must not be empty"));
    }
    Ok(())
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
