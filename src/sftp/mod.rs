//! Resilient SFTP client
//!
//! One SSH session per task, a fresh SFTP channel per operation, one forced
//! reconnect when a channel cannot be opened and in-place retries for failed
//! operations.

pub mod builder;
pub mod client;
pub mod error;
pub mod executor;
pub mod ops;
pub mod path_utils;
pub mod registry;
pub mod retry;

pub use builder::SftpClientBuilder;
pub use client::SftpClient;
pub use error::{ClientError, ErrorKind, SftpError};
pub use executor::{ConnectTarget, OperationExecutor};
pub use ops::SftpOp;
pub use registry::{ContextId, SessionRegistry};
pub use retry::{calculate_backoff, is_retryable_error, RetryConfig};
