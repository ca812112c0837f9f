//! SSH module - session and channel plumbing
//!
//! Defines the capabilities the SFTP client needs from an SSH stack and
//! provides the russh implementation of them.

mod channel;
mod client;
mod error;
mod provider;

pub use channel::RusshSftpChannel;
pub use client::{ClientHandler, RusshSession, RusshSessionProvider};
pub use error::SshError;
pub use provider::{
    ChannelKind, DirEntry, RemoteReader, Session, SessionProvider, SftpChannel,
};
