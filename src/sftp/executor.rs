//! Operation executor
//!
//! Wraps every facade call in the same lifecycle:
//!
//! 1. make sure the calling context has a live session, connecting if needed
//! 2. open a fresh SFTP channel; if that fails, rebuild the session once and
//!    try again
//! 3. run the operation on that channel, retrying operation-level failures in
//!    place up to the retry budget
//! 4. release the channel, whatever happened in 3
//!
//! Connection failures in 1 or 2 are not retried: the context's session is
//! torn down and the error surfaces as [`ClientError::Connection`].

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::error::ClientError;
use super::ops::SftpOp;
use super::registry::{ContextId, SessionRegistry, SessionSlot, SlotGuard};
use super::retry::{run_with_retry, RetryConfig};
use crate::ssh::{ChannelKind, SessionProvider, SftpChannel, SshError};

/// Where sessions connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
}

pub struct OperationExecutor {
    target: ConnectTarget,
    provider: Arc<dyn SessionProvider>,
    registry: Arc<SessionRegistry>,
    retry: RetryConfig,
}

impl OperationExecutor {
    pub fn new(
        target: ConnectTarget,
        provider: Arc<dyn SessionProvider>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            target,
            provider,
            registry: Arc::new(SessionRegistry::new()),
            retry,
        }
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Run `fut` in a session scope; see [`SessionRegistry::scope`].
    pub fn scoped<F: Future>(&self, fut: F) -> impl Future<Output = F::Output> {
        self.registry.scope(fut)
    }

    /// Connect the calling context, replacing any session it already has.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let ctx = ContextId::current();
        let mut slot = self.registry.lock(ctx).await;

        match self.reconnect(&mut slot).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.release_session(ctx, &mut slot).await;
                Err(ClientError::Connection(e))
            }
        }
    }

    /// Drop the calling context's session. Never fails.
    pub async fn disconnect(&self) {
        let ctx = ContextId::current();
        if self.registry.get(ctx).is_none() {
            return;
        }
        let mut slot = self.registry.lock(ctx).await;
        self.release_session(ctx, &mut slot).await;
    }

    pub async fn is_connected(&self) -> bool {
        match self.registry.get(ContextId::current()) {
            Some(slot) => is_live(&*slot.lock().await),
            None => false,
        }
    }

    /// Disconnect the sessions of every context.
    pub async fn disconnect_all(&self) {
        let contexts = self.registry.contexts();
        info!("Closing {} SFTP sessions", contexts.len());

        for ctx in contexts {
            let mut slot = self.registry.lock(ctx).await;
            self.release_session(ctx, &mut slot).await;
        }
    }

    pub async fn active_sessions(&self) -> usize {
        self.registry.active_sessions().await
    }

    /// Run `op` for the calling context.
    pub async fn execute<O: SftpOp>(&self, mut op: O) -> Result<O::Output, ClientError> {
        let ctx = ContextId::current();
        let mut slot = self.registry.lock(ctx).await;

        if !is_live(&*slot) {
            if let Err(e) = self.reconnect(&mut slot).await {
                self.release_session(ctx, &mut slot).await;
                return Err(ClientError::Connection(e));
            }
        }

        let channel = match self.open_channel(&mut slot).await {
            Ok(channel) => channel,
            Err(e) => {
                self.release_session(ctx, &mut slot).await;
                return Err(ClientError::Connection(e));
            }
        };

        let mut lease = ChannelLease::new(channel);
        let result = run_with_retry(&mut op, lease.channel(), &self.retry).await;
        lease.release().await;

        result.map_err(ClientError::Operation)
    }

    /// Replace whatever session `slot` holds with a freshly connected one.
    ///
    /// On failure the slot is left empty.
    async fn reconnect(&self, slot: &mut SessionSlot) -> Result<(), SshError> {
        if let Some(mut old) = slot.take() {
            debug!("Disconnecting previous session before reconnecting");
            old.disconnect().await;
        }

        let ConnectTarget {
            host,
            port,
            username,
        } = &self.target;

        let mut session = self.provider.get_session(username, host, *port).await?;
        if let Err(e) = session.connect().await {
            session.disconnect().await;
            return Err(e);
        }

        info!("Connected to {}@{}:{}", username, host, port);
        *slot = Some(session);
        Ok(())
    }

    /// Open and connect an SFTP channel, rebuilding the session once if the
    /// current one cannot produce a working channel.
    async fn open_channel(&self, slot: &mut SessionSlot) -> Result<Box<dyn SftpChannel>, SshError> {
        match open_sftp_channel(slot).await {
            Ok(channel) => Ok(channel),
            Err(e) => {
                warn!("Trying to reconnect because of [{}]", e);
                self.reconnect(slot).await?;
                open_sftp_channel(slot).await
            }
        }
    }

    /// Disconnect the context's session and remove it from the registry.
    async fn release_session(&self, ctx: ContextId, slot: &mut SlotGuard) {
        if let Some(mut session) = slot.take() {
            session.disconnect().await;
        }
        self.registry.remove(ctx);
    }
}

fn is_live(slot: &SessionSlot) -> bool {
    slot.as_ref().is_some_and(|session| session.is_connected())
}

async fn open_sftp_channel(slot: &mut SessionSlot) -> Result<Box<dyn SftpChannel>, SshError> {
    let session = slot.as_mut().ok_or(SshError::Disconnected)?;
    let mut channel = session.open_channel(ChannelKind::Sftp).await?;

    if let Err(e) = channel.connect().await {
        channel.disconnect().await;
        return Err(e);
    }
    Ok(channel)
}

/// Owns the channel of one operation until it is released.
///
/// If the operation future is dropped or panics before [`release`], the
/// channel is disconnected on a spawned task instead.
///
/// [`release`]: ChannelLease::release
struct ChannelLease {
    channel: Option<Box<dyn SftpChannel>>,
}

impl ChannelLease {
    fn new(channel: Box<dyn SftpChannel>) -> Self {
        Self {
            channel: Some(channel),
        }
    }

    fn channel(&mut self) -> &mut dyn SftpChannel {
        match self.channel.as_deref_mut() {
            Some(channel) => channel,
            None => unreachable!("channel lease used after release"),
        }
    }

    async fn release(mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.disconnect().await;
        }
    }
}

impl Drop for ChannelLease {
    fn drop(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            debug!("Operation abandoned, releasing its channel in the background");
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    channel.disconnect().await;
                });
            }
        }
    }
}
