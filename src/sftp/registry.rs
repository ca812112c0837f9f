//! Per-context session registry
//!
//! Each execution context (a session scope, a tokio task, or a thread
//! outside of any task) owns at most one SSH session. Sessions are never
//! shared across contexts, so channel traffic from concurrent callers never
//! interleaves on one session.
//!
//! Scopes started with [`SessionRegistry::scope`] end with their future: the
//! slot is removed and its session disconnected. Plain tasks and threads keep
//! their session until it is disconnected explicitly.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::ssh::Session;

static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    static CURRENT_SCOPE: u64;
}

/// Identity of the execution context a call is made from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextId {
    Scope(u64),
    Task(tokio::task::Id),
    Thread(ThreadId),
}

impl ContextId {
    /// The innermost session scope, else the running tokio task, else the
    /// current thread.
    pub fn current() -> Self {
        if let Ok(scope) = CURRENT_SCOPE.try_with(|scope| *scope) {
            return ContextId::Scope(scope);
        }
        match tokio::task::try_id() {
            Some(id) => ContextId::Task(id),
            None => ContextId::Thread(std::thread::current().id()),
        }
    }
}

/// The session owned by one context, if any.
pub type SessionSlot = Option<Box<dyn Session>>;

/// Exclusive access to one context's slot.
pub type SlotGuard = OwnedMutexGuard<SessionSlot>;

/// Registry of per-context sessions
pub struct SessionRegistry {
    slots: RwLock<HashMap<ContextId, Arc<Mutex<SessionSlot>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Get the slot for `ctx`, creating an empty one on first use
    pub fn slot(&self, ctx: ContextId) -> Arc<Mutex<SessionSlot>> {
        if let Some(slot) = self.slots.read().get(&ctx) {
            return slot.clone();
        }
        self.slots
            .write()
            .entry(ctx)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Lock the slot for `ctx`, waiting for any operation in that context.
    ///
    /// A slot removed while we were waiting on it is stale; lock the
    /// replacement instead.
    pub async fn lock(&self, ctx: ContextId) -> SlotGuard {
        loop {
            let slot = self.slot(ctx);
            let guard = slot.clone().lock_owned().await;
            if self
                .get(ctx)
                .is_some_and(|current| Arc::ptr_eq(&current, &slot))
            {
                return guard;
            }
        }
    }

    /// Get the slot for `ctx` if one was ever created
    pub fn get(&self, ctx: ContextId) -> Option<Arc<Mutex<SessionSlot>>> {
        self.slots.read().get(&ctx).cloned()
    }

    /// Forget the slot for `ctx`
    pub fn remove(&self, ctx: ContextId) -> Option<Arc<Mutex<SessionSlot>>> {
        self.slots.write().remove(&ctx)
    }

    /// Contexts that currently have a slot
    pub fn contexts(&self) -> Vec<ContextId> {
        self.slots.read().keys().copied().collect()
    }

    /// Run `fut` as a context of its own.
    ///
    /// When `fut` completes or is dropped, the scope's slot is removed and its
    /// session disconnected on a spawned task.
    pub fn scope<F: Future>(self: &Arc<Self>, fut: F) -> impl Future<Output = F::Output> {
        let registry = self.clone();
        async move {
            let id = NEXT_SCOPE.fetch_add(1, Ordering::Relaxed);
            let _guard = ScopeGuard {
                registry,
                ctx: ContextId::Scope(id),
            };
            CURRENT_SCOPE.scope(id, fut).await
        }
    }

    /// Number of slots holding a session
    pub async fn active_sessions(&self) -> usize {
        let slots: Vec<_> = self.slots.read().values().cloned().collect();
        let mut count = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Ends a scope's context when dropped.
struct ScopeGuard {
    registry: Arc<SessionRegistry>,
    ctx: ContextId,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let Some(slot) = self.registry.remove(self.ctx) else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let session = slot.lock().await.take();
                    if let Some(mut session) = session {
                        debug!("Session scope ended, disconnecting its session");
                        session.disconnect().await;
                    }
                });
            }
            Err(_) => {
                if let Ok(mut slot) = slot.try_lock() {
                    slot.take();
                }
            }
        }
    }
}
