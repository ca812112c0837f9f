//! In-memory session provider for tests
//!
//! [`FakeServer`] serves a small remote filesystem through fake sessions and
//! channels, counts every lifecycle call and can be told to fail in the ways
//! the executor has to cope with.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, ReadBuf};

use crate::sftp::SftpError;
use crate::ssh::{
    ChannelKind, DirEntry, RemoteReader, Session, SessionProvider, SftpChannel, SshError,
};

type ChannelFault = Box<dyn Fn(usize) -> bool + Send + Sync>;

/// Snapshot of the lifecycle counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub sessions_created: usize,
    pub connects: usize,
    pub session_disconnects: usize,
    pub channels_opened: usize,
    pub channel_connects: usize,
    pub channel_disconnects: usize,
    pub gets: usize,
    pub listings: usize,
}

#[derive(Default)]
struct Counters {
    sessions_created: AtomicUsize,
    connects: AtomicUsize,
    session_disconnects: AtomicUsize,
    channels_opened: AtomicUsize,
    channel_connects: AtomicUsize,
    channel_disconnects: AtomicUsize,
    gets: AtomicUsize,
    listings: AtomicUsize,
}

#[derive(Default)]
struct Faults {
    fail_connect: bool,
    channel_connect: Option<ChannelFault>,
    rm_fail_once: HashSet<String>,
    broken_reads: bool,
    pseudo_entries: bool,
}

#[derive(Default)]
struct RemoteFs {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
}

impl RemoteFs {
    fn is_dir(&self, key: &str) -> bool {
        key.is_empty()
            || self.dirs.contains(key)
            || self.files.keys().any(|f| f.starts_with(&format!("{}/", key)))
    }

    fn children(&self, key: &str) -> BTreeSet<String> {
        let prefix = if key.is_empty() {
            String::new()
        } else {
            format!("{}/", key)
        };

        self.files
            .keys()
            .chain(self.dirs.iter())
            .filter_map(|path| path.strip_prefix(&prefix))
            .filter(|rest| !rest.is_empty())
            .map(|rest| rest.split('/').next().unwrap_or(rest).to_string())
            .collect()
    }
}

/// Per-session state, observable after the client dropped the session.
#[derive(Default)]
pub struct SessionProbe {
    connected: AtomicBool,
    disconnects: AtomicUsize,
}

impl SessionProbe {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct Inner {
    fs: Mutex<RemoteFs>,
    counters: Counters,
    faults: Mutex<Faults>,
    removed: Mutex<Vec<String>>,
    sessions: Mutex<Vec<Arc<SessionProbe>>>,
    targets: Mutex<Vec<(String, String, u16)>>,
}

/// Shared handle to the fake remote side.
#[derive(Clone, Default)]
pub struct FakeServer {
    inner: Arc<Inner>,
}

/// Collapse `.`, empty segments and leading `/` so `/a`, `./a` and `a` match.
fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect::<Vec<_>>()
        .join("/")
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider(&self) -> Arc<dyn SessionProvider> {
        Arc::new(FakeProvider {
            server: self.clone(),
        })
    }

    /// A connected channel not tied to any session.
    pub fn raw_channel(&self) -> Box<dyn SftpChannel> {
        Box::new(FakeChannel {
            server: self.clone(),
            connected: true,
        })
    }

    pub fn add_file(&self, path: &str, content: &[u8]) {
        self.inner
            .fs
            .lock()
            .files
            .insert(normalize(path), content.to_vec());
    }

    pub fn add_dir(&self, path: &str) {
        self.inner.fs.lock().dirs.insert(normalize(path));
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.inner.fs.lock().files.get(&normalize(path)).cloned()
    }

    pub fn stats(&self) -> Stats {
        let c = &self.inner.counters;
        Stats {
            sessions_created: c.sessions_created.load(Ordering::SeqCst),
            connects: c.connects.load(Ordering::SeqCst),
            session_disconnects: c.session_disconnects.load(Ordering::SeqCst),
            channels_opened: c.channels_opened.load(Ordering::SeqCst),
            channel_connects: c.channel_connects.load(Ordering::SeqCst),
            channel_disconnects: c.channel_disconnects.load(Ordering::SeqCst),
            gets: c.gets.load(Ordering::SeqCst),
            listings: c.listings.load(Ordering::SeqCst),
        }
    }

    /// Every path passed to `rm`, failed attempts included.
    pub fn removed(&self) -> Vec<String> {
        self.inner.removed.lock().clone()
    }

    /// Sessions in creation order.
    pub fn sessions(&self) -> Vec<Arc<SessionProbe>> {
        self.inner.sessions.lock().clone()
    }

    /// `(username, host, port)` of every `get_session` call.
    pub fn targets(&self) -> Vec<(String, String, u16)> {
        self.inner.targets.lock().clone()
    }

    pub fn fail_connect(&self, fail: bool) {
        self.inner.faults.lock().fail_connect = fail;
    }

    /// Fail channel connects while `predicate(total session connects)` holds.
    pub fn fail_channel_connect_when<F>(&self, predicate: F)
    where
        F: Fn(usize) -> bool + Send + Sync + 'static,
    {
        self.inner.faults.lock().channel_connect = Some(Box::new(predicate));
    }

    /// The first `rm` of `path` fails; later ones behave normally.
    pub fn fail_rm_once(&self, path: &str) {
        self.inner.faults.lock().rm_fail_once.insert(path.to_string());
    }

    /// Every remote read stream errors on its first read.
    pub fn broken_reads(&self, broken: bool) {
        self.inner.faults.lock().broken_reads = broken;
    }

    /// Listings start with `.` and `..` like a real server's.
    pub fn include_pseudo_entries(&self, include: bool) {
        self.inner.faults.lock().pseudo_entries = include;
    }
}

struct FakeProvider {
    server: FakeServer,
}

#[async_trait]
impl SessionProvider for FakeProvider {
    async fn get_session(
        &self,
        username: &str,
        host: &str,
        port: u16,
    ) -> Result<Box<dyn Session>, SshError> {
        let inner = &self.server.inner;
        inner.counters.sessions_created.fetch_add(1, Ordering::SeqCst);
        inner
            .targets
            .lock()
            .push((username.to_string(), host.to_string(), port));

        let probe = Arc::new(SessionProbe::default());
        inner.sessions.lock().push(probe.clone());

        Ok(Box::new(FakeSession {
            server: self.server.clone(),
            probe,
        }))
    }
}

struct FakeSession {
    server: FakeServer,
    probe: Arc<SessionProbe>,
}

#[async_trait]
impl Session for FakeSession {
    async fn connect(&mut self) -> Result<(), SshError> {
        let inner = &self.server.inner;
        if inner.faults.lock().fail_connect {
            return Err(SshError::ConnectionFailed("connection refused".to_string()));
        }
        inner.counters.connects.fetch_add(1, Ordering::SeqCst);
        self.probe.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.server
            .inner
            .counters
            .session_disconnects
            .fetch_add(1, Ordering::SeqCst);
        self.probe.disconnects.fetch_add(1, Ordering::SeqCst);
        self.probe.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.probe.is_connected()
    }

    async fn open_channel(&mut self, kind: ChannelKind) -> Result<Box<dyn SftpChannel>, SshError> {
        if kind != ChannelKind::Sftp {
            return Err(SshError::ChannelError(format!("unsupported: {}", kind.as_str())));
        }
        if !self.probe.is_connected() {
            return Err(SshError::Disconnected);
        }
        self.server
            .inner
            .counters
            .channels_opened
            .fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(FakeChannel {
            server: self.server.clone(),
            connected: false,
        }))
    }
}

struct FakeChannel {
    server: FakeServer,
    connected: bool,
}

impl FakeChannel {
    fn inner(&self) -> &Inner {
        &self.server.inner
    }

    fn ensure_connected(&self) -> Result<(), SftpError> {
        if self.connected {
            Ok(())
        } else {
            Err(SftpError::ChannelError("channel is not connected".to_string()))
        }
    }
}

#[async_trait]
impl SftpChannel for FakeChannel {
    async fn connect(&mut self) -> Result<(), SshError> {
        let inner = self.inner();
        let connects = inner.counters.connects.load(Ordering::SeqCst);
        let fails = inner
            .faults
            .lock()
            .channel_connect
            .as_ref()
            .is_some_and(|fault| fault(connects));
        if fails {
            return Err(SshError::ChannelError("channel is not opened".to_string()));
        }

        inner.counters.channel_connects.fetch_add(1, Ordering::SeqCst);
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.inner()
            .counters
            .channel_disconnects
            .fetch_add(1, Ordering::SeqCst);
        self.connected = false;
    }

    async fn put(&mut self, local_path: &Path, remote_path: &str) -> Result<(), SftpError> {
        self.ensure_connected()?;
        let content = tokio::fs::read(local_path)
            .await
            .map_err(SftpError::LocalIo)?;
        self.inner()
            .fs
            .lock()
            .files
            .insert(normalize(remote_path), content);
        Ok(())
    }

    async fn get(&mut self, remote_path: &str) -> Result<RemoteReader, SftpError> {
        self.ensure_connected()?;
        let inner = self.inner();
        inner.counters.gets.fetch_add(1, Ordering::SeqCst);

        if inner.faults.lock().broken_reads {
            return Ok(Box::pin(BrokenReader));
        }
        let content = inner
            .fs
            .lock()
            .files
            .get(&normalize(remote_path))
            .cloned()
            .ok_or_else(|| SftpError::FileNotFound(remote_path.to_string()))?;
        Ok(Box::pin(io::Cursor::new(content)))
    }

    async fn ls(&mut self, dir: &str) -> Result<Vec<DirEntry>, SftpError> {
        self.ensure_connected()?;
        let inner = self.inner();
        inner.counters.listings.fetch_add(1, Ordering::SeqCst);

        let key = normalize(dir);
        let fs = inner.fs.lock();
        if !fs.is_dir(&key) {
            return Err(SftpError::FileNotFound(dir.to_string()));
        }

        let mut entries = Vec::new();
        if inner.faults.lock().pseudo_entries {
            entries.push(DirEntry::new("."));
            entries.push(DirEntry::new(".."));
        }
        entries.extend(fs.children(&key).into_iter().map(DirEntry::new));
        Ok(entries)
    }

    async fn rename(&mut self, from: &str, to: &str) -> Result<(), SftpError> {
        self.ensure_connected()?;
        let mut fs = self.inner().fs.lock();
        let content = fs
            .files
            .remove(&normalize(from))
            .ok_or_else(|| SftpError::FileNotFound(from.to_string()))?;
        fs.files.insert(normalize(to), content);
        Ok(())
    }

    async fn rm(&mut self, path: &str) -> Result<(), SftpError> {
        self.ensure_connected()?;
        let inner = self.inner();
        inner.removed.lock().push(path.to_string());

        if inner.faults.lock().rm_fail_once.remove(path) {
            return Err(SftpError::ProtocolError(format!("Cannot drop {}", path)));
        }
        inner
            .fs
            .lock()
            .files
            .remove(&normalize(path))
            .map(|_| ())
            .ok_or_else(|| SftpError::FileNotFound(path.to_string()))
    }
}

/// Remote stream whose every read fails.
struct BrokenReader;

impl AsyncRead for BrokenReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "the only thing this stream does is fail",
        )))
    }
}
