//! Client-side session handle. A [`Session`] is configured while idle,
//! connects lazily on the first lock (socket path, then unicast address,
//! then multicast discovery), and walks a strict lifecycle:
//!
//! `UNINITIALIZED → INITIALIZED → LOCKED → INITIALIZED → … → CLEANED`
//!
//! Configuration is frozen while a lock is held, and a cleaned session
//! cannot be revived.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UnixStream};

use crate::config::{
    DEFAULT_DISCOVERY_ATTEMPTS, DEFAULT_DISCOVERY_TIMEOUT_MS, DEFAULT_DISCOVERY_TTL, DEFAULT_PORT,
    DEFAULT_QUANTITY, DEFAULT_TIMEOUT_MS, DiscoveryConfig,
};
use crate::discovery;
use crate::error::Error;
use crate::proto::{LockRequest, Reply, Request, UnlockRequest};
use crate::types::{LockMode, ResourceName};

// ─── Lifecycle ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Locked,
    Cleaned,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "UNINITIALIZED",
            SessionState::Initialized => "INITIALIZED",
            SessionState::Locked => "LOCKED",
            SessionState::Cleaned => "CLEANED",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Transport ──────────────────────────────────────────────────────────────

enum Conn {
    Tcp(BufReader<TcpStream>),
    Unix(BufReader<UnixStream>),
}

impl Conn {
    async fn call(&mut self, request: &Request) -> Result<Reply, Error> {
        match self {
            Conn::Tcp(stream) => roundtrip(stream, request).await,
            Conn::Unix(stream) => roundtrip(stream, request).await,
        }
    }
}

async fn roundtrip<S>(stream: &mut BufReader<S>, request: &Request) -> Result<Reply, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut bytes = serde_json::to_vec(request)?;
    bytes.push(b'\n');
    stream.write_all(&bytes).await?;
    stream.flush().await?;
    let mut line = String::new();
    let n = stream.read_line(&mut line).await?;
    if n == 0 {
        return Err(Error::Protocol("daemon closed the connection".to_string()));
    }
    Ok(serde_json::from_str(&line)?)
}

// ─── Session Handle ─────────────────────────────────────────────────────────

/// One client session against a lock daemon. Holds at most one lock.
pub struct Session {
    state: SessionState,
    conn: Option<Conn>,
    locked_element: Option<String>,
    resource_name: Option<ResourceName>,
    socket_name: Option<PathBuf>,
    unicast_address: Option<IpAddr>,
    unicast_port: u16,
    multicast_address: Option<IpAddr>,
    multicast_port: u16,
    discovery_attempts: u32,
    discovery_timeout: Duration,
    discovery_ttl: u32,
    lock_mode: LockMode,
    resource_quantity: u64,
    resource_create: bool,
    resource_timeout_ms: i64,
    resource_idle_lifespan_ms: u64,
}

impl Session {
    pub fn new() -> Self {
        Session {
            state: SessionState::Uninitialized,
            conn: None,
            locked_element: None,
            resource_name: None,
            socket_name: None,
            unicast_address: None,
            unicast_port: DEFAULT_PORT,
            multicast_address: None,
            multicast_port: DEFAULT_PORT,
            discovery_attempts: DEFAULT_DISCOVERY_ATTEMPTS,
            discovery_timeout: Duration::from_millis(DEFAULT_DISCOVERY_TIMEOUT_MS),
            discovery_ttl: DEFAULT_DISCOVERY_TTL,
            lock_mode: LockMode::default(),
            resource_quantity: DEFAULT_QUANTITY,
            resource_create: true,
            resource_timeout_ms: DEFAULT_TIMEOUT_MS,
            resource_idle_lifespan_ms: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Element granted by the last lock on a sequence resource, if any.
    pub fn locked_element(&self) -> Option<&str> {
        self.locked_element.as_deref()
    }

    // ─── Lifecycle Calls ────────────────────────────────────────────────────

    pub fn init(&mut self) -> Result<(), Error> {
        match self.state {
            SessionState::Uninitialized => {
                self.state = SessionState::Initialized;
                Ok(())
            }
            _ => Err(self.out_of_sequence("init")),
        }
    }

    /// Acquires the configured resource and returns the granted element
    /// for sequence resources, `None` otherwise.
    pub async fn lock(&mut self) -> Result<Option<String>, Error> {
        if self.state != SessionState::Initialized {
            return Err(self.out_of_sequence("lock"));
        }
        let name = self
            .resource_name
            .clone()
            .ok_or_else(|| Error::InvalidParameter("resource name is not set".to_string()))?;
        self.ensure_connected().await?;
        let request = Request::Lock(LockRequest {
            resource: name.as_str().to_string(),
            mode: self.lock_mode,
            quantity: self.resource_quantity,
            timeout_ms: self.resource_timeout_ms,
            create: self.resource_create,
            idle_lifespan_ms: self.resource_idle_lifespan_ms,
        });
        match self.call(&request).await? {
            Reply::Granted { element } => {
                self.state = SessionState::Locked;
                self.locked_element = element.clone();
                Ok(element)
            }
            Reply::Busy => Err(Error::LockBusy),
            Reply::Timeout => Err(Error::LockTimeout),
            Reply::NotFound => Err(Error::ResourceNotFound),
            Reply::Impossible => Err(Error::LockImpossible),
            Reply::Invalid { reason } => Err(Error::Protocol(reason)),
            other => Err(Error::Protocol(format!(
                "unexpected reply to lock: {other:?}"
            ))),
        }
    }

    /// Releases the held lock. On a transactional sequence this commits
    /// the element.
    pub async fn unlock(&mut self) -> Result<(), Error> {
        self.release(false, "unlock").await
    }

    /// Releases the held lock and returns the element to its pool, so the
    /// next grant hands it out again. Only transactional sequences honor
    /// the rollback; other kinds release anyway and report
    /// [`Error::NotTransactional`].
    pub async fn unlock_rollback(&mut self) -> Result<(), Error> {
        self.release(true, "unlock_rollback").await
    }

    async fn release(&mut self, rollback: bool, call: &'static str) -> Result<(), Error> {
        if self.state != SessionState::Locked {
            return Err(self.out_of_sequence(call));
        }
        let request = Request::Unlock(UnlockRequest {
            resource: self.resource_name.as_ref().map(|n| n.as_str().to_string()),
            rollback,
        });
        let reply = match self.call(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                // transport failed; the daemon releases on disconnect
                self.state = SessionState::Initialized;
                self.locked_element = None;
                return Err(e);
            }
        };
        self.state = SessionState::Initialized;
        self.locked_element = None;
        match reply {
            Reply::Released | Reply::NotHeld => Ok(()),
            Reply::NotTransactional => Err(Error::NotTransactional),
            Reply::Invalid { reason } => Err(Error::Protocol(reason)),
            other => Err(Error::Protocol(format!(
                "unexpected reply to unlock: {other:?}"
            ))),
        }
    }

    /// Round-trips a ping to verify the daemon is reachable.
    pub async fn ping(&mut self) -> Result<(), Error> {
        if self.state != SessionState::Initialized {
            return Err(self.out_of_sequence("ping"));
        }
        self.ensure_connected().await?;
        match self.call(&Request::Ping).await? {
            Reply::Pong => Ok(()),
            other => Err(Error::Protocol(format!(
                "unexpected reply to ping: {other:?}"
            ))),
        }
    }

    /// Tears the session down. Refused while a lock is held.
    pub fn clean(&mut self) -> Result<(), Error> {
        match self.state {
            SessionState::Uninitialized | SessionState::Initialized => {
                self.conn = None;
                self.locked_element = None;
                self.state = SessionState::Cleaned;
                Ok(())
            }
            SessionState::Locked | SessionState::Cleaned => Err(self.out_of_sequence("clean")),
        }
    }

    // ─── Configuration ──────────────────────────────────────────────────────

    pub fn set_resource_name(&mut self, name: &str) -> Result<(), Error> {
        self.guard_mutable("set_resource_name")?;
        self.resource_name = Some(name.parse()?);
        Ok(())
    }

    pub fn resource_name(&self) -> Option<&str> {
        self.resource_name.as_ref().map(|n| n.as_str())
    }

    pub fn set_socket_name(&mut self, path: impl Into<PathBuf>) -> Result<(), Error> {
        self.guard_mutable("set_socket_name")?;
        self.socket_name = Some(path.into());
        Ok(())
    }

    pub fn socket_name(&self) -> Option<&Path> {
        self.socket_name.as_deref()
    }

    pub fn set_unicast_address(&mut self, address: IpAddr) -> Result<(), Error> {
        self.guard_mutable("set_unicast_address")?;
        self.unicast_address = Some(address);
        Ok(())
    }

    pub fn unicast_address(&self) -> Option<IpAddr> {
        self.unicast_address
    }

    pub fn set_unicast_port(&mut self, port: u16) -> Result<(), Error> {
        self.guard_mutable("set_unicast_port")?;
        self.unicast_port = port;
        Ok(())
    }

    pub fn unicast_port(&self) -> u16 {
        self.unicast_port
    }

    pub fn set_multicast_address(&mut self, address: IpAddr) -> Result<(), Error> {
        self.guard_mutable("set_multicast_address")?;
        self.multicast_address = Some(address);
        Ok(())
    }

    pub fn multicast_address(&self) -> Option<IpAddr> {
        self.multicast_address
    }

    pub fn set_multicast_port(&mut self, port: u16) -> Result<(), Error> {
        self.guard_mutable("set_multicast_port")?;
        self.multicast_port = port;
        Ok(())
    }

    pub fn multicast_port(&self) -> u16 {
        self.multicast_port
    }

    pub fn set_discovery_attempts(&mut self, attempts: u32) -> Result<(), Error> {
        self.guard_mutable("set_discovery_attempts")?;
        if attempts == 0 {
            return Err(Error::InvalidParameter(
                "discovery attempts must be at least 1".to_string(),
            ));
        }
        self.discovery_attempts = attempts;
        Ok(())
    }

    pub fn discovery_attempts(&self) -> u32 {
        self.discovery_attempts
    }

    pub fn set_discovery_timeout(&mut self, timeout: Duration) -> Result<(), Error> {
        self.guard_mutable("set_discovery_timeout")?;
        self.discovery_timeout = timeout;
        Ok(())
    }

    pub fn discovery_timeout(&self) -> Duration {
        self.discovery_timeout
    }

    /// TTL applied to IPv4 multicast discovery probes
    pub fn set_discovery_ttl(&mut self, ttl: u32) -> Result<(), Error> {
        self.guard_mutable("set_discovery_ttl")?;
        self.discovery_ttl = ttl;
        Ok(())
    }

    pub fn discovery_ttl(&self) -> u32 {
        self.discovery_ttl
    }

    pub fn set_lock_mode(&mut self, mode: LockMode) -> Result<(), Error> {
        self.guard_mutable("set_lock_mode")?;
        self.lock_mode = mode;
        Ok(())
    }

    pub fn lock_mode(&self) -> LockMode {
        self.lock_mode
    }

    pub fn set_resource_quantity(&mut self, quantity: u64) -> Result<(), Error> {
        self.guard_mutable("set_resource_quantity")?;
        if quantity == 0 {
            return Err(Error::InvalidParameter(
                "resource quantity must be at least 1".to_string(),
            ));
        }
        self.resource_quantity = quantity;
        Ok(())
    }

    pub fn resource_quantity(&self) -> u64 {
        self.resource_quantity
    }

    pub fn set_resource_create(&mut self, create: bool) -> Result<(), Error> {
        self.guard_mutable("set_resource_create")?;
        self.resource_create = create;
        Ok(())
    }

    pub fn resource_create(&self) -> bool {
        self.resource_create
    }

    /// Lock wait budget in milliseconds: negative waits forever, zero
    /// never waits.
    pub fn set_resource_timeout(&mut self, timeout_ms: i64) -> Result<(), Error> {
        self.guard_mutable("set_resource_timeout")?;
        self.resource_timeout_ms = timeout_ms;
        Ok(())
    }

    pub fn resource_timeout(&self) -> i64 {
        self.resource_timeout_ms
    }

    /// How long the resource may sit idle on the daemon before the reaper
    /// may evict it.
    pub fn set_resource_idle_lifespan(&mut self, lifespan_ms: u64) -> Result<(), Error> {
        self.guard_mutable("set_resource_idle_lifespan")?;
        self.resource_idle_lifespan_ms = lifespan_ms;
        Ok(())
    }

    pub fn resource_idle_lifespan(&self) -> u64 {
        self.resource_idle_lifespan_ms
    }

    // ─── Internals ──────────────────────────────────────────────────────────

    fn guard_mutable(&self, call: &'static str) -> Result<(), Error> {
        match self.state {
            SessionState::Uninitialized | SessionState::Initialized => Ok(()),
            SessionState::Locked => Err(Error::ImmutableSession),
            SessionState::Cleaned => Err(self.out_of_sequence(call)),
        }
    }

    fn out_of_sequence(&self, call: &'static str) -> Error {
        Error::InvalidSequence {
            call,
            state: self.state.as_str(),
        }
    }

    async fn ensure_connected(&mut self) -> Result<(), Error> {
        if self.conn.is_some() {
            return Ok(());
        }
        if let Some(path) = &self.socket_name {
            let stream = UnixStream::connect(path).await?;
            tracing::debug!(socket = %path.display(), "connected (unix)");
            self.conn = Some(Conn::Unix(BufReader::new(stream)));
            return Ok(());
        }
        if let Some(ip) = self.unicast_address {
            let addr = SocketAddr::new(ip, self.unicast_port);
            let stream = TcpStream::connect(addr).await?;
            tracing::debug!(address = %addr, "connected (tcp)");
            self.conn = Some(Conn::Tcp(BufReader::new(stream)));
            return Ok(());
        }
        if let Some(group) = self.multicast_address {
            let cfg = DiscoveryConfig {
                address: group,
                port: self.multicast_port,
                attempts: self.discovery_attempts,
                timeout: self.discovery_timeout,
                ttl: self.discovery_ttl,
            };
            let addr = discovery::probe(&cfg).await?;
            let stream = TcpStream::connect(addr).await?;
            tracing::debug!(address = %addr, "connected (discovered)");
            self.conn = Some(Conn::Tcp(BufReader::new(stream)));
            return Ok(());
        }
        Err(Error::InvalidParameter(
            "no endpoint configured: set a socket name, a unicast address, or a multicast group"
                .to_string(),
        ))
    }

    async fn call(&mut self, request: &Request) -> Result<Reply, Error> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(Error::Protocol("not connected".to_string()));
        };
        match conn.call(request).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                // a broken connection is not reused; the next call redials
                self.conn = None;
                Err(e)
            }
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}
