//! Daemon bootstrap and the per-connection session protocol. Each accepted
//! connection gets its own worker task plus a reader task, so a client
//! that disappears mid-wait is noticed and its queue entry withdrawn. One
//! lock per session; the rest of the protocol machine lives in the match
//! arms of [`handle_lock`] and [`handle_unlock`].

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use nanoid::nanoid;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::{DEFAULT_REAPER_INTERVAL_MS, DaemonConfig};
use crate::discovery;
use crate::error::Error;
use crate::proto::{LockRequest, Reply, Request, UnlockRequest};
use crate::reaper;
use crate::registry::{Registry, ResourceRef};
use crate::scheduler::{Cmd, LockReply, UnlockReply};
use crate::types::ResourceName;

// ─── Bootstrap ──────────────────────────────────────────────────────────────

/// Binds listeners and background tasks per the config and returns the
/// running daemon's handle.
pub async fn start(config: DaemonConfig) -> Result<DaemonHandle, Error> {
    if config.socket.is_none() && config.bind.is_none() {
        return Err(Error::InvalidParameter(
            "a socket path or a bind address is required".to_string(),
        ));
    }
    if config.discovery.is_some() && config.bind.is_none() {
        return Err(Error::InvalidParameter(
            "discovery requires a TCP bind address to announce".to_string(),
        ));
    }

    let registry = Arc::new(Registry::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    let mut local_addr = None;
    if let Some(addr) = config.bind {
        let listener = TcpListener::bind(addr).await?;
        let bound = listener.local_addr()?;
        tracing::info!(address = %bound, "🔒 hasp daemon listening (tcp)");
        tasks.push(tokio::spawn(serve_tcp(
            listener,
            Arc::clone(&registry),
            shutdown_rx.clone(),
        )));
        local_addr = Some(bound);
    }

    if let Some(path) = &config.socket {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let listener = UnixListener::bind(path)?;
        tracing::info!(socket = %path.display(), "🔒 hasp daemon listening (unix)");
        tasks.push(tokio::spawn(serve_unix(
            listener,
            Arc::clone(&registry),
            shutdown_rx.clone(),
        )));
    }

    let mut discovery_port = None;
    if let (Some(dcfg), Some(bound)) = (config.discovery.clone(), local_addr) {
        let (task, port) =
            discovery::spawn_responder(dcfg.clone(), bound.port(), shutdown_rx.clone()).await?;
        match dcfg.group {
            Some(group) => tracing::info!(group = %group, port, "📡 discovery responder ready"),
            None => tracing::info!(port, "📡 discovery responder ready (unicast only)"),
        }
        tasks.push(task);
        discovery_port = Some(port);
    }

    let interval = config
        .reaper_interval
        .unwrap_or(Duration::from_millis(DEFAULT_REAPER_INTERVAL_MS));
    tasks.push(reaper::spawn(
        Arc::clone(&registry),
        interval,
        shutdown_rx.clone(),
    ));

    Ok(DaemonHandle {
        local_addr,
        socket_path: config.socket.clone(),
        discovery_port,
        registry,
        shutdown_tx,
        tasks,
    })
}

/// A running daemon. Dropping the handle leaves the tasks running;
/// call [`shutdown`](Self::shutdown) to stop them.
pub struct DaemonHandle {
    local_addr: Option<SocketAddr>,
    socket_path: Option<PathBuf>,
    discovery_port: Option<u16>,
    registry: Arc<Registry>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl DaemonHandle {
    /// Actual TCP address after binding, when TCP is enabled
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn socket_path(&self) -> Option<&Path> {
        self.socket_path.as_deref()
    }

    /// Actual discovery port, when the responder is enabled
    pub fn discovery_port(&self) -> Option<u16> {
        self.discovery_port
    }

    /// Live resources in the registry
    pub fn resource_count(&self) -> usize {
        self.registry.len()
    }

    /// Stops listeners, reaper, and discovery. Connections already
    /// established end when their clients go away.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        if let Some(path) = &self.socket_path {
            let _ = std::fs::remove_file(path);
        }
        tracing::info!("hasp daemon stopped");
    }
}

// ─── Accept Loops ───────────────────────────────────────────────────────────

async fn serve_tcp(
    listener: TcpListener,
    registry: Arc<Registry>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            r = listener.accept() => match r {
                Ok((stream, peer)) => {
                    tracing::debug!(peer = %peer, "client connected");
                    let registry = Arc::clone(&registry);
                    tokio::spawn(async move {
                        let (read, write) = stream.into_split();
                        session(BufReader::new(read), write, registry).await;
                    });
                }
                Err(e) => tracing::warn!(error = %e, "tcp accept failed"),
            },
            _ = shutdown.changed() => break,
        }
    }
}

async fn serve_unix(
    listener: UnixListener,
    registry: Arc<Registry>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            r = listener.accept() => match r {
                Ok((stream, _)) => {
                    tracing::debug!("local client connected");
                    let registry = Arc::clone(&registry);
                    tokio::spawn(async move {
                        let (read, write) = stream.into_split();
                        session(BufReader::new(read), write, registry).await;
                    });
                }
                Err(e) => tracing::warn!(error = %e, "unix accept failed"),
            },
            _ = shutdown.changed() => break,
        }
    }
}

// ─── Session Protocol ───────────────────────────────────────────────────────

/// Requests parsed off the wire by the reader task. A decode failure ends
/// the session after one Invalid reply.
type Inbound = Result<Request, String>;

/// What the worker does with a handler's answer.
enum Flow {
    Reply(Reply),
    ReplyClose(Reply),
    Close,
}

/// The connection's protocol state: at most one lock per session.
enum ConnState {
    Idle,
    Locked(HeldLock),
}

/// A held grant pins its resource so the reaper cannot evict it.
struct HeldLock {
    name: ResourceName,
    res: ResourceRef,
}

async fn session<R, W>(reader: R, mut writer: W, registry: Arc<Registry>)
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let session_id = nanoid!();
    let (tx, mut rx) = mpsc::channel::<Inbound>(8);
    let reader_task = tokio::spawn(read_requests(reader, tx));
    let mut state = ConnState::Idle;

    while let Some(inbound) = rx.recv().await {
        let flow = match inbound {
            Err(reason) => Flow::ReplyClose(Reply::Invalid { reason }),
            Ok(Request::Ping) => Flow::Reply(Reply::Pong),
            Ok(Request::Lock(req)) => {
                handle_lock(&session_id, &registry, &mut state, req, &mut rx).await
            }
            Ok(Request::Unlock(req)) => handle_unlock(&session_id, &mut state, req).await,
        };
        match flow {
            Flow::Reply(reply) => {
                if write_reply(&mut writer, &reply).await.is_err() {
                    break;
                }
            }
            Flow::ReplyClose(reply) => {
                let _ = write_reply(&mut writer, &reply).await;
                break;
            }
            Flow::Close => break,
        }
    }

    // client gone; give back whatever it still held
    if let ConnState::Locked(held) = state {
        let _ = held
            .res
            .sender()
            .send(Cmd::Disconnect {
                session: session_id.clone(),
            })
            .await;
        tracing::debug!(
            session = %session_id,
            resource = %held.name,
            "released lock of departed client"
        );
    }
    reader_task.abort();
}

async fn read_requests<R>(mut reader: R, tx: mpsc::Sender<Inbound>)
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                if line.trim().is_empty() {
                    continue;
                }
                let item = serde_json::from_str::<Request>(&line).map_err(|e| e.to_string());
                let malformed = item.is_err();
                if tx.send(item).await.is_err() || malformed {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "connection read failed");
                break;
            }
        }
    }
}

async fn handle_lock(
    session_id: &str,
    registry: &Registry,
    state: &mut ConnState,
    req: LockRequest,
    rx: &mut mpsc::Receiver<Inbound>,
) -> Flow {
    if matches!(state, ConnState::Locked(_)) {
        return Flow::Reply(Reply::Invalid {
            reason: "session already holds a lock".to_string(),
        });
    }
    if let Err(reason) = req.validate() {
        return Flow::Reply(Reply::Invalid { reason });
    }
    let name = match ResourceName::from_str(&req.resource) {
        Ok(n) => n,
        Err(e) => {
            return Flow::Reply(Reply::Invalid {
                reason: e.to_string(),
            });
        }
    };
    let res = match registry.resolve(
        &name,
        req.create,
        Duration::from_millis(req.idle_lifespan_ms),
    ) {
        Ok(r) => r,
        Err(Error::ResourceNotFound) => return Flow::Reply(Reply::NotFound),
        Err(e) => {
            return Flow::Reply(Reply::Invalid {
                reason: e.to_string(),
            });
        }
    };

    let (reply_tx, mut reply_rx) = oneshot::channel();
    let cmd = Cmd::Lock {
        session: session_id.to_string(),
        mode: req.mode,
        quantity: req.quantity,
        wait: req.timeout_ms != 0,
        reply: reply_tx,
    };
    if res.sender().send(cmd).await.is_err() {
        return Flow::Reply(Reply::Invalid {
            reason: "resource is shutting down".to_string(),
        });
    }

    let deadline = (req.timeout_ms > 0)
        .then(|| time::Instant::now() + Duration::from_millis(req.timeout_ms as u64));
    tokio::select! {
        granted = &mut reply_rx => match granted {
            Ok(LockReply::Granted { element }) => {
                *state = ConnState::Locked(HeldLock { name, res });
                Flow::Reply(Reply::Granted { element })
            }
            Ok(LockReply::Busy) => Flow::Reply(Reply::Busy),
            Ok(LockReply::Impossible) => Flow::Reply(Reply::Impossible),
            Err(_) => Flow::Reply(Reply::Invalid {
                reason: "resource is shutting down".to_string(),
            }),
        },
        _ = sleep_until(deadline) => {
            cancel_wait(session_id, &res).await;
            Flow::Reply(Reply::Timeout)
        }
        inbound = rx.recv() => {
            cancel_wait(session_id, &res).await;
            match inbound {
                // pipelining while a lock is pending breaks the protocol
                Some(_) => Flow::ReplyClose(Reply::Invalid {
                    reason: "request sent while a lock was pending".to_string(),
                }),
                None => Flow::Close,
            }
        }
    }
}

async fn handle_unlock(session_id: &str, state: &mut ConnState, req: UnlockRequest) -> Flow {
    let ConnState::Locked(held) = state else {
        // unlocking nothing is ignored; clients may unlock defensively
        return Flow::Reply(Reply::NotHeld);
    };
    if let Some(named) = &req.resource {
        if named != held.name.as_str() {
            return Flow::Reply(Reply::Invalid {
                reason: format!("session holds '{}', not '{}'", held.name, named),
            });
        }
    }
    let (reply_tx, reply_rx) = oneshot::channel();
    let cmd = Cmd::Unlock {
        session: session_id.to_string(),
        rollback: req.rollback,
        reply: reply_tx,
    };
    if held.res.sender().send(cmd).await.is_err() {
        return Flow::Reply(Reply::Invalid {
            reason: "resource is shutting down".to_string(),
        });
    }
    let verdict = match reply_rx.await {
        Ok(v) => v,
        Err(_) => {
            return Flow::Reply(Reply::Invalid {
                reason: "resource is shutting down".to_string(),
            });
        }
    };
    *state = ConnState::Idle;
    Flow::Reply(match verdict {
        UnlockReply::Released => Reply::Released,
        UnlockReply::NotTransactional => Reply::NotTransactional,
        UnlockReply::NotHeld => Reply::NotHeld,
    })
}

/// Withdraws a pending wait and confirms the queue entry is gone before
/// answering the client.
async fn cancel_wait(session_id: &str, res: &ResourceRef) {
    let (done_tx, done_rx) = oneshot::channel();
    let cmd = Cmd::Cancel {
        session: session_id.to_string(),
        done: done_tx,
    };
    if res.sender().send(cmd).await.is_ok() {
        let _ = done_rx.await;
    }
}

async fn sleep_until(deadline: Option<time::Instant>) {
    match deadline {
        Some(d) => time::sleep_until(d).await,
        None => std::future::pending::<()>().await,
    }
}

async fn write_reply<W>(writer: &mut W, reply: &Reply) -> Result<(), Error>
where
    W: AsyncWrite + Unpin,
{
    let mut bytes = serde_json::to_vec(reply)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}
