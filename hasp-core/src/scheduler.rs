//! One actor task per live resource. Commands arrive over an mpsc channel
//! and are applied to the pure [`ResourceState`]; a request that must wait
//! keeps its reply sender parked here until a release sweep grants it. The
//! actor exits when the registry entry and every pinned reference are gone.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::registry::ResourceMeta;
use crate::resource::{Acquire, Regrant, ResourceState};
use crate::types::{LockMode, ResourceName};

/// Commands session workers send to a resource actor.
#[derive(Debug)]
pub enum Cmd {
    Lock {
        session: String,
        mode: LockMode,
        quantity: u64,
        /// False = try-lock: answer Busy instead of enqueueing
        wait: bool,
        reply: oneshot::Sender<LockReply>,
    },
    Unlock {
        session: String,
        rollback: bool,
        reply: oneshot::Sender<UnlockReply>,
    },
    /// Abandon a pending wait after a timeout; acknowledged so the caller
    /// knows the queue entry is really gone
    Cancel {
        session: String,
        done: oneshot::Sender<()>,
    },
    /// Connection dropped: release any grant, forget any wait entry
    Disconnect { session: String },
}

/// Answer to a `Lock` command, immediate or deferred through the same
/// sender once a release frees capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockReply {
    Granted { element: Option<String> },
    Busy,
    Impossible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockReply {
    Released,
    /// Rollback requested on a kind that cannot honor it; released anyway
    NotTransactional,
    NotHeld,
}

const CMD_BUFFER: usize = 64;

/// Spawns the actor and hands back its command channel.
pub fn spawn(name: ResourceName, meta: Arc<ResourceMeta>) -> mpsc::Sender<Cmd> {
    let (tx, rx) = mpsc::channel(CMD_BUFFER);
    tokio::spawn(run(name, rx, meta));
    tx
}

async fn run(name: ResourceName, mut rx: mpsc::Receiver<Cmd>, meta: Arc<ResourceMeta>) {
    let mut state = ResourceState::new(name);
    let mut pending: HashMap<String, oneshot::Sender<LockReply>> = HashMap::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            Cmd::Lock {
                session,
                mode,
                quantity,
                wait,
                reply,
            } => match state.try_acquire(&session, mode, quantity) {
                Acquire::Granted { element } => {
                    sync_meta(&meta, &state);
                    tracing::debug!(
                        resource = %state.name(),
                        session = %session,
                        mode = %mode,
                        "lock granted"
                    );
                    let _ = reply.send(LockReply::Granted {
                        element: element.map(|v| v.to_string()),
                    });
                }
                Acquire::Impossible => {
                    sync_meta(&meta, &state);
                    let _ = reply.send(LockReply::Impossible);
                }
                Acquire::Wait if wait => {
                    state.enqueue(&session, mode, quantity);
                    sync_meta(&meta, &state);
                    tracing::debug!(
                        resource = %state.name(),
                        session = %session,
                        "lock enqueued"
                    );
                    pending.insert(session, reply);
                }
                Acquire::Wait => {
                    sync_meta(&meta, &state);
                    let _ = reply.send(LockReply::Busy);
                }
            },
            Cmd::Unlock {
                session,
                rollback,
                reply,
            } => {
                let out = state.release(&session, rollback);
                deliver(&state, &mut pending, out.granted);
                sync_meta(&meta, &state);
                if out.released {
                    tracing::debug!(
                        resource = %state.name(),
                        session = %session,
                        rollback,
                        "lock released"
                    );
                }
                let verdict = if !out.released {
                    UnlockReply::NotHeld
                } else if out.not_transactional {
                    UnlockReply::NotTransactional
                } else {
                    UnlockReply::Released
                };
                let _ = reply.send(verdict);
            }
            Cmd::Cancel { session, done } => {
                if !state.cancel_waiter(&session) {
                    // the grant raced the cancellation; release it again
                    let granted = state.drop_session(&session);
                    deliver(&state, &mut pending, granted);
                }
                pending.remove(&session);
                sync_meta(&meta, &state);
                let _ = done.send(());
            }
            Cmd::Disconnect { session } => {
                pending.remove(&session);
                let granted = state.drop_session(&session);
                deliver(&state, &mut pending, granted);
                sync_meta(&meta, &state);
                tracing::debug!(
                    resource = %state.name(),
                    session = %session,
                    "session disconnected"
                );
            }
        }
    }
}

/// Wakes swept waiters through their parked reply senders.
fn deliver(
    state: &ResourceState,
    pending: &mut HashMap<String, oneshot::Sender<LockReply>>,
    granted: Vec<Regrant>,
) {
    for g in granted {
        if let Some(tx) = pending.remove(&g.session) {
            tracing::debug!(
                resource = %state.name(),
                session = %g.session,
                "queued lock granted"
            );
            let _ = tx.send(LockReply::Granted {
                element: g.element.map(|v| v.to_string()),
            });
        }
    }
}

fn sync_meta(meta: &ResourceMeta, state: &ResourceState) {
    meta.update(state.holder_count() + state.waiter_count());
}
