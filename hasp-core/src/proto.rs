//! Wire protocol: newline-delimited JSON over the daemon socket, plus the
//! UDP discovery datagrams. One request, one reply; a LOCK reply is
//! deferred until the request is granted, denied, or timed out.

use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_QUANTITY, DEFAULT_TIMEOUT_MS};
use crate::types::LockMode;

// ─── Requests ───────────────────────────────────────────────────────────────

/// Client → daemon requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "verb", rename_all = "snake_case")]
pub enum Request {
    Lock(LockRequest),
    Unlock(UnlockRequest),
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRequest {
    pub resource: String,
    #[serde(default)]
    pub mode: LockMode,
    /// Units taken from a numeric resource; ignored by other kinds
    #[serde(default = "default_quantity")]
    pub quantity: u64,
    /// 0 = try-lock, > 0 = bounded wait in ms, < 0 = wait forever
    #[serde(default = "default_timeout")]
    pub timeout_ms: i64,
    /// Whether the daemon may create the resource on first reference
    #[serde(default = "default_create")]
    pub create: bool,
    /// Idle lifespan fixed at creation; 0 = evictable on the first sweep
    #[serde(default)]
    pub idle_lifespan_ms: u64,
}

impl LockRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.resource.is_empty() {
            return Err("resource is required".to_string());
        }
        if self.quantity == 0 {
            return Err("quantity must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockRequest {
    /// When present, must name the resource this session holds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default)]
    pub rollback: bool,
}

// ─── Replies ────────────────────────────────────────────────────────────────

/// Daemon → client replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    /// Lock granted; sequence kinds carry the element
    Granted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        element: Option<String>,
    },
    /// Try-lock denied
    Busy,
    /// Bounded wait elapsed; the wait-queue entry was removed
    Timeout,
    /// Resource absent and create was disabled
    NotFound,
    /// The request can never be satisfied by this resource
    Impossible,
    /// Unlock acknowledged
    Released,
    /// Unlock acknowledged, but rollback was requested on a
    /// non-transactional kind
    NotTransactional,
    /// Unlock with no lock held; ignored
    NotHeld,
    Pong,
    /// Request rejected before touching any resource state
    Invalid { reason: String },
}

// ─── Discovery Datagrams ────────────────────────────────────────────────────

/// UDP discovery exchange, correlated by the probe's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verb", rename_all = "snake_case")]
pub enum Datagram {
    /// Client probe
    Probe { id: String },
    /// Daemon answer carrying its connectable endpoint; a missing address
    /// means "use this datagram's source address"
    Announce {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        address: Option<String>,
        port: u16,
    },
}

fn default_quantity() -> u64 {
    DEFAULT_QUANTITY
}

fn default_timeout() -> i64 {
    DEFAULT_TIMEOUT_MS
}

fn default_create() -> bool {
    true
}
