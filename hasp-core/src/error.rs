use thiserror::Error;

/// Every failure the engine or the session handle can report. One variant
/// per condition in the taxonomy; no catch-all besides I/O and protocol
/// framing.
#[derive(Debug, Error)]
pub enum Error {
    /// A session call made outside its valid source state. Local to the
    /// caller, never sent to the daemon, and never retried.
    #[error("invalid call sequence: {call} is not allowed in the {state} state")]
    InvalidSequence {
        call: &'static str,
        state: &'static str,
    },

    /// A configuration setter invoked while a lock is held
    #[error("session configuration is immutable while a lock is held")]
    ImmutableSession,

    #[error("'{0}' is not a valid resource name")]
    InvalidResourceName(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Resource absent and the request disallowed creating it
    #[error("resource does not exist and creation was disabled")]
    ResourceNotFound,

    /// Try-lock denied; the resource is held incompatibly right now
    #[error("resource is busy")]
    LockBusy,

    /// A bounded wait elapsed; the queue entry was removed
    #[error("lock wait timed out")]
    LockTimeout,

    /// The request can never be satisfied, e.g. a numeric quantity above
    /// the resource's total
    #[error("requested quantity can never be satisfied by this resource")]
    LockImpossible,

    /// Warning, not a hard failure: the unlock completed, but rollback was
    /// requested on a kind that cannot honor it
    #[error("resource is not transactional; rollback was ignored")]
    NotTransactional,

    #[error("no daemon answered after {attempts} discovery attempt(s)")]
    DiscoveryExhausted { attempts: u32 },

    /// Malformed or unexpected traffic on an otherwise healthy connection
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Protocol(e.to_string())
    }
}
