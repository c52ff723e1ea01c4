//! Daemon configuration and the protocol's default values.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Well-known daemon port, also the default discovery port
pub const DEFAULT_PORT: u16 = 28015;
/// Discovery probe attempts before giving up
pub const DEFAULT_DISCOVERY_ATTEMPTS: u32 = 2;
/// Per-attempt discovery wait
pub const DEFAULT_DISCOVERY_TIMEOUT_MS: u64 = 500;
/// Multicast probe TTL
pub const DEFAULT_DISCOVERY_TTL: u32 = 1;
/// Units a lock request takes when unspecified
pub const DEFAULT_QUANTITY: u64 = 1;
/// Lock wait when unspecified: negative means wait forever
pub const DEFAULT_TIMEOUT_MS: i64 = -1;
/// Idle-resource sweep cadence
pub const DEFAULT_REAPER_INTERVAL_MS: u64 = 1000;

/// Where and how a daemon listens. At least one of `socket` and `bind`
/// must be set; discovery additionally requires `bind`, since the
/// announced endpoint is the TCP one.
#[derive(Debug, Clone, Default)]
pub struct DaemonConfig {
    /// Unix-domain socket path for local clients
    pub socket: Option<PathBuf>,
    /// TCP bind address for network clients
    pub bind: Option<SocketAddr>,
    /// UDP discovery responder, when enabled
    pub discovery: Option<ResponderConfig>,
    /// Idle-resource sweep interval; defaults to [`DEFAULT_REAPER_INTERVAL_MS`]
    pub reaper_interval: Option<Duration>,
}

/// Discovery responder parameters.
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// UDP port to answer probes on
    pub port: u16,
    /// Multicast group to join; `None` answers unicast probes only
    pub group: Option<Ipv4Addr>,
    /// Address to put in announcements; `None` lets clients fall back to
    /// the announcement's source address
    pub advertise: Option<IpAddr>,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            group: None,
            advertise: None,
        }
    }
}

/// Client-side discovery parameters, assembled by the session handle from
/// its individual settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Multicast group or the daemon's unicast address
    pub address: IpAddr,
    pub port: u16,
    pub attempts: u32,
    pub timeout: Duration,
    /// Probe TTL for IPv4 multicast groups, matching the responder's
    /// IPv4-only scope; unicast and IPv6 probes leave the OS default
    pub ttl: u32,
}
