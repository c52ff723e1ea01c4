//! UDP daemon discovery: the responder task a daemon runs, and the probe
//! loop clients use when no endpoint is configured. Probes and
//! announcements are correlated by id so stray datagrams on the port are
//! ignored.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use nanoid::nanoid;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::{DiscoveryConfig, ResponderConfig};
use crate::error::Error;
use crate::proto::Datagram;

const MAX_DATAGRAM: usize = 512;

/// Binds the responder socket, joins the multicast group if one is
/// configured, and spawns the answer loop. Returns the task and the port
/// actually bound, for configs that ask for an ephemeral port.
pub async fn spawn_responder(
    cfg: ResponderConfig,
    service_port: u16,
    shutdown: watch::Receiver<bool>,
) -> Result<(JoinHandle<()>, u16), Error> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, cfg.port)).await?;
    if let Some(group) = cfg.group {
        socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)?;
    }
    let port = socket.local_addr()?.port();
    let handle = tokio::spawn(respond(socket, cfg, service_port, shutdown));
    Ok((handle, port))
}

async fn respond(
    socket: UdpSocket,
    cfg: ResponderConfig,
    service_port: u16,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            r = socket.recv_from(&mut buf) => {
                let (n, src) = match r {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(error = %e, "discovery receive failed");
                        continue;
                    }
                };
                match serde_json::from_slice::<Datagram>(&buf[..n]) {
                    Ok(Datagram::Probe { id }) => {
                        let announce = Datagram::Announce {
                            id,
                            address: cfg.advertise.map(|a| a.to_string()),
                            port: service_port,
                        };
                        let Ok(bytes) = serde_json::to_vec(&announce) else {
                            continue;
                        };
                        match socket.send_to(&bytes, src).await {
                            Ok(_) => tracing::debug!(peer = %src, "discovery probe answered"),
                            Err(e) => tracing::warn!(error = %e, peer = %src, "discovery reply failed"),
                        }
                    }
                    // stray traffic on the discovery port
                    _ => {}
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Probes for a daemon: up to `attempts` datagrams, each waited on for
/// `timeout`, over multicast or unicast. The TTL is applied to IPv4
/// multicast probes only, the scope the responder serves. Returns the
/// daemon's connectable endpoint, falling back to the announcement's
/// source address when the daemon does not advertise one.
pub async fn probe(cfg: &DiscoveryConfig) -> Result<SocketAddr, Error> {
    for attempt in 1..=cfg.attempts {
        let bind_addr: SocketAddr = match cfg.address {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        if let IpAddr::V4(a) = cfg.address {
            if a.is_multicast() {
                socket.set_multicast_ttl_v4(cfg.ttl)?;
            }
        }
        let id = nanoid!();
        let bytes = serde_json::to_vec(&Datagram::Probe { id: id.clone() })?;
        socket.send_to(&bytes, (cfg.address, cfg.port)).await?;

        let deadline = time::Instant::now() + cfg.timeout;
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            let remaining = deadline.saturating_duration_since(time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            let Ok(received) = time::timeout(remaining, socket.recv_from(&mut buf)).await else {
                break;
            };
            let (n, src) = received?;
            match serde_json::from_slice::<Datagram>(&buf[..n]) {
                Ok(Datagram::Announce {
                    id: got,
                    address,
                    port,
                }) if got == id => {
                    let ip = match address {
                        Some(a) => a
                            .parse::<IpAddr>()
                            .map_err(|_| Error::Protocol(format!("bad announce address '{a}'")))?,
                        None => src.ip(),
                    };
                    return Ok(SocketAddr::new(ip, port));
                }
                // an answer to someone else's probe, or noise; wait on
                _ => {}
            }
        }
        tracing::debug!(attempt, "discovery attempt timed out");
    }
    Err(Error::DiscoveryExhausted {
        attempts: cfg.attempts,
    })
}
