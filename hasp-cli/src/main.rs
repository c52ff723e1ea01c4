use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};

use hasp_core::config::{
    DaemonConfig, DiscoveryConfig, ResponderConfig, DEFAULT_DISCOVERY_ATTEMPTS,
    DEFAULT_DISCOVERY_TIMEOUT_MS, DEFAULT_DISCOVERY_TTL, DEFAULT_PORT,
    DEFAULT_REAPER_INTERVAL_MS,
};
use hasp_core::discovery;
use hasp_core::error::Error;
use hasp_core::server;
use hasp_core::session::Session;

#[derive(Parser)]
#[command(
    name = "hasp",
    about = "hasp — distributed resource lock daemon",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the lock daemon
    Serve {
        /// TCP address to bind, e.g. 0.0.0.0:28015
        #[arg(long, env = "HASP_BIND")]
        bind: Option<SocketAddr>,

        /// Unix socket path to listen on
        #[arg(long, env = "HASP_SOCKET")]
        socket: Option<PathBuf>,

        /// UDP port to answer discovery probes on (requires a TCP bind)
        #[arg(long)]
        discovery_port: Option<u16>,

        /// Multicast group to join for discovery probes
        #[arg(long)]
        discovery_group: Option<Ipv4Addr>,

        /// Address to advertise in discovery answers instead of the
        /// probe's return path
        #[arg(long)]
        advertise: Option<IpAddr>,

        /// Milliseconds between idle-resource sweeps
        #[arg(long, default_value_t = DEFAULT_REAPER_INTERVAL_MS)]
        reaper_interval_ms: u64,
    },

    /// Probe for a daemon over UDP and print its address
    Discover {
        /// Multicast group (or unicast address) to probe
        #[arg(long, default_value = "224.0.0.1")]
        address: IpAddr,

        /// Discovery port
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Probes to send before giving up
        #[arg(long, default_value_t = DEFAULT_DISCOVERY_ATTEMPTS)]
        attempts: u32,

        /// Per-probe answer timeout in milliseconds
        #[arg(long, default_value_t = DEFAULT_DISCOVERY_TIMEOUT_MS)]
        timeout_ms: u64,

        /// Multicast TTL for the probes
        #[arg(long, default_value_t = DEFAULT_DISCOVERY_TTL)]
        ttl: u32,
    },

    /// Round-trip a ping against a running daemon
    Ping {
        /// Unix socket path of the daemon
        #[arg(long, env = "HASP_SOCKET", conflicts_with = "address")]
        socket: Option<PathBuf>,

        /// Daemon TCP address
        #[arg(long)]
        address: Option<IpAddr>,

        /// Daemon TCP port
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            socket,
            discovery_port,
            discovery_group,
            advertise,
            reaper_interval_ms,
        } => {
            // with nothing configured, serve TCP on the default port
            let bind = match (bind, &socket) {
                (None, None) => Some(SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))),
                (bind, _) => bind,
            };
            let config = DaemonConfig {
                socket,
                bind,
                discovery: discovery_port.map(|port| ResponderConfig {
                    port,
                    group: discovery_group,
                    advertise,
                }),
                reaper_interval: Some(Duration::from_millis(reaper_interval_ms)),
            };
            let handle = match server::start(config).await {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::error!(error = %e, "failed to start daemon");
                    process::exit(1);
                }
            };
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to wait for the shutdown signal");
            }
            handle.shutdown().await;
        }

        Commands::Discover {
            address,
            port,
            attempts,
            timeout_ms,
            ttl,
        } => {
            let cfg = DiscoveryConfig {
                address,
                port,
                attempts,
                timeout: Duration::from_millis(timeout_ms),
                ttl,
            };
            match discovery::probe(&cfg).await {
                Ok(found) => println!("{found}"),
                Err(e) => {
                    tracing::error!(error = %e, "no daemon answered");
                    process::exit(1);
                }
            }
        }

        Commands::Ping {
            socket,
            address,
            port,
        } => match ping(socket, address, port).await {
            Ok(()) => println!("pong"),
            Err(e) => {
                tracing::error!(error = %e, "ping failed");
                process::exit(1);
            }
        },

        Commands::Version => {
            println!("hasp {}", env!("CARGO_PKG_VERSION"));
            println!("Distributed resource lock daemon");
        }
    }
}

async fn ping(socket: Option<PathBuf>, address: Option<IpAddr>, port: u16) -> Result<(), Error> {
    let mut session = Session::new();
    match socket {
        Some(path) => session.set_socket_name(path)?,
        None => {
            let ip = address.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
            session.set_unicast_address(ip)?;
            session.set_unicast_port(port)?;
        }
    }
    session.init()?;
    session.ping().await
}
