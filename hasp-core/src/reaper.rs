//! Background sweep evicting resources that have outlived their idle
//! lifespan. Independent of request traffic; cancelled through the
//! daemon's shutdown channel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::registry::Registry;

pub fn spawn(
    registry: Arc<Registry>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = time::interval(interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let evicted = registry.sweep(Instant::now());
                    if !evicted.is_empty() {
                        tracing::debug!(
                            count = evicted.len(),
                            resources = ?evicted,
                            "idle resources evicted"
                        );
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}
