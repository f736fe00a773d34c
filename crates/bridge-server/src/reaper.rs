//! Background task closing sessions that have gone quiet.

use std::sync::Arc;
use std::time::Duration;

use bridge_core::Bridge;
use metrics::counter;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::metrics::SESSIONS_REAPED_TOTAL;

/// Every `every`, close sessions idle longer than `max_idle`, until
/// `shutdown` fires.
pub fn spawn_reaper(
    bridge: Arc<Bridge>,
    max_idle: Duration,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Skip the immediate first tick
        let _ = ticker.tick().await;
        debug!(max_idle_secs = max_idle.as_secs(), "idle reaper started");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let reaped = bridge.reap_idle(max_idle).await;
                    if reaped > 0 {
                        info!(reaped, "closed idle sessions");
                        counter!(SESSIONS_REAPED_TOTAL).increment(reaped as u64);
                    }
                }
            }
        }
        debug!("idle reaper stopped");
    })
}
