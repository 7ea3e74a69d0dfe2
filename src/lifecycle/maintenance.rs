//! Periodic state maintenance.
//!
//! # Responsibilities
//! - Sweep idle rate-limit windows
//! - Purge expired blocklist entries
//! - Sweep idle abuse windows
//!
//! Blocking decisions never depend on this task; expiry is checked on every
//! lookup. The sweep only bounds memory.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::security::gate::SecurityGate;

pub struct MaintenanceTask {
    gate: Arc<SecurityGate>,
    interval: Duration,
}

impl MaintenanceTask {
    pub fn new(gate: Arc<SecurityGate>, interval: Duration) -> Self {
        Self { gate, interval }
    }

    /// Sweep on every tick until shutdown is signalled.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        tracing::info!(interval_secs = self.interval.as_secs(), "Maintenance task started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.gate.run_maintenance();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Maintenance task stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GateConfig;
    use crate::lifecycle::Shutdown;
    use crate::security::clock::ManualClock;
    use crate::security::firewall::BlockReason;

    #[tokio::test(start_paused = true)]
    async fn test_sweeps_until_shutdown() {
        let clock = Arc::new(ManualClock::new(0));
        let gate = Arc::new(SecurityGate::with_clock(&GateConfig::default(), clock.clone()).unwrap());
        gate.firewall().block("10.0.0.1", BlockReason::MaliciousPattern);
        gate.rate_limiter().check_rate_limit("10.0.0.1", "/");
        clock.advance_secs(3600);

        let shutdown = Shutdown::new();
        let task = MaintenanceTask::new(gate.clone(), Duration::from_secs(60));
        let handle = tokio::spawn(task.run(shutdown.subscribe()));

        // The immediate first tick does not sweep.
        tokio::task::yield_now().await;
        assert_eq!(gate.rate_limiter().tracked_keys(), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        assert_eq!(gate.rate_limiter().tracked_keys(), 0);
        assert_eq!(gate.firewall().purge_expired(), 0);

        shutdown.trigger();
        handle.await.unwrap();
    }
}
