//! Trigger loop for the sync coordinator.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

use super::SyncCoordinator;

impl SyncCoordinator {
    /// Run the trigger loop until `shutdown` turns true or its sender is
    /// dropped.
    ///
    /// Cycles start on explicit requests, on each offline → online edge of
    /// `connectivity`, and on the periodic wake. Requests and wakes that
    /// arrive while offline are skipped: sending would only burn retries.
    /// Config updates are applied between cycles.
    #[tracing::instrument(skip_all)]
    pub async fn run(&self, mut connectivity: watch::Receiver<bool>, mut shutdown: watch::Receiver<bool>) {
        if *shutdown.borrow_and_update() {
            return;
        }

        let mut config_rx = self.config_rx.lock().await;
        let mut wake = periodic_wake(self.config.read().sync_interval());
        info!(interval = ?self.config.read().sync_interval(), "Outbox sync loop running");

        if *connectivity.borrow_and_update() {
            crate::metrics::record_trigger("startup");
            self.run_cycle("startup").await;
        }

        loop {
            tokio::select! {
                _ = self.sync_requested.notified() => {
                    if *connectivity.borrow() {
                        self.run_cycle("request").await;
                    } else {
                        debug!("Offline, requested sync deferred to reconnect");
                    }
                }

                Ok(()) = connectivity.changed() => {
                    let online = *connectivity.borrow_and_update();
                    if online {
                        info!("Connectivity regained");
                        crate::metrics::record_trigger("connectivity");
                        self.run_cycle("connectivity").await;
                    } else {
                        info!("Connectivity lost");
                    }
                }

                _ = next_tick(&mut wake) => {
                    if *connectivity.borrow() {
                        crate::metrics::record_trigger("interval");
                        self.run_cycle("interval").await;
                    }
                }

                Ok(()) = config_rx.changed() => {
                    let new_config = config_rx.borrow_and_update().clone();
                    info!(
                        max_batch_size = ?new_config.max_batch_size,
                        max_queue_size = ?new_config.max_queue_size,
                        interval_secs = new_config.sync_interval_secs,
                        "Config updated"
                    );
                    wake = periodic_wake(new_config.sync_interval());
                    *self.config.write() = new_config;
                }

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Outbox sync loop stopped");
                        break;
                    }
                }
            }
        }
    }

    async fn run_cycle(&self, source: &'static str) {
        let outcome = self.sync_now().await;
        debug!(source, outcome = %outcome, "Sync cycle finished");
    }
}

fn periodic_wake(period: Option<Duration>) -> Option<Interval> {
    period.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    })
}

async fn next_tick(wake: &mut Option<Interval>) {
    match wake {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
