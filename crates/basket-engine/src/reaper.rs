//! # Reservation Reaper
//!
//! Optional background task that deletes expired reservations.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  loop {                                                                 │
//! │      select! {                                                          │
//! │          interval.tick()  → manager.purge_expired()                    │
//! │          shutdown_rx      → break                                      │
//! │      }                                                                  │
//! │  }                                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Expired rows already stop counting on read, so the reaper changes no
//! observable availability. It keeps the table small and drops idle key
//! locks.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::reservation::ReservationManager;

/// Periodically purges expired reservations.
pub struct ReservationReaper {
    manager: ReservationManager,
    interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping a spawned reaper.
#[derive(Debug)]
pub struct ReaperHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Stops the reaper and waits for the current sweep to finish.
    pub async fn shutdown(self) {
        if self.shutdown_tx.send(()).await.is_err() {
            warn!("Reaper already stopped");
        }
        if let Err(e) = self.task.await {
            error!(error = %e, "Reaper task ended abnormally");
        }
    }
}

impl ReservationReaper {
    /// Spawns a reaper sweeping every `interval`.
    pub fn spawn(manager: ReservationManager, interval: Duration) -> ReaperHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let reaper = ReservationReaper {
            manager,
            interval,
            shutdown_rx,
        };
        let task = tokio::spawn(reaper.run());
        ReaperHandle { shutdown_tx, task }
    }

    async fn run(mut self) {
        info!(interval_secs = self.interval.as_secs(), "Reservation reaper starting");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.manager.purge_expired().await {
                        error!(error = %e, "Reservation sweep failed");
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Reservation reaper shutting down");
                    break;
                }
            }
        }

        info!("Reservation reaper stopped");
    }
}
