//! Periodic cleanup of battles nobody joined

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::service::Arena;

pub struct SessionReaper {
    arena: Arc<Arena>,
    interval: Duration,
}

impl SessionReaper {
    pub fn new(arena: Arc<Arena>, interval: Duration) -> Self {
        Self { arena, interval }
    }

    /// Sweep once immediately, then once per interval. Never returns.
    pub async fn run(self) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = self.interval.as_secs(), "Session reaper started");
        loop {
            ticker.tick().await;
            self.sweep_once().await;
        }
    }

    pub async fn sweep_once(&self) -> usize {
        let removed = self.arena.sweep_expired().await;
        if removed > 0 {
            info!(removed, "Cleaned up expired battles");
        } else {
            debug!("No expired battles");
        }
        removed
    }
}
