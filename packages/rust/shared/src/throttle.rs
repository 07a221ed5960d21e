//! Per-host request spacing.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Reserves request slots so that two requests to the same host start at
/// least `spacing` apart, regardless of how many workers are fetching.
///
/// Slots are reserved under the lock and waited for outside it, so a slow
/// request never delays reservations for other hosts.
pub struct HostThrottle {
    spacing: Duration,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl HostThrottle {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    /// Wait until the next free slot for `host`.
    pub async fn reserve(&self, host: &str) {
        if self.spacing.is_zero() {
            return;
        }

        let key = host.to_ascii_lowercase();
        let slot = {
            let mut slots = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = slots
                .get(&key)
                .copied()
                .filter(|next| *next > now)
                .unwrap_or(now);
            slots.insert(key, slot + self.spacing);
            slot
        };

        let now = Instant::now();
        if slot > now {
            debug!(host, wait_ms = (slot - now).as_millis() as u64, "waiting for host slot");
            tokio::time::sleep_until(slot).await;
        }
    }
}
