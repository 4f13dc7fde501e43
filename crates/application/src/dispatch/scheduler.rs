//! Per-tier admission scheduler.

use llm_leaderboard_domain::ProviderTier;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, instrument};

/// Admission timestamps kept per tier
const WINDOW_CAPACITY: usize = 64;

struct TierWindow {
    interval: Duration,
    admissions: Mutex<VecDeque<Instant>>,
}

/// Throttles admission per provider tier.
///
/// Each tier with a configured interval keeps a sliding window of recent
/// admission instants. The window lock is held across the wait, so checking
/// the last admission and recording the new one cannot interleave between
/// callers. Tiers without an interval are admitted immediately.
pub struct DispatchScheduler {
    tiers: HashMap<ProviderTier, TierWindow>,
}

impl DispatchScheduler {
    /// Create a scheduler from per-tier minimum intervals
    pub fn new(intervals: HashMap<ProviderTier, Duration>) -> Self {
        let tiers = intervals
            .into_iter()
            .filter(|(_, interval)| !interval.is_zero())
            .map(|(tier, interval)| {
                (
                    tier,
                    TierWindow {
                        interval,
                        admissions: Mutex::new(VecDeque::with_capacity(WINDOW_CAPACITY)),
                    },
                )
            })
            .collect();
        Self { tiers }
    }

    /// A scheduler that never waits
    pub fn unthrottled() -> Self {
        Self {
            tiers: HashMap::new(),
        }
    }

    /// Minimum interval enforced for `tier`, if any
    pub fn interval(&self, tier: ProviderTier) -> Option<Duration> {
        self.tiers.get(&tier).map(|w| w.interval)
    }

    /// Suspend until a call on `tier` may proceed.
    #[instrument(skip(self))]
    pub async fn admit(&self, tier: ProviderTier) {
        let Some(window) = self.tiers.get(&tier) else {
            return;
        };

        let mut admissions = window.admissions.lock().await;

        if let Some(last) = admissions.back() {
            let ready_at = *last + window.interval;
            if ready_at > Instant::now() {
                debug!(
                    wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "Waiting for admission"
                );
                sleep_until(ready_at).await;
            }
        }

        admissions.push_back(Instant::now());
        while admissions.len() > WINDOW_CAPACITY {
            admissions.pop_front();
        }
    }

    /// Number of admissions currently held in the tier's window
    pub async fn admitted(&self, tier: ProviderTier) -> usize {
        match self.tiers.get(&tier) {
            Some(window) => window.admissions.lock().await.len(),
            None => 0,
        }
    }
}
