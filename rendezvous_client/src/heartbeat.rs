//! Keep-alive timer for active channels

use std::time::Duration;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Period between keep-alive frames on an active channel
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Fixed-period timer whose first tick is one full period from now
///
/// Ticks stay on the `start + n * period` grid; ticks missed during a stall
/// collapse into one.
pub(crate) fn timer(period: Duration) -> Interval {
    let period = period.max(MIN_INTERVAL);
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}
