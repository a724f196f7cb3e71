//! Words-per-hour budget.
//!
//! The history is the log of scan marks kept in the domain state, so the
//! budget carries over between invocations without any state of its own.

use chrono::{DateTime, Duration, Utc};
use driftnet_state::DomainState;

/// Length of the rolling window.
pub const WINDOW_MINUTES: i64 = 60;

/// Number of additional words this invocation may newly scan.
///
/// With a limit this is `max(0, limit - marks in the trailing window)`;
/// without one it is `remaining`, the count of words still unscanned.
#[must_use]
pub fn allowance(
    now: DateTime<Utc>,
    limit_per_hour: Option<u32>,
    history: &DomainState,
    remaining: usize,
) -> usize {
    match limit_per_hour {
        Some(limit) => {
            let used = history.scans_since(now - Duration::minutes(WINDOW_MINUTES));
            (limit as usize).saturating_sub(used)
        }
        None => remaining,
    }
}
