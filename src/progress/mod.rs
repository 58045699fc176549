/// Course progression
///
/// Module unlocking, daily streaks and badge awards. All state lives in the
/// database; these services only hold a pool handle and their settings.

pub mod badges;
pub mod streak;
pub mod unlock;

pub use badges::{highest_new_badge, BadgeEvaluator, BADGE_THRESHOLDS};
pub use streak::{StreakTracker, StreakUpdate};
pub use unlock::{UnlockEngine, UnlockOutcome};

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};

/// Fixed offset that defines the civil day, in minutes east of UTC
pub fn civil_offset(minutes: i32) -> FixedOffset {
    // Range is checked by ServerConfig::validate; fall back to UTC otherwise
    FixedOffset::east_opt(minutes * 60).unwrap_or_else(|| {
        tracing::warn!(minutes, "civil offset out of range, using UTC");
        Utc.fix()
    })
}

/// Calendar date of an instant in the given offset
pub fn civil_date(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    instant.with_timezone(&offset).date_naive()
}
