/// Daily activity streaks
///
/// Days are compared as calendar dates in a fixed civil offset, never as
/// instants. `last_activity_date` keeps the raw instant.
use crate::{
    db::models::BadgeType,
    error::{LmsError, LmsResult},
    metrics,
    progress::{badges::BadgeEvaluator, civil_date, civil_offset},
};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Result of recording activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakUpdate {
    pub streak: i64,
    /// False when the user was already active today
    pub incremented: bool,
    pub badge_awarded: Option<BadgeType>,
}

/// Streak after activity on `today`, given the last active civil day
pub fn next_streak(current: i64, last_day: Option<NaiveDate>, today: NaiveDate) -> i64 {
    match last_day.map(|last| (today - last).num_days()) {
        Some(0) => current,
        Some(1) => current + 1,
        _ => 1,
    }
}

/// Streak as seen on read: broken once more than one civil day has passed
fn visible_streak(current: i64, last_day: Option<NaiveDate>, today: NaiveDate) -> i64 {
    match last_day {
        Some(last) if (today - last).num_days() <= 1 => current,
        _ => 0,
    }
}

#[derive(Clone)]
pub struct StreakTracker {
    db: SqlitePool,
    offset: FixedOffset,
    badges: BadgeEvaluator,
}

impl StreakTracker {
    pub fn new(db: SqlitePool, utc_offset_minutes: i32, badges: BadgeEvaluator) -> Self {
        Self {
            db,
            offset: civil_offset(utc_offset_minutes),
            badges,
        }
    }

    /// Record activity now, then run the badge check
    pub async fn record_activity(&self, user_id: &str) -> LmsResult<StreakUpdate> {
        self.record_activity_at(user_id, Utc::now()).await
    }

    pub async fn record_activity_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> LmsResult<StreakUpdate> {
        let (current, last) = self.load(user_id).await?;
        let last_day = last.map(|instant| civil_date(instant, self.offset));
        let today = civil_date(now, self.offset);

        let streak = next_streak(current, last_day, today);
        let incremented = last_day != Some(today);

        if incremented {
            sqlx::query(
                "UPDATE users SET current_streak = ?1, last_activity_date = ?2 WHERE id = ?3",
            )
            .bind(streak)
            .bind(now)
            .bind(user_id)
            .execute(&self.db)
            .await?;

            metrics::record_streak_update(if streak == 1 { "reset" } else { "extended" });
            tracing::info!(user_id, streak, "Streak updated");
        } else {
            metrics::record_streak_update("unchanged");
        }

        let badge_awarded = match self.badges.check_and_award_badges(user_id).await {
            Ok(badge) => badge,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Badge check failed after activity");
                None
            }
        };

        Ok(StreakUpdate {
            streak,
            incremented,
            badge_awarded,
        })
    }

    /// Current streak, zeroing a broken one in storage
    pub async fn get_streak(&self, user_id: &str) -> LmsResult<i64> {
        self.get_streak_at(user_id, Utc::now()).await
    }

    pub async fn get_streak_at(&self, user_id: &str, now: DateTime<Utc>) -> LmsResult<i64> {
        let (current, last) = self.load(user_id).await?;
        let last_day = last.map(|instant| civil_date(instant, self.offset));
        let streak = visible_streak(current, last_day, civil_date(now, self.offset));

        if streak != current && self.clear_broken(user_id, current, last).await? {
            tracing::debug!(user_id, previous = current, "Streak broken");
        }

        Ok(streak)
    }

    /// Zero the stored streak only if it still holds the state that was read
    async fn clear_broken(
        &self,
        user_id: &str,
        current: i64,
        last: Option<DateTime<Utc>>,
    ) -> LmsResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users SET current_streak = 0
            WHERE id = ?1 AND current_streak = ?2 AND last_activity_date IS ?3
            "#,
        )
        .bind(user_id)
        .bind(current)
        .bind(last)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn load(&self, user_id: &str) -> LmsResult<(i64, Option<DateTime<Utc>>)> {
        let row = sqlx::query("SELECT current_streak, last_activity_date FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| LmsError::NotFound(format!("User {} not found", user_id)))?;

        Ok((row.try_get("current_streak")?, row.try_get("last_activity_date")?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::insert_user;
    use crate::db::test_pool;
    use chrono::{Duration, TimeZone};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    async fn tracker() -> StreakTracker {
        let db = test_pool().await;
        insert_user(&db, "u1").await;
        let badges = BadgeEvaluator::new(db.clone(), None);
        StreakTracker::new(db, 330, badges)
    }

    async fn set_state(tracker: &StreakTracker, streak: i64, last: DateTime<Utc>) {
        sqlx::query("UPDATE users SET current_streak = ?1, last_activity_date = ?2 WHERE id = 'u1'")
            .bind(streak)
            .bind(last)
            .execute(&tracker.db)
            .await
            .unwrap();
    }

    #[test]
    fn test_next_streak_rules() {
        assert_eq!(next_streak(0, None, day(10)), 1);
        assert_eq!(next_streak(3, Some(day(10)), day(10)), 3);
        assert_eq!(next_streak(3, Some(day(9)), day(10)), 4);
        assert_eq!(next_streak(3, Some(day(8)), day(10)), 1);
        // Month boundary
        assert_eq!(
            next_streak(7, Some(NaiveDate::from_ymd_opt(2024, 4, 30).unwrap()), day(1)),
            8
        );
    }

    #[test]
    fn test_visible_streak_rules() {
        assert_eq!(visible_streak(5, Some(day(10)), day(10)), 5);
        assert_eq!(visible_streak(5, Some(day(9)), day(10)), 5);
        assert_eq!(visible_streak(5, Some(day(8)), day(10)), 0);
        assert_eq!(visible_streak(0, None, day(10)), 0);
    }

    #[tokio::test]
    async fn test_yesterday_extends_streak() {
        let tracker = tracker().await;
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 6, 0, 0).unwrap();
        set_state(&tracker, 3, now - Duration::days(1)).await;

        let update = tracker.record_activity_at("u1", now).await.unwrap();
        assert_eq!(update.streak, 4);
        assert!(update.incremented);

        let (streak, last) = tracker.load("u1").await.unwrap();
        assert_eq!(streak, 4);
        assert_eq!(last, Some(now));
    }

    #[tokio::test]
    async fn test_once_per_civil_day() {
        let tracker = tracker().await;
        let morning = Utc.with_ymd_and_hms(2024, 5, 10, 1, 0, 0).unwrap();

        assert_eq!(tracker.record_activity_at("u1", morning).await.unwrap().streak, 1);

        let later = tracker
            .record_activity_at("u1", morning + Duration::hours(5))
            .await
            .unwrap();
        assert_eq!(later.streak, 1);
        assert!(!later.incremented);

        // Untouched on a same-day repeat
        let (_, last) = tracker.load("u1").await.unwrap();
        assert_eq!(last, Some(morning));
    }

    #[tokio::test]
    async fn test_civil_midnight_not_utc_midnight() {
        let tracker = tracker().await;
        // 18:00 UTC is 23:30 at +05:30; 19:00 UTC is already the next civil day
        let before = Utc.with_ymd_and_hms(2024, 5, 10, 18, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 5, 10, 19, 0, 0).unwrap();

        tracker.record_activity_at("u1", before).await.unwrap();
        let update = tracker.record_activity_at("u1", after).await.unwrap();
        assert_eq!(update.streak, 2);
    }

    #[tokio::test]
    async fn test_gap_resets_to_one() {
        let tracker = tracker().await;
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 6, 0, 0).unwrap();
        set_state(&tracker, 9, now - Duration::days(3)).await;

        assert_eq!(tracker.record_activity_at("u1", now).await.unwrap().streak, 1);
    }

    #[tokio::test]
    async fn test_read_zeroes_broken_streak() {
        let tracker = tracker().await;
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 6, 0, 0).unwrap();
        let last = now - Duration::days(2);
        set_state(&tracker, 6, last).await;

        assert_eq!(tracker.get_streak_at("u1", now).await.unwrap(), 0);

        let (streak, stored_last) = tracker.load("u1").await.unwrap();
        assert_eq!(streak, 0);
        assert_eq!(stored_last, Some(last));
    }

    #[tokio::test]
    async fn test_stale_read_does_not_clobber_new_activity() {
        let tracker = tracker().await;
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 6, 0, 0).unwrap();
        set_state(&tracker, 1, now - Duration::days(2)).await;

        // A read loads the broken state, then activity lands before it writes
        let (current, last) = tracker.load("u1").await.unwrap();
        tracker.record_activity_at("u1", now).await.unwrap();

        assert!(!tracker.clear_broken("u1", current, last).await.unwrap());
        let (streak, stored_last) = tracker.load("u1").await.unwrap();
        assert_eq!(streak, 1);
        assert_eq!(stored_last, Some(now));
        assert_eq!(tracker.get_streak_at("u1", now).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_read_keeps_live_streak() {
        let tracker = tracker().await;
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 6, 0, 0).unwrap();
        set_state(&tracker, 6, now - Duration::days(1)).await;

        assert_eq!(tracker.get_streak_at("u1", now).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_activity_runs_badge_check() {
        let tracker = tracker().await;
        for n in 0..50 {
            sqlx::query(
                r#"
                INSERT INTO submission (user_id, problem_id, kind, code, language, status, created_at)
                VALUES ('u1', ?1, 'PRACTICE', '', 'rust', 'PASSED', ?2)
                "#,
            )
            .bind(format!("p{}", n))
            .bind(Utc::now())
            .execute(&tracker.db)
            .await
            .unwrap();
        }

        let update = tracker.record_activity("u1").await.unwrap();
        assert_eq!(update.badge_awarded, Some(BadgeType::Problems50));

        let again = tracker.record_activity("u1").await.unwrap();
        assert_eq!(again.badge_awarded, None);
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let tracker = tracker().await;
        assert!(matches!(
            tracker.record_activity("ghost").await,
            Err(LmsError::NotFound(_))
        ));
        assert!(matches!(
            tracker.get_streak("ghost").await,
            Err(LmsError::NotFound(_))
        ));
    }
}
