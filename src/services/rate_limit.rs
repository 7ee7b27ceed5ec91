//! Per-line send-quota enforcement.
//!
//! Two rolling windows gate each line: daily (since UTC midnight) and
//! hourly (trailing 60 minutes), counted from historical dispatched records
//! so limits survive restarts. Limits tier by line age. On data-access
//! failure `can_send` fails open: availability over strict enforcement.

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::line_queries;
use crate::models::line::Line;

/// One rate tier: daily and hourly ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateTier {
    pub daily: i64,
    pub hourly: i64,
}

/// Lines younger than 7 days are still warming up.
pub const WARMING_TIER: RateTier = RateTier { daily: 300, hourly: 50 };

/// 7 to 30 days.
pub const ESTABLISHED_TIER: RateTier = RateTier { daily: 450, hourly: 80 };

/// 30 days and older. Currently identical to the established tier; kept as
/// a distinct named constant pending product clarification on whether the
/// tiers should diverge.
pub const MATURE_TIER: RateTier = RateTier { daily: 450, hourly: 80 };

/// Window counts for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowCounts {
    pub today: i64,
    pub last_hour: i64,
}

/// Tier for a line of the given age in whole days. Boundary ages (7, 30)
/// land in the upper tier.
pub fn limits_for_age(age_days: i64) -> RateTier {
    if age_days < 7 {
        WARMING_TIER
    } else if age_days < 30 {
        ESTABLISHED_TIER
    } else {
        MATURE_TIER
    }
}

/// Whether both windows are under their ceilings.
pub fn can_send_within(counts: WindowCounts, tier: RateTier) -> bool {
    counts.today < tier.daily && counts.last_hour < tier.hourly
}

/// Gate one send for a line. Fails open on any data-access error.
pub async fn can_send(pool: &PgPool, line: &Line) -> bool {
    match line_queries::sent_window_counts(pool, line.id).await {
        Ok((today, last_hour)) => {
            let tier = limits_for_age(line.age_days(Utc::now()));
            can_send_within(WindowCounts { today, last_hour }, tier)
        }
        Err(e) => {
            tracing::warn!(
                line = %line.instance_name,
                error = %e,
                "rate limit counts unavailable, failing open"
            );
            true
        }
    }
}

/// Non-destructive diagnostic view of the same computation.
#[derive(Debug, Serialize)]
pub struct RateLimitInfo {
    pub line_id: Uuid,
    pub age_days: i64,
    pub tier: RateTier,
    pub counts: WindowCounts,
    pub can_send: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("line {0} not found")]
    LineNotFound(Uuid),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Surface the rate computation for diagnostics. Unlike [`can_send`] this
/// does not fail open: an unknown line is a domain error.
pub async fn rate_limit_info(pool: &PgPool, line_id: Uuid) -> Result<RateLimitInfo, RateLimitError> {
    let line = line_queries::get_line(pool, line_id)
        .await?
        .ok_or(RateLimitError::LineNotFound(line_id))?;

    let (today, last_hour) = line_queries::sent_window_counts(pool, line_id).await?;
    let age_days = line.age_days(Utc::now());
    let tier = limits_for_age(age_days);
    let counts = WindowCounts { today, last_hour };

    Ok(RateLimitInfo {
        line_id,
        age_days,
        tier,
        counts,
        can_send: can_send_within(counts, tier),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(limits_for_age(0), WARMING_TIER);
        assert_eq!(limits_for_age(6), WARMING_TIER);
        // Boundary ages use the upper tier
        assert_eq!(limits_for_age(7), ESTABLISHED_TIER);
        assert_eq!(limits_for_age(29), ESTABLISHED_TIER);
        assert_eq!(limits_for_age(30), MATURE_TIER);
        assert_eq!(limits_for_age(365), MATURE_TIER);
    }

    #[test]
    fn test_mature_tier_matches_established() {
        // Intentional convergence in the source limits; a future split is a
        // one-line change here.
        assert_eq!(ESTABLISHED_TIER, MATURE_TIER);
    }

    #[test]
    fn test_can_send_under_both_limits() {
        let counts = WindowCounts { today: 10, last_hour: 3 };
        assert!(can_send_within(counts, WARMING_TIER));
    }

    #[test]
    fn test_daily_limit_blocks() {
        let counts = WindowCounts { today: 300, last_hour: 0 };
        assert!(!can_send_within(counts, WARMING_TIER));
    }

    #[test]
    fn test_hourly_limit_blocks() {
        let counts = WindowCounts { today: 10, last_hour: 50 };
        assert!(!can_send_within(counts, WARMING_TIER));
    }

    #[test]
    fn test_ten_day_line_hourly_boundary() {
        // Line created 10 days ago: established tier, daily 450 / hourly 80.
        // 80 sends today is far under the daily ceiling, but with all 80 in
        // the trailing hour the hourly ceiling blocks.
        let tier = limits_for_age(10);
        assert_eq!(tier, ESTABLISHED_TIER);
        assert!(!can_send_within(WindowCounts { today: 80, last_hour: 80 }, tier));
        // Same daily count spread outside the hour passes.
        assert!(can_send_within(WindowCounts { today: 80, last_hour: 20 }, tier));
    }

    #[test]
    fn test_limit_is_exclusive_below() {
        let tier = WARMING_TIER;
        assert!(can_send_within(WindowCounts { today: 299, last_hour: 49 }, tier));
        assert!(!can_send_within(WindowCounts { today: 299, last_hour: 50 }, tier));
    }
}
