//! Line reputation collaborator.
//!
//! Current policy: reputation is advisory only. A poor or missing score is
//! logged and never blocks a send, a deliberate temporary relaxation while
//! the health signal is being calibrated.

use crate::models::line::Line;

/// Score below which a line is considered at risk of provider restriction.
const MIN_HEALTHY_SCORE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReputationStatus {
    Healthy(f64),
    AtRisk(f64),
    Unknown,
}

/// Classify a line's reputation from its last known score.
pub fn check(line: &Line) -> ReputationStatus {
    match line.reputation_score {
        Some(score) if score >= MIN_HEALTHY_SCORE => ReputationStatus::Healthy(score),
        Some(score) => ReputationStatus::AtRisk(score),
        None => ReputationStatus::Unknown,
    }
}

/// Advisory check at send time: warn on risk, never block.
pub fn check_and_log(line: &Line) {
    match check(line) {
        ReputationStatus::Healthy(_) => {}
        ReputationStatus::AtRisk(score) => {
            tracing::warn!(
                line = %line.instance_name,
                score,
                "line reputation below threshold; sending anyway (advisory policy)"
            );
        }
        ReputationStatus::Unknown => {
            tracing::debug!(line = %line.instance_name, "no reputation score for line");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn line(score: Option<f64>) -> Line {
        Line {
            id: Uuid::new_v4(),
            instance_name: "line-01".to_string(),
            active: true,
            segment: "default".to_string(),
            created_at: Utc::now(),
            reputation_score: score,
            cloud_api: None,
        }
    }

    #[test]
    fn test_classification() {
        assert_eq!(check(&line(Some(0.9))), ReputationStatus::Healthy(0.9));
        assert_eq!(check(&line(Some(0.2))), ReputationStatus::AtRisk(0.2));
        assert_eq!(check(&line(None)), ReputationStatus::Unknown);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        assert_eq!(check(&line(Some(0.5))), ReputationStatus::Healthy(0.5));
    }
}
