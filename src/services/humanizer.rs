//! Humanized delivery pacing: randomized delays before sends, and a
//! background presence cycle that flips lines "online" at random so traffic
//! does not look machine-generated.

use rand::Rng;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::db::line_queries;
use crate::services::gateway::{GatewayClient, Presence};

/// Delay bounds applied before each send inside a job (seconds).
pub const SEND_DELAY_MIN_SECS: u64 = 5;
pub const SEND_DELAY_MAX_SECS: u64 = 15;

/// Presence cycle tuning.
const PRESENCE_TICK: Duration = Duration::from_secs(5 * 60);
const PRESENCE_CHANCE: f64 = 0.15;
const ONLINE_MIN_SECS: u64 = 10;
const ONLINE_MAX_SECS: u64 = 40;

/// Uniform random delay in `[min_seconds, max_seconds]`, millisecond
/// granularity. Used before every send in a bulk context.
pub fn message_delay(min_seconds: u64, max_seconds: u64) -> Duration {
    let ms = rand::thread_rng().gen_range(min_seconds * 1000..=max_seconds * 1000);
    Duration::from_millis(ms)
}

/// Cooperative suspension: delays only the task that awaits it.
pub async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Start the periodic presence cycle.
///
/// Every tick, each active line has a 15% chance of being marked available
/// for a random 10-40s window, then reverted. Pure cosmetic noise, fully
/// decoupled from dispatch: every failure is logged and swallowed, and the
/// revert task is fire-and-forget; it runs even if the line goes inactive
/// in the interim.
pub fn spawn_presence_cycle(pool: PgPool, gateway: Arc<GatewayClient>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(PRESENCE_TICK);
        loop {
            tick.tick().await;

            let lines = match line_queries::active_lines(&pool).await {
                Ok(lines) => lines,
                Err(e) => {
                    tracing::warn!(error = %e, "presence cycle could not list active lines");
                    continue;
                }
            };

            for line in lines {
                let (selected, online_secs) = {
                    let mut rng = rand::thread_rng();
                    (rng.gen::<f64>() < PRESENCE_CHANCE, rng.gen_range(ONLINE_MIN_SECS..=ONLINE_MAX_SECS))
                };
                if !selected {
                    continue;
                }

                let gateway = gateway.clone();
                tokio::spawn(async move {
                    if let Err(e) = gateway.send_presence(&line.instance_name, Presence::Available).await {
                        tracing::debug!(
                            line = %line.instance_name,
                            error = %e,
                            "presence online signal failed"
                        );
                        return;
                    }

                    tracing::trace!(
                        line = %line.instance_name,
                        online_secs,
                        "line marked available"
                    );
                    tokio::time::sleep(Duration::from_secs(online_secs)).await;

                    if let Err(e) = gateway.send_presence(&line.instance_name, Presence::Unavailable).await {
                        tracing::debug!(
                            line = %line.instance_name,
                            error = %e,
                            "presence offline signal failed"
                        );
                    }
                });
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_delay_within_bounds() {
        for _ in 0..100 {
            let d = message_delay(5, 15);
            assert!(d >= Duration::from_secs(5));
            assert!(d <= Duration::from_secs(15));
        }
    }

    #[test]
    fn test_message_delay_degenerate_range() {
        assert_eq!(message_delay(3, 3), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_sleep_is_cooperative() {
        // Two concurrent sleeps finish in roughly one sleep's wall time.
        let start = std::time::Instant::now();
        let (a, b) = tokio::join!(
            sleep(Duration::from_millis(50)),
            sleep(Duration::from_millis(50))
        );
        let _ = (a, b);
        assert!(start.elapsed() < Duration::from_millis(95));
    }
}
