//! Per-operation, per-instance circuit breakers for gateway calls.
//!
//! Breakers are keyed `<operation>-<instance>` so one line's outage never
//! opens the circuit for another line, and a flaky cosmetic endpoint never
//! blocks real sends on the same instance.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Breaker tuning per operation criticality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerPolicy {
    /// Real sends: trip fast, stay open longer.
    Strict,
    /// Typing/presence cosmetics: tolerate noise.
    Tolerant,
}

impl BreakerPolicy {
    fn failure_threshold(self) -> u32 {
        match self {
            BreakerPolicy::Strict => 3,
            BreakerPolicy::Tolerant => 10,
        }
    }

    fn cooldown(self) -> Duration {
        match self {
            BreakerPolicy::Strict => Duration::from_secs(60),
            BreakerPolicy::Tolerant => Duration::from_secs(15),
        }
    }
}

#[derive(Debug)]
enum BreakerState {
    Closed { consecutive_failures: u32 },
    Open { until: Instant },
    HalfOpen,
}

/// One circuit breaker: closed until `failure_threshold` consecutive
/// failures, then open for the cooldown, then a single half-open probe.
#[derive(Debug)]
pub struct CircuitBreaker {
    policy: BreakerPolicy,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(policy: BreakerPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(BreakerState::Closed { consecutive_failures: 0 }),
        }
    }

    /// Whether a call may proceed right now. An elapsed cooldown moves the
    /// breaker to half-open and lets one probe through.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        match *state {
            BreakerState::Closed { .. } | BreakerState::HalfOpen => true,
            BreakerState::Open { until } => {
                if Instant::now() >= until {
                    *state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        *state = BreakerState::Closed { consecutive_failures: 0 };
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        match *state {
            BreakerState::Closed { consecutive_failures } => {
                let failures = consecutive_failures + 1;
                if failures >= self.policy.failure_threshold() {
                    *state = BreakerState::Open { until: Instant::now() + self.policy.cooldown() };
                } else {
                    *state = BreakerState::Closed { consecutive_failures: failures };
                }
            }
            BreakerState::HalfOpen => {
                *state = BreakerState::Open { until: Instant::now() + self.policy.cooldown() };
            }
            BreakerState::Open { .. } => {}
        }
    }
}

/// Registry of breakers keyed `<operation>-<instance>`.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, operation: &str, instance: &str, policy: BreakerPolicy) -> Arc<CircuitBreaker> {
        let key = format!("{operation}-{instance}");
        let mut breakers = self.breakers.lock().expect("registry lock poisoned");
        breakers
            .entry(key)
            .or_insert_with(|| Arc::new(CircuitBreaker::new(policy)))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_opens_after_three_failures() {
        let breaker = CircuitBreaker::new(BreakerPolicy::Strict);
        assert!(breaker.try_acquire());
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.try_acquire());
        breaker.record_failure();
        assert!(!breaker.try_acquire());
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let breaker = CircuitBreaker::new(BreakerPolicy::Strict);
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.try_acquire());
    }

    #[test]
    fn test_tolerant_allows_more_noise() {
        let breaker = CircuitBreaker::new(BreakerPolicy::Tolerant);
        for _ in 0..9 {
            breaker.record_failure();
        }
        assert!(breaker.try_acquire());
        breaker.record_failure();
        assert!(!breaker.try_acquire());
    }

    #[test]
    fn test_registry_isolates_instances() {
        let registry = BreakerRegistry::new();
        let a = registry.get("sendText", "line-a", BreakerPolicy::Strict);
        let b = registry.get("sendText", "line-b", BreakerPolicy::Strict);
        for _ in 0..3 {
            a.record_failure();
        }
        assert!(!a.try_acquire());
        assert!(b.try_acquire());
    }

    #[test]
    fn test_registry_isolates_operations() {
        let registry = BreakerRegistry::new();
        let send = registry.get("sendText", "line-a", BreakerPolicy::Strict);
        let typing = registry.get("sendTyping", "line-a", BreakerPolicy::Tolerant);
        for _ in 0..3 {
            send.record_failure();
        }
        assert!(!send.try_acquire());
        assert!(typing.try_acquire());
    }

    #[test]
    fn test_registry_returns_same_breaker() {
        let registry = BreakerRegistry::new();
        let first = registry.get("sendText", "line-a", BreakerPolicy::Strict);
        for _ in 0..3 {
            first.record_failure();
        }
        let second = registry.get("sendText", "line-a", BreakerPolicy::Strict);
        assert!(!second.try_acquire());
    }
}
