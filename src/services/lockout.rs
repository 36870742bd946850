use chrono::{DateTime, Duration, Utc};

use crate::config::LockoutConfig;

/// Decision logic over a user's failed-attempt counter and lock timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    max_attempts: u32,
    lock_duration: Duration,
}

/// What a failed password check does to an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Still usable. `remaining` further failures trigger a lock.
    Counted { attempts: u32, remaining: u32 },
    /// This failure hit the threshold.
    Locked { attempts: u32, until: DateTime<Utc> },
}

impl LockoutPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, lock_duration: Duration) -> Self {
        Self {
            max_attempts,
            lock_duration,
        }
    }

    #[must_use]
    pub fn from_config(config: &LockoutConfig) -> Self {
        Self::new(config.max_attempts, Duration::minutes(config.lockout_minutes))
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn is_locked(locked_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        locked_until.is_some_and(|until| now < until)
    }

    /// Classifies a failure given the already incremented counter.
    #[must_use]
    pub fn on_failure(&self, attempts: u32, now: DateTime<Utc>) -> FailureOutcome {
        if attempts >= self.max_attempts {
            FailureOutcome::Locked {
                attempts,
                until: now + self.lock_duration,
            }
        } else {
            FailureOutcome::Counted {
                attempts,
                remaining: self.max_attempts - attempts,
            }
        }
    }
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::from_config(&LockoutConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_applies_only_before_expiry() {
        let now = Utc::now();
        assert!(!LockoutPolicy::is_locked(None, now));
        assert!(LockoutPolicy::is_locked(Some(now + Duration::seconds(1)), now));
        assert!(!LockoutPolicy::is_locked(Some(now), now));
        assert!(!LockoutPolicy::is_locked(Some(now - Duration::minutes(1)), now));
    }

    #[test]
    fn remaining_attempts_count_down_then_lock() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();

        let remaining: Vec<u32> = (1..=4)
            .map(|attempts| match policy.on_failure(attempts, now) {
                FailureOutcome::Counted { remaining, .. } => remaining,
                FailureOutcome::Locked { .. } => panic!("locked too early at {attempts}"),
            })
            .collect();
        assert_eq!(remaining, vec![4, 3, 2, 1]);

        assert_eq!(
            policy.on_failure(5, now),
            FailureOutcome::Locked {
                attempts: 5,
                until: now + Duration::minutes(30),
            }
        );
    }

    #[test]
    fn failures_past_the_threshold_relock_from_now() {
        let policy = LockoutPolicy::new(3, Duration::minutes(5));
        let later = Utc::now() + Duration::hours(1);
        assert!(matches!(
            policy.on_failure(7, later),
            FailureOutcome::Locked { until, .. } if until == later + Duration::minutes(5)
        ));
    }
}
