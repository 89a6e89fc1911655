//! Retry and backoff policy
//!
//! Two independent retry layers cover different failure modes:
//!
//! - **Transport retries** re-run a single execution attempt (flaky
//!   connection, transient non-2xx) with exponential backoff. They are cheap
//!   and scoped to one scheduling attempt.
//! - **Scheduling retries** reclaim the whole work item back to the frontier
//!   after the transport budget is exhausted, with a fresh transport budget
//!   and possibly a different session on the next attempt.
//!
//! Transport retries never increment `WorkItem::retry_count`; that counter
//! tracks scheduling-level reclaims only. A permanently failing item is
//! therefore executed `(max_retries + 1) * (max_transport_retries + 1)` times
//! in total.

use crate::request::WorkItem;
use std::time::Duration;

/// Decision for an item whose execution attempt ultimately failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingVerdict {
    /// Reclaim the item to the frontier after the given delay
    Reclaim(Duration),

    /// Retry budget exhausted; finalize as permanently failed
    GiveUp,
}

/// Pure retry/backoff policy; all per-item state lives on the work item
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Transport-level retries per scheduling attempt
    pub max_transport_retries: u32,

    /// Base of the exponential transport backoff
    pub backoff_base: Duration,

    /// Fixed additive floor on every transport backoff delay
    pub backoff_fixed: Duration,

    /// Delay before a reclaimed item is re-queued
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_transport_retries: 2,
            backoff_base: Duration::from_millis(500),
            backoff_fixed: Duration::from_millis(1000),
            retry_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Whether another transport-level attempt is allowed
    ///
    /// `attempt` counts completed failed attempts, starting at 0.
    pub fn should_retry_transport(&self, attempt: u32) -> bool {
        attempt < self.max_transport_retries
    }

    /// Backoff delay before transport retry number `attempt`
    ///
    /// Computed as `base * 2^attempt + fixed`. No jitter; callers wanting
    /// hardening against synchronized retries can add it on top.
    pub fn transport_backoff(&self, attempt: u32) -> Duration {
        let exp = self.backoff_base.saturating_mul(1u32 << attempt.min(16));
        exp.saturating_add(self.backoff_fixed)
    }

    /// Decides the fate of an item whose attempt failed after transport
    /// retries were exhausted
    pub fn scheduling_verdict(&self, item: &WorkItem) -> SchedulingVerdict {
        if item.has_retries_left() {
            SchedulingVerdict::Reclaim(self.retry_delay)
        } else {
            SchedulingVerdict::GiveUp
        }
    }

    /// Worst-case number of executor invocations for a single item
    pub fn max_total_attempts(&self, item: &WorkItem) -> u32 {
        (item.max_retries + 1) * (self.max_transport_retries + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_transport_retries: 2,
            backoff_base: Duration::from_millis(500),
            backoff_fixed: Duration::from_millis(1000),
            retry_delay: Duration::from_millis(250),
        }
    }

    #[test]
    fn test_transport_backoff_is_exponential_with_floor() {
        let p = policy();
        assert_eq!(p.transport_backoff(0), Duration::from_millis(1500));
        assert_eq!(p.transport_backoff(1), Duration::from_millis(2000));
        assert_eq!(p.transport_backoff(2), Duration::from_millis(3000));
        assert_eq!(p.transport_backoff(3), Duration::from_millis(5000));
    }

    #[test]
    fn test_transport_backoff_saturates_on_large_attempts() {
        let p = policy();
        // Must not overflow; exact value does not matter beyond being large
        assert!(p.transport_backoff(40) > Duration::from_secs(30));
    }

    #[test]
    fn test_should_retry_transport_respects_budget() {
        let p = policy();
        assert!(p.should_retry_transport(0));
        assert!(p.should_retry_transport(1));
        assert!(!p.should_retry_transport(2));
    }

    #[test]
    fn test_verdict_reclaims_while_budget_left() {
        let p = policy();
        let mut item = WorkItem::new("https://example.com/").with_max_retries(2);
        assert_eq!(
            p.scheduling_verdict(&item),
            SchedulingVerdict::Reclaim(Duration::from_millis(250))
        );

        item.retry_count = 1;
        assert!(matches!(
            p.scheduling_verdict(&item),
            SchedulingVerdict::Reclaim(_)
        ));
    }

    #[test]
    fn test_verdict_gives_up_when_exhausted() {
        let p = policy();
        let mut item = WorkItem::new("https://example.com/").with_max_retries(2);
        item.retry_count = 2;
        assert_eq!(p.scheduling_verdict(&item), SchedulingVerdict::GiveUp);
    }

    #[test]
    fn test_zero_max_retries_fails_immediately() {
        let p = policy();
        let item = WorkItem::new("https://example.com/").with_max_retries(0);
        assert_eq!(p.scheduling_verdict(&item), SchedulingVerdict::GiveUp);
    }

    #[test]
    fn test_max_total_attempts_composition() {
        let p = policy();
        let item = WorkItem::new("https://example.com/").with_max_retries(2);
        // 3 scheduling attempts, each with 1 initial + 2 transport retries
        assert_eq!(p.max_total_attempts(&item), 9);
    }
}
