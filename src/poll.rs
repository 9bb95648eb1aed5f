//! Bounded retry driver for readiness checks.
//!
//! [`RetryPoller`] only counts attempts. Callers derive the try budget from a
//! configured timeout with [`TryBudget::from_timeout`], so every wait ends on
//! either budget exhaustion or the [`Interrupt`] flag.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::sleep;

/// Cooperative cancellation flag shared between the provisioning run and
/// whoever may cancel it (for example a Ctrl-C handler).
#[derive(Clone, Debug, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    /// Creates a flag in the cleared state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Safe to call from any thread.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once cancellation has been requested.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Maximum number of predicate invocations allowed for a polling phase.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TryBudget {
    /// Stop after this many attempts.
    Limited(u32),
    /// Keep polling until success or interruption.
    Unlimited,
}

impl TryBudget {
    /// Derives a budget as `timeout / interval`, never less than one attempt.
    #[must_use]
    pub fn from_timeout(timeout: Duration, interval: Duration) -> Self {
        let tries = timeout
            .as_millis()
            .checked_div(interval.as_millis())
            .unwrap_or_else(|| timeout.as_millis());
        Self::Limited(u32::try_from(tries).unwrap_or(u32::MAX).max(1))
    }

    const fn exhausted(self, attempts: u32) -> bool {
        match self {
            Self::Limited(limit) => attempts >= limit,
            Self::Unlimited => false,
        }
    }
}

/// Result of a polling phase.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PollOutcome<T> {
    /// The predicate reported readiness and produced a value.
    Succeeded(T),
    /// The try budget ran out.
    TimedOut,
    /// The interrupt flag was observed before an attempt.
    Cancelled,
}

/// Repeatedly invokes a readiness predicate with a fixed delay between tries.
#[derive(Clone, Copy, Debug)]
pub struct RetryPoller {
    interval: Duration,
}

impl RetryPoller {
    /// Creates a poller that sleeps `interval` between attempts.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Calls `predicate` until it yields `Some`, the budget is spent, or
    /// `interrupt` is set.
    ///
    /// The interrupt flag is checked before every attempt, so a flag set
    /// before the first call yields [`PollOutcome::Cancelled`] without
    /// invoking the predicate.
    ///
    /// # Errors
    ///
    /// Any error returned by `predicate` is propagated unchanged and stops
    /// polling immediately.
    pub async fn poll_until<T, E, F, Fut>(
        &self,
        mut predicate: F,
        budget: TryBudget,
        interrupt: &Interrupt,
    ) -> Result<PollOutcome<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let mut attempts: u32 = 0;
        loop {
            if interrupt.is_set() {
                return Ok(PollOutcome::Cancelled);
            }

            attempts = attempts.saturating_add(1);
            if let Some(value) = predicate().await? {
                return Ok(PollOutcome::Succeeded(value));
            }

            // A spent budget is a timeout even if the flag flipped during the last try.
            if budget.exhausted(attempts) {
                return Ok(PollOutcome::TimedOut);
            }
            sleep(self.interval).await;
        }
    }
}
