//! Per-request hedging scoreboard: attempt cap and deadline accounting.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::config::HedgingConfig;
use crate::decision::NO_HEDGING;

/// The per-attempt timeout actually in force for the next attempt, after
/// folding in the whole-operation deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveTimeout {
    /// Use this many milliseconds (0 = unlimited).
    Millis(i64),
    /// The whole-operation deadline has already elapsed; the caller should
    /// fail the attempt immediately rather than start it with a timeout.
    AlreadyExpired,
}

struct HedgingStateInner {
    total_attempts: usize,
}

/// Mutable scoreboard for one outer request: how many attempts have been
/// reserved so far, and the whole-operation deadline (if any). Attached to
/// the outer [`crate::context::RequestContext`]'s [`crate::context::Attributes`]
/// under its own type.
pub struct HedgingState {
    config: Arc<HedgingConfig>,
    deadline: Option<Instant>,
    inner: Mutex<HedgingStateInner>,
}

impl HedgingState {
    pub fn new(config: Arc<HedgingConfig>, deadline: Option<Instant>) -> Self {
        Self {
            config,
            deadline,
            inner: Mutex::new(HedgingStateInner { total_attempts: 0 }),
        }
    }

    pub fn config(&self) -> &Arc<HedgingConfig> {
        &self.config
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn total_attempts(&self) -> usize {
        self.inner.lock().expect("hedging state mutex poisoned").total_attempts
    }

    /// Reserves the next attempt slot and decides the delay to use before
    /// starting it.
    ///
    /// 1. Increments `total_attempts`; if it now exceeds `max_total_attempts`,
    ///    returns [`NO_HEDGING`].
    /// 2. If `proposed_delay_ms` is negative, returns [`NO_HEDGING`].
    /// 3. If a whole-operation deadline is set and `proposed_delay_ms` exceeds
    ///    the remaining budget, returns [`NO_HEDGING`].
    /// 4. Otherwise returns `proposed_delay_ms` unchanged.
    pub fn next_delay(&self, proposed_delay_ms: i64) -> i64 {
        let mut inner = self.inner.lock().expect("hedging state mutex poisoned");
        inner.total_attempts += 1;
        if inner.total_attempts > self.config.max_total_attempts() {
            return NO_HEDGING;
        }
        drop(inner);

        if proposed_delay_ms < 0 {
            return NO_HEDGING;
        }

        if let Some(deadline) = self.deadline {
            let remaining_ms = deadline.saturating_duration_since(Instant::now()).as_millis();
            if (proposed_delay_ms as u128) > remaining_ms {
                return NO_HEDGING;
            }
        }

        proposed_delay_ms
    }

    /// Read-only check for whether a hedge proposed at `delay_ms` is worth
    /// arming a timer for at all — negative delays and delays that already
    /// overrun the whole-operation deadline are rejected without touching
    /// `total_attempts`. This is [`Self::next_delay`]'s steps 2-3 without its
    /// step 1 side effect, so arming (and re-arming, on a later `Accept`) a
    /// pending hedge never consumes a reservation; only the timer actually
    /// firing does, via [`Self::next_delay`].
    pub fn fits_remaining_budget(&self, delay_ms: i64) -> bool {
        if delay_ms < 0 {
            return false;
        }
        if let Some(deadline) = self.deadline {
            let remaining_ms = deadline.saturating_duration_since(Instant::now()).as_millis();
            if (delay_ms as u128) > remaining_ms {
                return false;
            }
        }
        true
    }

    /// The attempt index that the most recent successful [`Self::next_delay`]
    /// call reserved (`total_attempts - 1`, 0-based).
    pub fn last_reserved_index(&self) -> usize {
        self.total_attempts().saturating_sub(1)
    }

    /// The per-attempt timeout to apply to the next attempt, folding in the
    /// whole-operation deadline.
    pub fn effective_per_attempt_timeout_ms(&self) -> EffectiveTimeout {
        match self.deadline {
            None => EffectiveTimeout::Millis(self.config.per_attempt_response_timeout_ms()),
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return EffectiveTimeout::AlreadyExpired;
                }
                let remaining_ms = deadline.duration_since(now).as_millis() as i64;
                let per_attempt = self.config.per_attempt_response_timeout_ms();
                if per_attempt > 0 {
                    EffectiveTimeout::Millis(remaining_ms.min(per_attempt))
                } else {
                    EffectiveTimeout::Millis(remaining_ms)
                }
            }
        }
    }
}
