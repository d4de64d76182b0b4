//! The hedging engine itself: the attempt-race coordinator.
//!
//! One [`HedgingClient::execute`] call is one task. All race state — the
//! in-flight attempts, the pending hedge timer, the last-seen failure cause —
//! lives in local variables of that call's async stack frame. Nothing here
//! needs a lock; [`crate::state::HedgingState`] is the only piece shared with
//! anything outside this function, and it carries its own.

use std::pin::Pin;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;

use crate::config::HedgingConfigMapping;
use crate::context::RequestContext;
use crate::decision::{Decision, NO_HEDGING};
use crate::errors::{AttemptError, HedgingError};
use crate::header;
use crate::rule::RuleKind;
use crate::state::{EffectiveTimeout, HedgingState};
use crate::transport::{DelegateClient, HedgeRequest, HedgeResponse};

struct AttemptOutcome<R> {
    attempt_index: usize,
    ctx: RequestContext,
    result: Result<R, AttemptError>,
}

/// Decorates a [`DelegateClient`] with hedging, per a [`HedgingConfigMapping`]-resolved
/// [`crate::config::HedgingConfig`].
pub struct HedgingClient<D: DelegateClient> {
    delegate: D,
    mapping: std::sync::Arc<dyn HedgingConfigMapping>,
}

impl<D: DelegateClient> HedgingClient<D> {
    pub fn new(delegate: D, mapping: std::sync::Arc<dyn HedgingConfigMapping>) -> Self {
        Self { delegate, mapping }
    }

    /// Exposes the decorated delegate, mainly so tests can inspect call
    /// counts on a fake backend.
    pub fn delegate(&self) -> &D {
        &self.delegate
    }

    /// Races attempts of `req` under `ctx` per the resolved config, returning
    /// the first acceptable response.
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        req: HedgeRequest,
    ) -> Result<D::Response, HedgingError> {
        let config = self.mapping.get(ctx, &req).await?;
        let state = std::sync::Arc::new(HedgingState::new(config.clone(), ctx.deadline()));
        ctx.attributes().insert(state.clone());

        tracing::debug!(
            method = %req.method,
            max_total_attempts = config.max_total_attempts(),
            "hedging request"
        );

        let started = Instant::now();
        let mut attempts: FuturesUnordered<BoxFuture<'_, AttemptOutcome<D::Response>>> =
            FuturesUnordered::new();
        let mut hedge_timer: Option<Pin<Box<tokio::time::Sleep>>> = None;
        let mut last_cause: Option<AttemptError> = None;

        // Attempt 0 always starts immediately: its proposed delay is 0, and
        // the cap/deadline checks in `next_delay` can't reject a
        // non-negative, zero delay on the very first reservation.
        let reserved = state.next_delay(0);
        debug_assert_eq!(reserved, 0, "attempt 0 must always be schedulable");
        let index0 = state.last_reserved_index();
        let (_child0, fut0) = self.spawn_attempt(ctx, &state, &req, index0, true);
        attempts.push(fut0);

        self.arm_next_hedge(&state, &mut hedge_timer, config.initial_hedging_delay_ms());

        loop {
            let hedge_fut = async {
                match hedge_timer.as_mut() {
                    Some(sleep) => sleep.await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                Some(outcome) = attempts.next(), if !attempts.is_empty() => {
                    let mut batch = vec![outcome];
                    while let std::task::Poll::Ready(Some(o)) = futures::poll!(attempts.next()) {
                        batch.push(o);
                    }

                    let mut decisions = Vec::with_capacity(batch.len());
                    for outcome in batch.iter_mut() {
                        if let Err(cause) = &outcome.result {
                            last_cause = Some(cause.clone());
                        }
                        let decision = evaluate_outcome(&config, outcome).await;
                        tracing::trace!(attempt_index = outcome.attempt_index, ?decision, "rule decision");
                        decisions.push(decision);
                    }

                    let mut winner: Option<usize> = None;
                    for (i, decision) in decisions.iter().enumerate() {
                        if decision.is_decisive() {
                            match winner {
                                None => winner = Some(i),
                                Some(w) if batch[i].attempt_index < batch[w].attempt_index => winner = Some(i),
                                _ => {}
                            }
                        }
                    }

                    if let Some(w) = winner {
                        let mut batch = batch;
                        let winning = batch.swap_remove(w);
                        tracing::debug!(
                            attempt_index = winning.attempt_index,
                            ok = winning.result.is_ok(),
                            "attempt won the race"
                        );
                        for mut outcome in batch {
                            cancel_outcome(&mut outcome);
                        }
                        ctx.log().mark_ended_with_last_child();
                        return match winning.result {
                            Ok(response) => Ok(response),
                            Err(cause) => Err(HedgingError::AllAttemptsFailed(cause)),
                        };
                    }

                    // No decisive outcome this round: every completion in the
                    // batch voted Accept. None of them is kept — Accept never
                    // makes an attempt the winner by itself, so the response
                    // (if any) is discarded and the race continues with a
                    // fresh hedge. Several simultaneous Accepts only ever
                    // produce one more scheduled attempt: the soonest delay
                    // they proposed.
                    let min_delay = decisions
                        .iter()
                        .filter_map(|d| match d {
                            Decision::Accept { next_delay_ms } => Some(*next_delay_ms),
                            _ => None,
                        })
                        .min();

                    for mut outcome in batch {
                        cancel_outcome(&mut outcome);
                    }

                    if let Some(delay) = min_delay {
                        self.arm_next_hedge(&state, &mut hedge_timer, delay);
                    }

                    if attempts.is_empty() && hedge_timer.is_none() {
                        return Err(terminal_error(ctx, started, last_cause));
                    }
                }
                _ = hedge_fut => {
                    hedge_timer.take();
                    // The reservation (the counter increment and the attempt
                    // index it earns) only happens now, when the hedge
                    // actually fires — arming and re-arming the timer on a
                    // later `Accept` never touched `total_attempts`, so a
                    // hedge that's superseded before it fires never
                    // consumed a slot.
                    let reserved = state.next_delay(0);
                    if reserved == NO_HEDGING {
                        tracing::trace!("hedge fired but cap or deadline was exhausted meanwhile, not spawning");
                    } else {
                        let attempt_index = state.last_reserved_index();
                        let (_child, fut) = self.spawn_attempt(ctx, &state, &req, attempt_index, false);
                        attempts.push(fut);
                    }

                    if attempts.is_empty() && hedge_timer.is_none() {
                        return Err(terminal_error(ctx, started, last_cause));
                    }
                }
            }
        }
    }

    fn spawn_attempt<'a>(
        &'a self,
        parent_ctx: &RequestContext,
        state: &HedgingState,
        req_template: &HedgeRequest,
        attempt_index: usize,
        is_initial: bool,
    ) -> (RequestContext, BoxFuture<'a, AttemptOutcome<D::Response>>) {
        let child_ctx = parent_ctx.derive_child(is_initial);
        let mut req = req_template.clone();
        if attempt_index > 0 {
            header::stamp_retry_count(&mut req, attempt_index);
        }
        tracing::trace!(attempt_index, is_initial, "spawning attempt");

        let timeout = state.effective_per_attempt_timeout_ms();
        let ctx_for_future = child_ctx.clone();
        let fut = async move {
            match timeout {
                EffectiveTimeout::AlreadyExpired => AttemptOutcome {
                    attempt_index,
                    ctx: ctx_for_future,
                    result: Err(AttemptError::Timeout),
                },
                EffectiveTimeout::Millis(ms) if ms > 0 => {
                    ctx_for_future.set_response_timeout_millis(ms);
                    let result = tokio::time::timeout(
                        Duration::from_millis(ms as u64),
                        self.delegate.execute(&ctx_for_future, req),
                    )
                    .await;
                    let result = match result {
                        Ok(inner) => inner,
                        Err(_elapsed) => Err(AttemptError::Timeout),
                    };
                    AttemptOutcome {
                        attempt_index,
                        ctx: ctx_for_future,
                        result,
                    }
                }
                EffectiveTimeout::Millis(_) => {
                    let result = self.delegate.execute(&ctx_for_future, req).await;
                    AttemptOutcome {
                        attempt_index,
                        ctx: ctx_for_future,
                        result,
                    }
                }
            }
        }
        .boxed();

        (child_ctx, fut)
    }

    /// Arms (or re-arms) `hedge_timer` to fire `delay_ms` from now, without
    /// reserving an attempt slot — only the timer actually firing does that,
    /// via `state.next_delay` in the main loop. This is deliberate: a rule's
    /// `Accept` on an attempt that completes while an earlier hedge is still
    /// pending must replace that pending hedge's delay, not queue a second,
    /// separately-reserved one (only one scheduled-but-not-yet-started
    /// attempt may exist at a time). Committing the reservation at arm time
    /// instead would also overcount `total_attempts` for hedges that get
    /// superseded or never get the chance to fire before the race settles.
    ///
    /// `delay_ms` is still checked against the whole-operation budget here
    /// (read-only) so an obviously-too-late hedge is never armed at all.
    fn arm_next_hedge(
        &self,
        state: &HedgingState,
        hedge_timer: &mut Option<Pin<Box<tokio::time::Sleep>>>,
        delay_ms: i64,
    ) {
        if !state.fits_remaining_budget(delay_ms) {
            tracing::trace!(delay_ms, "hedge not armed, negative delay or budget exceeded");
            return;
        }
        tracing::trace!(delay_ms, "hedge armed");
        *hedge_timer = Some(Box::pin(tokio::time::sleep(Duration::from_millis(delay_ms as u64))));
    }
}

async fn evaluate_outcome<R: HedgeResponse>(
    config: &crate::config::HedgingConfig,
    outcome: &mut AttemptOutcome<R>,
) -> Decision {
    match &mut outcome.result {
        Ok(response) => {
            outcome.ctx.log().set_response_status(response.status());
            match config.rule() {
                RuleKind::Plain(r) => r.should_hedge(&outcome.ctx, None).await,
                RuleKind::WithContent(r) => {
                    let view = response.duplicate_for_rule(config.max_content_length()).await;
                    if !view.content_preview.is_empty() {
                        outcome
                            .ctx
                            .log()
                            .set_response_content_preview(String::from_utf8_lossy(&view.content_preview).into_owned());
                    }
                    r.should_hedge(&outcome.ctx, Some(&view), None).await
                }
            }
        }
        Err(cause) => match config.rule() {
            RuleKind::Plain(r) => r.should_hedge(&outcome.ctx, Some(cause)).await,
            RuleKind::WithContent(r) => r.should_hedge(&outcome.ctx, None, Some(cause)).await,
        },
    }
}

fn cancel_outcome<R: HedgeResponse>(outcome: &mut AttemptOutcome<R>) {
    if let Ok(response) = &mut outcome.result {
        response.cancel();
    }
    outcome.ctx.cancel(AttemptError::Cancelled);
}

fn terminal_error(ctx: &RequestContext, started: Instant, last_cause: Option<AttemptError>) -> HedgingError {
    if let Some(deadline) = ctx.deadline() {
        if Instant::now() >= deadline {
            tracing::warn!(elapsed_ms = started.elapsed().as_millis() as u64, "deadline exceeded");
            return HedgingError::DeadlineExceeded(started.elapsed());
        }
    }
    tracing::warn!(cause = ?last_cause, "all attempts failed");
    HedgingError::AllAttemptsFailed(last_cause.unwrap_or(AttemptError::Cancelled))
}
