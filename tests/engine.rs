//! End-to-end attempt-race scenarios, driven with a fake in-memory backend
//! and `tokio`'s paused clock so no test actually sleeps wall-clock time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use std::sync::Mutex;

use async_trait::async_trait;
use hedging_client::config::{HedgingConfig, SingletonHedgingConfigMapping};
use hedging_client::context::RequestContext;
use hedging_client::engine::HedgingClient;
use hedging_client::errors::{AttemptError, HedgingError};
use hedging_client::header::RETRY_COUNT_HEADER;
use hedging_client::rule::{presets, RuleBuilder, RuleKind};
use hedging_client::transport::{DelegateClient, HedgeRequest};
use hedging_client::variants::UnaryResponse;
use http::{HeaderMap, Method, StatusCode};

#[derive(Clone)]
struct Step {
    delay_ms: u64,
    outcome: Result<StatusCode, AttemptError>,
}

/// Returns steps in call order — attempt 0's call gets `steps[0]`, the first
/// hedge gets `steps[1]`, and so on.
struct ScriptedBackend {
    steps: Vec<Step>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DelegateClient for ScriptedBackend {
    type Response = UnaryResponse;

    async fn execute(&self, _ctx: &RequestContext, _req: HedgeRequest) -> Result<UnaryResponse, AttemptError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps[index].clone();
        tokio::time::sleep(Duration::from_millis(step.delay_ms)).await;
        step.outcome.map(|status| UnaryResponse::new(status, HeaderMap::new(), "body"))
    }
}

/// Like [`ScriptedBackend`], but also records the headers each call arrived
/// with, so a test can assert on the `armeria-retry-count` value a given
/// attempt actually carried.
struct HeaderCapturingBackend {
    steps: Vec<Step>,
    calls: AtomicUsize,
    headers: Mutex<Vec<HeaderMap>>,
}

impl HeaderCapturingBackend {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            calls: AtomicUsize::new(0),
            headers: Mutex::new(Vec::new()),
        }
    }

    fn headers_for_call(&self, index: usize) -> HeaderMap {
        self.headers.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl DelegateClient for HeaderCapturingBackend {
    type Response = UnaryResponse;

    async fn execute(&self, _ctx: &RequestContext, req: HedgeRequest) -> Result<UnaryResponse, AttemptError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.headers.lock().unwrap().push(req.headers.clone());
        let step = self.steps[index].clone();
        tokio::time::sleep(Duration::from_millis(step.delay_ms)).await;
        step.outcome.map(|status| UnaryResponse::new(status, HeaderMap::new(), "body"))
    }
}

fn req() -> HedgeRequest {
    HedgeRequest::new(Method::GET, "https://example.test/".parse().unwrap())
}

fn ctx() -> RequestContext {
    RequestContext::new(Method::GET, None, None)
}

fn ctx_with_deadline(ms: u64) -> RequestContext {
    RequestContext::new(Method::GET, Some(Instant::now() + Duration::from_millis(ms)), None)
}

#[tokio::test(start_paused = true)]
async fn first_attempt_succeeds_fast_no_hedge_fires() {
    let backend = ScriptedBackend::new(vec![Step {
        delay_ms: 5,
        outcome: Ok(StatusCode::OK),
    }]);
    let config = HedgingConfig::builder(presets::failsafe(50))
        .max_total_attempts(3)
        .initial_hedging_delay_ms(1_000)
        .build()
        .unwrap();
    let mapping = Arc::new(SingletonHedgingConfigMapping::new(config));
    let client = HedgingClient::new(backend, mapping);

    let response = client.execute(&ctx(), req()).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(client.delegate().calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_first_attempt_loses_to_hedge() {
    let backend = ScriptedBackend::new(vec![
        Step {
            delay_ms: 10_000,
            outcome: Ok(StatusCode::OK),
        },
        Step {
            delay_ms: 5,
            outcome: Ok(StatusCode::OK),
        },
    ]);
    let config = HedgingConfig::builder(presets::failsafe(30))
        .max_total_attempts(3)
        .initial_hedging_delay_ms(20)
        .build()
        .unwrap();
    let mapping = Arc::new(SingletonHedgingConfigMapping::new(config));
    let client = HedgingClient::new(backend, mapping);

    let response = client.execute(&ctx(), req()).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert!(client.delegate().calls.load(Ordering::SeqCst) >= 2);
}

#[tokio::test(start_paused = true)]
async fn unprocessed_first_attempt_races_to_second() {
    let backend = ScriptedBackend::new(vec![
        Step {
            delay_ms: 5,
            outcome: Err(AttemptError::Unprocessed("connection refused".into())),
        },
        Step {
            delay_ms: 5,
            outcome: Ok(StatusCode::OK),
        },
    ]);
    let config = HedgingConfig::builder(presets::failsafe(10))
        .max_total_attempts(3)
        .initial_hedging_delay_ms(1_000)
        .build()
        .unwrap();
    let mapping = Arc::new(SingletonHedgingConfigMapping::new(config));
    let client = HedgingClient::new(backend, mapping);

    let response = client.execute(&ctx(), req()).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn exhausts_cap_when_every_attempt_is_unprocessed() {
    let backend = ScriptedBackend::new(vec![
        Step {
            delay_ms: 5,
            outcome: Err(AttemptError::Unprocessed("down".into())),
        },
        Step {
            delay_ms: 5,
            outcome: Err(AttemptError::Unprocessed("down".into())),
        },
    ]);
    let config = HedgingConfig::builder(presets::failsafe(10))
        .max_total_attempts(2)
        .build()
        .unwrap();
    let mapping = Arc::new(SingletonHedgingConfigMapping::new(config));
    let client = HedgingClient::new(backend, mapping);

    let err = client.execute(&ctx(), req()).await.unwrap_err();
    assert!(matches!(err, HedgingError::AllAttemptsFailed(AttemptError::Unprocessed(_))));
}

#[tokio::test(start_paused = true)]
async fn deadline_shorter_than_next_hedge_delay_fails_without_hedging() {
    let backend = ScriptedBackend::new(vec![Step {
        delay_ms: 200,
        outcome: Err(AttemptError::Unprocessed("slow failure".into())),
    }]);
    let config = HedgingConfig::builder(presets::failsafe(500))
        .max_total_attempts(5)
        .initial_hedging_delay_ms(500)
        .build()
        .unwrap();
    let mapping = Arc::new(SingletonHedgingConfigMapping::new(config));
    let client = HedgingClient::new(backend, mapping);

    let err = client.execute(&ctx_with_deadline(10), req()).await.unwrap_err();
    assert!(matches!(
        err,
        HedgingError::AllAttemptsFailed(_) | HedgingError::DeadlineExceeded(_)
    ));
    // only attempt 0 ever ran — the 500ms initial-hedge proposal exceeds the 10ms deadline budget
    assert_eq!(client.delegate().calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn rule_rejects_on_client_error_status() {
    let backend = ScriptedBackend::new(vec![Step {
        delay_ms: 5,
        outcome: Ok(StatusCode::NOT_FOUND),
    }]);
    let config = HedgingConfig::builder(presets::failsafe(50))
        .max_total_attempts(3)
        .initial_hedging_delay_ms(1_000)
        .build()
        .unwrap();
    let mapping = Arc::new(SingletonHedgingConfigMapping::new(config));
    let client = HedgingClient::new(backend, mapping);

    let response = client.execute(&ctx(), req()).await.unwrap();
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(client.delegate().calls.load(Ordering::SeqCst), 1);
}

/// A rule `Accept` on an attempt that completes while the initial hedge is
/// still pending must reschedule that pending hedge, not queue a second,
/// separately-reserved one. Attempt 0 fails `Unprocessed` at t=5ms and its
/// rule accepts a 50ms hedge, superseding the initial-hedging-delay timer
/// (armed for t=50 at t=0) with one firing at t=55. Only one more attempt
/// should ever be spawned, and it must carry `armeria-retry-count: 1`, not
/// `2`.
#[tokio::test(start_paused = true)]
async fn accept_while_hedge_pending_reschedules_instead_of_double_reserving() {
    let backend = HeaderCapturingBackend::new(vec![
        Step {
            delay_ms: 5,
            outcome: Err(AttemptError::Unprocessed("connection refused".into())),
        },
        Step {
            delay_ms: 5,
            outcome: Ok(StatusCode::OK),
        },
    ]);
    let config = HedgingConfig::builder(RuleKind::plain(RuleBuilder::new().on_unprocessed().then_hedge(50)))
        .max_total_attempts(3)
        .initial_hedging_delay_ms(50)
        .build()
        .unwrap();
    let mapping = Arc::new(SingletonHedgingConfigMapping::new(config));
    let client = HedgingClient::new(backend, mapping);

    let response = client.execute(&ctx(), req()).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(client.delegate().calls.load(Ordering::SeqCst), 2);
    assert!(client.delegate().headers_for_call(0).get(&RETRY_COUNT_HEADER).is_none());
    assert_eq!(
        client.delegate().headers_for_call(1).get(&RETRY_COUNT_HEADER).unwrap(),
        "1"
    );
}
