//! Races three simulated endpoints under the `failsafe` preset: the first
//! endpoint is slow, so the hedge fires and the second endpoint wins.
//!
//! Run with `cargo run --example failsafe_race`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hedging_client::config::{HedgingConfig, SingletonHedgingConfigMapping};
use hedging_client::context::{Endpoint, RequestContext, StaticEndpointGroup};
use hedging_client::engine::HedgingClient;
use hedging_client::errors::AttemptError;
use hedging_client::rule::presets;
use hedging_client::transport::{DelegateClient, HedgeRequest};
use hedging_client::variants::UnaryResponse;
use http::{HeaderMap, Method, StatusCode};

/// A toy backend where each simulated endpoint has a fixed latency and
/// outcome, standing in for three real RPC providers of varying health.
struct SimulatedBackend;

#[async_trait]
impl DelegateClient for SimulatedBackend {
    type Response = UnaryResponse;

    async fn execute(&self, ctx: &RequestContext, _req: HedgeRequest) -> Result<UnaryResponse, AttemptError> {
        let endpoint = ctx.endpoint().expect("demo always selects an endpoint");
        let (latency_ms, status) = match endpoint.port {
            1 => (250, StatusCode::OK),       // slow but would eventually succeed
            2 => (20, StatusCode::OK),        // fast and healthy
            _ => (5, StatusCode::BAD_GATEWAY),
        };
        tokio::time::sleep(Duration::from_millis(latency_ms)).await;
        Ok(UnaryResponse::new(status, HeaderMap::new(), "ok"))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = HedgingConfig::builder(presets::failsafe(30))
        .max_total_attempts(3)
        .per_attempt_response_timeout_ms(1_000)
        .build()?;
    let mapping = Arc::new(SingletonHedgingConfigMapping::new(config));
    let client = HedgingClient::new(SimulatedBackend, mapping);

    let endpoints = Arc::new(StaticEndpointGroup::new(vec![
        Endpoint::new("slow-provider", 1),
        Endpoint::new("fast-provider", 2),
        Endpoint::new("flaky-provider", 3),
    ]));
    let ctx = RequestContext::new(Method::GET, None, Some(endpoints));
    let req = HedgeRequest::new(Method::GET, "https://example.test/accounts".parse()?);

    let response = client.execute(&ctx, req).await?;
    println!("winning status: {}", response.status);
    Ok(())
}
