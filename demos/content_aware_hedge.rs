//! A content-aware rule that hedges when the first attempt's body carries a
//! soft-failure marker the server uses instead of a non-2xx status.
//!
//! Run with `cargo run --example content_aware_hedge`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use hedging_client::config::{HedgingConfig, SingletonHedgingConfigMapping};
use hedging_client::context::{Endpoint, RequestContext, StaticEndpointGroup};
use hedging_client::engine::HedgingClient;
use hedging_client::errors::AttemptError;
use hedging_client::rule::ContentRuleBuilder;
use hedging_client::transport::{DelegateClient, HedgeRequest};
use hedging_client::variants::StreamedResponse;
use http::{HeaderMap, Method, StatusCode};

struct SoftFailureBackend;

#[async_trait]
impl DelegateClient for SoftFailureBackend {
    type Response = StreamedResponse;

    async fn execute(&self, ctx: &RequestContext, _req: HedgeRequest) -> Result<StreamedResponse, AttemptError> {
        let endpoint = ctx.endpoint().expect("demo always selects an endpoint");
        let body: &'static [u8] = if endpoint.port == 1 {
            b"retry-me: index not yet ready"
        } else {
            b"{\"result\": \"ready\"}"
        };
        tokio::time::sleep(Duration::from_millis(if endpoint.port == 1 { 10 } else { 30 })).await;
        let chunks = stream::iter(vec![Ok(Bytes::from_static(body))]).boxed();
        Ok(StreamedResponse::new(StatusCode::OK, HeaderMap::new(), chunks))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let rule = ContentRuleBuilder::new()
        .on_response(|view| view.content_preview.starts_with(b"retry-me"))
        .then_hedge(5);

    let config = HedgingConfig::builder(hedging_client::rule::RuleKind::with_content(rule))
        .max_total_attempts(2)
        .max_content_length(64)
        .build()?;
    let mapping = Arc::new(SingletonHedgingConfigMapping::new(config));
    let client = HedgingClient::new(SoftFailureBackend, mapping);

    let endpoints = Arc::new(StaticEndpointGroup::new(vec![
        Endpoint::new("not-ready-yet", 1),
        Endpoint::new("ready", 2),
    ]));
    let ctx = RequestContext::new(Method::GET, None, Some(endpoints));
    let req = HedgeRequest::new(Method::GET, "https://example.test/index-status".parse()?);

    let response = client.execute(&ctx, req).await?;
    let mut body = response.into_body();
    while let Some(chunk) = body.next().await {
        print!("{}", String::from_utf8_lossy(&chunk?));
    }
    println!();
    Ok(())
}
