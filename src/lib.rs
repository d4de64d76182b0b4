//! A decorator that races duplicate attempts of an outbound request to
//! reduce tail latency, without needing a response cache or an
//! idempotency/dedup layer underneath it.
//!
//! # Quick start
//!
//! ```no_run
//! use hedging_client::config::{HedgingConfig, SingletonHedgingConfigMapping};
//! use hedging_client::context::RequestContext;
//! use hedging_client::engine::HedgingClient;
//! use hedging_client::rule::presets;
//! use hedging_client::transport::HedgeRequest;
//! use http::Method;
//! use std::sync::Arc;
//!
//! # async fn example(delegate: impl hedging_client::transport::DelegateClient) -> Result<(), Box<dyn std::error::Error>> {
//! let config = HedgingConfig::builder(presets::failsafe(50))
//!     .max_total_attempts(3)
//!     .build()?;
//! let mapping = Arc::new(SingletonHedgingConfigMapping::new(config));
//! let client = HedgingClient::new(delegate, mapping);
//!
//! let ctx = RequestContext::new(Method::GET, None, None);
//! let req = HedgeRequest::new(Method::GET, "https://example.test/accounts".parse()?);
//! let response = client.execute(&ctx, req).await?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```
//!
//! # Hedging strategy
//!
//! A [`rule::HedgingRule`] (or its content-aware cousin,
//! [`rule::HedgingRuleWithContent`]) inspects each completed attempt and
//! returns a [`decision::Decision`]:
//!
//! - `Reject` — stop hedging, this attempt wins.
//! - `Accept { next_delay_ms }` — schedule one more attempt after the delay;
//!   this attempt does not win even if it otherwise looks successful.
//! - `Next` — this rule has no opinion; fall through to a composed rule, or
//!   stand as the winner if it's the last one consulted.
//!
//! [`engine::HedgingClient`] races attempts under a per-request
//! [`state::HedgingState`] scoreboard (attempt cap, whole-operation deadline)
//! and cancels every loser once a winner is chosen.
//!
//! # Presets
//!
//! [`rule::presets::failsafe`] hedges idempotent methods on a server-error
//! status or a transport failure, and declines to hedge everything else —
//! the starting point most callers reach for before writing a custom rule.

pub mod config;
pub mod context;
pub mod decision;
pub mod duplicator;
pub mod engine;
pub mod errors;
pub mod filters;
pub mod header;
pub mod log;
pub mod rule;
pub mod state;
pub mod transport;
pub mod variants;

pub use config::{
    HedgingConfig, HedgingConfigBuilder, HedgingConfigMapping, KeyedHedgingConfigMapping,
    SingletonHedgingConfigMapping,
};
pub use context::{Attributes, Endpoint, EndpointGroup, RequestContext, RequestId, StaticEndpointGroup};
pub use decision::{Decision, NO_HEDGING};
pub use duplicator::Duplicator;
pub use engine::HedgingClient;
pub use errors::{AttemptError, ConfigError, HedgingError};
pub use filters::{status_class_of, MethodExt, StatusClass};
pub use log::{RequestLogBuilder, RequestLogSnapshot};
pub use rule::{
    presets, ContentRuleBuilder, HedgingRule, HedgingRuleExt, HedgingRuleWithContent,
    HedgingRuleWithContentExt, RuleBuilder, RuleKind,
};
pub use state::{EffectiveTimeout, HedgingState};
pub use transport::{DelegateClient, HedgeRequest, HedgeResponse, ResponseView};
pub use variants::{StreamedResponse, UnaryResponse};
