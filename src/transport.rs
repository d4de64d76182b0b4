//! The delegate-client seam the engine decorates.

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, Uri};

use crate::context::RequestContext;
use crate::errors::AttemptError;

/// An outbound attempt, independent of transport. Cloned once per attempt so
/// the `armeria-retry-count` header can be stamped on hedges without
/// mutating the original.
#[derive(Debug, Clone)]
pub struct HedgeRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HedgeRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// A read-only snapshot of a response's metadata and (possibly truncated)
/// content, handed to a [`crate::rule::HedgingRuleWithContent`]. Never the
/// caller-visible response object itself — the engine retains that and hands
/// out only this view while the rule decides.
#[derive(Debug, Clone)]
pub struct ResponseView {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub trailers: Option<HeaderMap>,
    pub content_preview: Bytes,
    /// True if `content_preview` stopped short of the full body because it
    /// hit `max_content_length`.
    pub truncated: bool,
}

/// A completed attempt's response, abstracted over the unary/streaming
/// variant adapters.
#[async_trait]
pub trait HedgeResponse: Send + 'static {
    fn status(&self) -> StatusCode;
    fn headers(&self) -> &HeaderMap;
    fn trailers(&self) -> Option<&HeaderMap> {
        None
    }

    /// Aborts this response's delivery. A no-op for fully-materialized
    /// (unary) responses; aborts the body stream/duplicator for the
    /// streaming variant. Called on every loser once the race settles.
    fn cancel(&mut self);

    /// Produces a [`ResponseView`] for a content-aware rule. For the unary
    /// variant this is a cheap structural copy of already-buffered content;
    /// for the streaming variant it tees the body through a duplicator,
    /// consuming up to `max_content_length` bytes for the preview while
    /// splicing the remainder back in for the eventual caller.
    async fn duplicate_for_rule(&mut self, max_content_length: usize) -> ResponseView;
}

/// The transport the engine decorates. One impl per backend; the
/// [`crate::variants`] module provides the two response-shape variant
/// adapters (`unary`, `streaming`).
#[async_trait]
pub trait DelegateClient: Send + Sync {
    type Response: HedgeResponse;

    async fn execute(&self, ctx: &RequestContext, req: HedgeRequest) -> Result<Self::Response, AttemptError>;
}
