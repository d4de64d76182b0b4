//! Fully-materialized responses. Cheapest variant to content-hedge on: the
//! whole body is already in memory, so `duplicate_for_rule` is a structural
//! clone rather than a tee.

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use crate::transport::{HedgeResponse, ResponseView};

/// A response whose body arrived as one buffer.
#[derive(Debug, Clone)]
pub struct UnaryResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub trailers: Option<HeaderMap>,
    pub body: Bytes,
    cancelled: bool,
}

impl UnaryResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            trailers: None,
            body: body.into(),
            cancelled: false,
        }
    }

    pub fn with_trailers(mut self, trailers: HeaderMap) -> Self {
        self.trailers = Some(trailers);
        self
    }
}

#[async_trait]
impl HedgeResponse for UnaryResponse {
    fn status(&self) -> StatusCode {
        self.status
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn trailers(&self) -> Option<&HeaderMap> {
        self.trailers.as_ref()
    }

    fn cancel(&mut self) {
        // Nothing to stop — the body is already fully resident. Marking the
        // flag only matters for observability/tests; there is no stream to
        // abort.
        self.cancelled = true;
    }

    async fn duplicate_for_rule(&mut self, max_content_length: usize) -> ResponseView {
        let truncated = self.body.len() > max_content_length;
        let preview = if truncated {
            self.body.slice(..max_content_length)
        } else {
            self.body.clone()
        };
        ResponseView {
            status: self.status,
            headers: self.headers.clone(),
            trailers: self.trailers.clone(),
            content_preview: preview,
            truncated,
        }
    }
}
