//! Streamed responses. `duplicate_for_rule` tees the body through a
//! [`Duplicator`]: one branch is drained up to `max_content_length` bytes to
//! build the rule's [`ResponseView`], the other is kept as the response body
//! the eventual winner's caller reads. Because a tee hands both branches
//! every chunk (rather than splitting the stream), the branch kept for the
//! caller is already complete — nothing needs to be spliced back together.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;
use http::{HeaderMap, StatusCode};

use crate::duplicator::Duplicator;
use crate::errors::AttemptError;
use crate::transport::{HedgeResponse, ResponseView};

/// A response whose body arrives as a stream of chunks.
pub struct StreamedResponse {
    status: StatusCode,
    headers: HeaderMap,
    trailers: Option<HeaderMap>,
    body: Option<BoxStream<'static, Result<Bytes, AttemptError>>>,
    duplicator: Option<Duplicator>,
}

impl StreamedResponse {
    pub fn new(
        status: StatusCode,
        headers: HeaderMap,
        body: BoxStream<'static, Result<Bytes, AttemptError>>,
    ) -> Self {
        Self {
            status,
            headers,
            trailers: None,
            body: Some(body),
            duplicator: None,
        }
    }

    pub fn with_trailers(mut self, trailers: HeaderMap) -> Self {
        self.trailers = Some(trailers);
        self
    }

    /// Takes ownership of the remaining body stream, leaving this response
    /// unable to produce further content. Called once the winner is known
    /// and its body is handed to the caller.
    pub fn into_body(mut self) -> BoxStream<'static, Result<Bytes, AttemptError>> {
        self.body
            .take()
            .unwrap_or_else(|| futures::stream::empty().boxed())
    }
}

#[async_trait]
impl HedgeResponse for StreamedResponse {
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
        if let Some(duplicator) = self.duplicator.take() {
            duplicator.abort(AttemptError::Cancelled);
        }
        self.body = None;
    }

    async fn duplicate_for_rule(&mut self, max_content_length: usize) -> ResponseView {
        let Some(source) = self.body.take() else {
            return ResponseView {
                status: self.status,
                headers: self.headers.clone(),
                trailers: self.trailers.clone(),
                content_preview: Bytes::new(),
                truncated: false,
            };
        };

        let (duplicator, mut preview_stream, remainder_stream) = Duplicator::tee(source);
        self.duplicator = Some(duplicator);
        self.body = Some(remainder_stream);

        let mut preview = BytesMut::new();
        let mut truncated = false;
        while preview.len() < max_content_length {
            match preview_stream.next().await {
                Some(Ok(chunk)) => {
                    let remaining = max_content_length - preview.len();
                    if chunk.len() > remaining {
                        preview.extend_from_slice(&chunk[..remaining]);
                        truncated = true;
                        break;
                    }
                    preview.extend_from_slice(&chunk);
                }
                _ => break,
            }
        }

        ResponseView {
            status: self.status,
            headers: self.headers.clone(),
            trailers: self.trailers.clone(),
            content_preview: preview.freeze(),
            truncated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn body_of(chunks: Vec<&'static [u8]>) -> BoxStream<'static, Result<Bytes, AttemptError>> {
        stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c)))).boxed()
    }

    #[tokio::test]
    async fn duplicate_for_rule_truncates_across_chunk_boundaries() {
        let mut response = StreamedResponse::new(
            StatusCode::OK,
            HeaderMap::new(),
            body_of(vec![b"abcd", b"efgh"]),
        );
        let view = response.duplicate_for_rule(6).await;
        assert!(view.truncated);
        assert_eq!(view.content_preview, Bytes::from_static(b"abcdef"));
    }

    #[tokio::test]
    async fn remainder_stream_still_carries_every_chunk() {
        let mut response = StreamedResponse::new(
            StatusCode::OK,
            HeaderMap::new(),
            body_of(vec![b"abcd", b"efgh"]),
        );
        let _preview = response.duplicate_for_rule(2).await;
        let mut remainder = response.into_body();
        let first = remainder.next().await.unwrap().unwrap();
        let second = remainder.next().await.unwrap().unwrap();
        assert_eq!(first, Bytes::from_static(b"abcd"));
        assert_eq!(second, Bytes::from_static(b"efgh"));
    }

    #[tokio::test]
    async fn cancel_aborts_outstanding_duplicator() {
        let mut response = StreamedResponse::new(
            StatusCode::OK,
            HeaderMap::new(),
            stream::pending::<Result<Bytes, AttemptError>>().boxed(),
        );
        // max_content_length = 0 returns without reading the tee'd preview
        // branch, so this doesn't hang on the never-ending source.
        let _view = response.duplicate_for_rule(0).await;
        response.cancel();
        let mut remainder = response.into_body();
        assert!(matches!(remainder.next().await, Some(Err(AttemptError::Cancelled))));
    }
}
