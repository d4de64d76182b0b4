//! Response-body tee for content-aware rules.
//!
//! Only the streaming variant needs this: a content-aware rule and the
//! eventual caller both need to read the same body independently, so the
//! body is split into two independently-pollable streams. `Bytes` chunks are
//! refcounted, so teeing is a clone of the chunk handle, not a copy of its
//! data.

use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use tokio::sync::mpsc;

use crate::errors::AttemptError;

type Chunk = Result<Bytes, AttemptError>;

/// Tees one `Stream<Item = Result<Bytes, AttemptError>>` into two.
///
/// Construction spawns a background task that pulls the source stream and
/// forwards a clone of each chunk to both output channels; `abort` stops
/// forwarding early and closes both outputs with the given cause.
pub struct Duplicator {
    abort_tx: mpsc::UnboundedSender<AttemptError>,
}

impl Duplicator {
    /// Tees `source` into two streams, returning the duplicator handle (used
    /// only to `abort`) alongside the two output streams.
    pub fn tee(
        source: BoxStream<'static, Chunk>,
    ) -> (Duplicator, BoxStream<'static, Chunk>, BoxStream<'static, Chunk>) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        let (abort_tx, mut abort_rx) = mpsc::unbounded_channel::<AttemptError>();

        tokio::spawn(async move {
            let mut source = source;
            loop {
                tokio::select! {
                    biased;
                    Some(cause) = abort_rx.recv() => {
                        let _ = a_tx.send(Err(cause.clone()));
                        let _ = b_tx.send(Err(cause));
                        return;
                    }
                    item = source.next() => {
                        match item {
                            Some(Ok(chunk)) => {
                                let a_failed = a_tx.send(Ok(chunk.clone())).is_err();
                                let b_failed = b_tx.send(Ok(chunk)).is_err();
                                if a_failed && b_failed {
                                    return;
                                }
                            }
                            Some(Err(cause)) => {
                                let _ = a_tx.send(Err(cause.clone()));
                                let _ = b_tx.send(Err(cause));
                                return;
                            }
                            None => return,
                        }
                    }
                }
            }
        });

        let a = tokio_stream_from_receiver(a_rx).boxed();
        let b = tokio_stream_from_receiver(b_rx).boxed();
        (Duplicator { abort_tx }, a, b)
    }

    /// Stops forwarding and closes both tee outputs with `cause`. Called
    /// once the engine knows this response lost the race.
    pub fn abort(&self, cause: AttemptError) {
        let _ = self.abort_tx.send(cause);
    }
}

fn tokio_stream_from_receiver(
    rx: mpsc::UnboundedReceiver<Chunk>,
) -> impl Stream<Item = Chunk> + Send + 'static {
    futures::stream::unfold(rx, |mut rx| async move {
        let item = rx.recv().await;
        item.map(|chunk| (chunk, rx))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn tees_all_chunks_to_both_branches() {
        let source = stream::iter(vec![
            Ok(Bytes::from_static(b"a")),
            Ok(Bytes::from_static(b"b")),
        ])
        .boxed();

        let (_dup, mut a, mut b) = Duplicator::tee(source);

        assert_eq!(a.next().await.unwrap().unwrap(), Bytes::from_static(b"a"));
        assert_eq!(b.next().await.unwrap().unwrap(), Bytes::from_static(b"a"));
        assert_eq!(a.next().await.unwrap().unwrap(), Bytes::from_static(b"b"));
        assert_eq!(b.next().await.unwrap().unwrap(), Bytes::from_static(b"b"));
        assert!(a.next().await.is_none());
        assert!(b.next().await.is_none());
    }

    #[tokio::test]
    async fn abort_closes_both_branches_with_cause() {
        let source = stream::pending::<Chunk>().boxed();
        let (dup, mut a, mut b) = Duplicator::tee(source);

        dup.abort(AttemptError::Cancelled);

        assert!(matches!(a.next().await, Some(Err(AttemptError::Cancelled))));
        assert!(matches!(b.next().await, Some(Err(AttemptError::Cancelled))));
    }
}
