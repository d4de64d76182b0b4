//! Request identity, endpoint selection, a type-keyed attribute store, and
//! the per-request context the engine derives one copy of per attempt.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use http::{Extensions, Method};

use crate::errors::AttemptError;
use crate::log::RequestLogBuilder;

/// Opaque, monotonically-assigned request identity. Attempt 0's derived
/// context gets a fresh id just like every hedge after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Generates fresh [`RequestId`]s for derived contexts.
pub trait RequestIdGenerator: Send + Sync {
    fn next_id(&self) -> RequestId;
}

/// The generator every [`RequestContext`] uses unless overridden: a process-wide
/// atomic counter.
#[derive(Default)]
pub struct SequentialRequestIdGenerator {
    next: AtomicU64,
}

impl RequestIdGenerator for SequentialRequestIdGenerator {
    fn next_id(&self) -> RequestId {
        RequestId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// A candidate destination for an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// The pool of candidate destinations an attempt's endpoint is freshly
/// selected from. `select_now` must be synchronous and non-blocking, which
/// keeps context derivation itself a synchronous operation.
pub trait EndpointGroup: Send + Sync {
    fn select_now(&self) -> Option<Endpoint>;
}

/// Round-robins over a fixed list of endpoints. The concrete `EndpointGroup`
/// used by the demos and tests in this crate; a real deployment would plug in
/// a DNS-backed or service-discovery-backed group behind the same trait.
pub struct StaticEndpointGroup {
    endpoints: Vec<Endpoint>,
    cursor: AtomicUsize,
}

impl StaticEndpointGroup {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl EndpointGroup for StaticEndpointGroup {
    fn select_now(&self) -> Option<Endpoint> {
        if self.endpoints.is_empty() {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
        Some(self.endpoints[idx].clone())
    }
}

/// Type-keyed, attach-by-type side channel threaded through a context and
/// inherited by its derived children, a thin wrapper over [`http::Extensions`].
/// [`crate::state::HedgingState`] is attached here under its own type.
#[derive(Clone, Default)]
pub struct Attributes {
    inner: Arc<Mutex<Extensions>>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Clone + Send + Sync + 'static>(&self, value: T) {
        self.inner.lock().expect("attributes mutex poisoned").insert(value);
    }

    pub fn get<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.inner.lock().expect("attributes mutex poisoned").get::<T>().cloned()
    }

    /// Shallow-copies the current key/value pairs into a fresh, independent
    /// store — used when deriving a child context so later mutation on one
    /// side doesn't leak to the other.
    pub fn fork(&self) -> Attributes {
        let guard = self.inner.lock().expect("attributes mutex poisoned");
        Attributes {
            inner: Arc::new(Mutex::new(guard.clone())),
        }
    }
}

struct ContextInner {
    id: RequestId,
    method: Method,
    deadline: Option<Instant>,
    endpoint_group: Option<Arc<dyn EndpointGroup>>,
    endpoint: Option<Endpoint>,
    attributes: Attributes,
    log: RequestLogBuilder,
    id_gen: Arc<dyn RequestIdGenerator>,
    cancelled: Mutex<Option<AttemptError>>,
    response_timeout_ms: Mutex<Option<i64>>,
}

/// A request context: the outer request's, or one of its derived per-attempt
/// copies. Cheap to clone (an `Arc` underneath).
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<ContextInner>,
}

impl RequestContext {
    /// Builds a root context for an outer request.
    pub fn new(
        method: Method,
        deadline: Option<Instant>,
        endpoint_group: Option<Arc<dyn EndpointGroup>>,
    ) -> Self {
        let id_gen: Arc<dyn RequestIdGenerator> = Arc::new(SequentialRequestIdGenerator::default());
        let endpoint = endpoint_group.as_ref().and_then(|g| g.select_now());
        let id = id_gen.next_id();
        Self {
            inner: Arc::new(ContextInner {
                id,
                method,
                deadline,
                endpoint_group,
                endpoint,
                attributes: Attributes::new(),
                log: RequestLogBuilder::new(),
                id_gen,
                cancelled: Mutex::new(None),
                response_timeout_ms: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> RequestId {
        self.inner.id
    }

    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    pub fn endpoint(&self) -> Option<Endpoint> {
        self.inner.endpoint.clone()
    }

    pub fn endpoint_group(&self) -> Option<&Arc<dyn EndpointGroup>> {
        self.inner.endpoint_group.as_ref()
    }

    pub fn attributes(&self) -> &Attributes {
        &self.inner.attributes
    }

    pub fn log(&self) -> &RequestLogBuilder {
        &self.inner.log
    }

    /// Derives a fresh child context for attempt `index`.
    ///
    /// Reuses the parent's endpoint when this is the initial attempt or the
    /// parent has no endpoint group; otherwise selects a new endpoint via
    /// `select_now`. Synchronous end to end, matching the non-blocking
    /// selection contract.
    pub fn derive_child(&self, is_initial_attempt: bool) -> RequestContext {
        let endpoint = if is_initial_attempt || self.inner.endpoint_group.is_none() {
            self.inner.endpoint.clone()
        } else {
            self.inner
                .endpoint_group
                .as_ref()
                .and_then(|g| g.select_now())
                .or_else(|| self.inner.endpoint.clone())
        };

        RequestContext {
            inner: Arc::new(ContextInner {
                id: self.inner.id_gen.next_id(),
                method: self.inner.method.clone(),
                deadline: self.inner.deadline,
                endpoint_group: self.inner.endpoint_group.clone(),
                endpoint,
                attributes: self.inner.attributes.fork(),
                log: self.inner.log.child(),
                id_gen: self.inner.id_gen.clone(),
                cancelled: Mutex::new(None),
                response_timeout_ms: Mutex::new(None),
            }),
        }
    }

    /// Cancels this context's in-flight work with `cause`. Idempotent.
    pub fn cancel(&self, cause: AttemptError) {
        let mut guard = self.inner.cancelled.lock().expect("cancel mutex poisoned");
        if guard.is_none() {
            *guard = Some(cause);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner
            .cancelled
            .lock()
            .expect("cancel mutex poisoned")
            .is_some()
    }

    pub fn cancellation_cause(&self) -> Option<AttemptError> {
        self.inner.cancelled.lock().expect("cancel mutex poisoned").clone()
    }

    /// Sets the per-attempt response timeout on this (derived) context.
    pub fn set_response_timeout_millis(&self, millis: i64) {
        *self
            .inner
            .response_timeout_ms
            .lock()
            .expect("timeout mutex poisoned") = Some(millis);
    }

    pub fn clear_response_timeout(&self) {
        *self
            .inner
            .response_timeout_ms
            .lock()
            .expect("timeout mutex poisoned") = None;
    }

    pub fn response_timeout_millis(&self) -> Option<i64> {
        *self
            .inner
            .response_timeout_ms
            .lock()
            .expect("timeout mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_roundtrip_by_type() {
        #[derive(Debug, Clone, PartialEq)]
        struct Marker(u32);

        let attrs = Attributes::new();
        assert!(attrs.get::<Marker>().is_none());
        attrs.insert(Marker(7));
        assert_eq!(attrs.get::<Marker>().unwrap(), Marker(7));
    }

    #[test]
    fn derive_child_reuses_endpoint_on_initial_attempt() {
        let group: Arc<dyn EndpointGroup> = Arc::new(StaticEndpointGroup::new(vec![
            Endpoint::new("a", 1),
            Endpoint::new("b", 2),
        ]));
        let ctx = RequestContext::new(Method::GET, None, Some(group));
        let first_endpoint = ctx.endpoint();

        let child0 = ctx.derive_child(true);
        assert_eq!(child0.endpoint(), first_endpoint);

        let child1 = ctx.derive_child(false);
        assert_ne!(child1.id(), ctx.id());
    }

    #[test]
    fn derive_child_without_group_reuses_parent_endpoint() {
        let ctx = RequestContext::new(Method::GET, None, None);
        let child = ctx.derive_child(false);
        assert_eq!(child.endpoint(), ctx.endpoint());
    }

    #[test]
    fn cancel_is_idempotent_and_keeps_first_cause() {
        let ctx = RequestContext::new(Method::GET, None, None);
        ctx.cancel(AttemptError::Timeout);
        ctx.cancel(AttemptError::Cancelled);
        assert!(matches!(ctx.cancellation_cause(), Some(AttemptError::Timeout)));
    }
}
