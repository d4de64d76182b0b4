//! User-facing rule-builder surface.

use async_trait::async_trait;
use http::StatusCode;

use crate::context::RequestContext;
use crate::decision::Decision;
use crate::errors::AttemptError;
use crate::filters::{status_class_of, StatusClass};
use crate::transport::ResponseView;

use super::{HedgingRule, HedgingRuleWithContent};

type PlainPredicate = Box<dyn Fn(&RequestContext, Option<&AttemptError>) -> bool + Send + Sync>;

/// Builds a plain (non-content-aware) [`HedgingRule`].
///
/// Each `on_*` call adds a filter; the filters are OR-ed together, and the
/// terminal (`then_hedge`/`then_no_hedge`) fires if any of them matched —
/// otherwise the built rule abstains (`Decision::Next`), letting a composed
/// `.or_else(...)` rule continue.
#[derive(Default)]
pub struct RuleBuilder {
    predicates: Vec<PlainPredicate>,
    requires_trailers: bool,
}

impl RuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches when the completed attempt's response status falls in `class`.
    pub fn on_status_class(mut self, class: StatusClass) -> Self {
        self.predicates.push(Box::new(move |ctx, _cause| {
            ctx.log()
                .snapshot()
                .response_status
                .map(status_class_of)
                == Some(class)
        }));
        self
    }

    /// Shorthand for `on_status_class(StatusClass::ServerError)`.
    pub fn on_server_error_status(self) -> Self {
        self.on_status_class(StatusClass::ServerError)
    }

    /// Matches when `predicate` accepts the completed attempt's status code.
    pub fn on_status(mut self, predicate: impl Fn(StatusCode) -> bool + Send + Sync + 'static) -> Self {
        self.predicates.push(Box::new(move |ctx, _cause| {
            ctx.log()
                .snapshot()
                .response_status
                .map(|s| predicate(s))
                .unwrap_or(false)
        }));
        self
    }

    /// Matches when `predicate` accepts the attempt's failure cause.
    pub fn on_exception(mut self, predicate: impl Fn(&AttemptError) -> bool + Send + Sync + 'static) -> Self {
        self.predicates.push(Box::new(move |_ctx, cause| {
            cause.map(|c| predicate(c)).unwrap_or(false)
        }));
        self
    }

    /// Matches any failure cause at all.
    pub fn on_any_exception(self) -> Self {
        self.on_exception(|_| true)
    }

    /// Matches when the attempt failed before reaching the wire.
    pub fn on_unprocessed(mut self) -> Self {
        self.predicates
            .push(Box::new(|_ctx, cause| cause.map(AttemptError::is_unprocessed).unwrap_or(false)));
        self
    }

    /// Matches when the attempt failed due to a timeout.
    pub fn on_timeout_exception(mut self) -> Self {
        self.predicates
            .push(Box::new(|_ctx, cause| cause.map(AttemptError::is_timeout).unwrap_or(false)));
        self
    }

    pub fn requires_response_trailers(mut self) -> Self {
        self.requires_trailers = true;
        self
    }

    /// Terminal: if any filter matched, hedge again after `delay_ms`.
    pub fn then_hedge(self, delay_ms: i64) -> BuiltRule {
        BuiltRule {
            predicates: self.predicates,
            requires_trailers: self.requires_trailers,
            terminal: Decision::accept(delay_ms),
        }
    }

    /// Terminal: if any filter matched, stop hedging (this attempt wins).
    pub fn then_no_hedge(self) -> BuiltRule {
        BuiltRule {
            predicates: self.predicates,
            requires_trailers: self.requires_trailers,
            terminal: Decision::Reject,
        }
    }
}

pub struct BuiltRule {
    predicates: Vec<PlainPredicate>,
    requires_trailers: bool,
    terminal: Decision,
}

#[async_trait]
impl HedgingRule for BuiltRule {
    async fn should_hedge(&self, ctx: &RequestContext, cause: Option<&AttemptError>) -> Decision {
        if self.predicates.iter().any(|p| p(ctx, cause)) {
            self.terminal
        } else {
            Decision::Next
        }
    }

    fn requires_response_trailers(&self) -> bool {
        self.requires_trailers
    }
}

type ContentPredicate =
    Box<dyn Fn(&RequestContext, Option<&ResponseView>, Option<&AttemptError>) -> bool + Send + Sync>;

/// Builds a content-aware [`HedgingRuleWithContent`]. Same OR-of-filters,
/// single-terminal shape as [`RuleBuilder`], plus `on_response` for
/// body-predicate filters.
#[derive(Default)]
pub struct ContentRuleBuilder {
    predicates: Vec<ContentPredicate>,
    requires_trailers: bool,
}

impl ContentRuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_status_class(mut self, class: StatusClass) -> Self {
        self.predicates.push(Box::new(move |_ctx, response, _cause| {
            response.map(|r| status_class_of(r.status) == class).unwrap_or(false)
        }));
        self
    }

    pub fn on_server_error_status(self) -> Self {
        self.on_status_class(StatusClass::ServerError)
    }

    pub fn on_status(mut self, predicate: impl Fn(StatusCode) -> bool + Send + Sync + 'static) -> Self {
        self.predicates.push(Box::new(move |_ctx, response, _cause| {
            response.map(|r| predicate(r.status)).unwrap_or(false)
        }));
        self
    }

    pub fn on_exception(mut self, predicate: impl Fn(&AttemptError) -> bool + Send + Sync + 'static) -> Self {
        self.predicates.push(Box::new(move |_ctx, _response, cause| {
            cause.map(|c| predicate(c)).unwrap_or(false)
        }));
        self
    }

    pub fn on_unprocessed(mut self) -> Self {
        self.predicates.push(Box::new(|_ctx, _response, cause| {
            cause.map(AttemptError::is_unprocessed).unwrap_or(false)
        }));
        self
    }

    pub fn on_timeout_exception(mut self) -> Self {
        self.predicates.push(Box::new(|_ctx, _response, cause| {
            cause.map(AttemptError::is_timeout).unwrap_or(false)
        }));
        self
    }

    /// Matches when `predicate` accepts the (possibly truncated) response
    /// content preview.
    pub fn on_response(mut self, predicate: impl Fn(&ResponseView) -> bool + Send + Sync + 'static) -> Self {
        self.predicates.push(Box::new(move |_ctx, response, _cause| {
            response.map(|r| predicate(r)).unwrap_or(false)
        }));
        self
    }

    pub fn requires_response_trailers(mut self) -> Self {
        self.requires_trailers = true;
        self
    }

    pub fn then_hedge(self, delay_ms: i64) -> BuiltContentRule {
        BuiltContentRule {
            predicates: self.predicates,
            requires_trailers: self.requires_trailers,
            terminal: Decision::accept(delay_ms),
        }
    }

    pub fn then_no_hedge(self) -> BuiltContentRule {
        BuiltContentRule {
            predicates: self.predicates,
            requires_trailers: self.requires_trailers,
            terminal: Decision::Reject,
        }
    }
}

pub struct BuiltContentRule {
    predicates: Vec<ContentPredicate>,
    requires_trailers: bool,
    terminal: Decision,
}

#[async_trait]
impl HedgingRuleWithContent for BuiltContentRule {
    async fn should_hedge(
        &self,
        ctx: &RequestContext,
        response: Option<&ResponseView>,
        cause: Option<&AttemptError>,
    ) -> Decision {
        if self.predicates.iter().any(|p| p(ctx, response, cause)) {
            self.terminal
        } else {
            Decision::Next
        }
    }

    fn requires_response_trailers(&self) -> bool {
        self.requires_trailers
    }
}
