//! Hedging rules: pure predicates mapping a completed (or failed) attempt to
//! a [`Decision`].

mod builder;
pub mod presets;

pub use builder::{ContentRuleBuilder, RuleBuilder};

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::decision::Decision;
use crate::errors::AttemptError;
use crate::transport::ResponseView;

/// A rule that does not need the response body — only the context and, on
/// failure, the cause. Response status/headers are still reachable through
/// `ctx.log()`, which the engine populates as soon as they're known.
#[async_trait]
pub trait HedgingRule: Send + Sync {
    async fn should_hedge(&self, ctx: &RequestContext, cause: Option<&AttemptError>) -> Decision;

    /// Whether this rule needs trailers to have arrived before it can decide.
    /// Composition propagates this as a logical OR.
    fn requires_response_trailers(&self) -> bool {
        false
    }
}

#[async_trait]
impl HedgingRule for Arc<dyn HedgingRule> {
    async fn should_hedge(&self, ctx: &RequestContext, cause: Option<&AttemptError>) -> Decision {
        (**self).should_hedge(ctx, cause).await
    }

    fn requires_response_trailers(&self) -> bool {
        (**self).requires_response_trailers()
    }
}

/// A rule that may also inspect the response body (content-aware).
#[async_trait]
pub trait HedgingRuleWithContent: Send + Sync {
    async fn should_hedge(
        &self,
        ctx: &RequestContext,
        response: Option<&ResponseView>,
        cause: Option<&AttemptError>,
    ) -> Decision;

    fn requires_response_trailers(&self) -> bool {
        false
    }
}

#[async_trait]
impl HedgingRuleWithContent for Arc<dyn HedgingRuleWithContent> {
    async fn should_hedge(
        &self,
        ctx: &RequestContext,
        response: Option<&ResponseView>,
        cause: Option<&AttemptError>,
    ) -> Decision {
        (**self).should_hedge(ctx, response, cause).await
    }

    fn requires_response_trailers(&self) -> bool {
        (**self).requires_response_trailers()
    }
}

/// Short-circuit disjunction of two plain rules: if `a` abstains (`Next`),
/// `b` is consulted; otherwise `a`'s decision stands.
pub struct OrElse<A, B> {
    a: A,
    b: B,
}

#[async_trait]
impl<A: HedgingRule, B: HedgingRule> HedgingRule for OrElse<A, B> {
    async fn should_hedge(&self, ctx: &RequestContext, cause: Option<&AttemptError>) -> Decision {
        match self.a.should_hedge(ctx, cause).await {
            Decision::Next => self.b.should_hedge(ctx, cause).await,
            other => other,
        }
    }

    fn requires_response_trailers(&self) -> bool {
        self.a.requires_response_trailers() || self.b.requires_response_trailers()
    }
}

/// Short-circuit disjunction of two content-aware rules.
pub struct OrElseWithContent<A, B> {
    a: A,
    b: B,
}

#[async_trait]
impl<A: HedgingRuleWithContent, B: HedgingRuleWithContent> HedgingRuleWithContent
    for OrElseWithContent<A, B>
{
    async fn should_hedge(
        &self,
        ctx: &RequestContext,
        response: Option<&ResponseView>,
        cause: Option<&AttemptError>,
    ) -> Decision {
        match self.a.should_hedge(ctx, response, cause).await {
            Decision::Next => self.b.should_hedge(ctx, response, cause).await,
            other => other,
        }
    }

    fn requires_response_trailers(&self) -> bool {
        self.a.requires_response_trailers() || self.b.requires_response_trailers()
    }
}

/// Adds `.or_else(...)` to any [`HedgingRule`].
pub trait HedgingRuleExt: HedgingRule + Sized {
    fn or_else<B: HedgingRule>(self, other: B) -> OrElse<Self, B> {
        OrElse { a: self, b: other }
    }
}
impl<T: HedgingRule> HedgingRuleExt for T {}

/// Adds `.or_else(...)` to any [`HedgingRuleWithContent`].
pub trait HedgingRuleWithContentExt: HedgingRuleWithContent + Sized {
    fn or_else<B: HedgingRuleWithContent>(self, other: B) -> OrElseWithContent<Self, B> {
        OrElseWithContent { a: self, b: other }
    }
}
impl<T: HedgingRuleWithContent> HedgingRuleWithContentExt for T {}

/// Lifts a plain [`HedgingRule`] into [`HedgingRuleWithContent`] by ignoring
/// the response argument.
pub struct FromRule<R>(pub R);

#[async_trait]
impl<R: HedgingRule> HedgingRuleWithContent for FromRule<R> {
    async fn should_hedge(
        &self,
        ctx: &RequestContext,
        _response: Option<&ResponseView>,
        cause: Option<&AttemptError>,
    ) -> Decision {
        self.0.should_hedge(ctx, cause).await
    }

    fn requires_response_trailers(&self) -> bool {
        self.0.requires_response_trailers()
    }
}

/// A [`HedgingConfig`](crate::config::HedgingConfig) carries exactly one
/// rule, plain or content-aware. Modeled as a two-variant enum so the
/// "exactly one" invariant is a compile-time shape rather than a runtime
/// check on two optional fields.
#[derive(Clone)]
pub enum RuleKind {
    Plain(Arc<dyn HedgingRule>),
    WithContent(Arc<dyn HedgingRuleWithContent>),
}

impl RuleKind {
    pub fn plain(rule: impl HedgingRule + 'static) -> Self {
        RuleKind::Plain(Arc::new(rule))
    }

    pub fn with_content(rule: impl HedgingRuleWithContent + 'static) -> Self {
        RuleKind::WithContent(Arc::new(rule))
    }

    pub fn requires_response_trailers(&self) -> bool {
        match self {
            RuleKind::Plain(r) => r.requires_response_trailers(),
            RuleKind::WithContent(r) => r.requires_response_trailers(),
        }
    }

    pub fn is_content_aware(&self) -> bool {
        matches!(self, RuleKind::WithContent(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    struct Always(Decision);
    #[async_trait]
    impl HedgingRule for Always {
        async fn should_hedge(&self, _ctx: &RequestContext, _cause: Option<&AttemptError>) -> Decision {
            self.0
        }
    }

    struct AlwaysNext;
    #[async_trait]
    impl HedgingRule for AlwaysNext {
        async fn should_hedge(&self, _ctx: &RequestContext, _cause: Option<&AttemptError>) -> Decision {
            Decision::Next
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Method::GET, None, None)
    }

    #[tokio::test]
    async fn or_else_short_circuits_on_non_next() {
        let rule = Always(Decision::Reject).or_else(Always(Decision::accept(5)));
        assert_eq!(rule.should_hedge(&ctx(), None).await, Decision::Reject);
    }

    #[tokio::test]
    async fn or_else_falls_through_on_next() {
        let rule = AlwaysNext.or_else(Always(Decision::accept(5)));
        assert_eq!(rule.should_hedge(&ctx(), None).await, Decision::accept(5));
    }

    #[tokio::test]
    async fn or_else_is_associative_modulo_observable_decisions() {
        // (a orElse b) orElse c == a orElse (b orElse c) for any ordering of
        // outcomes, since orElse only ever inspects the left side's result.
        let left = (AlwaysNext.or_else(AlwaysNext)).or_else(Always(Decision::Reject));
        let right = AlwaysNext.or_else(AlwaysNext.or_else(Always(Decision::Reject)));
        assert_eq!(
            left.should_hedge(&ctx(), None).await,
            right.should_hedge(&ctx(), None).await
        );
    }

    #[tokio::test]
    async fn from_rule_lift_round_trips_for_any_cause() {
        let base = Always(Decision::accept(7));
        let lifted = FromRule(Always(Decision::accept(7)));
        let direct = base.should_hedge(&ctx(), None).await;
        let via_lift = lifted.should_hedge(&ctx(), None, None).await;
        assert_eq!(direct, via_lift);
    }

    #[tokio::test]
    async fn requires_response_trailers_propagates_as_or() {
        struct Trailered;
        #[async_trait]
        impl HedgingRule for Trailered {
            async fn should_hedge(&self, _ctx: &RequestContext, _cause: Option<&AttemptError>) -> Decision {
                Decision::Next
            }
            fn requires_response_trailers(&self) -> bool {
                true
            }
        }
        let rule = AlwaysNext.or_else(Trailered);
        assert!(rule.requires_response_trailers());
    }
}
