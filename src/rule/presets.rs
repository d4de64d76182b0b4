//! Ready-made rules for common policies: `failsafe(delay_ms)`.

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::decision::Decision;
use crate::errors::AttemptError;
use crate::filters::{status_class_of, MethodExt, StatusClass};

use super::{HedgingRule, RuleKind};

struct Failsafe {
    delay_ms: i64,
}

#[async_trait]
impl HedgingRule for Failsafe {
    async fn should_hedge(&self, ctx: &RequestContext, cause: Option<&AttemptError>) -> Decision {
        if !ctx.method().is_idempotent() {
            return Decision::Reject;
        }

        let server_error = ctx
            .log()
            .snapshot()
            .response_status
            .map(status_class_of)
            == Some(StatusClass::ServerError);
        let failed = cause.is_some();

        if server_error || failed {
            Decision::accept(self.delay_ms)
        } else {
            Decision::Reject
        }
    }
}

/// Hedge on idempotent methods when the attempt returned a server-error
/// status, threw a transport exception, or failed before reaching the wire;
/// otherwise don't hedge.
pub fn failsafe(delay_ms: i64) -> RuleKind {
    RuleKind::plain(Failsafe { delay_ms })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode};

    fn ctx(method: Method) -> RequestContext {
        RequestContext::new(method, None, None)
    }

    #[tokio::test]
    async fn does_not_hedge_non_idempotent_methods() {
        let RuleKind::Plain(rule) = failsafe(50) else {
            unreachable!()
        };
        let ctx = ctx(Method::POST);
        let cause = AttemptError::Protocol("boom".into());
        assert_eq!(rule.should_hedge(&ctx, Some(&cause)).await, Decision::Reject);
    }

    #[tokio::test]
    async fn hedges_idempotent_on_server_error() {
        let RuleKind::Plain(rule) = failsafe(50) else {
            unreachable!()
        };
        let ctx = ctx(Method::GET);
        ctx.log().set_response_status(StatusCode::BAD_GATEWAY);
        assert_eq!(rule.should_hedge(&ctx, None).await, Decision::accept(50));
    }

    #[tokio::test]
    async fn no_hedge_on_clean_success() {
        let RuleKind::Plain(rule) = failsafe(50) else {
            unreachable!()
        };
        let ctx = ctx(Method::GET);
        ctx.log().set_response_status(StatusCode::OK);
        assert_eq!(rule.should_hedge(&ctx, None).await, Decision::Reject);
    }
}
