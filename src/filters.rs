//! Small, composable predicates used to build [`crate::rule::HedgingRule`]s.
//!
//! Deliberately kept minimal: the rule-composition filter primitives (status
//! classes, exception predicates) stay a thin layer over `http`'s own
//! vocabulary types rather than growing their own status/method taxonomy.

use http::{Method, StatusCode};

/// The five RFC 7231 status classes, used by `onStatusClass`/`onServerErrorStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Informational,
    Success,
    Redirection,
    ClientError,
    ServerError,
}

/// Classifies a status code into its RFC 7231 class.
pub fn status_class_of(status: StatusCode) -> StatusClass {
    match status.as_u16() {
        100..=199 => StatusClass::Informational,
        200..=299 => StatusClass::Success,
        300..=399 => StatusClass::Redirection,
        400..=499 => StatusClass::ClientError,
        _ => StatusClass::ServerError,
    }
}

/// Extension used by `failsafe()` and user rules to decide if a method is
/// safe to hedge without a dedup/idempotency layer underneath.
pub trait MethodExt {
    fn is_idempotent(&self) -> bool;
}

impl MethodExt for Method {
    fn is_idempotent(&self) -> bool {
        matches!(
            *self,
            Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_status_codes() {
        assert_eq!(status_class_of(StatusCode::OK), StatusClass::Success);
        assert_eq!(
            status_class_of(StatusCode::NOT_FOUND),
            StatusClass::ClientError
        );
        assert_eq!(
            status_class_of(StatusCode::BAD_GATEWAY),
            StatusClass::ServerError
        );
    }

    #[test]
    fn idempotent_methods() {
        assert!(Method::GET.is_idempotent());
        assert!(Method::PUT.is_idempotent());
        assert!(!Method::POST.is_idempotent());
        assert!(!Method::PATCH.is_idempotent());
    }
}
