//! The two response-shape variant adapters behind
//! [`crate::transport::HedgeResponse`].
//!
//! A `DelegateClient` implementation picks one depending on whether its
//! transport hands back a fully-buffered response or a streamed body. Both
//! share the same rule-evaluation contract; they differ only in how
//! expensive `duplicate_for_rule` is.

pub mod streaming;
pub mod unary;

pub use streaming::StreamedResponse;
pub use unary::UnaryResponse;
