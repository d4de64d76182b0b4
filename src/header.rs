//! The `armeria-retry-count` outbound header contract.

use http::{HeaderName, HeaderValue};

use crate::transport::HedgeRequest;

/// Outbound attempt `i` where `i > 0` carries this header with value `i`
/// (ASCII decimal). Attempt 0 carries no such header.
pub static RETRY_COUNT_HEADER: HeaderName = HeaderName::from_static("armeria-retry-count");

/// Stamps `armeria-retry-count: <index>` on `req`. Call only for `index > 0`
/// — attempt 0 must not carry this header.
pub fn stamp_retry_count(req: &mut HedgeRequest, index: usize) {
    debug_assert!(index > 0, "attempt 0 must not carry armeria-retry-count");
    let value = HeaderValue::from_str(&index.to_string())
        .expect("attempt index always formats to a valid ASCII header value");
    req.headers.insert(RETRY_COUNT_HEADER.clone(), value);
}
