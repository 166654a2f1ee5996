//! Request correlation id middleware.
//!
//! Reuses the caller's id when the configured header carries one, otherwise
//! mints a UUIDv4. The id is bound to the request's log scope and echoed on
//! the response under the same header, byte for byte.

use async_trait::async_trait;
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use uuid::Uuid;

use super::{Middleware, MiddlewareResult};
use crate::core::{Context, Request, Response};

/// Default header carrying the correlation id.
pub const DEFAULT_HEADER: &str = "X-Request-ID";

/// A resolved correlation id.
///
/// `value` holds the exact bytes to echo; `text` is the printable form used
/// in logs and span attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId {
    pub value: HeaderValue,
    pub text: String,
}

impl RequestId {
    fn generate() -> Self {
        let text = Uuid::new_v4().to_string();
        // A hyphenated UUID is always a valid header value
        let value = HeaderValue::from_str(&text).unwrap_or_else(|_| HeaderValue::from_static(""));
        Self { value, text }
    }
}

/// Pick the correlation id for a request.
///
/// A present, non-empty header value is reused verbatim, whatever its
/// bytes; an absent or empty one gets a fresh UUIDv4.
pub fn resolve_request_id(headers: &HeaderMap, header_name: &str) -> RequestId {
    match headers.get(header_name) {
        Some(value) if !value.as_bytes().is_empty() => RequestId {
            value: value.clone(),
            text: String::from_utf8_lossy(value.as_bytes()).into_owned(),
        },
        _ => RequestId::generate(),
    }
}

/// Context key holding the header value to echo.
const ECHO_KEY: &str = "request_id.header";

pub struct RequestIdMiddleware {
    header: HeaderName,
}

impl RequestIdMiddleware {
    /// Falls back to [`DEFAULT_HEADER`] for a name that is not a valid header.
    pub fn new(header: impl AsRef<str>) -> Self {
        let header = HeaderName::from_bytes(header.as_ref().as_bytes())
            .unwrap_or_else(|_| HeaderName::from_static("x-request-id"));
        Self { header }
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }
}

impl Default for RequestIdMiddleware {
    fn default() -> Self {
        Self::new(DEFAULT_HEADER)
    }
}

#[async_trait]
impl Middleware for RequestIdMiddleware {
    fn name(&self) -> &'static str {
        "request_id"
    }

    fn priority(&self) -> i32 {
        -100 // Everything after this logs with the id
    }

    async fn on_request(&self, req: Request, ctx: &mut Context) -> MiddlewareResult {
        let id = resolve_request_id(req.headers(), self.header.as_str());
        ctx.set(ECHO_KEY, id.value);
        ctx.set_request_id(id.text);
        MiddlewareResult::Next(req)
    }

    fn on_response(&self, res: Response, ctx: &mut Context) -> Response {
        let value = match ctx.remove::<HeaderValue>(ECHO_KEY) {
            Some(value) => value,
            None => match HeaderValue::from_str(&ctx.request_id) {
                Ok(value) => value,
                Err(_) => return res,
            },
        };
        res.with_header_value(self.header.clone(), value)
    }
}
