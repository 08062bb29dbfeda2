//! HTTP middleware and extractors: basic auth and the request context.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use broker_core::identity::ORIGINATING_IDENTITY_HEADER;
use broker_engine::RequestContext;

use super::state::{AppState, BasicCredentials};

const CORRELATION_HEADERS: &[&str] = &["x-correlation-id", "x-request-id"];

/// Basic-auth middleware. Every route is protected when credentials are set.
pub(crate) async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(expected) = &state.credentials else {
        return next.run(request).await;
    };
    if authorized(request.headers(), expected) {
        return next.run(request).await;
    }
    super::json_error(StatusCode::UNAUTHORIZED, "unauthorized").into_response()
}

fn authorized(headers: &HeaderMap, expected: &BasicCredentials) -> bool {
    let Some(encoded) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
    else {
        return false;
    };
    let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
        return false;
    };
    let Ok(pair) = String::from_utf8(decoded) else {
        return false;
    };
    matches!(pair.split_once(':'), Some((user, password)) if user == expected.user && password == expected.password)
}

/// The per-request [`RequestContext`]: the caller's correlation id (or a
/// fresh one) and the decoded originating identity.
pub(crate) struct Ctx(pub(crate) RequestContext);

impl<S: Send + Sync> FromRequestParts<S> for Ctx {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Ctx(request_context(&parts.headers)))
    }
}

fn request_context(headers: &HeaderMap) -> RequestContext {
    let correlation_id = CORRELATION_HEADERS
        .iter()
        .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
        .filter(|id| !id.is_empty());
    let ctx = match correlation_id {
        Some(id) => RequestContext::new(id),
        None => RequestContext::generated(),
    };
    let identity = headers
        .get(ORIGINATING_IDENTITY_HEADER)
        .and_then(|v| v.to_str().ok());
    ctx.with_identity_header(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn creds() -> BasicCredentials {
        BasicCredentials {
            user: "broker".into(),
            password: "s3cr:et".into(),
        }
    }

    fn with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn basic_auth() {
        let good = format!("Basic {}", STANDARD.encode("broker:s3cr:et"));
        assert!(authorized(&with_auth(&good), &creds()));

        let wrong = format!("Basic {}", STANDARD.encode("broker:nope"));
        assert!(!authorized(&with_auth(&wrong), &creds()));
        assert!(!authorized(&with_auth("Bearer token"), &creds()));
        assert!(!authorized(&with_auth("Basic !!!"), &creds()));
        assert!(!authorized(&HeaderMap::new(), &creds()));
    }

    #[test]
    fn context_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("req-1"));
        headers.insert(
            "x-broker-api-originating-identity",
            HeaderValue::from_static("cloudfoundry eyJ1c2VyX2lkIjoiNjgzZWE3NDgifQ=="),
        );
        let ctx = request_context(&headers);
        assert_eq!(ctx.correlation_id, "req-1");
        assert_eq!(
            ctx.identity(),
            Some(&json!({"platform": "cloudfoundry", "value": {"user_id": "683ea748"}}))
        );

        let ctx = request_context(&HeaderMap::new());
        assert_eq!(ctx.correlation_id.len(), 36);
        assert!(ctx.identity().is_none());
    }
}
