//! Pass-through proxy for `/ask` traffic.
//!
//! Requests are forwarded to the configured question-answering upstream with
//! their method, query, body and end-to-end headers intact. Bodies are
//! buffered in both directions.

use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::http::{HeaderMap, Uri};
use axum::response::Response;
use tracing::debug;

use crate::error::AppError;

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !HOP_BY_HOP.contains(&name.as_str()) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Forwarder bound to one upstream base URL.
#[derive(Debug, Clone)]
pub struct AskProxy {
    client: reqwest::Client,
    upstream: Option<String>,
}

impl AskProxy {
    pub fn new(upstream: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            upstream: upstream.map(|u| u.trim_end_matches('/').to_string()),
        }
    }

    /// Upstream URL for an incoming `/ask...` URI, or `None` when no upstream
    /// is configured.
    pub fn target_url(&self, uri: &Uri) -> Option<String> {
        let base = self.upstream.as_deref()?;
        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/ask");
        Some(format!("{}{}", base, path_and_query))
    }

    pub async fn forward(&self, request: Request, max_body: usize) -> Result<Response, AppError> {
        let (parts, body) = request.into_parts();
        let url = self
            .target_url(&parts.uri)
            .ok_or_else(|| AppError::upstream("Question service is not configured", None))?;

        let body = to_bytes(body, max_body)
            .await
            .map_err(|e| AppError::validation("/body", e.to_string()))?;

        let upstream = self
            .client
            .request(parts.method.clone(), &url)
            .headers(forwardable(&parts.headers))
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::upstream("Question service is unavailable", Some(e.into())))?;

        let status = upstream.status();
        let headers = forwardable(upstream.headers());
        let bytes = upstream
            .bytes()
            .await
            .map_err(|e| AppError::upstream("Question service is unavailable", Some(e.into())))?;

        debug!(method = %parts.method, url = %url, status = status.as_u16(), "proxied");

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Method, StatusCode};
    use axum::routing::post;
    use axum::Router;

    const LIMIT: usize = 1024 * 1024;

    async fn spawn_upstream() -> String {
        let app = Router::new().route(
            "/ask/echo",
            post(|uri: Uri, headers: HeaderMap, body: String| async move {
                let marker = headers
                    .get("x-marker")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                (
                    StatusCode::CREATED,
                    [("x-upstream", "yes")],
                    format!("{}|{}|{}", uri, marker, body),
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn ask_request(uri: &str, body: &str) -> Request {
        let mut request = Request::new(Body::from(body.to_string()));
        *request.method_mut() = Method::POST;
        *request.uri_mut() = uri.parse().unwrap();
        request
            .headers_mut()
            .insert("x-marker", HeaderValue::from_static("m1"));
        request
            .headers_mut()
            .insert("connection", HeaderValue::from_static("close"));
        request
    }

    #[test]
    fn target_url_keeps_path_and_query() {
        let proxy = AskProxy::new(Some("http://rag:8000/".to_string()));
        let uri: Uri = "/ask/v1?q=rust".parse().unwrap();
        assert_eq!(
            proxy.target_url(&uri).as_deref(),
            Some("http://rag:8000/ask/v1?q=rust")
        );
        assert!(AskProxy::new(None).target_url(&uri).is_none());
    }

    #[test]
    fn hop_by_hop_headers_are_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("localhost"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("authorization", HeaderValue::from_static("Bearer t"));

        let kept = forwardable(&headers);
        assert_eq!(kept.len(), 1);
        assert!(kept.contains_key("authorization"));
    }

    #[tokio::test]
    async fn unconfigured_upstream_is_bad_gateway() {
        let err = AskProxy::new(None)
            .forward(ask_request("/ask", "{}"), LIMIT)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn unreachable_upstream_is_bad_gateway() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let proxy = AskProxy::new(Some(format!("http://{}", addr)));
        let err = proxy
            .forward(ask_request("/ask", "{}"), LIMIT)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BAD_GATEWAY");
    }

    #[tokio::test]
    async fn forwards_request_and_relays_response() {
        let proxy = AskProxy::new(Some(spawn_upstream().await));
        let response = proxy
            .forward(ask_request("/ask/echo?q=1", "hello"), LIMIT)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-upstream"], "yes");
        let body = to_bytes(response.into_body(), LIMIT).await.unwrap();
        assert_eq!(&body[..], b"/ask/echo?q=1|m1|hello");
    }
}
