//! In-process request helpers for `tower::ServiceExt::oneshot` tests.

use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, header::CONTENT_TYPE};
use axum::response::Response;
use serde_json::Value;

/// Build a request with the given headers and an optional JSON body.
pub fn request(method: Method, uri: &str, headers: HeaderMap, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(map) = builder.headers_mut() {
        map.extend(headers);
    }
    match body {
        Some(json) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Read the whole response body as JSON. Panics on a non-JSON body.
pub async fn read_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
