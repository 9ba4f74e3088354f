//! Upstream proxy: forwards a priced request to the configured third-party
//! API and relays its response back verbatim.
//!
//! A non-streaming request goes through a short-lived `reqwest::Client` and
//! is buffered whole; a streaming request (`stream=true` against
//! `/v1/chat/completions` or `/v1/responses`) opens a long-lived client with
//! no timeout and relays `bytes_stream()` chunks without buffering, closing
//! both the upstream response and its client on completion or drop.

use std::time::Duration;

use async_stream::stream;
use axum::body::Body;
use axum::body::StreamBody;
use axum::http::HeaderMap;
use axum::http::HeaderName;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use bytes::Bytes;

use crate::settings::ApiConfig;
use crate::settings::EndpointConfig;
use crate::AppError;

const STANDARD_TIMEOUT_SECONDS: u64 = 180;
const SLOW_TIMEOUT_SECONDS: u64 = 600;

const SLOW_PATHS: &[&str] =
    &["/v1/video/generations", "/v1/responses", "/v1/images/generations", "/v1/images/edits"];

const STREAMABLE_PATHS: &[&str] = &["/v1/chat/completions", "/v1/responses"];

/// Whether a parsed JSON body requests SSE-style streaming on a path that
/// supports it.
pub fn wants_stream(endpoint_path: &str, body: Option<&serde_json::Value>) -> bool {
    if !STREAMABLE_PATHS.contains(&endpoint_path) {
        return false;
    }
    body.and_then(|b| b.get("stream")).and_then(serde_json::Value::as_bool).unwrap_or(false)
}

fn upstream_timeout(endpoint_path: &str) -> Duration {
    if SLOW_PATHS.contains(&endpoint_path) {
        Duration::from_secs(SLOW_TIMEOUT_SECONDS)
    } else {
        Duration::from_secs(STANDARD_TIMEOUT_SECONDS)
    }
}

fn upstream_headers(api: &ApiConfig, api_name: &str, content_type: &str) -> Result<HeaderMap, AppError> {
    let mut headers = HeaderMap::new();

    let key_env = api.api_key_env.as_deref().unwrap_or_default();
    let api_key = std::env::var(key_env).map_err(|_| {
        AppError::UpstreamError(format!("missing upstream key: {key_env} for {api_name}"))
    })?;

    let header_name = api.auth_header.as_deref().unwrap_or("Authorization");
    let header_name = HeaderName::try_from(header_name)
        .map_err(|_| AppError::UpstreamError(format!("invalid auth header name for {api_name}")))?;
    let header_value = format!("{}{}", api.auth_prefix.as_deref().unwrap_or(""), api_key);
    let header_value = HeaderValue::from_str(&header_value)
        .map_err(|_| AppError::UpstreamError(format!("invalid auth header value for {api_name}")))?;
    headers.insert(header_name, header_value);

    headers.insert(
        axum::http::header::CONTENT_TYPE,
        HeaderValue::from_str(content_type).unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );

    for (key, value) in &api.extra_headers {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(key.as_str()), HeaderValue::from_str(value)) {
            headers.insert(name, value);
        }
    }

    Ok(headers)
}

fn upstream_url(api: &ApiConfig, endpoint_path: &str) -> String {
    format!("{}{endpoint_path}", api.upstream_base.trim_end_matches('/'))
}

/// Forwards a non-streaming request and buffers the upstream response whole.
pub async fn forward(
    api_name: &str,
    api: &ApiConfig,
    endpoint: &EndpointConfig,
    body: Bytes,
    content_type: &str,
) -> Result<Response, AppError> {
    let url = upstream_url(api, &endpoint.path);
    let headers = upstream_headers(api, api_name, content_type)?;
    let timeout = upstream_timeout(&endpoint.path);

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| AppError::UpstreamError(err.to_string()))?;

    let method = reqwest::Method::from_bytes(endpoint.method.as_bytes())
        .unwrap_or(reqwest::Method::POST);

    let response = client
        .request(method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|err| AppError::UpstreamError(format!("upstream request failed: {err}")))?;

    let status = StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json")
        .to_string();
    let bytes = response.bytes().await.map_err(|err| AppError::UpstreamError(err.to_string()))?;

    let mut builder = Response::builder().status(status);
    builder = builder.header(axum::http::header::CONTENT_TYPE, content_type);
    builder
        .body(axum::body::boxed(Body::from(bytes)))
        .map_err(|err| AppError::UpstreamError(err.to_string()))
}

/// Opens an upstream streaming response and relays bytes to the client as
/// they arrive, with no read timeout. Both the upstream response and its
/// dedicated client are dropped when the returned stream is exhausted or the
/// client disconnects — axum tears down the body future in either case,
/// which is what releases both nested scopes.
pub async fn forward_streaming(
    api_name: &str,
    api: &ApiConfig,
    endpoint: &EndpointConfig,
    body: Bytes,
    content_type: &str,
) -> Result<Response, AppError> {
    let url = upstream_url(api, &endpoint.path);
    let headers = upstream_headers(api, api_name, content_type)?;

    let client = reqwest::Client::builder()
        .build()
        .map_err(|err| AppError::UpstreamError(err.to_string()))?;

    let method = reqwest::Method::from_bytes(endpoint.method.as_bytes())
        .unwrap_or(reqwest::Method::POST);

    let response = client
        .request(method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|err| AppError::UpstreamError(format!("upstream request failed: {err}")))?;

    let status = StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("text/event-stream")
        .to_string();

    // Keeping `client` alive inside the stream's closure ties its lifetime
    // to the body future; when axum drops the body (completion or client
    // disconnect) both the response and the client are dropped together.
    let stream = stream! {
        let _keep_alive = client;
        let mut upstream = response;
        while let Some(chunk) = upstream.chunk().await.transpose() {
            match chunk {
                Ok(bytes) => yield Ok::<Bytes, std::io::Error>(bytes),
                Err(err) => {
                    yield Err(std::io::Error::new(std::io::ErrorKind::Other, err.to_string()));
                    break;
                }
            }
        }
    };

    Response::builder()
        .status(status)
        .header(axum::http::header::CONTENT_TYPE, content_type)
        .body(axum::body::boxed(StreamBody::new(stream)))
        .map_err(|err| AppError::UpstreamError(err.to_string()))
}
