//! Per-request state machine
//!
//! Pre-check: compute the signature and answer from the store on a hit.
//! On a miss, play mode answers 501; the other modes forward, then
//! re-check the store, skip 501 responses and capture everything else.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_LENGTH, HOST};
use hyper::http::{request, response};
use hyper::{Request, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, error};

use super::events::{EventBus, ProxyEvent};
use super::origin::{Origin, UpstreamTarget};
use crate::archive::{ArchiveRecord, RequestCapture};
use crate::config::{LimitsConfig, Mode};
use crate::fingerprint::{Fingerprint, RequestDescriptor, SignatureOptions};
use crate::network::{
    collect_body, empty_response, error_response, is_hop_by_hop, parse_query, strip_hop_by_hop,
    UpstreamClient,
};
use crate::storage::RecordStore;
use crate::{Result, VcrError};

/// Everything a connection task needs to answer requests
pub(crate) struct ProxyState {
    pub(crate) name: String,
    pub(crate) origin: Origin,
    pub(crate) mode: Mode,
    pub(crate) options: SignatureOptions,
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) client: UpstreamClient,
    pub(crate) limits: LimitsConfig,
    pub(crate) events: EventBus,
}

/// hyper service entry point; errors become status responses
pub(crate) async fn handle(
    state: Arc<ProxyState>,
    request: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let method = request.method().clone();
    let uri = request.uri().clone();

    match process(&state, request).await {
        Ok(response) => Ok(response),
        Err(e) => {
            error!("[{}] {method} {uri} failed: {e}", state.name);
            Ok(error_response(&e))
        }
    }
}

async fn process(state: &ProxyState, request: Request<Incoming>) -> Result<Response<Full<Bytes>>> {
    let started = Instant::now();
    let started_at = Utc::now();

    let (parts, body) = request.into_parts();
    let target = state
        .origin
        .rewrite(parts.uri.path_and_query().map_or("/", |pq| pq.as_str()));
    let query = parse_query(target.query.as_deref().unwrap_or_default());
    let body = collect_body(body, state.limits.max_request_size).await?;

    let fingerprint = Fingerprint::compute(
        &describe(&state.origin, &parts, &target, &query, &body),
        &state.options,
    );
    let key = fingerprint.record_key();
    let url = state.origin.url(&target);
    let method = parts.method.to_string();

    let cached = state.store.exists(&key)?;
    debug!(
        "[{}] {method} {url} signature={} cached={cached}",
        state.name,
        fingerprint.signature()
    );
    state.events.publish(ProxyEvent::PreCheck {
        name: state.name.clone(),
        method: method.clone(),
        url: url.clone(),
        cached,
    });

    if cached {
        let record = ArchiveRecord::from_bytes(&state.store.get(&key)?)?;
        let response = record.reply_from_first_entry()?;
        publish_sent(state, &method, &url, response.status(), true);
        return Ok(response);
    }

    if !state.mode.forwards_on_miss() {
        debug!("[{}] No record for {method} {url}", state.name);
        return Ok(empty_response(StatusCode::NOT_IMPLEMENTED));
    }

    let upstream = upstream_request(&state.origin, &parts, &url, body.clone())?;
    let (response_parts, response_body) = state.client.send(upstream).await?.into_parts();
    let response_bytes = collect_body(response_body, state.limits.max_response_size)
        .await
        .map_err(origin_overflow)?;

    if state.store.exists(&key)? {
        debug!("[{}] {key:?} stored concurrently, skipping capture", state.name);
        return Ok(forwarded_response(response_parts, &parts, response_bytes));
    }

    if response_parts.status == StatusCode::NOT_IMPLEMENTED {
        debug!("[{}] Origin answered 501, not storing", state.name);
        return Ok(forwarded_response(response_parts, &parts, response_bytes));
    }

    let capture = RequestCapture {
        started,
        started_at,
        url: url.clone(),
        method: method.clone(),
        version: parts.version,
        headers: parts.headers.clone(),
        query,
        body,
    };

    let mut record = ArchiveRecord::new();
    let response_bytes = record
        .capture_entry(&capture, &response_parts, Full::new(response_bytes))
        .await?;
    state.store.put(&key, &record.to_bytes()?)?;

    publish_sent(state, &method, &url, response_parts.status, false);
    Ok(forwarded_response(response_parts, &parts, response_bytes))
}

fn describe(
    origin: &Origin,
    parts: &request::Parts,
    target: &UpstreamTarget,
    query: &[(String, String)],
    body: &Bytes,
) -> RequestDescriptor {
    RequestDescriptor {
        method: parts.method.to_string(),
        host: origin.authority().to_string(),
        path: target.path.clone(),
        query: query
            .iter()
            .map(|(name, value)| (name.clone(), Value::String(value.clone())))
            .collect(),
        headers: parts
            .headers
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name) && *name != CONTENT_LENGTH)
            .map(|(name, value)| {
                (
                    name.to_string(),
                    Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
                )
            })
            .collect(),
        body: body.to_vec(),
    }
}

fn upstream_request(
    origin: &Origin,
    parts: &request::Parts,
    url: &str,
    body: Bytes,
) -> Result<Request<Full<Bytes>>> {
    let uri = url
        .parse()
        .map_err(|e| VcrError::InvalidOrigin(format!("{url}: {e}")))?;
    let host = HeaderValue::from_str(origin.authority())
        .map_err(|e| VcrError::InvalidOrigin(format!("{origin}: {e}")))?;

    let mut request = Request::new(Full::new(body));
    *request.method_mut() = parts.method.clone();
    *request.uri_mut() = uri;
    *request.headers_mut() = parts.headers.clone();

    let headers = request.headers_mut();
    strip_hop_by_hop(headers);
    headers.insert(HOST, host);

    Ok(request)
}

/// An oversized origin body is an upstream failure, not a client error
fn origin_overflow(error: VcrError) -> VcrError {
    match error {
        VcrError::DataTooLarge { size, limit } => VcrError::Upstream(format!(
            "Origin response of {size} bytes exceeds the {limit} byte limit"
        )),
        other => other,
    }
}

fn forwarded_response(
    mut parts: response::Parts,
    inbound: &request::Parts,
    body: Bytes,
) -> Response<Full<Bytes>> {
    strip_hop_by_hop(&mut parts.headers);
    parts.version = inbound.version;
    Response::from_parts(parts, Full::new(body))
}

fn publish_sent(state: &ProxyState, method: &str, url: &str, status: StatusCode, cached: bool) {
    state.events.publish(ProxyEvent::Sent {
        name: state.name.clone(),
        mode: state.mode,
        method: method.to_string(),
        url: url.to_string(),
        status: status.as_u16(),
        cached,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound(uri: &str) -> request::Parts {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(HOST, "localhost:5678")
            .header("connection", "keep-alive")
            .header("authorization", "Bearer X")
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[test]
    fn test_upstream_request_headers() {
        let origin = Origin::parse("https://example.com/v1").unwrap();
        let parts = inbound("/users?limit=10");
        let target = origin.rewrite("/users?limit=10");
        let url = origin.url(&target);

        let request = upstream_request(&origin, &parts, &url, Bytes::from_static(b"{}")).unwrap();

        assert_eq!(request.uri(), "https://example.com/v1/users?limit=10");
        assert_eq!(request.headers()[HOST], "example.com");
        assert_eq!(request.headers()["authorization"], "Bearer X");
        assert!(request.headers().get("connection").is_none());
    }

    #[test]
    fn test_describe_uses_origin_host_and_rewritten_path() {
        let origin = Origin::parse("https://Example.com/v1").unwrap();
        let parts = inbound("/users?limit=10");
        let target = origin.rewrite("/users?limit=10");
        let query = parse_query(target.query.as_deref().unwrap_or_default());

        let descriptor = describe(&origin, &parts, &target, &query, &Bytes::new());

        assert_eq!(descriptor.host, "example.com");
        assert_eq!(descriptor.path, "/v1/users");
        assert_eq!(
            descriptor.query,
            vec![("limit".to_string(), Value::String("10".to_string()))]
        );
        assert_eq!(descriptor.method, "POST");
        // Transport headers stay out of the signature
        assert!(descriptor.headers.iter().all(|(name, _)| name != "connection"));
        assert!(descriptor.headers.iter().any(|(name, _)| name == "authorization"));
    }

    #[test]
    fn test_forwarded_response_strips_hop_by_hop() {
        let (parts, ()) = Response::builder()
            .status(StatusCode::CREATED)
            .header("transfer-encoding", "chunked")
            .header("x-origin", "yes")
            .body(())
            .unwrap()
            .into_parts();

        let response = forwarded_response(parts, &inbound("/"), Bytes::from_static(b"ok"));

        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().get("transfer-encoding").is_none());
        assert_eq!(response.headers()["x-origin"], "yes");
    }

    #[test]
    fn test_origin_overflow_maps_to_bad_gateway() {
        let error = origin_overflow(VcrError::DataTooLarge { size: 26, limit: 5 });
        assert!(matches!(error, VcrError::Upstream(_)));
        assert_eq!(error_response(&error).status(), StatusCode::BAD_GATEWAY);

        let other = origin_overflow(VcrError::EmptyRecord);
        assert!(matches!(other, VcrError::EmptyRecord));
    }
}
