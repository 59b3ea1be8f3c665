// ============================================================================
// SSE Streaming Proxy
// ============================================================================
//
// Transparent forwarding of text/event-stream responses with per-event
// flushes. Selected by the router for instances tagged sse/streaming, but
// only entered when the inbound Accept header actually asks for an event
// stream (or */*); everything else delegates to the standard proxy.
//
// The streaming loop reads upstream bytes, reassembles lines, and emits one
// body chunk per SSE event: lines accumulate until the blank separator line,
// which is the flush boundary. Mid-stream failures terminate the stream
// without retry; redelivery is the client's concern.
//
// ============================================================================

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Response,
};
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::proxy;
use crate::gateway::router::RouteDecision;

const EVENT_STREAM: &str = "text/event-stream";

/// Whether the client is prepared to consume an event stream
fn accepts_event_stream(headers: &HeaderMap) -> bool {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    accept.contains(EVENT_STREAM) || accept.contains("*/*")
}

/// Augment the Accept header for the upstream request. MCP servers require
/// both application/json and text/event-stream to be present.
fn augment_accept(headers: &mut HeaderMap) {
    let current = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let accept = if current.is_empty() {
        "application/json, text/event-stream".to_string()
    } else if current.contains(EVENT_STREAM) {
        current
    } else {
        format!("{}, text/event-stream", current)
    };

    if let Ok(value) = HeaderValue::from_str(&accept) {
        headers.insert(header::ACCEPT, value);
    }
}

pub async fn forward(
    sse_client: &reqwest::Client,
    http_client: &reqwest::Client,
    decision: &RouteDecision,
    req: Request<Body>,
) -> GatewayResult<Response> {
    if !accepts_event_stream(req.headers()) {
        // The instance is SSE-capable but this request is not an SSE
        // request; use the buffering path.
        return proxy::forward(http_client, decision, req).await;
    }

    let method = req.method().clone();
    let query = req.uri().query().map(str::to_string);
    let url = proxy::target_url(decision, query.as_deref());

    debug!(
        service = %decision.service,
        method = %method,
        target = %url,
        "Proxying SSE request"
    );

    let (parts, body) = req.into_parts();
    let body_bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| GatewayError::bad_request(format!("failed to read request body: {}", e)))?;

    let mut upstream_headers = HeaderMap::new();
    for (name, value) in &parts.headers {
        if name == header::HOST || proxy::is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            upstream_headers.insert(name, value);
        }
    }
    augment_accept(&mut upstream_headers);
    upstream_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    upstream_headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));

    let reqwest_method = reqwest::Method::from_bytes(method.as_str().as_bytes())
        .map_err(|e| GatewayError::bad_request(format!("invalid method: {}", e)))?;

    let mut outgoing = sse_client
        .request(reqwest_method, &url)
        .headers(upstream_headers);
    if !body_bytes.is_empty() {
        outgoing = outgoing.body(body_bytes);
    }

    let upstream = outgoing.send().await.map_err(|e| {
        error!(service = %decision.service, target = %url, error = %e, "SSE proxy request failed");
        GatewayError::from(e)
    })?;

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !content_type.contains(EVENT_STREAM) {
        // Upstream answered with a plain response; copy it through
        return proxy::copy_response(upstream);
    }

    let status = StatusCode::from_u16(upstream.status().as_u16())
        .map_err(|e| GatewayError::internal(format!("invalid upstream status: {}", e)))?;

    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(16);
    tokio::spawn(pump_events(upstream.bytes_stream().boxed(), tx));

    let body = Body::from_stream(ReceiverStream::new(rx));

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, EVENT_STREAM)
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        // Tells buffering reverse proxies in front of us to pass events on
        .header("x-accel-buffering", "no")
        .body(body)
        .map_err(|e| GatewayError::internal(format!("failed to build SSE response: {}", e)))
}

/// Read upstream bytes, reassemble lines, and emit one chunk per event.
/// A send failure means the client went away; both cases just end the
/// stream.
async fn pump_events<S>(mut upstream: S, tx: mpsc::Sender<Result<Bytes, std::io::Error>>)
where
    S: futures_util::Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    let mut line_buf: Vec<u8> = Vec::new();
    let mut event_buf: Vec<u8> = Vec::new();

    while let Some(chunk) = upstream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                error!(error = %e, "SSE upstream read error, terminating stream");
                return;
            }
        };

        for &byte in chunk.iter() {
            if byte != b'\n' {
                line_buf.push(byte);
                continue;
            }

            // A complete line; CRLF normalizes to LF
            if line_buf.last() == Some(&b'\r') {
                line_buf.pop();
            }
            let blank = line_buf.is_empty();
            event_buf.append(&mut line_buf);
            event_buf.push(b'\n');

            if blank {
                // Event separator: flush everything accumulated so far
                let event = Bytes::from(std::mem::take(&mut event_buf));
                if tx.send(Ok(event)).await.is_err() {
                    debug!("SSE client disconnected");
                    return;
                }
            }
        }
    }

    // Upstream EOF: drain whatever is left without inventing a separator
    if !line_buf.is_empty() {
        if line_buf.last() == Some(&b'\r') {
            line_buf.pop();
        }
        event_buf.append(&mut line_buf);
        event_buf.push(b'\n');
    }
    if !event_buf.is_empty() {
        let _ = tx.send(Ok(Bytes::from(event_buf))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn headers_with_accept(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn accept_gating() {
        assert!(accepts_event_stream(&headers_with_accept("text/event-stream")));
        assert!(accepts_event_stream(&headers_with_accept("*/*")));
        assert!(accepts_event_stream(&headers_with_accept(
            "application/json, text/event-stream"
        )));
        assert!(!accepts_event_stream(&headers_with_accept("application/json")));
        assert!(!accepts_event_stream(&HeaderMap::new()));
    }

    #[test]
    fn accept_augmentation_preserves_existing_values() {
        let mut headers = headers_with_accept("application/json");
        augment_accept(&mut headers);
        assert_eq!(
            headers.get(header::ACCEPT).unwrap(),
            "application/json, text/event-stream"
        );

        let mut empty = HeaderMap::new();
        augment_accept(&mut empty);
        assert_eq!(
            empty.get(header::ACCEPT).unwrap(),
            "application/json, text/event-stream"
        );

        let mut already = headers_with_accept("text/event-stream");
        augment_accept(&mut already);
        assert_eq!(already.get(header::ACCEPT).unwrap(), "text/event-stream");
    }

    #[tokio::test]
    async fn events_are_flushed_at_blank_line_boundaries() {
        // Two events split across uneven chunks
        let chunks: Vec<Result<Bytes, reqwest::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"start\"}\n")),
            Ok(Bytes::from_static(b"\ndata: {\"type\":\"content\"")),
            Ok(Bytes::from_static(b"}\n\n")),
        ];
        let (tx, mut rx) = mpsc::channel(16);
        pump_events(stream::iter(chunks), tx).await;

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(&first[..], b"data: {\"type\":\"start\"}\n\n");
        let second = rx.recv().await.unwrap().unwrap();
        assert_eq!(&second[..], b"data: {\"type\":\"content\"}\n\n");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn eof_drains_partial_event_without_separator() {
        let chunks: Vec<Result<Bytes, reqwest::Error>> =
            vec![Ok(Bytes::from_static(b"data: [DONE]\n"))];
        let (tx, mut rx) = mpsc::channel(16);
        pump_events(stream::iter(chunks), tx).await;

        let tail = rx.recv().await.unwrap().unwrap();
        assert_eq!(&tail[..], b"data: [DONE]\n");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn crlf_lines_normalize_to_lf() {
        let chunks: Vec<Result<Bytes, reqwest::Error>> =
            vec![Ok(Bytes::from_static(b"data: hi\r\n\r\n"))];
        let (tx, mut rx) = mpsc::channel(16);
        pump_events(stream::iter(chunks), tx).await;

        let event = rx.recv().await.unwrap().unwrap();
        assert_eq!(&event[..], b"data: hi\n\n");
    }
}
