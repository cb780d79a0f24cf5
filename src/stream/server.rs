//! HTTP server publishing the MJPEG stream.

use super::chunk::{encode_chunk, CONTENT_TYPE};
use crate::config::HttpSettings;
use crate::frame::FrameSlot;
use crate::metrics::StreamMetrics;
use crate::shutdown::Shutdown;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Errors that can occur while serving the stream.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound or queried.
    #[error("failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),

    /// The HTTP server stopped with an error.
    #[error("server error: {0}")]
    Server(String),
}

/// State shared by every connection.
#[derive(Clone)]
struct StreamState {
    slot: Arc<FrameSlot>,
    interval: Duration,
    shutdown: Shutdown,
    metrics: StreamMetrics,
}

/// Serves the latest frame to any number of MJPEG clients.
pub struct StreamPublisher {
    settings: HttpSettings,
    state: StreamState,
}

impl StreamPublisher {
    /// Creates a publisher reading from `slot`.
    pub fn new(
        settings: HttpSettings,
        slot: Arc<FrameSlot>,
        shutdown: Shutdown,
        metrics: StreamMetrics,
    ) -> Self {
        let state = StreamState {
            slot,
            interval: settings.frame_interval,
            shutdown,
            metrics,
        };
        Self { settings, state }
    }

    /// Builds the router: the stream route, plus metrics if configured.
    pub fn router(&self) -> Router {
        let mut router = Router::new().route(&self.settings.path, get(stream_handler));
        if let Some(metrics_path) = &self.settings.metrics_path {
            router = router.route(metrics_path, get(metrics_handler));
        }
        router.with_state(self.state.clone())
    }

    /// Binds the configured address.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        Ok(TcpListener::bind(self.settings.bind_addr).await?)
    }

    /// Serves on an already bound listener until shutdown is requested.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let addr: SocketAddr = listener.local_addr()?;
        let app = self.router();
        let shutdown = self.state.shutdown.clone();

        tracing::info!(
            addr = %addr,
            path = %self.settings.path,
            interval_ms = self.state.interval.as_millis() as u64,
            "MJPEG server listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await
            .map_err(|e| ServerError::Server(e.to_string()))?;

        tracing::info!("MJPEG server stopped");
        Ok(())
    }
}

/// Handler for the stream route.
///
/// Each request gets its own producer task feeding the response body.
async fn stream_handler(State(state): State<StreamState>) -> impl IntoResponse {
    // One chunk in flight: a slow client delays its own loop and skips
    // frames rather than buffering them.
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(stream_frames(state, tx));

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(ReceiverStream::new(rx)),
    )
}

/// Per-connection loop: sleep, read the latest frame, send one chunk.
///
/// Ends when the body is dropped (client gone, so the send fails) or on
/// shutdown. The same frame is re-sent while the device is idle.
async fn stream_frames(state: StreamState, tx: mpsc::Sender<Result<Bytes, Infallible>>) {
    state.metrics.stream_opened();
    tracing::debug!("Stream client connected");

    let mut chunks: u64 = 0;
    loop {
        tokio::select! {
            _ = state.shutdown.wait() => break,
            _ = tokio::time::sleep(state.interval) => {}
        }

        let frame = state.slot.current();
        let chunk = encode_chunk(&frame);

        let sent = tokio::select! {
            _ = state.shutdown.wait() => break,
            sent = tx.send(Ok(chunk)) => sent,
        };
        if sent.is_err() {
            break;
        }

        chunks += 1;
        state.metrics.record_chunk();
        tracing::trace!(sequence = frame.sequence(), len = frame.len(), "Sent chunk");
    }

    state.metrics.stream_closed();
    tracing::debug!(chunks, "Stream client disconnected");
}

/// Handler for the optional metrics route.
async fn metrics_handler(State(state): State<StreamState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {}", e),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::task::JoinHandle;
    use tokio::time::{timeout, Instant};

    const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
    const NEXT_BOUNDARY: &[u8] = b"\r\n--frame\r\n";
    const INTERVAL: Duration = Duration::from_millis(20);

    struct TestServer {
        addr: SocketAddr,
        shutdown: Shutdown,
        metrics: StreamMetrics,
        handle: JoinHandle<Result<(), ServerError>>,
    }

    impl TestServer {
        fn url(&self, path: &str) -> String {
            format!("http://{}{}", self.addr, path)
        }
    }

    async fn start(slot: Arc<FrameSlot>) -> TestServer {
        let settings = HttpSettings {
            bind_addr: ([127, 0, 0, 1], 0).into(),
            path: "/stream".to_string(),
            frame_interval: INTERVAL,
            metrics_path: Some("/metrics".to_string()),
        };
        let shutdown = Shutdown::new();
        let metrics = StreamMetrics::new().unwrap();
        let publisher = StreamPublisher::new(settings, slot, shutdown.clone(), metrics.clone());

        let listener = publisher.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(publisher.serve(listener));

        TestServer {
            addr,
            shutdown,
            metrics,
            handle,
        }
    }

    /// Reads one complete multipart part and returns its body.
    ///
    /// A part is complete once the next boundary has arrived, which also
    /// proves nothing sits between the two parts.
    async fn next_part(response: &mut reqwest::Response, buf: &mut Vec<u8>) -> Vec<u8> {
        loop {
            if buf.len() >= PART_HEADER.len() {
                assert!(buf.starts_with(PART_HEADER), "malformed part header");
                if let Some(end) = find(&buf[PART_HEADER.len()..], NEXT_BOUNDARY) {
                    let body = buf[PART_HEADER.len()..PART_HEADER.len() + end].to_vec();
                    // Keep the next part's boundary line.
                    buf.drain(..PART_HEADER.len() + end + 2);
                    return body;
                }
            }
            let chunk = timeout(Duration::from_secs(2), response.chunk())
                .await
                .expect("timed out waiting for chunk")
                .unwrap()
                .expect("stream ended");
            buf.extend_from_slice(&chunk);
        }
    }

    async fn fetch(url: String) -> reqwest::Response {
        reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap()
            .get(url)
            .send()
            .await
            .unwrap()
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    async fn wait_for_active_streams(metrics: &StreamMetrics, expected: i64) {
        let deadline = Instant::now() + Duration::from_secs(3);
        while metrics.active_streams() != expected {
            assert!(Instant::now() < deadline, "active streams never reached {}", expected);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_stream_headers_and_first_part() {
        let slot = Arc::new(FrameSlot::new());
        slot.publish(Bytes::from_static(b"HELLO"));
        let server = start(Arc::clone(&slot)).await;

        let mut response = fetch(server.url("/stream")).await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(
            response.headers()[reqwest::header::CONTENT_TYPE],
            "multipart/x-mixed-replace; boundary=frame"
        );

        let mut buf = Vec::new();
        assert_eq!(next_part(&mut response, &mut buf).await, b"HELLO");
    }

    #[tokio::test]
    async fn test_idle_device_still_streams_last_frame() {
        let slot = Arc::new(FrameSlot::new());
        slot.publish(Bytes::from_static(b"stale"));
        let server = start(Arc::clone(&slot)).await;

        let mut response = fetch(server.url("/stream")).await;
        let mut buf = Vec::new();
        let started = Instant::now();
        for _ in 0..5 {
            assert_eq!(next_part(&mut response, &mut buf).await, b"stale");
        }
        // Each part after the first waits out one more interval.
        assert!(started.elapsed() >= INTERVAL * 4);
    }

    #[tokio::test]
    async fn test_sentinel_streamed_before_first_capture() {
        let slot = Arc::new(FrameSlot::new());
        let server = start(Arc::clone(&slot)).await;

        let mut response = fetch(server.url("/stream")).await;
        let mut buf = Vec::new();
        assert!(next_part(&mut response, &mut buf).await.is_empty());
    }

    #[tokio::test]
    async fn test_two_clients_and_one_disconnect() {
        let slot = Arc::new(FrameSlot::new());
        slot.publish(Bytes::from(vec![0xAA; 3000]));
        let server = start(Arc::clone(&slot)).await;

        let mut first = fetch(server.url("/stream")).await;
        let mut second = fetch(server.url("/stream")).await;
        let (mut first_buf, mut second_buf) = (Vec::new(), Vec::new());

        assert_eq!(next_part(&mut first, &mut first_buf).await, vec![0xAA; 3000]);
        assert_eq!(next_part(&mut second, &mut second_buf).await, vec![0xAA; 3000]);
        wait_for_active_streams(&server.metrics, 2).await;

        drop(first);
        slot.publish(Bytes::from(vec![0xBB; 1200]));

        // The remaining client moves on to the new frame, and every part
        // it sees is one of the two published frames, whole.
        let mut saw_new_frame = false;
        for _ in 0..20 {
            let body = next_part(&mut second, &mut second_buf).await;
            assert!(body == vec![0xAA; 3000] || body == vec![0xBB; 1200]);
            if body == vec![0xBB; 1200] {
                saw_new_frame = true;
                break;
            }
        }
        assert!(saw_new_frame);

        wait_for_active_streams(&server.metrics, 1).await;
        let _ = next_part(&mut second, &mut second_buf).await;
    }

    #[tokio::test]
    async fn test_unknown_route_not_found() {
        let server = start(Arc::new(FrameSlot::new())).await;

        let response = fetch(server.url("/other")).await;
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_route() {
        let server = start(Arc::new(FrameSlot::new())).await;

        let body = fetch(server.url("/metrics")).await.text().await.unwrap();
        assert!(body.contains("serial_mjpeg_active_streams"));
    }

    #[tokio::test]
    async fn test_shutdown_ends_streams_and_server() {
        let slot = Arc::new(FrameSlot::new());
        slot.publish(Bytes::from_static(b"bye"));
        let server = start(Arc::clone(&slot)).await;

        let mut response = fetch(server.url("/stream")).await;
        let mut buf = Vec::new();
        assert_eq!(next_part(&mut response, &mut buf).await, b"bye");

        server.shutdown.trigger();

        // Drain whatever was in flight until the body ends.
        let drained = timeout(Duration::from_secs(3), async {
            while let Ok(Some(_)) = response.chunk().await {}
        })
        .await;
        assert!(drained.is_ok());

        let result = timeout(Duration::from_secs(3), server.handle)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(server.metrics.active_streams(), 0);
    }
}
