//! HTTP request/response tracing middleware.

use tower_http::LatencyUnit;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Creates a tracing middleware for HTTP requests.
///
/// # Logging Behavior
///
/// **On Request:**
/// - Creates a span at `INFO` level with:
///   - HTTP method
///   - URI path
///   - HTTP version
///
/// **On Response:**
/// - Logs at `INFO` level with:
///   - Status code
///   - Latency in milliseconds
///
/// # Example Logs
///
/// ```text
/// INFO request{method=GET uri=/Ab3 version=HTTP/1.1}: started processing request
/// INFO request{method=GET uri=/Ab3 version=HTTP/1.1}: finished processing request latency=1 ms status=302
/// ```
///
/// # Integration
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/{path}", get(redirect_handler))
///     .layer(tracing::layer());
/// ```
pub fn layer() -> HttpTraceLayer {
    layer_at(Level::INFO)
}

/// Same as [`layer`] but at `DEBUG`, for probe endpoints polled by the
/// orchestrator every few seconds.
pub fn probe_layer() -> HttpTraceLayer {
    layer_at(Level::DEBUG)
}

type HttpTraceLayer = TraceLayer<SharedClassifier<ServerErrorsAsFailures>>;

fn layer_at(level: Level) -> HttpTraceLayer {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(level))
        .on_response(
            DefaultOnResponse::new()
                .level(level)
                .latency_unit(LatencyUnit::Millis),
        )
}
