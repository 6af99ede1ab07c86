use axum::{
    body::Body,
    http::{HeaderValue, Request},
};
use fleetcommon::observability::CounterSample;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Encoder, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec,
    TextEncoder,
};
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use uuid::Uuid;

static REQ_COUNTER: Lazy<Option<IntCounterVec>> = Lazy::new(|| {
    register_int_counter_vec!(
        "gateway_http_requests_total",
        "HTTP request count",
        &["method", "path", "status"]
    )
    .ok()
});
static REQ_LATENCY: Lazy<Option<HistogramVec>> = Lazy::new(|| {
    register_histogram_vec!(
        "gateway_http_request_duration_seconds",
        "HTTP request latency",
        &["method", "path", "status"]
    )
    .ok()
});
static ERROR_5XX_COUNTER: Lazy<Option<IntCounterVec>> = Lazy::new(|| {
    register_int_counter_vec!(
        "gateway_http_errors_total",
        "HTTP 5xx error count",
        &["method", "path", "status"]
    )
    .ok()
});
static BUILD_INFO: Lazy<Option<IntGauge>> = Lazy::new(|| {
    let g = register_int_gauge!(
        "gateway_build_info",
        "Build info as a constant 1 gauge with labels"
    )
    .ok()?;
    g.set(1);
    Some(g)
});
static REGISTRY_OUTCOMES: Lazy<Option<IntGaugeVec>> = Lazy::new(|| {
    register_int_gauge_vec!(
        "registry_outcomes",
        "Provisioning and decommission outcome counters",
        &["outcome"]
    )
    .ok()
});

fn record_request(method: &str, path: &str, status: &str, started: Instant) {
    let labels = [method, path, status];
    if let Some(counter) = REQ_COUNTER.as_ref() {
        counter.with_label_values(&labels).inc();
    }
    if let Some(latency) = REQ_LATENCY.as_ref() {
        latency
            .with_label_values(&labels)
            .observe(started.elapsed().as_secs_f64());
    }
    if status.starts_with('5') || status == "error" {
        if let Some(errors) = ERROR_5XX_COUNTER.as_ref() {
            errors.with_label_values(&labels).inc();
        }
    }
}

/// Request counters, latency and an `x-request-id` on every response.
#[derive(Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;
    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for MetricsService<S>
where
    S: Service<Request<Body>, Response = axum::response::Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }
    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let rid = req
            .headers()
            .get("x-request-id")
            .and_then(|id| id.to_str().ok())
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let method = req.method().as_str().to_owned();
        let path = normalize_path(req.uri().path());
        let rid_header =
            HeaderValue::from_str(&rid).unwrap_or_else(|_| HeaderValue::from_static("invalid"));
        req.headers_mut().insert("x-request-id", rid_header.clone());
        let started = Instant::now();
        let fut = self.inner.call(req);
        Box::pin(async move {
            match fut.await {
                Ok(mut resp) => {
                    let status = resp.status().as_u16().to_string();
                    record_request(&method, &path, &status, started);
                    tracing::debug!(%method, %path, %status, request_id = %rid, "request served");
                    resp.headers_mut().insert("x-request-id", rid_header);
                    Ok(resp)
                }
                Err(e) => {
                    record_request(&method, &path, "error", started);
                    Err(e)
                }
            }
        })
    }
}

/// Prometheus text for the process registry, with the registry's outcome
/// counters copied in first.
pub fn gather_metrics(outcomes: &[CounterSample]) -> (axum::http::StatusCode, String) {
    if let Some(gauges) = REGISTRY_OUTCOMES.as_ref() {
        for sample in outcomes {
            gauges
                .with_label_values(&[sample.name.as_str()])
                .set(i64::try_from(sample.value).unwrap_or(i64::MAX));
        }
    }
    let _ = BUILD_INFO.as_ref();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buf = Vec::new();
    match encoder.encode(&metric_families, &mut buf) {
        Ok(_) => (
            axum::http::StatusCode::OK,
            String::from_utf8_lossy(&buf).into_owned(),
        ),
        Err(e) => (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            format!("encode error: {e}"),
        ),
    }
}

/// Collapses per-vehicle and per-account path segments so label cardinality
/// stays bounded.
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    let mut out = Vec::with_capacity(segments.len());
    for (i, seg) in segments.iter().enumerate() {
        let parent = i.checked_sub(1).and_then(|p| segments.get(p)).copied();
        let collapsed = match parent {
            Some("vehicles") if *seg != "count" && !seg.is_empty() => ":id",
            Some("owners" | "contributors" | "roles") if !seg.is_empty() => ":account",
            _ => seg,
        };
        out.push(collapsed);
    }
    out.join("/")
}
