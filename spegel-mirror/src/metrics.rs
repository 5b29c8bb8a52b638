use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, HistogramVec,
    IntCounterVec, IntGaugeVec,
};

pub static MIRROR_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "mirror_requests_total",
        "Mirror requests by registry, cache outcome, and source",
        &["registry", "cache", "source"]
    )
    .unwrap()
});

pub static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "http_request_duration_seconds",
        "Request latency by handler, method, and status code",
        &["handler", "method", "code"]
    )
    .unwrap()
});

pub static HTTP_RESPONSE_SIZE_BYTES: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "http_response_size_bytes",
        "Response body size by handler, method, and status code",
        &["handler", "method", "code"]
    )
    .unwrap()
});

pub static HTTP_REQUESTS_INFLIGHT: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "http_requests_inflight",
        "Requests currently being handled, by handler",
        &["handler"]
    )
    .unwrap()
});

/// `cache` label for [`MIRROR_REQUESTS_TOTAL`]: `hit` = a peer served the request, `miss` = a
/// peer was tried but every attempt failed, `unavailable` = no peer was even known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
    Unavailable,
}

impl CacheOutcome {
    fn as_str(self) -> &'static str {
        match self {
            CacheOutcome::Hit => "hit",
            CacheOutcome::Miss => "miss",
            CacheOutcome::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Internal,
    External,
}

impl Source {
    fn as_str(self) -> &'static str {
        match self {
            Source::Internal => "internal",
            Source::External => "external",
        }
    }
}

pub fn record_mirror_request(registry: &str, outcome: CacheOutcome, source: Source) {
    MIRROR_REQUESTS_TOTAL
        .with_label_values(&[registry, outcome.as_str(), source.as_str()])
        .inc();
}

/// A guard that, when dropped, records the outer HTTP metrics (duration, size, inflight) for one
/// request. This is the "single outer decorator" the response abstraction calls for: handlers
/// only ever set `status`/record bytes/attach an error on it, never touch the histograms
/// directly.
///
/// `bytes_written` is a shared atomic rather than a plain field so it can be handed to a
/// streaming body (see [`crate::handler::pooled_stream`]) and keep accumulating real bytes
/// after the handler function itself has returned — the guard is dropped only once the body is
/// fully drained (or the stream is dropped early on a mid-stream failure), so a truncated
/// transfer is reflected as a truncated count rather than the originally-promised length.
pub struct RequestMetrics {
    handler: &'static str,
    method: String,
    start: std::time::Instant,
    status: http::StatusCode,
    bytes_written: Arc<AtomicU64>,
    last_error: Mutex<Option<String>>,
}

impl RequestMetrics {
    pub fn start(handler: &'static str, method: http::Method) -> Self {
        HTTP_REQUESTS_INFLIGHT.with_label_values(&[handler]).inc();
        RequestMetrics {
            handler,
            method: method.to_string(),
            start: std::time::Instant::now(),
            status: http::StatusCode::OK,
            bytes_written: Arc::new(AtomicU64::new(0)),
            last_error: Mutex::new(None),
        }
    }

    pub fn set_status(&mut self, status: http::StatusCode) {
        self.status = status;
    }

    /// Records bytes actually handed off for delivery (written or streamed), not the promised
    /// `Content-Length`.
    pub fn record_bytes(&self, n: u64) {
        self.bytes_written.fetch_add(n, Ordering::Relaxed);
    }

    /// A clone of the shared byte counter, to move into a streaming body alongside the guard
    /// itself so both keep incrementing the same total.
    pub fn byte_counter(&self) -> Arc<AtomicU64> {
        self.bytes_written.clone()
    }

    /// Attaches the last error seen while producing this response, for correlation in the
    /// drop-time log line. Overwrites any previously attached error.
    pub fn set_error(&self, err: impl std::fmt::Display) {
        *self.last_error.lock().unwrap() = Some(err.to_string());
    }
}

impl Drop for RequestMetrics {
    fn drop(&mut self) {
        HTTP_REQUESTS_INFLIGHT
            .with_label_values(&[self.handler])
            .dec();
        let code = self.status.as_u16().to_string();
        let labels = [self.handler, self.method.as_str(), code.as_str()];
        HTTP_REQUEST_DURATION_SECONDS
            .with_label_values(&labels)
            .observe(self.start.elapsed().as_secs_f64());
        let bytes = self.bytes_written.load(Ordering::Relaxed);
        HTTP_RESPONSE_SIZE_BYTES
            .with_label_values(&labels)
            .observe(bytes as f64);
        if let Some(err) = self.last_error.lock().unwrap().take() {
            log::warn!(
                "{} {} ({code}, {bytes}B): {err}",
                self.handler,
                self.method
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_mirror_request_increments_the_right_series() {
        let before = MIRROR_REQUESTS_TOTAL
            .with_label_values(&["docker.io", "hit", "internal"])
            .get();
        record_mirror_request("docker.io", CacheOutcome::Hit, Source::Internal);
        let after = MIRROR_REQUESTS_TOTAL
            .with_label_values(&["docker.io", "hit", "internal"])
            .get();
        assert_eq!(after, before + 1);
    }

    #[test]
    fn request_metrics_guard_decrements_inflight_on_drop() {
        let before = HTTP_REQUESTS_INFLIGHT.with_label_values(&["mirror"]).get();
        {
            let mut m = RequestMetrics::start("mirror", http::Method::GET);
            assert_eq!(
                HTTP_REQUESTS_INFLIGHT.with_label_values(&["mirror"]).get(),
                before + 1
            );
            m.set_status(http::StatusCode::OK);
            m.record_bytes(128);
        }
        assert_eq!(HTTP_REQUESTS_INFLIGHT.with_label_values(&["mirror"]).get(), before);
    }

    #[test]
    fn byte_counter_shares_state_with_the_guard() {
        let m = RequestMetrics::start("mirror", http::Method::GET);
        let counter = m.byte_counter();
        counter.fetch_add(64, Ordering::Relaxed);
        m.record_bytes(32);
        assert_eq!(m.bytes_written.load(Ordering::Relaxed), 96);
    }

    #[test]
    fn set_error_overwrites_previous_value() {
        let m = RequestMetrics::start("mirror", http::Method::GET);
        m.set_error("first failure");
        m.set_error("second failure");
        assert_eq!(
            m.last_error.lock().unwrap().as_deref(),
            Some("second failure")
        );
    }
}
