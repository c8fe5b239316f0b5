use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Once;

static INIT: Once = Once::new();

lazy_static! {
    /// Global Prometheus metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Fetch Metrics
    // ============================================================================

    /// Datastore objects downloaded successfully
    pub static ref OBJECTS_FETCHED_TOTAL: IntCounter = IntCounter::new(
        "ledgerstream_objects_fetched_total",
        "Total datastore objects downloaded"
    ).expect("metric can be created");

    /// Bytes downloaded from the datastore
    pub static ref OBJECT_BYTES_TOTAL: IntCounter = IntCounter::new(
        "ledgerstream_object_bytes_total",
        "Total bytes downloaded from the datastore"
    ).expect("metric can be created");

    /// Fetch retries, labelled by reason (not_found, error)
    pub static ref FETCH_RETRIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ledgerstream_fetch_retries_total", "Total object fetch retries"),
        &["reason"]
    ).expect("metric can be created");

    /// Object fetch latency
    pub static ref FETCH_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new("ledgerstream_fetch_latency_seconds", "Object fetch latency in seconds")
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
    ).expect("metric can be created");

    // ============================================================================
    // Buffer Metrics
    // ============================================================================

    /// Objects sitting in order in the ready queue
    pub static ref BUFFER_READY_OBJECTS: IntGauge = IntGauge::new(
        "ledgerstream_buffer_ready_objects",
        "Objects waiting in the ready queue"
    ).expect("metric can be created");

    /// Buffers terminated by a fatal error, labelled by reason
    pub static ref BUFFER_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ledgerstream_buffer_failures_total", "Total fatal buffer failures"),
        &["reason"]
    ).expect("metric can be created");

    // ============================================================================
    // Consumer Metrics
    // ============================================================================

    /// Ledgers returned to callers
    pub static ref LEDGERS_DELIVERED_TOTAL: IntCounter = IntCounter::new(
        "ledgerstream_ledgers_delivered_total",
        "Total ledgers returned by get_ledger"
    ).expect("metric can be created");
}

/// Initialize metrics registry
/// Can be called multiple times safely (idempotent)
pub fn init() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(OBJECTS_FETCHED_TOTAL.clone()))
            .expect("objects_fetched_total can be registered");
        REGISTRY
            .register(Box::new(OBJECT_BYTES_TOTAL.clone()))
            .expect("object_bytes_total can be registered");
        REGISTRY
            .register(Box::new(FETCH_RETRIES_TOTAL.clone()))
            .expect("fetch_retries_total can be registered");
        REGISTRY
            .register(Box::new(FETCH_LATENCY.clone()))
            .expect("fetch_latency can be registered");
        REGISTRY
            .register(Box::new(BUFFER_READY_OBJECTS.clone()))
            .expect("buffer_ready_objects can be registered");
        REGISTRY
            .register(Box::new(BUFFER_FAILURES_TOTAL.clone()))
            .expect("buffer_failures_total can be registered");
        REGISTRY
            .register(Box::new(LEDGERS_DELIVERED_TOTAL.clone()))
            .expect("ledgers_delivered_total can be registered");
    });
}

/// Render every registered metric in the Prometheus text format
pub fn gather_text() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
