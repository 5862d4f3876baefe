//! Process-wide Prometheus collectors of the adaptation layer.
//!
//! Collectors are created lazily and are not registered anywhere until the
//! embedding application calls [`register_custom_metrics`] with its own
//! registry.


use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Encoder;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use tracing::error;

lazy_static! {
    pub static ref DISPATCHED_COMMANDS: IntCounterVec = IntCounterVec::new(
        Opts::new("dispatched_commands", "Commands registered with the dispatcher"),
        &["operation"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRATION_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("registration_failures", "Commands the dispatcher refused to schedule"),
        &["operation"]
    )
    .expect("metric can not be created");

    pub static ref BATCH_CALLS: IntCounterVec = IntCounterVec::new(
        Opts::new("batch_calls", "Batch calls started"),
        &["family"]
    )
    .expect("metric can not be created");

    pub static ref BATCH_ABORTS: IntCounterVec = IntCounterVec::new(
        Opts::new("batch_aborts", "Batch calls terminated by a node failure"),
        &["family"]
    )
    .expect("metric can not be created");

    pub static ref PER_ITEM_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("per_item_failures", "Batch items resolved with an error code"),
        &["family"]
    )
    .expect("metric can not be created");

    pub static ref BATCH_SIZE: HistogramVec = HistogramVec::new(
        HistogramOpts::new("batch_size", "Items per batch call")
            .buckets(exponential_buckets(1.0, 4.0, 8).expect("valid buckets")),
        &["family"]
    )
    .expect("metric can not be created");

    pub static ref STREAM_CANCELLATIONS: IntCounter =
        IntCounter::new("stream_cancellations", "Streams cancelled by their consumer")
            .expect("metric can not be created");
}

/// Registers every collector of this crate into `registry`
pub fn register_custom_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(DISPATCHED_COMMANDS.clone()))?;
    registry.register(Box::new(REGISTRATION_FAILURES.clone()))?;
    registry.register(Box::new(BATCH_CALLS.clone()))?;
    registry.register(Box::new(BATCH_ABORTS.clone()))?;
    registry.register(Box::new(PER_ITEM_FAILURES.clone()))?;
    registry.register(Box::new(BATCH_SIZE.clone()))?;
    registry.register(Box::new(STREAM_CANCELLATIONS.clone()))?;
    Ok(())
}

/// Text exposition of `registry`, ready to be served to a scraper
pub fn metrics_body(registry: &Registry) -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        error!("custom metrics could not be from_utf8'd: {}", e);
        String::default()
    })
}
