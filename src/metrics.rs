//! Prometheus series and their HTTP exposition, fed by the `Event` stream.

use std::net::SocketAddr;

use axum::routing::get;
use axum::Router;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use tokio::sync::mpsc;

use crate::event::Event;

const BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

pub struct Metrics {
    request_count: IntCounterVec,
    error_count: IntCounterVec,
    request_duration: HistogramVec,
    error_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Ok(Metrics {
            request_count: register_int_counter_vec!("drk_request_count", "successful requests", &["workflow", "query"])?,
            error_count: register_int_counter_vec!("drk_error_count", "failed requests", &["workflow", "query"])?,
            request_duration: register_histogram_vec!(
                "drk_request_duration",
                "latency of successful requests",
                &["workflow", "query"],
                BUCKETS.to_vec()
            )?,
            error_duration: register_histogram_vec!(
                "drk_error_duration",
                "latency of failed requests",
                &["workflow", "query"],
                BUCKETS.to_vec()
            )?,
        })
    }

    fn observe(&self, event: &Event) {
        let seconds = event.duration.as_secs_f64();
        if event.is_err() {
            self.error_count.with_label_values(&[&event.workflow, &event.name]).inc();
            self.error_duration.with_label_values(&[&event.workflow, &event.name]).observe(seconds);
        } else {
            self.request_count.with_label_values(&[&event.workflow, &event.name]).inc();
            self.request_duration.with_label_values(&[&event.workflow, &event.name]).observe(seconds);
        }
    }
}

/// Drains `events`, updating the registered series and forwarding each
/// event unchanged to `forward` so the printer can also consume it.
pub async fn run(metrics: Metrics, mut events: mpsc::Receiver<Event>, forward: mpsc::Sender<Event>) {
    while let Some(event) = events.recv().await {
        metrics.observe(&event);
        if forward.send(event).await.is_err() {
            break;
        }
    }
}

async fn serve_metrics() -> String {
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    encoder.encode(&metric_families, &mut buffer).unwrap_or_default();
    String::from_utf8(buffer).unwrap_or_default()
}

/// Binds `/metrics` on `port`. Runs until the process exits.
pub async fn serve(port: u16) -> Result<(), std::io::Error> {
    let app = Router::new().route("/metrics", get(serve_metrics));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "serving metrics");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
