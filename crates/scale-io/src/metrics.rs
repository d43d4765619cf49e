//! Prometheus metrics for the scale monitor.
//!
//! Counters mirror the decode-loop and recording counters; gauges track the
//! latest weight state.

use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use scale_core::{DecodeStats, RecordingStats, WeightSnapshot};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

fn counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
}

fn gauge(name: &str, help: &str) -> Gauge {
    let gauge = Gauge::new(name, help).unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
}

fn int_gauge(name: &str, help: &str) -> IntGauge {
    let gauge = IntGauge::new(name, help).unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
}

// ============================================================================
// Decoding
// ============================================================================

pub static FRAMES_DECODED: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "scale_frames_decoded_total",
        "Frames that passed header and checksum validation",
    )
});

pub static STABLE_FRAMES: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "scale_stable_frames_total",
        "Decoded frames carrying the stable status marker",
    )
});

pub static DECODE_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "scale_decode_failures_total",
        "Partial frames discarded on a timing violation",
    )
});

pub static HEADER_MISMATCHES: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "scale_header_mismatches_total",
        "Decoded bytes dropped while scanning for the frame header",
    )
});

pub static CHECKSUM_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "scale_checksum_failures_total",
        "Complete frames rejected by checksum validation",
    )
});

// ============================================================================
// Recording
// ============================================================================

pub static RECORDINGS_STARTED: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "scale_recordings_started_total",
        "Recording tasks launched",
    )
});

pub static RECORDINGS_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "scale_recordings_completed_total",
        "Weights handed to the recorder successfully",
    )
});

pub static RECORDINGS_FAILED: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "scale_recordings_failed_total",
        "Recorder calls that returned an error",
    )
});

pub static TRIGGERS_ABSORBED: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "scale_triggers_absorbed_total",
        "Stability triggers absorbed by an in-flight recording",
    )
});

pub static RECORDING_IN_FLIGHT: LazyLock<IntGauge> = LazyLock::new(|| {
    int_gauge(
        "scale_recording_in_flight",
        "Recording task status (1=in flight, 0=idle)",
    )
});

// ============================================================================
// Weight State
// ============================================================================

pub static WEIGHT_KG: LazyLock<Gauge> =
    LazyLock::new(|| gauge("scale_weight_kg", "Most recently displayed weight in kg"));

pub static STABLE_WEIGHT_KG: LazyLock<Gauge> =
    LazyLock::new(|| gauge("scale_stable_weight_kg", "Most recent stable weight in kg"));

pub static STABLE_COUNT: LazyLock<IntGauge> = LazyLock::new(|| {
    int_gauge(
        "scale_stable_count",
        "Consecutive stable frames in the current streak",
    )
});

/// Turns counter snapshots into Prometheus counter increments.
#[derive(Debug, Default)]
pub struct MetricsPublisher {
    last_decode: DecodeStats,
    last_recording: RecordingStats,
}

impl MetricsPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(
        &mut self,
        decode: DecodeStats,
        recording: RecordingStats,
        weight: WeightSnapshot,
        in_flight: bool,
    ) {
        let prev = self.last_decode;
        advance(&FRAMES_DECODED, prev.frames_decoded, decode.frames_decoded);
        advance(&STABLE_FRAMES, prev.stable_frames, decode.stable_frames);
        advance(&DECODE_FAILURES, prev.decode_failures, decode.decode_failures);
        advance(&HEADER_MISMATCHES, prev.header_mismatches, decode.header_mismatches);
        advance(&CHECKSUM_FAILURES, prev.checksum_failures, decode.checksum_failures);
        self.last_decode = decode;

        let prev = self.last_recording;
        advance(&RECORDINGS_STARTED, prev.started, recording.started);
        advance(&RECORDINGS_COMPLETED, prev.completed, recording.completed);
        advance(&RECORDINGS_FAILED, prev.failed, recording.failed);
        advance(&TRIGGERS_ABSORBED, prev.absorbed, recording.absorbed);
        self.last_recording = recording;

        WEIGHT_KG.set(weight.weight);
        STABLE_WEIGHT_KG.set(weight.stable_weight);
        STABLE_COUNT.set(i64::from(weight.stable_count));
        RECORDING_IN_FLIGHT.set(i64::from(in_flight));
    }
}

fn advance(counter: &IntCounter, last: u64, now: u64) {
    if now > last {
        counter.inc_by(now - last);
    }
}

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            match request.url() {
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let mut buffer = Vec::new();

                    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
                        tracing::warn!("Failed to encode metrics: {}", e);
                        let _ = request.respond(
                            Response::from_string("Internal Server Error").with_status_code(500),
                        );
                        continue;
                    }

                    let response = Response::from_data(buffer).with_header(
                        tiny_http::Header::from_bytes(
                            &b"Content-Type"[..],
                            &b"text/plain; version=0.0.4"[..],
                        )
                        .unwrap(),
                    );
                    let _ = request.respond(response);
                }
                "/health" => {
                    let _ = request.respond(Response::from_string("OK"));
                }
                "/ready" => {
                    // Ready once the receiver has produced a valid frame
                    if FRAMES_DECODED.get() > 0 {
                        let _ = request.respond(Response::from_string("Ready"));
                    } else {
                        let _ = request
                            .respond(Response::from_string("Not Ready").with_status_code(503));
                    }
                }
                _ => {
                    let _ =
                        request.respond(Response::from_string("Not Found").with_status_code(404));
                }
            }
        }
    })
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    let _ = FRAMES_DECODED.get();
    let _ = STABLE_FRAMES.get();
    let _ = DECODE_FAILURES.get();
    let _ = HEADER_MISMATCHES.get();
    let _ = CHECKSUM_FAILURES.get();
    let _ = RECORDINGS_STARTED.get();
    let _ = RECORDINGS_COMPLETED.get();
    let _ = RECORDINGS_FAILED.get();
    let _ = TRIGGERS_ABSORBED.get();
    let _ = RECORDING_IN_FLIGHT.get();
    let _ = WEIGHT_KG.get();
    let _ = STABLE_WEIGHT_KG.get();
    let _ = STABLE_COUNT.get();
}
