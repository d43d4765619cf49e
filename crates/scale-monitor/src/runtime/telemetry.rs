use scale_core::{DecodeCounters, RecordingCounters, SingleFlight, WeightState};
use scale_io::metrics::{init_metrics, serve_metrics, MetricsPublisher};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;
use tracing::info;

const PUBLISH_INTERVAL: Duration = Duration::from_millis(200);

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(addr: &Option<String>) -> Option<thread::JoinHandle<()>> {
    addr.as_ref().map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.clone())
    })
}

/// Shared handles the updater samples.
pub struct TelemetrySources {
    pub decode: Arc<DecodeCounters>,
    pub recording: Arc<RecordingCounters>,
    pub state: Arc<WeightState>,
    pub flight: Arc<SingleFlight>,
}

impl TelemetrySources {
    fn publish(&self, publisher: &mut MetricsPublisher) {
        publisher.publish(
            self.decode.snapshot(),
            self.recording.snapshot(),
            self.state.snapshot(),
            self.flight.is_busy(),
        );
    }
}

pub fn start_metrics_updater(
    sources: TelemetrySources,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut publisher = MetricsPublisher::new();
        while !stop.load(Ordering::Relaxed) {
            sources.publish(&mut publisher);
            thread::sleep(PUBLISH_INTERVAL);
        }
        // Final counts after shutdown
        sources.publish(&mut publisher);
    })
}
