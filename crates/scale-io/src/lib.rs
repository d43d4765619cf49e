pub mod led;
pub mod lirc;
pub mod metrics;
pub mod mode2;

pub use led::{LedError, NullIndicator, SysfsLed};
pub use lirc::LircDevice;
pub use metrics::{init_metrics, serve_metrics, MetricsPublisher};
pub use mode2::{Mode2Error, Mode2Replay};
