pub mod decode_loop;
pub mod decoder;
pub mod frame;
pub mod pulse;
pub mod recording;
pub mod sim;
pub mod stability;

pub use decode_loop::{DecodeCounters, DecodeLoop, DecodeStats, LoopError};
pub use decoder::{BitDecoder, BitError, DecoderTiming, TimingWindow};
pub use frame::{checksum, AssemblerEvent, Frame, FrameAssembler, FrameError};
pub use pulse::{PulseSample, PulseSource, SampleBuffer, SourceError};
pub use recording::{
    FlightPermit, Indicator, IndicatorGuard, RecordError, Recorder, RecordingConfig,
    RecordingCoordinator, RecordingCounters, RecordingStats, SingleFlight, Trigger,
};
pub use sim::SimulatedScale;
pub use stability::{StabilityConfig, WeightSnapshot, WeightState};
