use crate::infra::journal::JournalRecorder;
use crate::runtime::config::RuntimeConfig;
use crate::runtime::logging::init_tracing;
use crate::runtime::telemetry::{self, TelemetrySources};
use scale_core::{
    DecodeLoop, DecodeStats, DecoderTiming, Indicator, LoopError, PulseSource, Recorder,
    RecordingCoordinator, SimulatedScale, WeightState,
};
use scale_io::{LircDevice, Mode2Replay, NullIndicator, SysfsLed};
use std::io;
use std::process::ExitCode;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Unstable ramp frames precede these extra stable frames in a simulated
/// weighing, so the arming threshold is crossed with margin.
const SIMULATED_EXTRA_FRAMES: usize = 5;
/// How long a decode thread blocked in a device read may delay shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const JOIN_POLL: Duration = Duration::from_millis(50);

pub fn run_from_args() -> ExitCode {
    let config = RuntimeConfig::from_env();
    if config.show_help {
        RuntimeConfig::print_help();
        return ExitCode::SUCCESS;
    }
    run(config)
}

pub fn run(config: RuntimeConfig) -> ExitCode {
    let _log_guard = init_tracing(config.json_logs, config.debug, config.log_dir.as_deref());

    let journal = match JournalRecorder::new(&config.journal_path) {
        Ok(journal) => Arc::new(journal),
        Err(e) => {
            error!(
                error = %e,
                path = %config.journal_path.display(),
                "Failed to open weight journal"
            );
            return ExitCode::FAILURE;
        }
    };

    if config.test_recorder {
        return record_test_weight(&journal);
    }

    telemetry::init();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    let source = match open_source(&config) {
        Ok(source) => source,
        Err(e) => {
            error!(error = %e, "Failed to open pulse source");
            return ExitCode::FAILURE;
        }
    };
    let indicator = open_indicator(&config);

    let stop = Arc::new(AtomicBool::new(false));
    let state = Arc::new(WeightState::new(config.stability_config()));
    let coordinator = RecordingCoordinator::new(
        Arc::clone(&state),
        journal,
        Arc::clone(&indicator),
        config.recording_config(),
        Arc::clone(&stop),
    );
    let mut decode_loop = DecodeLoop::new(
        source,
        DecoderTiming::default(),
        Arc::clone(&state),
        coordinator,
    );

    let telemetry_stop = Arc::new(AtomicBool::new(false));
    let updater_handle = config.metrics_addr.as_ref().map(|_| {
        telemetry::start_metrics_updater(
            TelemetrySources {
                decode: decode_loop.counters(),
                recording: decode_loop.coordinator().counters(),
                state: Arc::clone(&state),
                flight: decode_loop.coordinator().flight(),
            },
            Arc::clone(&telemetry_stop),
        )
    });

    info!(
        stable_frames = config.stable_frames,
        quiet_window_ms = config.quiet_window_ms,
        journal = %config.journal_path.display(),
        "Waiting for weight readings"
    );

    let stop_decode = Arc::clone(&stop);
    let decode_handle = match thread::Builder::new()
        .name("decoder".into())
        .spawn(move || decode_loop.run(&stop_decode))
    {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "Failed to spawn decode thread");
            return ExitCode::FAILURE;
        }
    };

    if let Some(seconds) = config.run_seconds {
        info!(seconds, "Running for limited duration");
        wait_until_finished(&decode_handle, Duration::from_secs(seconds));
        stop.store(true, Ordering::Relaxed);
        wait_until_finished(&decode_handle, SHUTDOWN_GRACE);
    }

    let code = if decode_handle.is_finished() || config.run_seconds.is_none() {
        match decode_handle.join() {
            Ok(result) => report(result),
            Err(_) => {
                error!("Decode thread panicked");
                ExitCode::FAILURE
            }
        }
    } else {
        warn!("Decode thread still blocked on the receiver, exiting without it");
        ExitCode::SUCCESS
    };

    indicator.set(false);
    telemetry_stop.store(true, Ordering::Relaxed);
    if let Some(handle) = updater_handle {
        let _ = handle.join();
    }
    code
}

fn record_test_weight(journal: &JournalRecorder) -> ExitCode {
    match journal.record(0.0) {
        Ok(()) => {
            info!(path = %journal.path().display(), "Test weight recorded");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Test recording failed");
            ExitCode::FAILURE
        }
    }
}

fn open_source(config: &RuntimeConfig) -> io::Result<Box<dyn PulseSource>> {
    if let Some(kg) = config.simulate_kg {
        let frames = config.stable_frames as usize + SIMULATED_EXTRA_FRAMES;
        info!(weight_kg = kg, frames, "Simulating a weighing");
        let scale = SimulatedScale::weighing(kg, frames)
            .with_frame_interval(Duration::from_millis(config.sim_frame_ms));
        return Ok(Box::new(scale));
    }

    if let Some(path) = &config.replay_path {
        info!(path = %path.display(), "Replaying mode2 capture");
        return Ok(Box::new(Mode2Replay::open(path)?));
    }

    info!(device = %config.device.display(), "Opening LIRC receiver");
    Ok(Box::new(LircDevice::open(&config.device)?))
}

fn open_indicator(config: &RuntimeConfig) -> Arc<dyn Indicator> {
    let Some(path) = &config.led_path else {
        return Arc::new(NullIndicator);
    };
    match SysfsLed::new(path) {
        Ok(led) => {
            info!(path = %path.display(), "Status LED enabled");
            Arc::new(led)
        }
        Err(e) => {
            warn!(error = %e, "Status LED unavailable, continuing without it");
            Arc::new(NullIndicator)
        }
    }
}

fn wait_until_finished<T>(handle: &thread::JoinHandle<T>, limit: Duration) {
    let deadline = Instant::now() + limit;
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(JOIN_POLL);
    }
}

fn report(result: Result<DecodeStats, LoopError>) -> ExitCode {
    match result {
        Ok(stats) => {
            info!(
                frames_decoded = stats.frames_decoded,
                stable_frames = stats.stable_frames,
                decode_failures = stats.decode_failures,
                header_mismatches = stats.header_mismatches,
                checksum_failures = stats.checksum_failures,
                "Run complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Receiver failed");
            ExitCode::FAILURE
        }
    }
}
