use scale_core::{RecordingConfig, StabilityConfig};
use scale_io::lirc::DEFAULT_DEVICE;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub run_seconds: Option<u64>,
    pub device: PathBuf,
    pub replay_path: Option<PathBuf>,
    pub simulate_kg: Option<f64>,
    pub sim_frame_ms: u64,
    pub journal_path: PathBuf,
    pub led_path: Option<PathBuf>,
    pub stable_frames: u32,
    pub quiet_window_ms: u64,
    pub poll_ms: u64,
    pub metrics_addr: Option<String>,
    pub json_logs: bool,
    pub log_dir: Option<PathBuf>,
    pub debug: bool,
    pub test_recorder: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let stability = StabilityConfig::default();
        Self {
            show_help: false,
            run_seconds: None,
            device: PathBuf::from(DEFAULT_DEVICE),
            replay_path: None,
            simulate_kg: None,
            sim_frame_ms: 100,
            journal_path: PathBuf::from("weights.jsonl"),
            led_path: None,
            stable_frames: stability.stable_frames,
            quiet_window_ms: stability.quiet_window.as_millis() as u64,
            poll_ms: RecordingConfig::default().poll_interval.as_millis() as u64,
            metrics_addr: None,
            json_logs: false,
            log_dir: None,
            debug: false,
            test_recorder: false,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Self {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1);
            match args[i].as_str() {
                "--run-seconds" => {
                    if let Some(v) = value {
                        cfg.run_seconds = v.parse::<u64>().ok();
                        i += 1;
                    }
                }
                "--device" => {
                    if let Some(v) = value {
                        cfg.device = PathBuf::from(v);
                        i += 1;
                    }
                }
                "--replay" => {
                    if let Some(v) = value {
                        cfg.replay_path = Some(PathBuf::from(v));
                        i += 1;
                    }
                }
                "--simulate" => {
                    if let Some(v) = value {
                        cfg.simulate_kg = v.parse::<f64>().ok().filter(|kg| *kg > 0.0);
                        i += 1;
                    }
                }
                "--sim-frame-ms" => {
                    if let Some(v) = value {
                        cfg.sim_frame_ms = v.parse().unwrap_or(cfg.sim_frame_ms);
                        i += 1;
                    }
                }
                "--journal" => {
                    if let Some(v) = value {
                        cfg.journal_path = PathBuf::from(v);
                        i += 1;
                    }
                }
                "--led" => {
                    if let Some(v) = value {
                        cfg.led_path = Some(PathBuf::from(v));
                        i += 1;
                    }
                }
                "--stable-frames" => {
                    if let Some(v) = value {
                        cfg.stable_frames = v.parse().unwrap_or(cfg.stable_frames);
                        i += 1;
                    }
                }
                "--quiet-window-ms" => {
                    if let Some(v) = value {
                        cfg.quiet_window_ms = v.parse().unwrap_or(cfg.quiet_window_ms);
                        i += 1;
                    }
                }
                "--poll-ms" => {
                    if let Some(v) = value {
                        cfg.poll_ms = v.parse().unwrap_or(cfg.poll_ms);
                        i += 1;
                    }
                }
                "--metrics-addr" => {
                    if let Some(v) = value {
                        cfg.metrics_addr = Some(v.clone());
                        i += 1;
                    }
                }
                "--log-dir" => {
                    if let Some(v) = value {
                        cfg.log_dir = Some(PathBuf::from(v));
                        i += 1;
                    }
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--debug" => {
                    cfg.debug = true;
                }
                "--test" => {
                    cfg.test_recorder = true;
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                _ => {}
            }
            i += 1;
        }
        cfg
    }

    pub fn stability_config(&self) -> StabilityConfig {
        StabilityConfig {
            stable_frames: self.stable_frames,
            quiet_window: Duration::from_millis(self.quiet_window_ms),
        }
    }

    /// The arming threshold follows the stability threshold so a launch never
    /// precedes a recordable streak.
    pub fn recording_config(&self) -> RecordingConfig {
        let threshold = i64::from(self.stable_frames);
        RecordingConfig {
            trigger_threshold: threshold,
            rearm_sentinel: -threshold,
            poll_interval: Duration::from_millis(self.poll_ms.max(1)),
        }
    }

    pub fn print_help() {
        println!(
            r#"scale-monitor - Records settled readings from an IR bathroom scale

USAGE:
    scale-monitor [OPTIONS]

OPTIONS:
    --device <PATH>         LIRC receiver in mode2 [default: /dev/lirc0]
    --replay <PATH>         Replay a `mode2` text capture instead of the device
    --simulate <KG>         Feed a simulated weighing of KG instead of the device
    --sim-frame-ms <MS>     Interval between simulated frames [default: 100]
    --journal <PATH>        JSONL file receiving recorded weights [default: weights.jsonl]
    --led <PATH>            GPIO value file driving the status LED
    --stable-frames <N>     Consecutive stable frames before recording [default: 10]
    --quiet-window-ms <MS>  Quiet time after the last stable frame [default: 2000]
    --poll-ms <MS>          Recording task poll interval [default: 500]
    --run-seconds <SECS>    Run for a fixed duration then exit
    --test                  Record 0.0 once through the journal and exit
    --debug                 Log every frame and decoder rejection
    --json-logs             Output logs in JSON format (for log aggregation)
    --log-dir <DIR>         Also write daily-rolling log files into DIR
    --metrics-addr <ADDR>   Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log filter (e.g., RUST_LOG=debug,scale_core=trace)

EXAMPLES:
    # Record from the receiver with a status LED
    scale-monitor --led /sys/class/gpio/gpio17/value

    # Check the journal is writable
    scale-monitor --test --journal /var/lib/scale/weights.jsonl

    # Dry run without hardware
    scale-monitor --simulate 72.5 --debug
"#
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("scale-monitor")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn defaults_match_the_scale_protocol() {
        let cfg = RuntimeConfig::from_args(&args(&[]));
        assert_eq!(cfg.device, PathBuf::from("/dev/lirc0"));
        assert_eq!(cfg.stability_config(), StabilityConfig::default());
        assert_eq!(cfg.recording_config(), RecordingConfig::default());
        assert!(cfg.simulate_kg.is_none());
        assert!(!cfg.test_recorder);
    }

    #[test]
    fn parses_sources_and_tuning() {
        let cfg = RuntimeConfig::from_args(&args(&[
            "--simulate",
            "72.5",
            "--replay",
            "capture.txt",
            "--stable-frames",
            "4",
            "--quiet-window-ms",
            "300",
            "--poll-ms",
            "50",
            "--debug",
            "--run-seconds",
            "5",
        ]));
        assert_eq!(cfg.simulate_kg, Some(72.5));
        assert_eq!(cfg.replay_path, Some(PathBuf::from("capture.txt")));
        assert_eq!(cfg.run_seconds, Some(5));
        assert!(cfg.debug);

        let recording = cfg.recording_config();
        assert_eq!(recording.trigger_threshold, 4);
        assert_eq!(recording.rearm_sentinel, -4);
        assert_eq!(recording.poll_interval, Duration::from_millis(50));
        assert_eq!(
            cfg.stability_config().quiet_window,
            Duration::from_millis(300)
        );
    }

    #[test]
    fn invalid_numbers_keep_defaults() {
        let cfg = RuntimeConfig::from_args(&args(&["--stable-frames", "many", "--simulate", "-3"]));
        assert_eq!(cfg.stable_frames, 10);
        assert!(cfg.simulate_kg.is_none());
    }

    #[test]
    fn help_stops_parsing() {
        let cfg = RuntimeConfig::from_args(&args(&["-h", "--debug"]));
        assert!(cfg.show_help);
        assert!(!cfg.debug);
    }
}
