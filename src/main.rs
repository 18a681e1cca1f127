#[cfg(feature = "audio")]
use voice_trace::audio_input::CpalMicrophone;
#[cfg(feature = "audio")]
use voice_trace::audio_output::SpeakerPlayback;
use voice_trace::config::EngineConfig;
use voice_trace::console_display::ConsoleDisplay;
use voice_trace::data_logger::DataLogger;
use voice_trace::estimator::YinEstimatorFactory;
use voice_trace::microphone::{MicrophoneSource, SimulatedMicrophone};
use voice_trace::notes::parse_note_name;
use voice_trace::pattern::{
    expand_intervals, Exercise, TargetPattern, DEFAULT_NOTE_DURATION, DEFAULT_NOTE_GAP,
};
use voice_trace::playback::{BackingTrack, SharedPlayback};
use voice_trace::recorder::Recorder;
use voice_trace::render::{FrameCapture, SharedSurface};
use voice_trace::types::TargetNote;
use voice_trace::wav_source::WavFileMicrophone;

use clap::Parser;
use crossbeam_channel::unbounded;
#[cfg(feature = "audio")]
use log::warn;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "voice-trace")]
#[command(about = "Real-time pitch tracking against a target melody")]
struct Cli {
    /// Exercise definition (JSON). Overrides --root/--intervals/--timed.
    #[arg(long)]
    exercise: Option<PathBuf>,

    /// Root note as a name (C4, F#3) or in Hz
    #[arg(long, default_value = "C4")]
    root: String,

    /// Semitone offsets from the root, comma separated
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true, default_value = "0,4,7")]
    intervals: Vec<i32>,

    /// Sing the intervals as a timed sequence instead of a free interval set
    #[arg(long)]
    timed: bool,

    /// Seconds per note when expanding intervals
    #[arg(long, default_value_t = DEFAULT_NOTE_DURATION)]
    note_duration: f64,

    /// Silence between expanded notes (seconds)
    #[arg(long, default_value_t = DEFAULT_NOTE_GAP)]
    gap: f64,

    /// Replay a WAV take instead of the simulated singer
    #[arg(long)]
    input_wav: Option<PathBuf>,

    /// Capture from the default input device
    #[cfg(feature = "audio")]
    #[arg(long)]
    mic: bool,

    /// Detune the simulated singer by this many cents
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    detune: f64,

    /// Play the rendered guide tones as the reference track
    /// (through the speakers in `audio` builds, otherwise as a silent clock)
    #[arg(long)]
    backing: bool,

    /// Use a WAV file as the reference track
    #[arg(long)]
    backing_wav: Option<PathBuf>,

    /// Recording length in seconds (default: pattern length + 0.5, or 5)
    #[arg(long)]
    duration: Option<f64>,

    /// Output directory for saved sessions
    #[arg(long, default_value = "./sessions")]
    output_dir: PathBuf,

    /// Draw the live view in the terminal
    #[arg(long)]
    console: bool,

    /// Console refresh rate (Hz)
    #[arg(long, default_value_t = 15)]
    display_hz: u32,

    /// Engine config (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn parse_root(root: &str) -> Result<f32, String> {
    if let Ok(hz) = root.parse::<f32>() {
        if hz > 0.0 && hz.is_finite() {
            return Ok(hz);
        }
        return Err(format!("root frequency must be positive, got {}", root));
    }
    parse_note_name(root).map_err(|e| e.to_string())
}

fn build_pattern(cli: &Cli) -> Result<TargetPattern, String> {
    if let Some(path) = &cli.exercise {
        return Exercise::load(path)
            .and_then(|ex| ex.to_pattern())
            .map_err(|e| e.to_string());
    }
    let root_hz = parse_root(&cli.root)?;
    if cli.timed {
        TargetPattern::timed(expand_intervals(root_hz, &cli.intervals, cli.note_duration, cli.gap))
            .map_err(|e| e.to_string())
    } else {
        Ok(TargetPattern::intervals(root_hz, cli.intervals.clone()))
    }
}

/// The melody the simulated singer and the guide track follow.
fn melody(pattern: &TargetPattern, cli: &Cli) -> Vec<TargetNote> {
    match pattern {
        TargetPattern::Timed(notes) => notes.clone(),
        TargetPattern::Intervals { root_hz, offsets } => {
            expand_intervals(*root_hz, offsets, cli.note_duration, cli.gap)
        }
    }
}

fn build_microphone(cli: &Cli, notes: &[TargetNote], config: &EngineConfig) -> Box<dyn MicrophoneSource> {
    #[cfg(feature = "audio")]
    if cli.mic {
        info!("  Input: default capture device");
        return Box::new(CpalMicrophone::new().with_sample_rate(config.sample_rate));
    }
    if let Some(path) = &cli.input_wav {
        info!("  Input: {:?}", path);
        return Box::new(WavFileMicrophone::new(path.clone()));
    }
    info!("  Input: simulated singer ({:+.0} cents)", cli.detune);
    Box::new(SimulatedMicrophone::singing(notes, config.sample_rate, cli.detune))
}

/// Route the track to the output device when there is one. Without it the
/// track still drives the timeline as a silent transport.
fn audible(track: BackingTrack) -> SharedPlayback {
    #[cfg(feature = "audio")]
    {
        let duration = track.duration();
        match SpeakerPlayback::open(track.clone()) {
            Ok(speaker) => {
                info!("  Backing: {:.2}s through the default output", duration);
                return Arc::new(Mutex::new(speaker));
            }
            Err(e) => warn!("{}; backing track will be silent", e),
        }
    }
    Arc::new(Mutex::new(track))
}

fn build_playback(cli: &Cli, notes: &[TargetNote], config: &EngineConfig) -> Option<SharedPlayback> {
    if let Some(path) = &cli.backing_wav {
        match BackingTrack::from_wav(path) {
            Ok(track) => return Some(audible(track)),
            Err(e) => error!("Backing track {:?}: {}; continuing without it", path, e),
        }
    }
    if cli.backing {
        let track = BackingTrack::from_notes(notes, config.sample_rate);
        info!("  Backing: guide tones, {:.2}s", track.duration());
        return Some(audible(track));
    }
    None
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = cli
        .config
        .as_deref()
        .map(EngineConfig::load)
        .unwrap_or_default();

    let pattern = match build_pattern(&cli) {
        Ok(p) => p,
        Err(e) => {
            error!("Invalid target pattern: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let notes = melody(&pattern, &cli);
    let duration = cli.duration.unwrap_or(match &pattern {
        TargetPattern::Timed(_) => pattern.duration() + 0.5,
        TargetPattern::Intervals { .. } => 5.0,
    });

    info!("═══════════════════════════════════════════════");
    info!("  VOICE TRACE v{}", env!("CARGO_PKG_VERSION"));
    match &pattern {
        TargetPattern::Intervals { root_hz, offsets } => {
            info!("  Target: intervals {:?} over {:.2} Hz", offsets, root_hz)
        }
        TargetPattern::Timed(n) => info!("  Target: {} timed notes", n.len()),
    }
    let microphone = build_microphone(&cli, &notes, &config);
    let playback = build_playback(&cli, &notes, &config);
    if cli.console {
        info!("  UI: Console");
    }
    info!("  Duration: {:.1}s", duration);
    info!("═══════════════════════════════════════════════");

    let surface: SharedSurface = if cli.console {
        Arc::new(Mutex::new(ConsoleDisplay::new(
            config.canvas_width,
            config.canvas_height,
            config.fps,
            cli.display_hz,
        )))
    } else {
        Arc::new(Mutex::new(FrameCapture::new(config.canvas_width, config.canvas_height)))
    };

    let (events_tx, events_rx) = unbounded();
    let estimators = Box::new(YinEstimatorFactory::new(config.clone()));
    let mut recorder = Recorder::new(microphone, estimators, surface, events_tx, config)
        .with_pattern(pattern);
    if let Some(p) = playback {
        recorder = recorder.with_playback(p);
    }

    let logger = DataLogger::new(&cli.output_dir);

    if recorder.start().is_err() {
        drop(recorder);
        logger.run(&events_rx);
        return ExitCode::FAILURE;
    }

    let started = Instant::now();
    let total = Duration::from_secs_f64(duration.max(0.0));
    while started.elapsed() < total {
        thread::sleep(Duration::from_secs(1).min(total.saturating_sub(started.elapsed())));
        if !cli.console {
            info!("{:>5.1}s  {}", started.elapsed().as_secs_f64(), recorder.tally());
        }
    }

    let stopped = recorder.stop();
    drop(recorder);
    let saved = logger.run(&events_rx);

    match stopped {
        Ok(()) => {
            for dir in saved {
                info!("Saved {:?}", dir);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
