use crate::classifier::classify;
use crate::pattern::TargetPattern;
use crate::recorder::{CompletedRecording, RecorderEvent};
use crossbeam_channel::Receiver;
use log::{error, info, warn};
use serde_json::json;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Output artifact consumer: saves each finished recording to its own
/// `session_<ts>` directory.
///
/// ```text
/// session_1718000000/
///   recording.wav    the encoder's artifact, byte for byte
///   pitch.jsonl      one {time, frequency, verdict} per line
///   manifest.json    pattern, tally, audio stats
/// ```
pub struct DataLogger {
    output_dir: PathBuf,
}

impl DataLogger {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
        }
    }

    /// Consume events until the recorder side hangs up. Returns the session
    /// directories written.
    pub fn run(&self, rx: &Receiver<RecorderEvent>) -> Vec<PathBuf> {
        let mut written = Vec::new();
        for event in rx.iter() {
            if let Some(dir) = self.handle(&event) {
                written.push(dir);
            }
        }
        written
    }

    pub fn handle(&self, event: &RecorderEvent) -> Option<PathBuf> {
        match event {
            RecorderEvent::RecordingComplete(done) => match self.save(done) {
                Ok(dir) => Some(dir),
                Err(e) => {
                    error!("Failed to save session: {}", e);
                    None
                }
            },
            RecorderEvent::StartFailed { message } => {
                warn!("Nothing to save: {}", message);
                None
            }
        }
    }

    pub fn save(&self, done: &CompletedRecording) -> io::Result<PathBuf> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let session_dir = unique_dir(&self.output_dir, timestamp);
        fs::create_dir_all(&session_dir)?;

        fs::write(session_dir.join("recording.wav"), &done.audio.bytes)?;

        let mut pitch = BufWriter::new(File::create(session_dir.join("pitch.jsonl"))?);
        for sample in &done.history {
            let line = json!({
                "time": sample.time,
                "frequency": sample.frequency,
                "verdict": classify(sample, &done.pattern),
            });
            writeln!(pitch, "{}", line)?;
        }
        pitch.flush()?;

        let manifest = json!({
            "version": env!("CARGO_PKG_VERSION"),
            "system": "voice-trace",
            "pattern": pattern_json(&done.pattern),
            "tally": {
                "hits": done.tally.hits,
                "misses": done.tally.misses,
                "neutral": done.tally.neutral,
                "hit_rate": done.tally.hit_rate(),
            },
            "audio": {
                "file": "recording.wav",
                "media_type": done.audio.media_type,
                "sample_rate": done.audio.sample_rate,
                "sample_count": done.audio.sample_count,
                "duration_secs": done.audio.duration_secs(),
                "bytes": done.audio.bytes.len(),
            },
            "pitch_samples": done.history.len(),
        });
        let text = serde_json::to_string_pretty(&manifest).map_err(io::Error::other)?;
        fs::write(session_dir.join("manifest.json"), text)?;

        info!(
            "Session saved: {:.2}s audio, {} pitch samples, {} → {:?}",
            done.audio.duration_secs(),
            done.history.len(),
            done.tally,
            session_dir
        );
        Ok(session_dir)
    }
}

fn unique_dir(root: &Path, timestamp: u64) -> PathBuf {
    let base = root.join(format!("session_{}", timestamp));
    if !base.exists() {
        return base;
    }
    (1..)
        .map(|n| root.join(format!("session_{}_{}", timestamp, n)))
        .find(|p| !p.exists())
        .unwrap_or(base)
}

fn pattern_json(pattern: &TargetPattern) -> serde_json::Value {
    match pattern {
        TargetPattern::Intervals { root_hz, offsets } => json!({
            "mode": "intervals",
            "root_hz": root_hz,
            "offsets": offsets,
        }),
        TargetPattern::Timed(notes) => json!({
            "mode": "timed",
            "notes": notes,
        }),
    }
}
