//! Scrolling pitch visualization.
//!
//! [`compute_frame`] is a pure function from a session snapshot to a list of
//! draw commands; [`RendererLoop`] paces it and hands the commands to a
//! [`DrawSurface`].

use crate::classifier::{classify, Verdict};
use crate::notes::{midi_to_hz, note_name};
use crate::pattern::TargetPattern;
use crate::session::{lock, RecordingSession, SharedSession};
use crate::timeline::{synchronized_time, PlaybackClock, Timeline};
use crate::types::PitchSample;
use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use log::{debug, info, trace};
use std::io;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Bottom of the frequency axis (≈ C2).
pub const MIN_DISPLAY_HZ: f32 = 65.0;
/// Top of the frequency axis (≈ C6).
pub const MAX_DISPLAY_HZ: f32 = 1046.0;
/// Seconds of timeline visible across the full width.
pub const VISIBLE_SECONDS: f64 = 4.0;
/// Playhead position as a fraction of the width.
pub const PLAYHEAD_FRACTION: f32 = 0.2;
/// Trail segments ending further left than this are skipped.
pub const OFFSCREEN_MARGIN: f32 = 10.0;
/// Consecutive samples further apart than this are not joined.
pub const MAX_TRAIL_GAP: f64 = 0.25;
/// Height of a target note bar in pixels.
pub const NOTE_BAR_HEIGHT: f32 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

pub const BACKGROUND: Rgb = Rgb(17, 24, 39);
pub const GRID: Rgb = Rgb(55, 65, 81);
pub const TARGET: Rgb = Rgb(96, 165, 250);
pub const PLAYHEAD: Rgb = Rgb(250, 204, 21);
pub const HIT: Rgb = Rgb(34, 197, 94);
pub const MISS: Rgb = Rgb(239, 68, 68);
pub const NEUTRAL: Rgb = Rgb(156, 163, 175);
pub const TEXT: Rgb = Rgb(243, 244, 246);

pub fn verdict_color(verdict: Verdict) -> Rgb {
    match verdict {
        Verdict::Hit => HIT,
        Verdict::Miss => MISS,
        Verdict::Neutral => NEUTRAL,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    FillRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Rgb,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        width: f32,
        color: Rgb,
    },
    Text {
        x: f32,
        y: f32,
        text: String,
        color: Rgb,
    },
}

impl DrawCommand {
    pub fn color(&self) -> Rgb {
        match self {
            DrawCommand::FillRect { color, .. }
            | DrawCommand::Line { color, .. }
            | DrawCommand::Text { color, .. } => *color,
        }
    }
}

/// Logarithmic frequency → y. Out-of-range frequencies saturate at the edges.
pub fn freq_to_y(frequency: f32, height: f32) -> f32 {
    let norm = if frequency > 0.0 {
        ((frequency / MIN_DISPLAY_HZ).ln() / (MAX_DISPLAY_HZ / MIN_DISPLAY_HZ).ln()).clamp(0.0, 1.0)
    } else {
        0.0
    };
    height - norm * height
}

pub fn playhead_x(width: f32) -> f32 {
    width * PLAYHEAD_FRACTION
}

pub fn time_to_x(time: f64, current_time: f64, width: f32) -> f32 {
    let pixels_per_second = width as f64 / VISIBLE_SECONDS;
    playhead_x(width) + ((time - current_time) * pixels_per_second) as f32
}

/// Everything one frame needs, copied out of the session so drawing happens
/// without holding the lock.
#[derive(Debug, Clone)]
pub struct FrameInput {
    pub current_time: f64,
    pub history: Vec<PitchSample>,
    pub pattern: Arc<TargetPattern>,
    pub current_pitch: Option<f32>,
}

impl FrameInput {
    pub fn from_session(session: &RecordingSession, playback: Option<PlaybackClock>) -> Self {
        let elapsed = session.started_at().map(|t| t.elapsed());
        Self {
            current_time: synchronized_time(playback, elapsed),
            history: session.history().to_vec(),
            pattern: session.pattern(),
            current_pitch: session.current_pitch(),
        }
    }
}

/// Lay out one frame. Later commands occlude earlier ones.
pub fn compute_frame(input: &FrameInput, width: f32, height: f32) -> Vec<DrawCommand> {
    if !(width > 0.0 && height > 0.0) {
        return Vec::new();
    }
    let mut out = Vec::new();

    out.push(DrawCommand::FillRect {
        x: 0.0,
        y: 0.0,
        width,
        height,
        color: BACKGROUND,
    });

    // One grid line per C from C2 to C6
    for midi in (36..=84).step_by(12) {
        let y = freq_to_y(midi_to_hz(midi as f64) as f32, height);
        out.push(DrawCommand::Line {
            x1: 0.0,
            y1: y,
            x2: width,
            y2: y,
            width: 1.0,
            color: GRID,
        });
    }

    push_targets(&mut out, input, width, height);

    let px = playhead_x(width);
    out.push(DrawCommand::Line {
        x1: px,
        y1: 0.0,
        x2: px,
        y2: height,
        width: 2.0,
        color: PLAYHEAD,
    });

    push_trail(&mut out, input, width, height);

    if let Some(f) = input.current_pitch {
        out.push(DrawCommand::Text {
            x: 8.0,
            y: 16.0,
            text: format!("{:.1} Hz  {}", f, note_name(f)),
            color: TEXT,
        });
    }

    out
}

fn push_targets(out: &mut Vec<DrawCommand>, input: &FrameInput, width: f32, height: f32) {
    match input.pattern.as_ref() {
        TargetPattern::Intervals { .. } => {
            // No timing: each target pitch is a reference line across the view
            for f in input.pattern.interval_frequencies() {
                let y = freq_to_y(f, height);
                out.push(DrawCommand::Line {
                    x1: 0.0,
                    y1: y,
                    x2: width,
                    y2: y,
                    width: 2.0,
                    color: TARGET,
                });
            }
        }
        TargetPattern::Timed(notes) => {
            let behind = PLAYHEAD_FRACTION as f64 * VISIBLE_SECONDS;
            let from = input.current_time - behind;
            let to = input.current_time + (VISIBLE_SECONDS - behind);
            for note in notes.iter().filter(|n| n.overlaps(from, to)) {
                let x1 = time_to_x(note.start_time, input.current_time, width);
                let x2 = time_to_x(note.end_time(), input.current_time, width);
                let y = freq_to_y(note.frequency, height);
                out.push(DrawCommand::FillRect {
                    x: x1,
                    y: y - NOTE_BAR_HEIGHT / 2.0,
                    width: x2 - x1,
                    height: NOTE_BAR_HEIGHT,
                    color: TARGET,
                });
            }
        }
    }
}

/// Trail segments, oldest first. Walks back from the newest sample and stops
/// at the first segment that ends off the left edge, so the cost does not
/// grow with history length.
fn push_trail(out: &mut Vec<DrawCommand>, input: &FrameInput, width: f32, height: f32) {
    let mut segments = Vec::new();
    for pair in input.history.windows(2).rev() {
        let (a, b) = (&pair[0], &pair[1]);
        let x2 = time_to_x(b.time, input.current_time, width);
        if x2 < -OFFSCREEN_MARGIN {
            break;
        }
        if b.time - a.time > MAX_TRAIL_GAP {
            continue;
        }
        segments.push(DrawCommand::Line {
            x1: time_to_x(a.time, input.current_time, width),
            y1: freq_to_y(a.frequency, height),
            x2,
            y2: freq_to_y(b.frequency, height),
            width: 2.0,
            color: verdict_color(classify(a, &input.pattern)),
        });
    }
    segments.reverse();
    out.extend(segments);
}

/// Something the renderer can draw on.
///
/// `size()` is None while the surface is not attached; frames are skipped.
pub trait DrawSurface: Send {
    fn size(&self) -> Option<(f32, f32)>;
    fn draw(&mut self, commands: &[DrawCommand]);
}

pub type SharedSurface = Arc<Mutex<dyn DrawSurface>>;

/// Headless surface that keeps the last frame.
#[derive(Debug, Default)]
pub struct FrameCapture {
    size: Option<(f32, f32)>,
    last: Vec<DrawCommand>,
    frames: u64,
}

impl FrameCapture {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            size: Some((width, height)),
            ..Self::default()
        }
    }

    /// A surface that never reports a size.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn last_frame(&self) -> &[DrawCommand] {
        &self.last
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }
}

impl DrawSurface for FrameCapture {
    fn size(&self) -> Option<(f32, f32)> {
        self.size
    }

    fn draw(&mut self, commands: &[DrawCommand]) {
        self.last = commands.to_vec();
        self.frames += 1;
    }
}

/// Draw one frame for `generation`. Returns false once that generation is over.
pub fn render_frame(
    session: &SharedSession,
    timeline: &Timeline,
    surface: &SharedSurface,
    generation: u64,
) -> bool {
    let clock = timeline.playback_clock();
    let input = {
        let s = lock(session);
        if !s.is_live(generation) {
            return false;
        }
        FrameInput::from_session(&s, clock)
    };

    let mut surface = lock(surface);
    let Some((width, height)) = surface.size() else {
        return true;
    };
    let commands = compute_frame(&input, width, height);
    surface.draw(&commands);
    true
}

/// The per-frame renderer task.
///
/// Waits on the frame ticker or the cancel channel, whichever comes first.
/// [`RendererLoop::cancel`] drops the cancel sender, so a pending frame is
/// abandoned without drawing.
pub struct RendererLoop {
    cancel_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl RendererLoop {
    pub fn spawn(
        session: SharedSession,
        timeline: Timeline,
        surface: SharedSurface,
        generation: u64,
        frame_interval: Duration,
    ) -> io::Result<Self> {
        let (cancel_tx, cancel_rx) = bounded::<()>(0);
        let thread = thread::Builder::new()
            .name("renderer".into())
            .spawn(move || {
                run(cancel_rx, &session, &timeline, &surface, generation, frame_interval)
            })?;
        info!(
            "Renderer started at {:.0} fps",
            1.0 / frame_interval.as_secs_f64().max(1e-3)
        );
        Ok(Self {
            cancel_tx: Some(cancel_tx),
            thread: Some(thread),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancel the pending frame and wait for the thread. Idempotent.
    pub fn cancel(&mut self) {
        drop(self.cancel_tx.take());
        if let Some(t) = self.thread.take() {
            let _ = t.join();
            info!("Renderer stopped");
        }
    }
}

impl Drop for RendererLoop {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn run(
    cancel_rx: Receiver<()>,
    session: &SharedSession,
    timeline: &Timeline,
    surface: &SharedSurface,
    generation: u64,
    frame_interval: Duration,
) {
    let ticker = tick(frame_interval);
    let mut frames: u64 = 0;
    loop {
        select! {
            recv(cancel_rx) -> _ => break,
            recv(ticker) -> _ => {
                if !render_frame(session, timeline, surface, generation) {
                    break;
                }
                frames += 1;
                if frames % 600 == 0 {
                    trace!("Renderer: {} frames", frames);
                }
            }
        }
    }
    debug!("Renderer exiting after {} frames", frames);
}
