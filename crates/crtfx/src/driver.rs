//! Frame scheduling loop.
//!
//! The driver owns the cadence; the pipeline stays a pure function invoked
//! once per tick:
//!
//! ```text
//!   TimeSource ─▶ sample ─▶ SourceFeed::frame_at ─▶ render_frame (rayon)
//!        ▲                                              │
//!        └──────── FramePacer::delay ◀── FrameSink::present
//! ```
//!
//! Each iteration finishes presenting before the next time sample is taken, so
//! no frame can observe another frame's time.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::frame::{render_frame, Frame};
use crate::params::{validate_output, ConfigurationError};
use crate::pipeline::Pipeline;
use crate::runtime::{time_source_for_policy, RenderPolicy, TimeSample};
use crate::source::SourceFeed;

/// Frames closer than this to their deadline are rendered immediately.
const PACER_SLACK: Duration = Duration::from_micros(250);

/// Receives finished frames, in order.
pub trait FrameSink: Send {
    fn present(&mut self, frame: &Frame, sample: TimeSample) -> Result<()>;

    /// Called once after the last frame.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes every frame to `<dir>/frame-NNNNNN.png`.
#[derive(Debug)]
pub struct PngSequenceSink {
    dir: PathBuf,
    written: u64,
}

impl PngSequenceSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        Ok(Self { dir, written: 0 })
    }

    pub fn path_for(&self, frame_index: u64) -> PathBuf {
        self.dir.join(format!("frame-{frame_index:06}.png"))
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for PngSequenceSink {
    fn present(&mut self, frame: &Frame, sample: TimeSample) -> Result<()> {
        let path = self.path_for(sample.frame_index);
        frame.save_png(&path)?;
        self.written += 1;
        tracing::trace!(path = %path.display(), time = sample.seconds, "wrote frame");
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        tracing::info!(
            dir = %self.dir.display(),
            frames = self.written,
            "image sequence written"
        );
        Ok(())
    }
}

/// Writes frames to a single file; the last frame presented wins.
#[derive(Debug)]
pub struct PngStillSink {
    path: PathBuf,
    written: bool,
}

impl PngStillSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            written: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSink for PngStillSink {
    fn present(&mut self, frame: &Frame, sample: TimeSample) -> Result<()> {
        if self.written {
            tracing::debug!(path = %self.path.display(), "overwriting still frame");
        }
        frame.save_png(&self.path)?;
        self.written = true;
        tracing::debug!(time = sample.seconds, path = %self.path.display(), "wrote still frame");
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.written {
            tracing::info!(path = %self.path.display(), "still frame written");
        } else {
            tracing::warn!(path = %self.path.display(), "no frame was rendered");
        }
        Ok(())
    }
}

/// Deadline-based frame cap for the wall-clock policy.
#[derive(Debug, Clone)]
pub struct FramePacer {
    target_interval: Option<Duration>,
    next_deadline: Option<Instant>,
}

impl FramePacer {
    pub fn new(target_fps: Option<f32>) -> Self {
        let target_interval = target_fps.and_then(|fps| {
            if fps.is_finite() && fps > 0.0 {
                Some(Duration::from_secs_f64(1.0 / fps as f64))
            } else {
                None
            }
        });
        Self {
            target_interval,
            next_deadline: None,
        }
    }

    /// How long to wait at `now` before starting the next frame.
    ///
    /// Falling more than a whole interval behind re-anchors the schedule
    /// instead of rendering a burst of catch-up frames.
    pub fn delay(&mut self, now: Instant) -> Duration {
        let Some(interval) = self.target_interval else {
            return Duration::ZERO;
        };
        match self.next_deadline {
            Some(deadline) => {
                let wait = deadline.saturating_duration_since(now);
                let behind = now.saturating_duration_since(deadline);
                self.next_deadline = Some(if behind > interval {
                    now + interval
                } else {
                    deadline + interval
                });
                if wait <= PACER_SLACK {
                    Duration::ZERO
                } else {
                    wait
                }
            }
            None => {
                self.next_deadline = Some(now + interval);
                Duration::ZERO
            }
        }
    }
}

/// Outcome of [`Driver::run`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverSummary {
    pub frames: u64,
    pub last_time: Option<f32>,
    pub wall: Duration,
}

/// Owns the pipeline, the source and the presentation sink for one session.
pub struct Driver {
    pipeline: Pipeline,
    source: Box<dyn SourceFeed>,
    sink: Box<dyn FrameSink>,
    output: (u32, u32),
    stop: Arc<AtomicBool>,
}

impl Driver {
    pub fn new(
        pipeline: Pipeline,
        source: Box<dyn SourceFeed>,
        sink: Box<dyn FrameSink>,
        output: (u32, u32),
    ) -> Result<Self, ConfigurationError> {
        validate_output(output.0, output.1)?;
        Ok(Self {
            pipeline,
            source,
            sink,
            output,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that ends the loop after the frame in flight when set.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Runs frames until the policy is exhausted or the stop flag is raised.
    pub fn run(&mut self, policy: &RenderPolicy) -> Result<DriverSummary> {
        let (width, height) = self.output;
        let mut clock = time_source_for_policy(policy);
        let mut pacer = match policy {
            RenderPolicy::Animate { target_fps, .. } => FramePacer::new(*target_fps),
            _ => FramePacer::new(None),
        };

        tracing::info!(
            source = %self.source.describe(),
            width,
            height,
            policy = ?policy,
            "starting render loop"
        );

        let started = Instant::now();
        let mut stats = FrameStats::new(started);
        let mut frames = 0u64;
        let mut last_time: Option<f32> = None;

        loop {
            if self.stop.load(Ordering::Relaxed) {
                tracing::info!("stop requested; leaving render loop");
                break;
            }
            if policy_exhausted(policy, frames, started.elapsed()) {
                break;
            }

            let wait = pacer.delay(Instant::now());
            if !wait.is_zero() {
                thread::sleep(wait);
            }

            let sample = clock.sample();
            let seconds = hold_monotonic(last_time, sample.seconds);
            let sample = TimeSample::new(seconds, sample.frame_index);

            let texture = self.source.frame_at(seconds);
            let frame = render_frame(&self.pipeline, texture.as_ref(), seconds, width, height);
            self.sink.present(&frame, sample)?;

            frames += 1;
            last_time = Some(seconds);
            stats.record(Instant::now(), frames, seconds);
        }

        self.sink.finish()?;
        let wall = started.elapsed();
        tracing::info!(
            frames,
            elapsed = %format_elapsed(wall),
            wall_ms = wall.as_millis() as u64,
            "render loop finished"
        );
        Ok(DriverSummary {
            frames,
            last_time,
            wall,
        })
    }
}

fn policy_exhausted(policy: &RenderPolicy, frames: u64, elapsed: Duration) -> bool {
    match policy {
        RenderPolicy::Animate { limit, .. } => limit.reached(frames, elapsed),
        RenderPolicy::Still { .. } => frames >= 1,
        RenderPolicy::Offline { frames: total, .. } => frames >= *total,
    }
}

/// Keeps the time fed to the pipeline non-decreasing across frames.
fn hold_monotonic(previous: Option<f32>, seconds: f32) -> f32 {
    match previous {
        Some(last) if seconds < last => {
            tracing::warn!(
                last,
                sampled = seconds,
                "time source went backwards; holding previous time"
            );
            last
        }
        _ => seconds,
    }
}

/// Clock readout `HH:MM:SS`, counting the running second as already started.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs() + 1;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Once-a-second throughput logging.
struct FrameStats {
    session_start: Instant,
    window_start: Instant,
    frames_in_window: u64,
}

impl FrameStats {
    fn new(now: Instant) -> Self {
        Self {
            session_start: now,
            window_start: now,
            frames_in_window: 0,
        }
    }

    fn record(&mut self, now: Instant, frame_count: u64, time: f32) {
        self.frames_in_window += 1;
        let window = now.saturating_duration_since(self.window_start);
        if window >= Duration::from_secs(1) {
            let fps = self.frames_in_window as f32 / window.as_secs_f32();
            tracing::debug!(
                fps = fps.round(),
                frame_count,
                time,
                elapsed = %format_elapsed(now.saturating_duration_since(self.session_start)),
                "render stats"
            );
            self.frames_in_window = 0;
            self.window_start = now;
        }
    }
}
