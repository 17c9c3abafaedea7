use std::time::{Duration, Instant};

/// High-level behaviour requested by the caller.
///
/// The render policy decides whether frames follow the wall clock, are
/// evaluated once at a fixed timestamp, or are stepped deterministically for
/// offline export.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderPolicy {
    /// Follow the monotonic clock, optionally capping the frame rate.
    Animate {
        /// Optional requested frames-per-second cap.
        target_fps: Option<f32>,
        /// When to stop; unbounded when both fields are empty.
        limit: FrameLimit,
    },
    /// Render a single still frame at an optional timestamp.
    Still {
        /// Specific timestamp to evaluate the pipeline at (seconds).
        time: Option<f32>,
    },
    /// Render `frames` frames spaced `1 / fps` apart starting at `start`,
    /// as fast as the machine allows.
    Offline { fps: f32, start: f32, frames: u64 },
}

impl Default for RenderPolicy {
    fn default() -> Self {
        Self::Animate {
            target_fps: None,
            limit: FrameLimit::default(),
        }
    }
}

impl RenderPolicy {
    /// Upper bound on the number of frames this policy produces, if any.
    pub fn frame_budget(&self) -> Option<u64> {
        match self {
            RenderPolicy::Animate { limit, .. } => limit.frames,
            RenderPolicy::Still { .. } => Some(1),
            RenderPolicy::Offline { frames, .. } => Some(*frames),
        }
    }
}

/// Stop conditions for [`RenderPolicy::Animate`]; whichever is hit first wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameLimit {
    pub frames: Option<u64>,
    pub duration: Option<Duration>,
}

impl FrameLimit {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// True once `frames_done` or `elapsed` passes either limit.
    pub fn reached(&self, frames_done: u64, elapsed: Duration) -> bool {
        self.frames.is_some_and(|max| frames_done >= max)
            || self.duration.is_some_and(|max| elapsed >= max)
    }
}

/// Snapshot of the time state supplied to one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    /// Elapsed wall-clock or simulated time in seconds.
    pub seconds: f32,
    /// Monotonic frame counter for the running session.
    pub frame_index: u64,
}

impl TimeSample {
    /// Creates a new time sample.
    pub fn new(seconds: f32, frame_index: u64) -> Self {
        Self {
            seconds,
            frame_index,
        }
    }
}

/// Abstraction over where time values originate from.
pub trait TimeSource: Send {
    /// Resets the source to its initial state.
    fn reset(&mut self);
    /// Produces a time sample for the next frame.
    fn sample(&mut self) -> TimeSample;
}

/// Time source backed by the system monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
    frame: u64,
}

impl SystemTimeSource {
    /// Creates a system time source initialised to `Instant::now()`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            frame: 0,
        }
    }
}

impl TimeSource for SystemTimeSource {
    fn reset(&mut self) {
        self.origin = Instant::now();
        self.frame = 0;
    }

    fn sample(&mut self) -> TimeSample {
        let elapsed = self.origin.elapsed();
        let sample = TimeSample::new(elapsed.as_secs_f32(), self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

/// Time source that always reports a fixed timestamp.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeSource {
    time: f32,
    frame: u64,
}

impl FixedTimeSource {
    /// Constructs a fixed time source that always returns the provided time.
    pub fn new(time: f32) -> Self {
        Self { time, frame: 0 }
    }

    /// Accesses the fixed timestamp without advancing the frame counter.
    pub fn time(&self) -> f32 {
        self.time
    }
}

impl TimeSource for FixedTimeSource {
    fn reset(&mut self) {
        self.frame = 0;
    }

    fn sample(&mut self) -> TimeSample {
        let sample = TimeSample::new(self.time, self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

/// Deterministic clock advancing by `1 / fps` per sample.
#[derive(Debug, Clone, Copy)]
pub struct SteppedTimeSource {
    start: f32,
    step: f64,
    frame: u64,
}

impl SteppedTimeSource {
    pub fn new(start: f32, fps: f32) -> Self {
        let step = if fps > 0.0 { 1.0 / fps as f64 } else { 0.0 };
        Self {
            start,
            step,
            frame: 0,
        }
    }
}

impl TimeSource for SteppedTimeSource {
    fn reset(&mut self) {
        self.frame = 0;
    }

    fn sample(&mut self) -> TimeSample {
        // Accumulate in f64 so long exports do not drift.
        let seconds = self.start as f64 + self.frame as f64 * self.step;
        let sample = TimeSample::new(seconds as f32, self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

/// Convenient alias for owning time sources behind trait objects.
pub type BoxedTimeSource = Box<dyn TimeSource + Send>;

/// Builds a time source suited to the requested render policy.
pub fn time_source_for_policy(policy: &RenderPolicy) -> BoxedTimeSource {
    match policy {
        RenderPolicy::Animate { .. } => Box::new(SystemTimeSource::new()),
        RenderPolicy::Still { time } => Box::new(FixedTimeSource::new(time.unwrap_or(0.0))),
        RenderPolicy::Offline { fps, start, .. } => Box::new(SteppedTimeSource::new(*start, *fps)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_time_is_monotonic() {
        let mut source = SystemTimeSource::new();
        let first = source.sample();
        let second = source.sample();
        assert!(second.seconds >= first.seconds);
        assert_eq!(first.frame_index, 0);
        assert_eq!(second.frame_index, 1);
        source.reset();
        assert_eq!(source.sample().frame_index, 0);
    }

    #[test]
    fn fixed_time_never_moves() {
        let mut source = FixedTimeSource::new(2.5);
        assert_eq!(source.sample().seconds, 2.5);
        assert_eq!(source.sample().seconds, 2.5);
        assert_eq!(source.time(), 2.5);
    }

    #[test]
    fn stepped_time_advances_by_frame_period() {
        let mut source = SteppedTimeSource::new(1.0, 4.0);
        let samples: Vec<f32> = (0..5).map(|_| source.sample().seconds).collect();
        assert_eq!(samples, vec![1.0, 1.25, 1.5, 1.75, 2.0]);
    }

    #[test]
    fn policy_selects_matching_source() {
        let mut still = time_source_for_policy(&RenderPolicy::Still { time: Some(7.0) });
        assert_eq!(still.sample().seconds, 7.0);

        let mut offline = time_source_for_policy(&RenderPolicy::Offline {
            fps: 10.0,
            start: 0.0,
            frames: 3,
        });
        offline.sample();
        assert!((offline.sample().seconds - 0.1).abs() < 1e-6);
    }

    #[test]
    fn frame_limit_stops_on_first_condition() {
        let limit = FrameLimit {
            frames: Some(10),
            duration: Some(Duration::from_secs(2)),
        };
        assert!(!limit.reached(3, Duration::from_millis(500)));
        assert!(limit.reached(10, Duration::from_millis(500)));
        assert!(limit.reached(3, Duration::from_secs(2)));
        assert!(!FrameLimit::unbounded().reached(u64::MAX, Duration::MAX));
    }

    #[test]
    fn frame_budget_reflects_policy() {
        assert_eq!(RenderPolicy::default().frame_budget(), None);
        assert_eq!(RenderPolicy::Still { time: None }.frame_budget(), Some(1));
        assert_eq!(
            RenderPolicy::Offline {
                fps: 30.0,
                start: 0.0,
                frames: 90
            }
            .frame_budget(),
            Some(90)
        );
    }
}
