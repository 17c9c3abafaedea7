//! Retro CRT post-processing.
//!
//! The crate turns a flat source picture into what it would look like on an
//! old curved tube. The flow for one session is:
//!
//! ```text
//!   CrtParams ──▶ Pipeline::new (validated once)
//!                      │
//!   Driver::run ──▶ TimeSource ─▶ SourceFeed ─▶ render_frame ─▶ FrameSink
//!                                                  │
//!                                                  └─▶ Pipeline::render per pixel (rayon)
//! ```
//!
//! [`Pipeline`] is a pure function of pixel, time, source and parameters; all
//! scheduling and presentation live in [`driver`].

pub mod driver;
pub mod frame;
pub mod params;
pub mod pipeline;
pub mod runtime;
pub mod source;
pub mod texture;

pub use driver::{
    format_elapsed, Driver, DriverSummary, FramePacer, FrameSink, PngSequenceSink, PngStillSink,
};
pub use frame::{render_frame, Frame};
pub use glam;
pub use params::{validate_output, ConfigurationError, CrtParams, Stages};
pub use pipeline::Pipeline;
pub use runtime::{
    time_source_for_policy, BoxedTimeSource, FixedTimeSource, FrameLimit, RenderPolicy,
    SteppedTimeSource, SystemTimeSource, TimeSample, TimeSource,
};
pub use source::{open_source, ImageSequence, SourceFeed, StaticSource};
pub use texture::{Sampler, SourceTexture};
