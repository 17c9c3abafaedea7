use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use crtconfig::{CrtConfig, ScreenSection};
use crtfx::glam::Vec2;
use crtfx::{CrtParams, FrameLimit, RenderPolicy, Stages};
use tracing::{debug, info};

use crate::cli::RunArgs;
use crate::paths::AppPaths;

pub const DEFAULT_OUTPUT_SIZE: (u32, u32) = (800, 600);
pub const DEFAULT_OFFLINE_FPS: f32 = 30.0;
pub const DEFAULT_SEQUENCE_FPS: f32 = 24.0;
pub const DEFAULT_STILL_OUTPUT: &str = "crtview.png";
pub const DEFAULT_SEQUENCE_OUTPUT: &str = "crtview-frames";

/// Where the configuration came from, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    Explicit(PathBuf),
    UserDefault(PathBuf),
    BuiltIn,
}

/// How finished frames are presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// One file, rewritten for every frame.
    File(PathBuf),
    /// `frame-NNNNNN.png` files inside a directory.
    Sequence(PathBuf),
}

/// Everything needed to start one render session.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub params: CrtParams,
    pub stages: Stages,
    pub output_size: (u32, u32),
    pub policy: RenderPolicy,
    pub input: Option<PathBuf>,
    pub sequence_fps: f32,
    pub target: OutputTarget,
}

/// Loads the config file named on the command line, or the user default if present.
pub fn load_config(args: &RunArgs, paths: &AppPaths) -> Result<(CrtConfig, ConfigOrigin)> {
    if let Some(path) = &args.config {
        let config = CrtConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        return Ok((config, ConfigOrigin::Explicit(path.clone())));
    }

    let default = paths.default_config_file();
    if default.is_file() {
        let config = CrtConfig::load(&default)
            .with_context(|| format!("failed to load config {}", default.display()))?;
        debug!(path = %default.display(), "loaded user configuration");
        return Ok((config, ConfigOrigin::UserDefault(default)));
    }

    debug!("no configuration file found; using built-in defaults");
    Ok((CrtConfig::default(), ConfigOrigin::BuiltIn))
}

/// Command-line flags win over values from the file.
pub fn apply_overrides(config: &mut CrtConfig, args: &RunArgs) -> Result<()> {
    if let Some(curvature) = args.curvature {
        config.screen.curvature = curvature;
    }
    if let Some(resolution) = args.screen_resolution {
        config.screen.resolution = resolution;
    }
    if let Some(opacity) = args.scanline_opacity {
        config.screen.scan_line_opacity = opacity;
    }
    if args.vignette {
        config.stages.vignette = true;
    }
    if let Some(size) = &args.size {
        config.output.size = Some(size.clone());
    }
    if let Some(fps) = args.fps {
        config.output.fps = Some(fps);
    }
    if let Some(frames) = args.frames {
        config.output.frames = Some(frames);
    }
    if let Some(duration) = args.duration {
        config.output.duration = Some(duration);
    }
    if let Some(fps) = args.sequence_fps {
        config.output.sequence_fps = Some(fps);
    }
    config
        .validate()
        .context("command-line overrides produced an invalid configuration")?;
    Ok(())
}

pub fn params_from_screen(screen: &ScreenSection) -> CrtParams {
    CrtParams {
        curvature: Vec2::from_array(screen.curvature),
        screen_resolution: Vec2::from_array(screen.resolution),
        scan_line_opacity: Vec2::from_array(screen.scan_line_opacity),
        vignette_opacity: screen.vignette_opacity,
    }
}

/// Turns the effective configuration and mode flags into a session plan.
pub fn plan_session(config: &CrtConfig, args: &RunArgs) -> Result<SessionPlan> {
    let output_size = config.output_size()?.unwrap_or(DEFAULT_OUTPUT_SIZE);
    let policy = resolve_policy(config, args)?;
    let target = resolve_target(args.output.as_deref(), &policy);

    Ok(SessionPlan {
        params: params_from_screen(&config.screen),
        stages: Stages {
            vignette: config.stages.vignette,
        },
        output_size,
        policy,
        input: args.input.clone(),
        sequence_fps: config.output.sequence_fps.unwrap_or(DEFAULT_SEQUENCE_FPS),
        target,
    })
}

fn resolve_policy(config: &CrtConfig, args: &RunArgs) -> Result<RenderPolicy> {
    let fps = config.output.fps.filter(|fps| *fps > 0.0);

    if args.still {
        if let Some(time) = args.still_time {
            check_timestamp("--still-time", time)?;
        }
        return Ok(RenderPolicy::Still {
            time: args.still_time,
        });
    }

    if args.offline {
        let fps = fps.unwrap_or(DEFAULT_OFFLINE_FPS);
        let frames = match (config.output.frames, config.output.duration) {
            (Some(frames), _) => frames,
            (None, Some(duration)) => (duration.as_secs_f64() * fps as f64).ceil() as u64,
            (None, None) => bail!("offline rendering needs --frames or --duration"),
        };
        let start = args.start.unwrap_or(0.0);
        check_timestamp("--start", start)?;
        return Ok(RenderPolicy::Offline { fps, start, frames });
    }

    let limit = FrameLimit {
        frames: config.output.frames,
        duration: config.output.duration,
    };
    if limit == FrameLimit::unbounded() {
        info!("no frame or duration limit set; rendering until interrupted");
    }
    Ok(RenderPolicy::Animate {
        target_fps: fps,
        limit,
    })
}

fn check_timestamp(flag: &str, seconds: f32) -> Result<()> {
    if !seconds.is_finite() || seconds < 0.0 {
        bail!("{flag} must be a non-negative number of seconds (got {seconds})");
    }
    Ok(())
}

/// Open-ended animation without an explicit output rewrites one file, so an
/// unattended run never fills the disk with numbered frames.
fn resolve_target(output: Option<&Path>, policy: &RenderPolicy) -> OutputTarget {
    let single_file = match policy {
        RenderPolicy::Still { .. } => true,
        RenderPolicy::Animate { limit, .. } => *limit == FrameLimit::unbounded(),
        RenderPolicy::Offline { .. } => false,
    };
    match output {
        Some(path) if has_png_extension(path) || policy_is_still(policy) => {
            OutputTarget::File(path.into())
        }
        Some(path) => OutputTarget::Sequence(path.into()),
        None if single_file => OutputTarget::File(PathBuf::from(DEFAULT_STILL_OUTPUT)),
        None => OutputTarget::Sequence(PathBuf::from(DEFAULT_SEQUENCE_OUTPUT)),
    }
}

fn policy_is_still(policy: &RenderPolicy) -> bool {
    matches!(policy, RenderPolicy::Still { .. })
}

fn has_png_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn plan_from_flags(args: &RunArgs) -> Result<SessionPlan> {
        let mut config = CrtConfig::default();
        apply_overrides(&mut config, args)?;
        plan_session(&config, args)
    }

    #[test]
    fn flags_override_file_values() {
        let mut config = CrtConfig::from_toml_str(
            "[screen]\ncurvature = [5.0, 5.0]\nresolution = [100.0, 100.0]\n",
        )
        .unwrap();
        let args = RunArgs {
            curvature: Some([2.0, 2.5]),
            vignette: true,
            size: Some("320x200".into()),
            ..RunArgs::default()
        };
        apply_overrides(&mut config, &args).unwrap();
        assert_eq!(config.screen.curvature, [2.0, 2.5]);
        assert_eq!(config.screen.resolution, [100.0, 100.0]);
        assert!(config.stages.vignette);
        assert_eq!(config.output_size().unwrap(), Some((320, 200)));
    }

    #[test]
    fn invalid_override_is_reported() {
        let mut config = CrtConfig::default();
        let args = RunArgs {
            size: Some("0x0".into()),
            ..RunArgs::default()
        };
        assert!(apply_overrides(&mut config, &args).is_err());
    }

    #[test]
    fn unbounded_default_plan_rewrites_a_single_file() {
        let plan = plan_session(&CrtConfig::default(), &RunArgs::default()).unwrap();
        assert_eq!(plan.output_size, DEFAULT_OUTPUT_SIZE);
        assert_eq!(plan.params, CrtParams::default());
        assert!(!plan.stages.vignette);
        assert_eq!(plan.policy, RenderPolicy::default());
        assert_eq!(
            plan.target,
            OutputTarget::File(PathBuf::from(DEFAULT_STILL_OUTPUT))
        );
    }

    #[test]
    fn bounded_animation_defaults_to_sequence_directory() {
        let args = RunArgs {
            frames: Some(10),
            ..RunArgs::default()
        };
        let plan = plan_from_flags(&args).unwrap();
        assert_eq!(
            plan.target,
            OutputTarget::Sequence(PathBuf::from(DEFAULT_SEQUENCE_OUTPUT))
        );

        let args = RunArgs {
            duration: Some(Duration::from_secs(2)),
            ..RunArgs::default()
        };
        let plan = plan_from_flags(&args).unwrap();
        assert!(matches!(plan.target, OutputTarget::Sequence(_)));
    }

    #[test]
    fn still_plan_writes_single_file() {
        let args = RunArgs {
            still: true,
            still_time: Some(1.5),
            output: Some(PathBuf::from("shots/out.png")),
            ..RunArgs::default()
        };
        let plan = plan_session(&CrtConfig::default(), &args).unwrap();
        assert_eq!(plan.policy, RenderPolicy::Still { time: Some(1.5) });
        assert_eq!(plan.target, OutputTarget::File(PathBuf::from("shots/out.png")));
    }

    #[test]
    fn offline_plan_derives_frames_from_duration() {
        let mut config = CrtConfig::default();
        config.output.fps = Some(12.0);
        config.output.duration = Some(Duration::from_millis(1500));
        let args = RunArgs {
            offline: true,
            start: Some(2.0),
            ..RunArgs::default()
        };
        let plan = plan_session(&config, &args).unwrap();
        assert_eq!(
            plan.policy,
            RenderPolicy::Offline {
                fps: 12.0,
                start: 2.0,
                frames: 18
            }
        );
    }

    #[test]
    fn timestamps_must_be_non_negative_and_finite() {
        for bad in [-0.5, f32::NAN, f32::INFINITY] {
            let still = RunArgs {
                still: true,
                still_time: Some(bad),
                ..RunArgs::default()
            };
            let err = plan_from_flags(&still).unwrap_err();
            assert!(err.to_string().contains("--still-time"), "{err}");

            let offline = RunArgs {
                offline: true,
                frames: Some(1),
                start: Some(bad),
                ..RunArgs::default()
            };
            let err = plan_from_flags(&offline).unwrap_err();
            assert!(err.to_string().contains("--start"), "{err}");
        }

        let zero = RunArgs {
            still: true,
            still_time: Some(0.0),
            ..RunArgs::default()
        };
        assert!(plan_session(&CrtConfig::default(), &zero).is_ok());
    }

    #[test]
    fn offline_plan_needs_a_length() {
        let args = RunArgs {
            offline: true,
            ..RunArgs::default()
        };
        assert!(plan_session(&CrtConfig::default(), &args).is_err());
    }

    #[test]
    fn zero_fps_means_uncapped() {
        let mut config = CrtConfig::default();
        config.output.fps = Some(0.0);
        config.output.frames = Some(3);
        let plan = plan_session(&config, &RunArgs::default()).unwrap();
        assert_eq!(
            plan.policy,
            RenderPolicy::Animate {
                target_fps: None,
                limit: FrameLimit {
                    frames: Some(3),
                    duration: None
                }
            }
        );
    }

    #[test]
    fn png_output_is_rewritten_in_place_when_animating() {
        let args = RunArgs {
            output: Some(PathBuf::from("live.PNG")),
            frames: Some(2),
            ..RunArgs::default()
        };
        let plan = plan_session(&CrtConfig::default(), &args).unwrap();
        assert_eq!(plan.target, OutputTarget::File(PathBuf::from("live.PNG")));
    }
}
