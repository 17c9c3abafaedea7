use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use crtfx::{
    open_source, Driver, FrameSink, Pipeline, PngSequenceSink, PngStillSink, SourceFeed,
    SourceTexture, StaticSource,
};
use tracing_subscriber::EnvFilter;

use crate::bootstrap::{apply_overrides, load_config, plan_session, OutputTarget, SessionPlan};
use crate::cli::RunArgs;
use crate::paths::AppPaths;

const TEST_PATTERN_SIZE: (u32, u32) = (320, 240);

pub fn run(args: RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let (mut config, origin) = load_config(&args, &paths)?;
    tracing::debug!(
        config_dir = %paths.config_dir().display(),
        origin = ?origin,
        "resolved crtview configuration"
    );
    apply_overrides(&mut config, &args)?;
    let plan = plan_session(&config, &args)?;

    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure render thread pool")?;
    }

    run_session(plan)
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_session(plan: SessionPlan) -> Result<()> {
    let pipeline = Pipeline::new(plan.params, plan.stages).context("invalid CRT parameters")?;
    let source = build_source(&plan)?;
    let sink = build_sink(&plan.target)?;

    let mut driver = Driver::new(pipeline, source, sink, plan.output_size)
        .context("invalid output resolution")?;
    install_stop_handler(driver.stop_handle())?;
    let summary = driver.run(&plan.policy)?;

    tracing::info!(
        frames = summary.frames,
        last_time = ?summary.last_time,
        elapsed = %crtfx::format_elapsed(summary.wall),
        "render finished"
    );
    Ok(())
}

fn build_source(plan: &SessionPlan) -> Result<Box<dyn SourceFeed>> {
    match &plan.input {
        Some(path) => open_source(path, plan.sequence_fps)
            .with_context(|| format!("failed to open input {}", path.display())),
        None => {
            tracing::info!("no input given; using the built-in test pattern");
            let (width, height) = TEST_PATTERN_SIZE;
            Ok(Box::new(StaticSource::new(
                SourceTexture::test_pattern(width, height),
                "test pattern",
            )))
        }
    }
}

fn build_sink(target: &OutputTarget) -> Result<Box<dyn FrameSink>> {
    match target {
        OutputTarget::File(path) => Ok(Box::new(PngStillSink::new(path.clone()))),
        OutputTarget::Sequence(dir) => Ok(Box::new(
            PngSequenceSink::new(dir.clone())
                .with_context(|| format!("failed to prepare frame directory {}", dir.display()))?,
        )),
    }
}

/// SIGINT and SIGTERM end the loop after the frame in flight so sinks can
/// finish; a second signal exits immediately.
#[cfg(unix)]
fn install_stop_handler(stop: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::signal::{SIGINT, SIGTERM};
    use signal_hook::flag;

    for signal in [SIGINT, SIGTERM] {
        flag::register_conditional_shutdown(signal, 1, Arc::clone(&stop))
            .context("failed to install signal handler")?;
        flag::register(signal, Arc::clone(&stop)).context("failed to install signal handler")?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn install_stop_handler(_stop: Arc<AtomicBool>) -> Result<()> {
    Ok(())
}
