use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "crtview",
    author,
    version,
    about = "Render images through a retro CRT tube",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Source image, or a directory of images played back as a sequence.
    /// A colour-bar test pattern is used when omitted.
    #[arg(long, short = 'i', value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Configuration file (TOML, or JSON by extension). Defaults to `config.toml`
    /// in the crtview config directory when present.
    #[arg(long, short = 'c', value_name = "FILE", env = "CRTVIEW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output PNG file for stills, or a directory for frame sequences.
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Render target resolution (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT")]
    pub size: Option<String>,

    /// Frame cap for real-time rendering, or step rate with `--offline` (0=uncapped).
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f32>,

    /// Stop after this many frames.
    #[arg(long, value_name = "COUNT")]
    pub frames: Option<u64>,

    /// Stop after this much wall-clock time (e.g. `10s`, `1m 30s`).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Render a single still frame instead of animating.
    #[arg(long)]
    pub still: bool,

    /// Timestamp in seconds to evaluate for `--still`.
    #[arg(long, value_name = "SECONDS", requires = "still")]
    pub still_time: Option<f32>,

    /// Step time by `1/fps` per frame instead of following the wall clock.
    #[arg(long, conflicts_with = "still")]
    pub offline: bool,

    /// First timestamp in seconds for `--offline`.
    #[arg(long, value_name = "SECONDS", requires = "offline")]
    pub start: Option<f32>,

    /// Enable the vignette stage (off in the reference look).
    #[arg(long)]
    pub vignette: bool,

    /// Curvature per axis (`X,Y`); larger is flatter.
    #[arg(long, value_name = "X,Y", value_parser = parse_pair)]
    pub curvature: Option<[f32; 2]>,

    /// Simulated phosphor grid resolution (`X,Y`).
    #[arg(long, value_name = "X,Y", value_parser = parse_pair)]
    pub screen_resolution: Option<[f32; 2]>,

    /// Scanline contrast exponents (`X,Y`).
    #[arg(long, value_name = "X,Y", value_parser = parse_pair)]
    pub scanline_opacity: Option<[f32; 2]>,

    /// Playback rate for image-sequence inputs.
    #[arg(long, value_name = "FPS")]
    pub sequence_fps: Option<f32>,

    /// Worker threads for the pixel pool (defaults to one per core).
    #[arg(long, value_name = "COUNT")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect configuration.
    Config(ConfigCommand),
}

#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the config directory and the config file that would be used.
    Where,
    /// Print the effective configuration (file plus flags) as TOML.
    Print,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_pair(value: &str) -> Result<[f32; 2], String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("expected two comma-separated numbers".to_string());
    }

    let (x, y) = trimmed
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y but got '{trimmed}'"))?;
    let x: f32 = x
        .trim()
        .parse()
        .map_err(|_| format!("invalid number '{}'", x.trim()))?;
    let y: f32 = y
        .trim()
        .parse()
        .map_err(|_| format!("invalid number '{}'", y.trim()))?;
    Ok([x, y])
}

pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    if let Ok(seconds) = trimmed.parse::<f64>() {
        if seconds.is_finite() && seconds >= 0.0 {
            return Ok(Duration::from_secs_f64(seconds));
        }
        return Err("duration must be non-negative".to_string());
    }
    humantime::parse_duration(trimmed).map_err(|err| format!("invalid duration '{trimmed}': {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn pairs_are_comma_separated() {
        assert_eq!(parse_pair("3,3").unwrap(), [3.0, 3.0]);
        assert_eq!(parse_pair(" 300 , 400 ").unwrap(), [300.0, 400.0]);
        assert!(parse_pair("3x3").is_err());
        assert!(Cli::try_parse_from(["crtview", "--curvature", "3x3"]).is_err());
        assert_eq!(parse_pair("0.9, 0.25").unwrap(), [0.9, 0.25]);
        assert!(parse_pair("3").is_err());
        assert!(parse_pair("a,b").is_err());
        assert!(parse_pair("").is_err());
    }

    #[test]
    fn durations_accept_seconds_and_humantime() {
        assert_eq!(parse_duration("2.5").unwrap(), Duration::from_millis(2500));
        assert_eq!(parse_duration("1m 5s").unwrap(), Duration::from_secs(65));
        assert!(parse_duration("-1").is_err());
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn still_time_requires_still() {
        assert!(Cli::try_parse_from(["crtview", "--still-time", "2"]).is_err());
        let cli = Cli::try_parse_from(["crtview", "--still", "--still-time", "2"]).unwrap();
        assert_eq!(cli.run.still_time, Some(2.0));
    }

    #[test]
    fn offline_conflicts_with_still() {
        assert!(Cli::try_parse_from(["crtview", "--still", "--offline"]).is_err());
    }
}
