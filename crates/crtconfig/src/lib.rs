use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to parse JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to serialise configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// On-disk description of one CRT session.
///
/// Every section is optional; omitted values fall back to the reference look
/// (curvature 3, a 300x400 phosphor grid, scanline opacity 0.9/0.25).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CrtConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub screen: ScreenSection,
    #[serde(default)]
    pub stages: StageSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScreenSection {
    pub curvature: [f32; 2],
    pub resolution: [f32; 2],
    pub scan_line_opacity: [f32; 2],
    pub vignette_opacity: f32,
}

impl Default for ScreenSection {
    fn default() -> Self {
        Self {
            curvature: [3.0, 3.0],
            resolution: [300.0, 400.0],
            scan_line_opacity: [0.9, 0.25],
            vignette_opacity: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StageSection {
    pub vignette: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSection {
    /// Render target as `WIDTHxHEIGHT`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Frame cap for real-time rendering, or the step rate for offline export.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f32>,
    #[serde(
        deserialize_with = "deserialize_duration_opt",
        serialize_with = "serialize_duration_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames: Option<u64>,
    /// Playback rate used when the input is a directory of images.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_fps: Option<f32>,
}

fn default_version() -> u32 {
    1
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs_f64(v)))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn serialize_duration_opt<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(duration) => {
            serializer.serialize_str(&humantime::format_duration(*duration).to_string())
        }
        None => serializer.serialize_none(),
    }
}

/// Parses `WIDTHxHEIGHT` (also `X` or `×` as separator); zero dimensions are rejected.
pub fn parse_size(spec: &str) -> Result<(u32, u32), ConfigError> {
    let trimmed = spec.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| ConfigError::Invalid("expected WxH format, e.g. 1280x720".into()))?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("invalid width in size '{trimmed}'")))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("invalid height in size '{trimmed}'")))?;

    if width == 0 || height == 0 {
        return Err(ConfigError::Invalid(
            "output dimensions must be greater than zero".into(),
        ));
    }

    Ok((width, height))
}

impl Default for CrtConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            screen: ScreenSection::default(),
            stages: StageSection::default(),
            output: OutputSection::default(),
        }
    }
}

impl CrtConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: CrtConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let raw: CrtConfig = serde_json::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Reads a file, choosing JSON for `.json` and TOML for anything else.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&contents)
        } else {
            Self::from_toml_str(&contents)
        }
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Parsed output size, if one was configured.
    pub fn output_size(&self) -> Result<Option<(u32, u32)>, ConfigError> {
        self.output.size.as_deref().map(parse_size).transpose()
    }

    /// File-level checks. Numeric screen parameters are checked again by the
    /// pipeline when it is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        self.output_size()?;

        for (name, value) in [
            ("output.fps", self.output.fps),
            ("output.sequence_fps", self.output.sequence_fps),
        ] {
            if let Some(fps) = value {
                if !fps.is_finite() || fps < 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "{name} must be a non-negative number (got {fps})"
                    )));
                }
            }
        }

        if self.output.sequence_fps == Some(0.0) {
            return Err(ConfigError::Invalid(
                "output.sequence_fps must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1

[screen]
curvature = [4.0, 3.5]
resolution = [320.0, 240.0]

[stages]
vignette = true

[output]
size = "640x480"
fps = 30
duration = "2s 500ms"
"#;

    #[test]
    fn parses_sample_config() {
        let config = CrtConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.screen.curvature, [4.0, 3.5]);
        assert_eq!(config.screen.resolution, [320.0, 240.0]);
        assert_eq!(config.screen.scan_line_opacity, [0.9, 0.25]);
        assert!(config.stages.vignette);
        assert_eq!(config.output_size().unwrap(), Some((640, 480)));
        assert_eq!(config.output.fps, Some(30.0));
        assert_eq!(config.output.duration, Some(Duration::from_millis(2500)));
    }

    #[test]
    fn empty_document_uses_reference_defaults() {
        let config = CrtConfig::from_toml_str("").unwrap();
        assert_eq!(config, CrtConfig::default());
        assert!(!config.stages.vignette);
        assert_eq!(config.screen.vignette_opacity, 1.0);
    }

    #[test]
    fn numeric_durations_are_seconds() {
        let config = CrtConfig::from_toml_str("[output]\nduration = 3\n").unwrap();
        assert_eq!(config.output.duration, Some(Duration::from_secs(3)));
        let config = CrtConfig::from_toml_str("[output]\nduration = 0.25\n").unwrap();
        assert_eq!(config.output.duration, Some(Duration::from_millis(250)));
    }

    #[test]
    fn rejects_unknown_version() {
        let err = CrtConfig::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = CrtConfig::from_toml_str("[screen]\ncurvatur = [1.0, 1.0]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_bad_size_and_rates() {
        let err = CrtConfig::from_toml_str("[output]\nsize = \"0x10\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = CrtConfig::from_toml_str("[output]\nfps = -1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = CrtConfig::from_toml_str("[output]\nsequence_fps = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn parse_size_accepts_separators() {
        assert_eq!(parse_size("1280x720").unwrap(), (1280, 720));
        assert_eq!(parse_size(" 300 X 400 ").unwrap(), (300, 400));
        assert_eq!(parse_size("64×48").unwrap(), (64, 48));
        assert!(parse_size("1280").is_err());
        assert!(parse_size("axb").is_err());
    }

    #[test]
    fn parses_json() {
        let config = CrtConfig::from_json_str(
            r#"{ "screen": { "curvature": [2.0, 2.0] }, "output": { "frames": 12 } }"#,
        )
        .unwrap();
        assert_eq!(config.screen.curvature, [2.0, 2.0]);
        assert_eq!(config.output.frames, Some(12));
    }

    #[test]
    fn toml_round_trip_preserves_values() {
        let config = CrtConfig::from_toml_str(SAMPLE).unwrap();
        let rendered = config.to_toml_string().unwrap();
        let reparsed = CrtConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn load_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("crt.json");
        fs::write(&json, r#"{ "stages": { "vignette": true } }"#).unwrap();
        assert!(CrtConfig::load(&json).unwrap().stages.vignette);

        let toml_path = dir.path().join("crt.toml");
        fs::write(&toml_path, "[output]\nframes = 5\n").unwrap();
        assert_eq!(CrtConfig::load(&toml_path).unwrap().output.frames, Some(5));

        let err = CrtConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
