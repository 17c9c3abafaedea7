use glam::Vec2;

/// Raised when a pipeline is built from parameters it cannot evaluate.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("parameter `{field}` must be finite")]
    NonFinite { field: &'static str },
    #[error("parameter `{field}` must be greater than zero (got {value})")]
    NonPositive { field: &'static str, value: f32 },
    #[error("output resolution must be non-empty (got {width}x{height})")]
    EmptyOutput { width: u32, height: u32 },
}

/// Static look of the simulated tube.
///
/// The defaults reproduce the reference composition: mildly curved glass over a
/// 300x400 phosphor grid, heavy horizontal scanlines and faint vertical ones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrtParams {
    /// Barrel distortion strength per axis; larger values flatten the glass.
    pub curvature: Vec2,
    /// Simulated phosphor grid resolution, independent of the output size.
    pub screen_resolution: Vec2,
    /// Scanline contrast exponent per axis.
    pub scan_line_opacity: Vec2,
    /// Strength of the optional vignette stage.
    pub vignette_opacity: f32,
}

impl Default for CrtParams {
    fn default() -> Self {
        Self {
            curvature: Vec2::new(3.0, 3.0),
            screen_resolution: Vec2::new(300.0, 400.0),
            scan_line_opacity: Vec2::new(0.9, 0.25),
            vignette_opacity: 1.0,
        }
    }
}

impl CrtParams {
    /// Checks every field once so the per-pixel path never has to.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        require_positive("curvature.x", self.curvature.x)?;
        require_positive("curvature.y", self.curvature.y)?;
        require_positive("screen_resolution.x", self.screen_resolution.x)?;
        require_positive("screen_resolution.y", self.screen_resolution.y)?;
        require_finite("scan_line_opacity.x", self.scan_line_opacity.x)?;
        require_finite("scan_line_opacity.y", self.scan_line_opacity.y)?;
        require_finite("vignette_opacity", self.vignette_opacity)?;
        Ok(())
    }
}

/// Optional stages that are not part of the default composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stages {
    /// Multiply by the radial vignette after flicker. Off unless asked for.
    pub vignette: bool,
}

/// Rejects degenerate render targets before any frame is allocated.
pub fn validate_output(width: u32, height: u32) -> Result<(), ConfigurationError> {
    if width == 0 || height == 0 {
        return Err(ConfigurationError::EmptyOutput { width, height });
    }
    Ok(())
}

fn require_finite(field: &'static str, value: f32) -> Result<(), ConfigurationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigurationError::NonFinite { field })
    }
}

fn require_positive(field: &'static str, value: f32) -> Result<(), ConfigurationError> {
    require_finite(field, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigurationError::NonPositive { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(CrtParams::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_screen_resolution() {
        let params = CrtParams {
            screen_resolution: Vec2::new(300.0, 0.0),
            ..CrtParams::default()
        };
        let err = params.validate().unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::NonPositive {
                field: "screen_resolution.y",
                value: 0.0
            }
        );
    }

    #[test]
    fn rejects_negative_curvature() {
        let params = CrtParams {
            curvature: Vec2::new(-1.0, 3.0),
            ..CrtParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigurationError::NonPositive {
                field: "curvature.x",
                ..
            })
        ));
    }

    #[test]
    fn rejects_non_finite_values() {
        let params = CrtParams {
            scan_line_opacity: Vec2::new(f32::NAN, 0.25),
            ..CrtParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigurationError::NonFinite { .. })
        ));

        let params = CrtParams {
            curvature: Vec2::new(f32::INFINITY, 3.0),
            ..CrtParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigurationError::NonFinite {
                field: "curvature.x"
            })
        ));
    }

    #[test]
    fn empty_output_is_rejected() {
        assert!(validate_output(1, 1).is_ok());
        assert_eq!(
            validate_output(0, 10),
            Err(ConfigurationError::EmptyOutput {
                width: 0,
                height: 10
            })
        );
    }

    #[test]
    fn vignette_stage_is_off_by_default() {
        assert!(!Stages::default().vignette);
    }
}
