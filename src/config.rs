//! Demo configuration loaded from TOML, and the runtime render settings

use std::ops::RangeInclusive;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::DepthBias;
use crate::particles::EmitterSettings;
use crate::scene::Camera;
use crate::shadow::ClampMode;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

pub const SHADOW_RESOLUTION_RANGE: RangeInclusive<u32> = 32..=2048;
pub const OFFSET_FACTOR_RANGE: RangeInclusive<f32> = 0.0..=10.0;
pub const OFFSET_UNITS_RANGE: RangeInclusive<f32> = 0.0..=100.0;
pub const SPOT_ANGLE_RANGE: RangeInclusive<f32> = 0.0..=90.0;

/// Knobs the settings panel edits between frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub shadow_resolution: u32,
    pub clamp_mode: ClampMode,
    /// Lookups past a border-clamped map read as shadowed
    pub border_shadowed: bool,
    pub polygon_offset: bool,
    pub offset_factor: f32,
    pub offset_units: f32,
    /// Only move the light when dragged
    pub manual_light_only: bool,
    pub use_spot_light: bool,
    /// Degrees
    pub inner_spot_angle: f32,
    /// Degrees
    pub outer_spot_angle: f32,
    pub soft_falloff: bool,
    pub hardware_pcf: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            shadow_resolution: 128,
            clamp_mode: ClampMode::Border,
            border_shadowed: false,
            polygon_offset: true,
            offset_factor: 1.87,
            offset_units: 1.0,
            manual_light_only: true,
            use_spot_light: true,
            inner_spot_angle: 17.5,
            outer_spot_angle: 22.5,
            soft_falloff: false,
            hardware_pcf: false,
        }
    }
}

fn clamp_field<T>(name: &str, value: &mut T, range: &RangeInclusive<T>) -> bool
where
    T: PartialOrd + Copy + std::fmt::Display,
{
    let clamped = if *value < *range.start() {
        *range.start()
    } else if *value > *range.end() {
        *range.end()
    } else {
        return false;
    };
    log::warn!("{name} = {value} is out of range, using {clamped}");
    *value = clamped;
    true
}

impl RenderSettings {
    /// Polygon offset for the depth pass, if enabled
    pub fn depth_bias(&self) -> Option<DepthBias> {
        self.polygon_offset
            .then(|| DepthBias::new(self.offset_factor, self.offset_units))
    }

    /// Clamp every ranged field into its slider range.
    ///
    /// Returns how many fields were changed. NaN offsets fall back to defaults.
    /// Fields are otherwise independent: an outer spot angle inside the inner
    /// one is kept as written.
    pub fn sanitize(&mut self) -> usize {
        let defaults = Self::default();
        let mut changed = 0;
        for (name, value, fallback) in [
            ("offset_factor", &mut self.offset_factor, defaults.offset_factor),
            ("offset_units", &mut self.offset_units, defaults.offset_units),
            ("inner_spot_angle", &mut self.inner_spot_angle, defaults.inner_spot_angle),
            ("outer_spot_angle", &mut self.outer_spot_angle, defaults.outer_spot_angle),
        ] {
            if value.is_nan() {
                log::warn!("{name} is NaN, using {fallback}");
                *value = fallback;
                changed += 1;
            }
        }

        changed += usize::from(clamp_field(
            "shadow_resolution",
            &mut self.shadow_resolution,
            &SHADOW_RESOLUTION_RANGE,
        ));
        changed += usize::from(clamp_field("offset_factor", &mut self.offset_factor, &OFFSET_FACTOR_RANGE));
        changed += usize::from(clamp_field("offset_units", &mut self.offset_units, &OFFSET_UNITS_RANGE));
        changed += usize::from(clamp_field(
            "inner_spot_angle",
            &mut self.inner_spot_angle,
            &SPOT_ANGLE_RANGE,
        ));
        changed += usize::from(clamp_field(
            "outer_spot_angle",
            &mut self.outer_spot_angle,
            &SPOT_ANGLE_RANGE,
        ));
        changed
    }
}

/// Configuration for the demo renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Upper bound on simultaneously live particles
    pub particle_capacity: usize,
    pub emitter: EmitterSettings,
    pub camera: Camera,
    pub settings: RenderSettings,
    /// Main pass clear color
    pub clear_color: [f32; 4],
    /// Write gray-scale light depth to a color attachment for debug display
    pub shadow_debug_color: bool,
    /// Off-screen target size for the main pass
    pub width: u32,
    pub height: u32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            particle_capacity: 100_000,
            emitter: EmitterSettings::default(),
            camera: Camera::default(),
            settings: RenderSettings::default(),
            clear_color: [0.2, 0.2, 0.8, 1.0],
            shadow_debug_color: true,
            width: 1280,
            height: 720,
        }
    }
}

impl DemoConfig {
    /// Parse a TOML document; missing fields keep their defaults
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(source)?;
        config.sanitize();
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Bring every field into a usable range, logging what changed
    pub fn sanitize(&mut self) -> usize {
        let mut changed = self.settings.sanitize();
        if self.width == 0 || self.height == 0 {
            log::warn!("target size {}x{} is empty, using 1280x720", self.width, self.height);
            self.width = 1280;
            self.height = 720;
            changed += 1;
        }
        if !(self.emitter.life_span > 0.0) {
            log::warn!("emitter life_span {} must be positive, using 5", self.emitter.life_span);
            self.emitter.life_span = EmitterSettings::default().life_span;
            changed += 1;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_demo() {
        let config = DemoConfig::default();
        assert_eq!(config.particle_capacity, 100_000);
        assert_eq!(config.emitter.spawn_per_frame, 64);
        assert_eq!(config.clear_color, [0.2, 0.2, 0.8, 1.0]);

        let settings = &config.settings;
        assert_eq!(settings.shadow_resolution, 128);
        assert_eq!(settings.clamp_mode, ClampMode::Border);
        assert_eq!(settings.depth_bias(), Some(DepthBias::new(1.87, 1.0)));
        assert!(settings.manual_light_only && settings.use_spot_light);
        assert!(!settings.soft_falloff && !settings.hardware_pcf && !settings.border_shadowed);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = DemoConfig::from_toml_str(
            r#"
            particle_capacity = 500

            [settings]
            shadow_resolution = 1024
            clamp_mode = "edge"
            polygon_offset = false
            "#,
        )
        .unwrap();

        assert_eq!(config.particle_capacity, 500);
        assert_eq!(config.settings.shadow_resolution, 1024);
        assert_eq!(config.settings.clamp_mode, ClampMode::Edge);
        assert_eq!(config.settings.depth_bias(), None);
        assert_eq!(config.settings.outer_spot_angle, 22.5);
        assert_eq!(config.emitter, EmitterSettings::default());
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let config = DemoConfig::from_toml_str(
            r#"
            [settings]
            shadow_resolution = 8
            offset_factor = 25.0
            inner_spot_angle = 40.0
            outer_spot_angle = 120.0
            "#,
        )
        .unwrap();
        assert_eq!(config.settings.shadow_resolution, 32);
        assert_eq!(config.settings.offset_factor, 10.0);
        assert_eq!(config.settings.outer_spot_angle, 90.0);

        assert_eq!(config.settings.inner_spot_angle, 40.0);
    }

    #[test]
    fn in_range_fields_are_left_alone() {
        let mut settings = RenderSettings {
            inner_spot_angle: 30.0,
            outer_spot_angle: 20.0,
            ..Default::default()
        };
        assert_eq!(settings.sanitize(), 0);
        assert_eq!(settings.inner_spot_angle, 30.0);
        assert_eq!(settings.outer_spot_angle, 20.0);
    }

    #[test]
    fn parse_and_io_errors() {
        assert!(matches!(
            DemoConfig::from_toml_str("particle_capacity = \"many\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            DemoConfig::load("/nonexistent/shadow-sim.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
