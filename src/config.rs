use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tuning for the tile pipeline and viewport behaviour.
///
/// Every field has a default, so a JSON config only needs the keys it
/// overrides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrogramConfig {
    /// Seconds of audio covered by one tile.
    pub tile_duration_s: f64,
    /// Level-of-detail pixel widths, ascending.
    pub lod_widths: Vec<u32>,
    /// Extra tiles requested on each side of the visible range.
    pub prefetch_margin: usize,
    pub cache_capacity: usize,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub default_zoom: f64,
    /// Zoom multiplier per wheel notch.
    pub zoom_sensitivity: f64,
    /// Fraction of the remaining distance covered per animation frame.
    pub smoothing: f64,
    pub scroll_epsilon_px: f64,
    pub zoom_epsilon: f64,
    /// Pixel height tiles are rendered at.
    pub render_height: u32,
    /// Pixel height tiles are drawn at.
    pub display_height: f64,
    pub min_display_height: f64,
    pub max_display_height: f64,
    pub default_gain: f32,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            tile_duration_s: 5.0,
            lod_widths: vec![512, 1024, 2048, 4096, 8192],
            prefetch_margin: 2,
            cache_capacity: 70,
            min_zoom: 10.0,
            max_zoom: 1000.0,
            default_zoom: 100.0,
            zoom_sensitivity: 1.15,
            smoothing: 0.27,
            scroll_epsilon_px: 0.5,
            zoom_epsilon: 0.1,
            render_height: 256,
            display_height: 200.0,
            min_display_height: 100.0,
            max_display_height: 800.0,
            default_gain: 1.0,
        }
    }
}

impl SpectrogramConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid { field, reason: reason.into() }
        }

        if !(self.tile_duration_s > 0.0) {
            return Err(invalid("tile_duration_s", "must be positive"));
        }
        if self.lod_widths.is_empty() {
            return Err(invalid("lod_widths", "must not be empty"));
        }
        if self.lod_widths[0] == 0 || self.lod_widths.windows(2).any(|w| w[0] >= w[1]) {
            return Err(invalid("lod_widths", "must be positive and strictly ascending"));
        }
        if self.cache_capacity == 0 {
            return Err(invalid("cache_capacity", "must be at least 1"));
        }
        if !(self.min_zoom > 0.0) {
            return Err(invalid("min_zoom", "must be positive"));
        }
        if !(self.min_zoom <= self.default_zoom && self.default_zoom <= self.max_zoom) {
            return Err(invalid("default_zoom", "must lie within [min_zoom, max_zoom]"));
        }
        if !(self.zoom_sensitivity > 1.0) {
            return Err(invalid("zoom_sensitivity", "must be greater than 1"));
        }
        if !(self.smoothing > 0.0 && self.smoothing <= 1.0) {
            return Err(invalid("smoothing", "must lie in (0, 1]"));
        }
        if !(self.scroll_epsilon_px > 0.0) {
            return Err(invalid("scroll_epsilon_px", "must be positive"));
        }
        if !(self.zoom_epsilon > 0.0) {
            return Err(invalid("zoom_epsilon", "must be positive"));
        }
        if self.render_height == 0 {
            return Err(invalid("render_height", "must be positive"));
        }
        if !(self.min_display_height > 0.0 && self.min_display_height <= self.max_display_height) {
            return Err(invalid("min_display_height", "must be positive and at most max_display_height"));
        }
        Ok(())
    }
}
