//! Runtime settings.
//!
//! The tuning dials the original exposed through a control panel, consumed here
//! as a read-only key/value config: loaded once from an optional JSON file,
//! then threaded into construction. Nothing re-reads settings mid-run.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Crossfade thresholds for the flow material's sharp/blur mix.
///
/// The falloff term is the squared distance from the feedback atlas center;
/// below `blend_lo` the sharp capture wins, above `blend_hi` the blurred one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowTuning {
    pub blend_lo: f32,
    pub blend_hi: f32,
}

impl Default for FlowTuning {
    fn default() -> Self {
        Self {
            blend_lo: 0.1,
            blend_hi: 0.3,
        }
    }
}

/// Edge-detection constants, fixed at antialias stage construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AaTuning {
    /// Luma contrast required to flag an edge.
    pub threshold: f32,
    /// Depth discontinuity that marks a geometric edge for predication.
    pub predication_threshold: f32,
    /// How strongly a depth edge raises luma sensitivity.
    pub predication_scale: f32,
}

impl Default for AaTuning {
    fn default() -> Self {
        Self {
            threshold: 0.05,
            predication_threshold: 0.002,
            predication_scale: 1.0,
        }
    }
}

/// Scene-wide constants: clear color and the light rig.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneTuning {
    /// Linear-space background color for the main scene.
    pub background: [f32; 3],
    /// Direction the key light shines from (normalized at upload).
    pub light_direction: [f32; 3],
    pub light_intensity: f32,
    pub ambient_intensity: f32,
}

impl Default for SceneTuning {
    fn default() -> Self {
        Self {
            background: [0.004, 0.004, 0.005],
            light_direction: [10.0, 10.0, 10.0],
            light_intensity: 1.1,
            ambient_intensity: 0.1,
        }
    }
}

/// Top-level settings for the demo and the composer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Device pixel ratio the orthographic zoom is scaled by; clamped to 1..=2.
    pub pixel_ratio: f32,
    /// Orthographic zoom in logical pixels per world unit.
    pub zoom: f32,
    pub flow: FlowTuning,
    pub antialias: AaTuning,
    pub scene: SceneTuning,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            title: "flowdeck".to_string(),
            width: 1280,
            height: 720,
            pixel_ratio: 2.0,
            zoom: 60.0,
            flow: FlowTuning::default(),
            antialias: AaTuning::default(),
            scene: SceneTuning::default(),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Loads settings from a JSON file, falling back to defaults when the file
    /// is absent or unparseable. Unknown keys fall back field-by-field.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text).unwrap_or_else(|| {
                tracing::warn!(path = %path.display(), "settings file unreadable, using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    fn parse(text: &str) -> Option<Self> {
        let mut settings: Settings = serde_json::from_str(text).ok()?;
        settings.pixel_ratio = settings.pixel_ratio.clamp(1.0, 2.0);
        Some(settings)
    }

    /// Physical pixels per world unit for the main orthographic camera.
    pub fn effective_zoom(&self) -> f32 {
        self.zoom * self.pixel_ratio.clamp(1.0, 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let s = Settings::default();
        assert_eq!(s.flow.blend_lo, 0.1);
        assert_eq!(s.flow.blend_hi, 0.3);
        assert_eq!(s.antialias.threshold, 0.05);
        assert_eq!(s.antialias.predication_threshold, 0.002);
        assert_eq!(s.antialias.predication_scale, 1.0);
        assert_eq!(s.pixel_ratio, 2.0);
        assert_eq!(s.zoom, 60.0);
    }

    #[test]
    fn json_round_trip_preserves_settings() {
        let original = Settings::new().with_title("demo").with_size(640, 480);
        let json = serde_json::to_string(&original).unwrap();
        let restored = Settings::parse(&json).unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn partial_json_fills_remaining_fields_with_defaults() {
        let s = Settings::parse(r#"{"zoom": 30.0, "flow": {"blend_lo": 0.2}}"#).unwrap();
        assert_eq!(s.zoom, 30.0);
        assert_eq!(s.flow.blend_lo, 0.2);
        assert_eq!(s.flow.blend_hi, 0.3, "unspecified nested field keeps default");
        assert_eq!(s.width, 1280, "unspecified top-level field keeps default");
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(Settings::parse("{not json").is_none());
    }

    #[test]
    fn pixel_ratio_is_clamped_on_parse() {
        let high = Settings::parse(r#"{"pixel_ratio": 4.0}"#).unwrap();
        assert_eq!(high.pixel_ratio, 2.0);
        let low = Settings::parse(r#"{"pixel_ratio": 0.5}"#).unwrap();
        assert_eq!(low.pixel_ratio, 1.0);
    }

    #[test]
    fn effective_zoom_scales_by_pixel_ratio() {
        let s = Settings::default();
        assert!((s.effective_zoom() - 120.0).abs() < f32::EPSILON);
    }
}
