use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{BackdropError, Result};

/// Environment variable naming an optional JSON config file for the native host.
pub const CONFIG_ENV_VAR: &str = "WBACKDROP_CONFIG";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PointerConfig {
    /// Smoothing factor of the primary cursor.
    pub k_cursor: f32,
    /// Smoothing factor of the trail glow. Must stay below `k_cursor`.
    pub k_trail: f32,
    /// Viewports narrower than this (logical px) disable pointer following.
    pub narrow_breakpoint: f32,
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            k_cursor: 0.15,
            k_trail: 0.08,
            narrow_breakpoint: 768.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SectionConfig {
    /// Section identifiers, top to bottom.
    pub ids: Vec<String>,
    /// Height of the fixed navigation chrome in px.
    pub offset: f32,
}

impl Default for SectionConfig {
    fn default() -> Self {
        Self {
            ids: ["home", "about", "experience", "projects", "certifications", "contact"]
                .iter()
                .map(|id| id.to_string())
                .collect(),
            offset: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub particle_count: usize,
    /// Edge lengths of the box the particles are sampled in.
    pub bounds: [f32; 3],
    /// Field tilt per unit of normalized pointer.
    pub tilt_gain: f32,
    /// Constant yaw step applied to the field every frame, in radians.
    pub field_spin: f32,
    /// Shape displacement per unit of normalized pointer.
    pub parallax_gain: f32,
    pub bob_amplitude: f32,
    pub bob_frequency: f32,
    /// Fixed RNG seed for particle generation. `None` seeds from the clock.
    pub seed: Option<u64>,
    /// Upper bound on the scene clock advance per frame, in seconds.
    pub max_frame_step: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            particle_count: 1500,
            bounds: [55.0, 55.0, 25.0],
            tilt_gain: 0.08,
            field_spin: 0.0002,
            parallax_gain: 0.6,
            bob_amplitude: 0.5,
            bob_frequency: 1.0,
            seed: None,
            max_frame_step: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackdropConfig {
    pub pointer: PointerConfig,
    pub sections: SectionConfig,
    pub scene: SceneConfig,
    /// Where the native host persists the theme choice.
    pub storage_path: PathBuf,
}

impl Default for BackdropConfig {
    fn default() -> Self {
        Self {
            pointer: PointerConfig::default(),
            sections: SectionConfig::default(),
            scene: SceneConfig::default(),
            storage_path: PathBuf::from("wbackdrop-prefs.json"),
        }
    }
}

impl BackdropConfig {
    pub fn from_json(source: &str) -> Result<Self> {
        let config: BackdropConfig = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_json(&source)
    }

    /// Loads the file named by [`CONFIG_ENV_VAR`], falling back to defaults.
    pub fn from_env() -> Self {
        let Some(path) = std::env::var_os(CONFIG_ENV_VAR) else {
            return Self::default();
        };
        let path = PathBuf::from(path);
        match Self::from_file(&path) {
            Ok(config) => {
                log::info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Ignoring config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let pointer = &self.pointer;
        if !(pointer.k_cursor > 0.0 && pointer.k_cursor <= 1.0) {
            return Err(BackdropError::Config(format!(
                "k_cursor must be in (0, 1], got {}",
                pointer.k_cursor
            )));
        }
        if !(pointer.k_trail > 0.0 && pointer.k_trail < pointer.k_cursor) {
            return Err(BackdropError::Config(format!(
                "k_trail must be in (0, k_cursor), got {}",
                pointer.k_trail
            )));
        }
        if self.sections.offset < 0.0 {
            return Err(BackdropError::Config("section offset must not be negative".into()));
        }
        if self.scene.particle_count == 0 {
            return Err(BackdropError::Config("particle_count must be positive".into()));
        }
        if self.scene.bounds.iter().any(|&edge| edge <= 0.0) {
            return Err(BackdropError::Config("scene bounds must be positive".into()));
        }
        if self.scene.max_frame_step <= 0.0 {
            return Err(BackdropError::Config("max_frame_step must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(BackdropConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = BackdropConfig::from_json(
            r#"{ "pointer": { "k_cursor": 0.2 }, "scene": { "seed": 7 } }"#,
        )
        .unwrap();
        assert_eq!(config.pointer.k_cursor, 0.2);
        assert_eq!(config.pointer.k_trail, 0.08);
        assert_eq!(config.scene.seed, Some(7));
        assert_eq!(config.scene.particle_count, 1500);
        assert_eq!(config.sections.ids.len(), 6);
    }

    #[test]
    fn trail_must_be_slower_than_cursor() {
        let err = BackdropConfig::from_json(r#"{ "pointer": { "k_cursor": 0.1, "k_trail": 0.1 } }"#)
            .unwrap_err();
        assert!(matches!(err, BackdropError::Config(_)));
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = BackdropConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, BackdropError::Json(_)));
    }

    #[test]
    fn zero_particles_rejected() {
        let err = BackdropConfig::from_json(r#"{ "scene": { "particle_count": 0 } }"#).unwrap_err();
        assert!(matches!(err, BackdropError::Config(_)));
    }
}
