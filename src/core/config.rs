//! Engine configuration, loadable from JSON

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::types::{Result, Rgba};
use crate::slice::color::{ColorMap, ScalingType};
use crate::volume::region::TextureFilter;
use crate::volume::sizing::MAX_TEXTURE_DIM;

/// Tunables for region sizing and slice rendering.
///
/// Every field has a default, so a config file only needs the keys it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Memory budget for a materialized region, in megabytes (10^6 bytes)
    pub max_cube_size_mb: i64,
    /// Largest allowed region extent along any axis
    pub max_texture_dim: i32,
    /// Sampling filter requested for new regions
    pub texture_filter: TextureFilter,
    /// Value scaling applied before color mapping
    pub scaling: ScalingType,
    /// Color map for slice pixels
    pub color_map: ColorMap,
    /// Border color for masked regions
    pub mask_color: Rgba,
    /// Border color for the highlighted source
    pub highlight_color: Rgba,
    /// Opacity (0-1) of interior mask fill; 0 draws borders only
    pub mask_opacity: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_cube_size_mb: 1000,
            max_texture_dim: MAX_TEXTURE_DIM,
            texture_filter: TextureFilter::Point,
            scaling: ScalingType::Linear,
            color_map: ColorMap::Greyscale,
            mask_color: [255, 255, 255, 255],
            highlight_color: [255, 64, 64, 255],
            mask_opacity: 0.0,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Write as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_texture_dim, 2048);
        assert_eq!(config.max_cube_size_mb, 1000);
        assert_eq!(config.mask_opacity, 0.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "max_cube_size_mb": 64, "scaling": "Log" }"#).unwrap();
        assert_eq!(config.max_cube_size_mb, 64);
        assert_eq!(config.scaling, ScalingType::Log);
        assert_eq!(config.max_texture_dim, 2048);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");

        let config = EngineConfig {
            max_cube_size_mb: 256,
            color_map: ColorMap::Heat,
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let result = EngineConfig::load("/definitely/not/here.json");
        assert!(matches!(result, Err(crate::core::Error::Io(_))));
    }
}
