// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// What used to be scattered compile-time constants (validation toggle, image
// format, scenario side lengths) is one immutable value, loaded up front and
// passed to setup explicitly. Defaults apply when config.toml is missing or
// broken.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ProbeConfig {
    pub probe: ScenarioConfig,
    pub debug: DebugConfig,
}

/// Reproduction scenario settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Side length of the images expected to get their own memory blocks
    pub large_side: u32,
    /// Side length of the images small enough to share one block
    pub small_side: u32,
    /// Pixel format of every probe image
    pub format: String,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            large_side: 512,
            // The exact threshold is driver dependent; the aliasing was seen
            // with side lengths of ~300 and below.
            small_side: 32,
            format: "rgba32f".to_string(),
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
        }
    }
}

impl ProbeConfig {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {}. Using defaults.", e);
            ProbeConfig::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(ProbeConfig::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: ProbeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Get the image format as a Vulkan enum
    pub fn image_format(&self) -> vk::Format {
        match self.probe.format.to_lowercase().as_str() {
            "rgba32f" => vk::Format::R32G32B32A32_SFLOAT,
            "rgba16f" => vk::Format::R16G16B16A16_SFLOAT,
            "rgba8" => vk::Format::R8G8B8A8_UNORM,
            _ => {
                log::warn!(
                    "Unknown image format '{}', defaulting to rgba32f",
                    self.probe.format
                );
                vk::Format::R32G32B32A32_SFLOAT
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reproduction_scenario() {
        let config = ProbeConfig::default();
        assert_eq!(config.probe.large_side, 512);
        assert_eq!(config.probe.small_side, 32);
        assert!(config.debug.validation_layers);
        assert_eq!(config.image_format(), vk::Format::R32G32B32A32_SFLOAT);
    }

    #[test]
    fn format_names_map_to_vulkan_formats() {
        let mut config = ProbeConfig::default();

        config.probe.format = "RGBA16F".to_string();
        assert_eq!(config.image_format(), vk::Format::R16G16B16A16_SFLOAT);

        config.probe.format = "rgba8".to_string();
        assert_eq!(config.image_format(), vk::Format::R8G8B8A8_UNORM);

        config.probe.format = "something else".to_string();
        assert_eq!(config.image_format(), vk::Format::R32G32B32A32_SFLOAT);
    }

    #[test]
    fn toml_overlay_overrides_defaults() {
        let config: ProbeConfig = toml::from_str(
            r#"
            [probe]
            large_side = 640
            small_side = 16

            [debug]
            validation_layers = false
            "#,
        )
        .expect("parse inline config");

        assert_eq!(config.probe.large_side, 640);
        assert_eq!(config.probe.small_side, 16);
        assert_eq!(config.probe.format, "rgba32f");
        assert!(!config.debug.validation_layers);
    }
}
