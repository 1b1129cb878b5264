use serde::{Deserialize, Serialize};

use crate::playback::positive;
use crate::style::StyleConfig;
use crate::{InterpolationOptions, PlaybackConfig};

/// Every tunable, with defaults matching what the public feeds expect. Any field may be omitted
/// from a JSON config file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// When false, vehicles jump from breakpoint to breakpoint
    pub interpolate: bool,
    /// How long past its last breakpoint a vehicle stays on the map
    pub expiry_grace_ms: f64,
    /// Pointer distance, in pixels, that still counts as touching a vehicle
    pub hit_tolerance_px: f64,
    pub refresh_interval_ms: f64,
    pub playback: PlaybackConfig,
    pub style: StyleConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        let interpolation = InterpolationOptions::default();
        Self {
            interpolate: interpolation.enabled,
            expiry_grace_ms: interpolation.expiry_grace_ms,
            hit_tolerance_px: 10.0,
            refresh_interval_ms: 3000.0,
            playback: PlaybackConfig::default(),
            style: StyleConfig::default(),
        }
    }
}

impl TrackerConfig {
    pub fn interpolation(&self) -> InterpolationOptions {
        InterpolationOptions {
            enabled: self.interpolate,
            expiry_grace_ms: self.expiry_grace_ms,
        }
    }

    pub fn load(path: &str) -> anyhow::Result<Self> {
        let raw = fs_err::read_to_string(path)?;
        Self::from_json(&raw).map_err(|err| anyhow!("Bad config in {path}: {err}"))
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        if config.hit_tolerance_px < 0.0 || config.expiry_grace_ms < 0.0 {
            bail!("hit_tolerance_px and expiry_grace_ms can't be negative");
        }
        if !positive(config.refresh_interval_ms) {
            bail!("refresh_interval_ms must be positive");
        }
        config.playback.validate()?;
        Ok(config)
    }
}
