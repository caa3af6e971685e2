//! Watch-face configuration
//!
//! Configuration is stored as postcard binary data. Every field has a
//! default matching a 240x240 panel, so a device without a stored config
//! runs with [`FaceConfig::default`].

use alloc::string::String;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Well-known transport path of the weather payload.
pub const DEFAULT_DATA_PATH: &str = "/sunshine/weather";

/// Location used when the user never picked one.
pub const DEFAULT_LOCATION: &str = "94043";

/// Display unit for temperatures. Payloads always travel in Celsius.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemperatureUnit {
    #[default]
    Metric,
    Imperial,
}

impl TemperatureUnit {
    /// Convert a Celsius reading into this unit, unrounded.
    pub fn from_celsius(self, celsius: f64) -> f64 {
        match self {
            TemperatureUnit::Metric => celsius,
            TemperatureUnit::Imperial => celsius * 9.0 / 5.0 + 32.0,
        }
    }
}

/// Pixel geometry of the face.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LayoutConfig {
    pub width: u32,
    pub height: u32,
    /// Clock x position on square screens
    pub x_offset_square: i32,
    /// Clock x position on round screens (inset to clear the bezel)
    pub x_offset_round: i32,
    /// Clock baseline
    pub y_offset: i32,
    pub icon_size: u32,
    /// Added to the date baseline after subtracting the text height
    pub date_nudge: i32,
    /// Gap between the date baseline and the top of the icon
    pub icon_top_gap: i32,
    /// Temperature baseline, measured from the date baseline
    pub weather_row_offset: i32,
    /// Gap between the icon's right edge and the minimum temperature
    pub low_temp_gap: i32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            width: 240,
            height: 240,
            x_offset_square: 40,
            x_offset_round: 48,
            y_offset: 72,
            icon_size: 60,
            date_nudge: 10,
            icon_top_gap: 15,
            weather_row_offset: 60,
            low_temp_gap: 10,
        }
    }
}

/// Data-sync settings shared by publisher and subscriber.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub data_path: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            data_path: String::from(DEFAULT_DATA_PATH),
        }
    }
}

/// Settings of the wearable's own forecast refresh.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RefreshConfig {
    pub wake_lock_tag: String,
    pub default_location: String,
    pub unit: TemperatureUnit,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            wake_lock_tag: String::from("SunshineWatchFaceWakeLock"),
            default_location: String::from(DEFAULT_LOCATION),
            unit: TemperatureUnit::Metric,
        }
    }
}

/// Top-level watch-face configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FaceConfig {
    pub layout: LayoutConfig,
    pub sync: SyncConfig,
    pub refresh: RefreshConfig,
    /// TIME tick period; ticks land on multiples of this
    pub tick_interval_ms: i64,
    /// FORECAST period; refreshes land on multiples of this
    pub forecast_interval_ms: i64,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            layout: LayoutConfig::default(),
            sync: SyncConfig::default(),
            refresh: RefreshConfig::default(),
            tick_interval_ms: 1_000,
            forecast_interval_ms: 3_600_000,
        }
    }
}

impl FaceConfig {
    /// Decode and validate a postcard-encoded configuration.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = postcard::from_bytes(bytes).map_err(|_| ConfigError::Decode)?;
        config.validate()?;
        Ok(config)
    }

    /// Encode the configuration for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(|_| ConfigError::Encode)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms <= 0 || self.forecast_interval_ms <= 0 {
            return Err(ConfigError::Invalid("tick intervals must be positive"));
        }
        if self.layout.width == 0 || self.layout.height == 0 {
            return Err(ConfigError::Invalid("display size must be non-zero"));
        }
        if !self.sync.data_path.starts_with('/') {
            return Err(ConfigError::Invalid("data path must be absolute"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(FaceConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_config_survives_storage() {
        let mut config = FaceConfig::default();
        config.refresh.unit = TemperatureUnit::Imperial;
        config.layout.y_offset = 80;

        let bytes = config.to_bytes().unwrap();
        assert_eq!(FaceConfig::from_bytes(&bytes).unwrap(), config);
    }

    #[test]
    fn test_relative_data_path_rejected() {
        let mut config = FaceConfig::default();
        config.sync.data_path = String::from("sunshine/weather");

        let bytes = config.to_bytes().unwrap();
        assert!(matches!(
            FaceConfig::from_bytes(&bytes),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_garbage_fails_to_decode() {
        assert_eq!(FaceConfig::from_bytes(&[0xff]), Err(ConfigError::Decode));
    }
}
