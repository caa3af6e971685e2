//! Condition-code artwork and temperature formatting.

use core::fmt::Write;
use heapless::String;

use crate::config::TemperatureUnit;
use crate::error::SyncError;
use crate::sync::round_half_up;

/// Artwork the face can draw for a weather condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherArt {
    Clear,
    LightClouds,
    Clouds,
    LightRain,
    Rain,
    Snow,
    Storm,
    Fog,
}

/// Maps provider data onto something the face can show.
pub trait AssetResolver {
    /// Artwork for an OpenWeatherMap condition code, `None` when the code
    /// has no artwork.
    fn art_for_condition(&self, condition_id: i32) -> Option<WeatherArt>;

    /// Label such as `24°` for whole degrees already in the display unit.
    fn format_degrees(&self, degrees: i32) -> String<16>;

    /// Label for a Celsius reading shown in `unit`.
    fn format_temperature(&self, celsius: f64, unit: TemperatureUnit) -> String<16> {
        match display_degrees(celsius, unit) {
            Ok(degrees) => self.format_degrees(degrees),
            Err(_) => unknown_degrees(),
        }
    }
}

/// Whole degrees of a Celsius reading in `unit`. The value is converted
/// first and rounded once, so every label of the same reading agrees.
pub fn display_degrees(celsius: f64, unit: TemperatureUnit) -> Result<i32, SyncError> {
    round_half_up(unit.from_celsius(celsius))
}

fn unknown_degrees() -> String<16> {
    let mut text = String::new();
    let _ = text.push_str("--°");
    text
}

/// Artwork table of the Sunshine app.
#[derive(Debug, Clone, Copy, Default)]
pub struct SunshineAssets;

impl AssetResolver for SunshineAssets {
    fn art_for_condition(&self, condition_id: i32) -> Option<WeatherArt> {
        let art = match condition_id {
            200..=232 => WeatherArt::Storm,
            300..=321 => WeatherArt::LightRain,
            500..=504 => WeatherArt::Rain,
            511 => WeatherArt::Snow,
            520..=531 => WeatherArt::Rain,
            600..=622 => WeatherArt::Snow,
            701..=761 => WeatherArt::Fog,
            781 => WeatherArt::Storm,
            800 => WeatherArt::Clear,
            801 => WeatherArt::LightClouds,
            802..=804 => WeatherArt::Clouds,
            _ => return None,
        };
        Some(art)
    }

    fn format_degrees(&self, degrees: i32) -> String<16> {
        let mut text = String::new();
        if write!(text, "{}°", degrees).is_err() {
            return unknown_degrees();
        }
        text
    }
}
