//! Wearable-side subscriber that folds data events into the forecast cache.

use alloc::string::String;
use log::{debug, warn};

use super::payload::{DataMap, KEY_MAX_TEMP, KEY_MIN_TEMP, KEY_WEATHER_ID};
use super::transport::{DataEvent, ListenerId, Transport};
use crate::config::TemperatureUnit;
use crate::forecast::{CacheCell, ForecastCache, display_degrees};

pub struct WeatherSubscriber {
    data_path: String,
    listener: Option<ListenerId>,
}

impl WeatherSubscriber {
    pub fn new(data_path: &str) -> Self {
        Self {
            data_path: String::from(data_path),
            listener: None,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.listener.is_some()
    }

    /// Attach the data listener once the transport is connected.
    pub fn on_connected<T: Transport + ?Sized>(&mut self, transport: &mut T) {
        if self.listener.is_some() {
            return;
        }
        match transport.add_listener(&self.data_path) {
            Ok(id) => {
                debug!(" Listening for {} as {:?}", self.data_path, id);
                self.listener = Some(id);
            }
            Err(err) => warn!(" Could not attach weather listener: {}", err),
        }
    }

    /// Forget the listener after the transport dropped the connection.
    pub fn on_connection_lost(&mut self) {
        self.listener = None;
    }

    /// Remove the listener from `transport`.
    pub fn detach<T: Transport + ?Sized>(&mut self, transport: &mut T) {
        if let Some(id) = self.listener.take()
            && let Err(err) = transport.remove_listener(id)
        {
            debug!(" Listener {:?} already gone: {}", id, err);
        }
    }

    /// Fold a batch of data events into `cache`, converting the Celsius
    /// payload into `unit`. Returns whether any cell changed.
    pub fn apply(
        &self,
        events: &[DataEvent],
        cache: &mut ForecastCache,
        unit: TemperatureUnit,
    ) -> bool {
        let mut changed = false;
        for event in events {
            match event {
                DataEvent::Changed(item) if item.path == self.data_path => {
                    changed |= apply_map(&item.map, cache, unit);
                }
                DataEvent::Changed(_) => {}
                DataEvent::Deleted { path } => {
                    debug!(" Ignoring deletion of {}", path);
                }
            }
        }
        changed
    }
}

/// Recognized keys update their cell; anything else is left alone.
fn apply_map(map: &DataMap, cache: &mut ForecastCache, unit: TemperatureUnit) -> bool {
    let cells: [(&str, fn(i32) -> CacheCell, bool); 3] = [
        (KEY_MIN_TEMP, CacheCell::Min, true),
        (KEY_MAX_TEMP, CacheCell::Max, true),
        (KEY_WEATHER_ID, CacheCell::Condition, false),
    ];

    let mut changed = false;
    for (key, cell, is_temperature) in cells {
        let value = match map.get_int(key) {
            Ok(Some(value)) => value,
            Ok(None) => continue,
            Err(err) => {
                warn!(" Ignoring weather value: {}", err);
                continue;
            }
        };
        let value = if is_temperature {
            match display_degrees(f64::from(value), unit) {
                Ok(degrees) => degrees,
                Err(err) => {
                    warn!(" Ignoring {}: {}", key, err);
                    continue;
                }
            }
        } else {
            value
        };
        changed |= cache.set(cell(value));
    }
    changed
}
