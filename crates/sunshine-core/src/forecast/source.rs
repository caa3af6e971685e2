//! Content store and preference access for forecast lookups

use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::debug;

use super::ForecastRow;
use crate::clock::{Zone, start_of_local_day};
use crate::config::{DEFAULT_LOCATION, TemperatureUnit};
use crate::error::RefreshError;

/// Projection read by the refresh, in column order.
pub const FORECAST_COLUMNS: [&str; 4] = ["weather_id", "short_desc", "max_temp", "min_temp"];

/// Rows for `location` dated at or after `start_millis`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastQuery {
    pub location: String,
    pub start_millis: i64,
}

impl ForecastQuery {
    /// Today's forecast at `location`: the start is moved back to local
    /// midnight so the current day's row matches.
    pub fn today(location: &str, now_millis: i64, zone: &Zone) -> Self {
        Self {
            location: String::from(location),
            start_millis: start_of_local_day(now_millis, zone),
        }
    }
}

/// Read access to the weather content store.
pub trait ContentSource {
    /// First matching row in ascending date order.
    ///
    /// `Ok(None)` is an empty cursor; `Err` stands for a store that could
    /// not produce a cursor at all.
    fn query(&self, query: &ForecastQuery) -> Result<Option<ForecastRow>, RefreshError>;
}

impl<T: ContentSource + ?Sized> ContentSource for &T {
    fn query(&self, query: &ForecastQuery) -> Result<Option<ForecastRow>, RefreshError> {
        (**self).query(query)
    }
}

impl<T: ContentSource + ?Sized> ContentSource for alloc::sync::Arc<T> {
    fn query(&self, query: &ForecastQuery) -> Result<Option<ForecastRow>, RefreshError> {
        (**self).query(query)
    }
}

/// User preferences consulted by a refresh.
pub trait PreferenceStore {
    /// `None` when the user never chose a location.
    fn preferred_location(&self) -> Option<String>;

    fn temperature_unit(&self) -> TemperatureUnit;

    fn location_or_default(&self) -> String {
        self.preferred_location()
            .unwrap_or_else(|| String::from(DEFAULT_LOCATION))
    }
}

/// Preferences fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct FixedPreferences {
    pub location: Option<String>,
    pub unit: TemperatureUnit,
}

impl PreferenceStore for FixedPreferences {
    fn preferred_location(&self) -> Option<String> {
        self.location.clone()
    }

    fn temperature_unit(&self) -> TemperatureUnit {
        self.unit
    }
}

struct TableState {
    rows: Vec<(String, ForecastRow)>,
    available: bool,
}

/// In-memory forecast store shared between threads.
pub struct ForecastTable {
    state: Mutex<CriticalSectionRawMutex, RefCell<TableState>>,
}

impl Default for ForecastTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ForecastTable {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(TableState {
                rows: Vec::new(),
                available: true,
            })),
        }
    }

    pub fn insert(&self, location: &str, row: ForecastRow) {
        self.state.lock(|state| {
            state
                .borrow_mut()
                .rows
                .push((String::from(location), row));
        });
    }

    /// Remove every row.
    pub fn clear(&self) {
        self.state.lock(|state| state.borrow_mut().rows.clear());
    }

    /// While unavailable, queries fail instead of returning a cursor.
    pub fn set_available(&self, available: bool) {
        self.state
            .lock(|state| state.borrow_mut().available = available);
    }
}

impl ContentSource for ForecastTable {
    fn query(&self, query: &ForecastQuery) -> Result<Option<ForecastRow>, RefreshError> {
        self.state.lock(|state| {
            let state = state.borrow();
            if !state.available {
                return Err(RefreshError::Unavailable(String::from(
                    "forecast table offline",
                )));
            }

            let row = state
                .rows
                .iter()
                .filter(|(location, row)| {
                    *location == query.location && row.obs_time >= query.start_millis
                })
                .map(|(_, row)| row)
                .min_by_key(|row| row.obs_time)
                .cloned();

            debug!(
                " Forecast query for {} from {} matched: {}",
                query.location,
                query.start_millis,
                row.is_some()
            );
            Ok(row)
        })
    }
}
