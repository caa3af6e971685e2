//! Forecast rows, the face's forecast cache, and the background refresh
//! that fills it from the wearable's own content store.

pub mod assets;
pub mod refresh;
pub mod source;

use alloc::string::String;

pub use assets::{AssetResolver, SunshineAssets, WeatherArt, display_degrees};
pub use refresh::{
    CancelToken, ForecastSummary, QueuedWorker, RefreshOutcome, RefreshRequest, RefreshTask,
    RefreshTicket, RefreshWorker, WakeLock, WakeLockGuard,
};
pub use source::{
    ContentSource, FixedPreferences, ForecastQuery, ForecastTable, PreferenceStore,
    FORECAST_COLUMNS,
};

/// One day of forecast as stored by the weather provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRow {
    pub condition_id: i32,
    pub short_desc: String,
    /// Celsius
    pub min_temp: f64,
    /// Celsius
    pub max_temp: f64,
    /// Epoch millis of the forecast day
    pub obs_time: i64,
}

/// A single cell of [`ForecastCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCell {
    Min(i32),
    Max(i32),
    Condition(i32),
}

/// The latest forecast values known to the face. Temperatures are whole
/// degrees in the face's display unit.
///
/// Each cell fills independently: a payload that carries only the minimum
/// temperature leaves the other cells as they were.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForecastCache {
    pub min: Option<i32>,
    pub max: Option<i32>,
    pub cond: Option<i32>,
}

impl ForecastCache {
    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none() && self.cond.is_none()
    }

    /// Store a cell, returning whether the cached value changed.
    pub fn set(&mut self, cell: CacheCell) -> bool {
        match cell {
            CacheCell::Min(v) => replace_if_changed(&mut self.min, v),
            CacheCell::Max(v) => replace_if_changed(&mut self.max, v),
            CacheCell::Condition(v) => replace_if_changed(&mut self.cond, v),
        }
    }

    /// Fill every cell from a fetched summary.
    pub fn fill(&mut self, max: i32, min: i32, cond: i32) -> bool {
        let mut changed = self.set(CacheCell::Max(max));
        changed |= self.set(CacheCell::Min(min));
        changed |= self.set(CacheCell::Condition(cond));
        changed
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

fn replace_if_changed<T: PartialEq>(slot: &mut Option<T>, value: T) -> bool {
    if slot.as_ref() == Some(&value) {
        return false;
    }
    *slot = Some(value);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cells_fill_independently() {
        let mut cache = ForecastCache::default();
        assert!(cache.is_empty());

        assert!(cache.set(CacheCell::Min(12)));
        assert_eq!(cache.min, Some(12));
        assert_eq!(cache.max, None);
        assert_eq!(cache.cond, None);
        assert!(!cache.is_empty());
    }

    #[test]
    fn test_same_value_reports_unchanged() {
        let mut cache = ForecastCache::default();
        assert!(cache.fill(24, 12, 800));
        assert!(!cache.fill(24, 12, 800));
        assert!(cache.set(CacheCell::Condition(500)));
    }

    #[test]
    fn test_clear_empties_cache() {
        let mut cache = ForecastCache::default();
        cache.fill(24, 12, 800);
        cache.clear();
        assert!(cache.is_empty());
    }
}
