//! Data items exchanged over the transport, and the weather payload
//! carried inside them.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::forecast::ForecastRow;

/// Transport path of the weather payload.
pub const DATA_PATH: &str = crate::config::DEFAULT_DATA_PATH;

pub const KEY_MIN_TEMP: &str = "min_temp";
pub const KEY_MAX_TEMP: &str = "max_temp";
pub const KEY_WEATHER_ID: &str = "weather_id";

/// A typed value stored under a data-map key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum DataValue {
    Int(i32),
    Long(i64),
    Double(f64),
    Text(String),
    Bool(bool),
}

/// Key/value map stored at one transport path.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct DataMap {
    entries: BTreeMap<String, DataValue>,
}

impl DataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: &str, value: DataValue) {
        self.entries.insert(key.to_string(), value);
    }

    pub fn put_int(&mut self, key: &str, value: i32) {
        self.put(key, DataValue::Int(value));
    }

    pub fn get(&self, key: &str) -> Option<&DataValue> {
        self.entries.get(key)
    }

    /// `Ok(None)` when absent, an error when present with another type.
    pub fn get_int(&self, key: &str) -> Result<Option<i32>, SyncError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(DataValue::Int(v)) => Ok(Some(*v)),
            Some(_) => Err(SyncError::WrongType(key.to_string())),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A data map as stored by the transport, stamped with the version the
/// transport assigned when the put was accepted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DataItem {
    pub path: String,
    pub map: DataMap,
    pub version: u64,
}

impl DataItem {
    pub fn to_bytes(&self) -> Result<Vec<u8>, SyncError> {
        postcard::to_allocvec(self).map_err(|_| SyncError::Encoding)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        postcard::from_bytes(bytes).map_err(|_| SyncError::Encoding)
    }
}

/// Round half-up to a whole degree.
pub fn round_half_up(value: f64) -> Result<i32, SyncError> {
    if !value.is_finite() {
        return Err(SyncError::NonFiniteTemperature);
    }
    let rounded = libm::floor(value + 0.5);
    if rounded < f64::from(i32::MIN) || rounded > f64::from(i32::MAX) {
        return Err(SyncError::OutOfRange(value));
    }
    Ok(rounded as i32)
}

/// The three integers the companion publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WirePayload {
    pub min: i32,
    pub max: i32,
    pub cond: i32,
}

impl WirePayload {
    /// Build a payload from a content-store row.
    ///
    /// Rows with non-finite or inverted temperatures are rejected so that
    /// nothing meaningless reaches the wearable.
    pub fn from_row(row: &ForecastRow) -> Result<Self, SyncError> {
        if !row.min_temp.is_finite() || !row.max_temp.is_finite() {
            return Err(SyncError::NonFiniteTemperature);
        }
        if row.min_temp > row.max_temp {
            return Err(SyncError::InvertedRange {
                min: row.min_temp,
                max: row.max_temp,
            });
        }
        Ok(Self {
            min: round_half_up(row.min_temp)?,
            max: round_half_up(row.max_temp)?,
            cond: row.condition_id,
        })
    }

    pub fn to_data_map(&self) -> DataMap {
        let mut map = DataMap::new();
        map.put_int(KEY_MIN_TEMP, self.min);
        map.put_int(KEY_MAX_TEMP, self.max);
        map.put_int(KEY_WEATHER_ID, self.cond);
        map
    }

    /// Strict decode: all three keys must be present integers.
    pub fn from_data_map(map: &DataMap) -> Result<Self, SyncError> {
        let field = |key: &'static str| -> Result<i32, SyncError> {
            map.get_int(key)?.ok_or(SyncError::MissingKey(key))
        };
        Ok(Self {
            min: field(KEY_MIN_TEMP)?,
            max: field(KEY_MAX_TEMP)?,
            cond: field(KEY_WEATHER_ID)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(min_temp: f64, max_temp: f64) -> ForecastRow {
        ForecastRow {
            condition_id: 501,
            short_desc: String::from("Moderate rain"),
            min_temp,
            max_temp,
            obs_time: 0,
        }
    }

    #[test]
    fn test_rounding_is_half_up() {
        assert_eq!(round_half_up(3.4), Ok(3));
        assert_eq!(round_half_up(11.6), Ok(12));
        assert_eq!(round_half_up(2.5), Ok(3));
        assert_eq!(round_half_up(-2.5), Ok(-2));
        assert_eq!(round_half_up(f64::NAN), Err(SyncError::NonFiniteTemperature));
        assert!(matches!(round_half_up(1e12), Err(SyncError::OutOfRange(_))));
    }

    #[test]
    fn test_payload_from_row() {
        let payload = WirePayload::from_row(&row(3.4, 11.6)).unwrap();
        assert_eq!(
            payload,
            WirePayload {
                min: 3,
                max: 12,
                cond: 501
            }
        );

        let map = payload.to_data_map();
        assert_eq!(map.get_int(KEY_MIN_TEMP), Ok(Some(3)));
        assert_eq!(map.get_int(KEY_MAX_TEMP), Ok(Some(12)));
        assert_eq!(map.get_int(KEY_WEATHER_ID), Ok(Some(501)));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_invalid_rows_rejected() {
        assert_eq!(
            WirePayload::from_row(&row(f64::NAN, 10.0)),
            Err(SyncError::NonFiniteTemperature)
        );
        assert_eq!(
            WirePayload::from_row(&row(5.0, f64::INFINITY)),
            Err(SyncError::NonFiniteTemperature)
        );
        assert!(matches!(
            WirePayload::from_row(&row(12.0, 3.0)),
            Err(SyncError::InvertedRange { .. })
        ));
    }

    #[test]
    fn test_strict_decode_needs_all_keys() {
        let mut map = DataMap::new();
        map.put_int(KEY_MIN_TEMP, 5);
        map.put_int(KEY_MAX_TEMP, 15);
        assert_eq!(
            WirePayload::from_data_map(&map),
            Err(SyncError::MissingKey(KEY_WEATHER_ID))
        );

        map.put(KEY_WEATHER_ID, DataValue::Text(String::from("800")));
        assert_eq!(
            WirePayload::from_data_map(&map),
            Err(SyncError::WrongType(String::from(KEY_WEATHER_ID)))
        );
    }

    #[test]
    fn test_item_survives_byte_link() {
        let item = DataItem {
            path: String::from(DATA_PATH),
            map: WirePayload {
                min: -4,
                max: 2,
                cond: 600,
            }
            .to_data_map(),
            version: 7,
        };
        let bytes = item.to_bytes().unwrap();
        assert_eq!(DataItem::from_bytes(&bytes), Ok(item));
    }
}
