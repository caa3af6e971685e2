//! Weather data sync between the companion and the wearable.
//!
//! The companion's [`WeatherPublisher`] writes `{min_temp, max_temp,
//! weather_id}` to [`DATA_PATH`]; the wearable's [`WeatherSubscriber`]
//! folds every change at that path into its forecast cache. The transport
//! keeps the last put per path, so neither side tracks sequence numbers.

pub mod loopback;
pub mod payload;
pub mod publisher;
pub mod subscriber;
pub mod transport;

pub use loopback::{LoopbackClient, SyncHub};
pub use payload::{
    DATA_PATH, DataItem, DataMap, DataValue, KEY_MAX_TEMP, KEY_MIN_TEMP, KEY_WEATHER_ID,
    WirePayload, round_half_up,
};
pub use publisher::WeatherPublisher;
pub use subscriber::WeatherSubscriber;
pub use transport::{
    ConnectionEvent, DataEvent, ListenerId, SuspendCause, Transport, TransportBuilder,
    TransportEvent, TransportSink,
};
