//! Hardware-independent core of the Sunshine weather watch face
//!
//! This crate contains everything the wearable and its companion share:
//! the weather data-sync protocol, the watch-face state machine with its
//! tick scheduler, the asynchronous forecast refresh, and the renderer.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on embedded
//! targets and on desktop hosts (for the simulator and tests). Platform
//! services (display surface, transport radio, content store, wake locks)
//! are reached through traits.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod clock;
pub mod config;
pub mod error;
pub mod face;
pub mod forecast;
pub mod framebuffer;
pub mod sync;

pub use clock::{Clock, WallTime, Zone};
pub use config::{FaceConfig, TemperatureUnit};
pub use error::{ConfigError, RefreshError, SyncError, TransportError};
pub use face::{FaceEngine, FaceEvent, FaceMailbox, FaceRunner};
pub use forecast::{ForecastCache, ForecastRow};
pub use sync::{WeatherPublisher, WeatherSubscriber, WirePayload};
