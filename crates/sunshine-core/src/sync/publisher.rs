//! Companion-side publisher of the weather payload.
//!
//! Publishing is best-effort. A payload is held until the transport reports
//! `Connected`, then written with a single put whose completion is not
//! awaited. A suspended or failed connection drops the held payload; the
//! next refresh cycle publishes again.

use alloc::string::String;
use alloc::sync::Arc;
use log::{debug, info, warn};

use super::payload::WirePayload;
use super::transport::{ConnectionEvent, Transport, TransportBuilder, TransportEvent, TransportSink};
use crate::clock::Zone;
use crate::error::{RefreshError, SyncError};
use crate::forecast::{ContentSource, ForecastQuery, ForecastRow, PreferenceStore};

pub struct WeatherPublisher<B: TransportBuilder> {
    builder: B,
    sink: Arc<dyn TransportSink>,
    client: Option<B::Client>,
    pending: Option<WirePayload>,
    data_path: String,
}

impl<B: TransportBuilder> WeatherPublisher<B> {
    /// `sink` receives the client's callbacks; the host feeds them back
    /// through [`WeatherPublisher::on_transport_event`].
    pub fn new(builder: B, sink: Arc<dyn TransportSink>, data_path: &str) -> Self {
        Self {
            builder,
            sink,
            client: None,
            pending: None,
            data_path: String::from(data_path),
        }
    }

    /// Publish today's row. `None` leaves the published payload untouched.
    pub fn publish(&mut self, row: Option<&ForecastRow>) -> Result<(), SyncError> {
        let Some(row) = row else {
            debug!(" No forecast row, keeping the published payload");
            return Ok(());
        };

        let payload = WirePayload::from_row(row).inspect_err(|err| {
            warn!(" Not publishing forecast: {}", err);
        })?;
        self.pending = Some(payload);

        let client = self
            .client
            .get_or_insert_with(|| self.builder.build(self.sink.clone()));
        if client.is_connected() {
            self.flush();
        } else {
            client.connect();
        }
        Ok(())
    }

    /// Read today's row for the preferred location and publish it.
    pub fn refresh<S, P>(
        &mut self,
        source: &S,
        prefs: &P,
        now_millis: i64,
        zone: &Zone,
    ) -> Result<(), RefreshError>
    where
        S: ContentSource + ?Sized,
        P: PreferenceStore + ?Sized,
    {
        let location = prefs.location_or_default();
        let query = ForecastQuery::today(&location, now_millis, zone);
        let row = source.query(&query)?;
        self.publish(row.as_ref())?;
        Ok(())
    }

    /// Handle a callback produced by the publisher's own client.
    pub fn on_transport_event(&mut self, event: &TransportEvent) {
        match event {
            TransportEvent::Connection(ConnectionEvent::Connected) => self.flush(),
            TransportEvent::Connection(ConnectionEvent::Suspended { cause }) => {
                info!(" Publisher connection suspended ({:?})", cause);
                self.pending = None;
            }
            TransportEvent::Connection(ConnectionEvent::Failed(err)) => {
                info!(" Publisher connection failed: {}", err);
                self.pending = None;
            }
            TransportEvent::Data(_) => {}
        }
    }

    /// Payload waiting for a connection.
    pub fn pending(&self) -> Option<WirePayload> {
        self.pending
    }

    pub fn is_connected(&self) -> bool {
        self.client.as_ref().is_some_and(|client| client.is_connected())
    }

    /// Disconnect and release the client.
    pub fn shutdown(&mut self) {
        if let Some(mut client) = self.client.take() {
            client.disconnect();
        }
        self.pending = None;
    }

    fn flush(&mut self) {
        let Some(payload) = self.pending.take() else {
            return;
        };
        let Some(client) = self.client.as_mut() else {
            return;
        };
        match client.put_item(&self.data_path, &payload.to_data_map()) {
            Ok(()) => info!(
                " Published forecast min={} max={} cond={}",
                payload.min, payload.max, payload.cond
            ),
            Err(err) => warn!(" Forecast put failed: {}", err),
        }
    }
}
