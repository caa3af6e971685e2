//! Peer-to-peer transport interface.
//!
//! A transport client is built around a [`TransportSink`]. Every connection
//! callback and data-change batch the client produces is pushed into that
//! sink, possibly from another thread. Consumers drain the sink on their
//! own thread, so nothing in the face is ever mutated from a transport
//! callback.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use log::warn;

use super::payload::{DataItem, DataMap};
use crate::error::TransportError;

/// Handle of a data listener registered on a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ListenerId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendCause {
    ServiceDisconnected,
    NetworkLost,
}

/// Connection lifecycle callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Suspended { cause: SuspendCause },
    Failed(TransportError),
}

/// One entry of a data-change batch.
#[derive(Debug, Clone, PartialEq)]
pub enum DataEvent {
    Changed(DataItem),
    Deleted { path: String },
}

impl DataEvent {
    pub fn path(&self) -> &str {
        match self {
            DataEvent::Changed(item) => &item.path,
            DataEvent::Deleted { path } => path,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connection(ConnectionEvent),
    Data(Vec<DataEvent>),
}

/// Receiver of transport callbacks. Implementations only enqueue.
pub trait TransportSink: Send + Sync {
    fn deliver(&self, event: TransportEvent);
}

impl<M, const N: usize> TransportSink for Channel<M, TransportEvent, N>
where
    M: RawMutex + Send + Sync,
{
    fn deliver(&self, event: TransportEvent) {
        if self.try_send(event).is_err() {
            warn!(" Transport event queue full, dropping event");
        }
    }
}

/// A connected (or connecting) transport client.
pub trait Transport {
    /// Start connecting; the outcome arrives as a [`ConnectionEvent`].
    fn connect(&mut self);

    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Atomically replace the data map stored at `path`.
    ///
    /// Completion is not reported; the transport delivers the item to
    /// listeners eventually. Identical consecutive puts are deduplicated.
    fn put_item(&mut self, path: &str, map: &DataMap) -> Result<(), TransportError>;

    /// Current item stored at `path`, if any.
    fn get_item(&self, path: &str) -> Option<DataItem>;

    /// Receive data batches for items under `path`.
    fn add_listener(&mut self, path: &str) -> Result<ListenerId, TransportError>;

    fn remove_listener(&mut self, id: ListenerId) -> Result<(), TransportError>;
}

/// Produces transport clients bound to a sink.
pub trait TransportBuilder {
    type Client: Transport;

    fn build(&mut self, sink: Arc<dyn TransportSink>) -> Self::Client;
}
