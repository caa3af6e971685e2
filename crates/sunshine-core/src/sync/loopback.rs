//! In-process transport.
//!
//! [`SyncHub`] stands in for the peer-to-peer data layer: every client built
//! from the same hub shares one item store. Puts are versioned per hub,
//! identical consecutive puts to a path are dropped, and accepted puts fan
//! out to every connected listener whose path matches. The simulator runs
//! the companion and the wearable against one hub; tests use it to control
//! connection failures.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{debug, info};

use super::payload::{DataItem, DataMap};
use super::transport::{
    ConnectionEvent, DataEvent, ListenerId, SuspendCause, Transport, TransportBuilder,
    TransportEvent, TransportSink,
};
use crate::error::TransportError;

struct ClientEntry {
    sink: Arc<dyn TransportSink>,
    connected: bool,
    listeners: Vec<(ListenerId, String)>,
}

struct HubState {
    items: BTreeMap<String, DataItem>,
    clients: BTreeMap<u32, ClientEntry>,
    next_version: u64,
    next_client: u32,
    next_listener: u32,
    reachable: bool,
}

type Outbox = Vec<(Arc<dyn TransportSink>, TransportEvent)>;

impl HubState {
    /// Queue `event` for every connected client listening below `path`.
    fn fan_out(&self, path: &str, event: &DataEvent, outbox: &mut Outbox) {
        for entry in self.clients.values() {
            let listening = entry
                .listeners
                .iter()
                .any(|(_, prefix)| path.starts_with(prefix.as_str()));
            if entry.connected && listening {
                outbox.push((
                    entry.sink.clone(),
                    TransportEvent::Data(vec![event.clone()]),
                ));
            }
        }
    }
}

struct HubShared {
    state: Mutex<CriticalSectionRawMutex, RefCell<HubState>>,
}

impl HubShared {
    /// Run `f` under the hub lock, then deliver whatever it queued once
    /// the lock is released.
    fn with_state<R>(&self, f: impl FnOnce(&mut HubState, &mut Outbox) -> R) -> R {
        let mut outbox = Outbox::new();
        let result = self
            .state
            .lock(|state| f(&mut *state.borrow_mut(), &mut outbox));
        for (sink, event) in outbox {
            sink.deliver(event);
        }
        result
    }
}

/// Shared item store that hands out [`LoopbackClient`]s.
#[derive(Clone)]
pub struct SyncHub {
    shared: Arc<HubShared>,
}

impl Default for SyncHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncHub {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(HubShared {
                state: Mutex::new(RefCell::new(HubState {
                    items: BTreeMap::new(),
                    clients: BTreeMap::new(),
                    next_version: 1,
                    next_client: 0,
                    next_listener: 0,
                    reachable: true,
                })),
            }),
        }
    }

    /// While unreachable, connection attempts fail.
    pub fn set_reachable(&self, reachable: bool) {
        self.shared.with_state(|state, _| state.reachable = reachable);
    }

    /// Drop every live connection, reporting `cause` to each client.
    pub fn suspend_all(&self, cause: SuspendCause) {
        self.shared.with_state(|state, outbox| {
            for entry in state.clients.values_mut() {
                if entry.connected {
                    entry.connected = false;
                    entry.listeners.clear();
                    outbox.push((
                        entry.sink.clone(),
                        TransportEvent::Connection(ConnectionEvent::Suspended { cause }),
                    ));
                }
            }
        });
    }

    /// Delete the item at `path` and notify listeners.
    pub fn delete(&self, path: &str) {
        self.shared.with_state(|state, outbox| {
            if state.items.remove(path).is_some() {
                let event = DataEvent::Deleted {
                    path: String::from(path),
                };
                state.fan_out(path, &event, outbox);
            }
        });
    }

    pub fn item(&self, path: &str) -> Option<DataItem> {
        self.shared
            .with_state(|state, _| state.items.get(path).cloned())
    }

    /// Clients built from this hub that are still alive.
    pub fn client_count(&self) -> usize {
        self.shared.with_state(|state, _| state.clients.len())
    }

    /// Listeners registered across all clients.
    pub fn listener_count(&self) -> usize {
        self.shared.with_state(|state, _| {
            state
                .clients
                .values()
                .map(|entry| entry.listeners.len())
                .sum()
        })
    }
}

impl TransportBuilder for SyncHub {
    type Client = LoopbackClient;

    fn build(&mut self, sink: Arc<dyn TransportSink>) -> LoopbackClient {
        let id = self.shared.with_state(|state, _| {
            let id = state.next_client;
            state.next_client = state.next_client.wrapping_add(1);
            state.clients.insert(
                id,
                ClientEntry {
                    sink,
                    connected: false,
                    listeners: Vec::new(),
                },
            );
            id
        });
        debug!(" Built loopback client {}", id);
        LoopbackClient {
            shared: self.shared.clone(),
            id,
        }
    }
}

/// A client of a [`SyncHub`]. Dropping it unregisters it from the hub.
pub struct LoopbackClient {
    shared: Arc<HubShared>,
    id: u32,
}

impl Transport for LoopbackClient {
    fn connect(&mut self) {
        let id = self.id;
        self.shared.with_state(|state, outbox| {
            let reachable = state.reachable;
            let Some(entry) = state.clients.get_mut(&id) else {
                return;
            };
            let event = if reachable {
                entry.connected = true;
                ConnectionEvent::Connected
            } else {
                ConnectionEvent::Failed(TransportError::Unreachable)
            };
            outbox.push((entry.sink.clone(), TransportEvent::Connection(event)));
        });
    }

    fn disconnect(&mut self) {
        let id = self.id;
        self.shared.with_state(|state, _| {
            if let Some(entry) = state.clients.get_mut(&id) {
                entry.connected = false;
                entry.listeners.clear();
            }
        });
    }

    fn is_connected(&self) -> bool {
        let id = self.id;
        self.shared.with_state(|state, _| {
            state
                .clients
                .get(&id)
                .is_some_and(|entry| entry.connected)
        })
    }

    fn put_item(&mut self, path: &str, map: &DataMap) -> Result<(), TransportError> {
        let id = self.id;
        self.shared.with_state(|state, outbox| {
            if !state.clients.get(&id).is_some_and(|entry| entry.connected) {
                return Err(TransportError::NotConnected);
            }
            if state.items.get(path).is_some_and(|item| item.map == *map) {
                debug!(" Put to {} unchanged, not delivered", path);
                return Ok(());
            }

            let item = DataItem {
                path: String::from(path),
                map: map.clone(),
                version: state.next_version,
            };
            state.next_version += 1;
            info!(" Stored {} at version {}", path, item.version);

            state.fan_out(path, &DataEvent::Changed(item.clone()), outbox);
            state.items.insert(String::from(path), item);
            Ok(())
        })
    }

    fn get_item(&self, path: &str) -> Option<DataItem> {
        self.shared
            .with_state(|state, _| state.items.get(path).cloned())
    }

    fn add_listener(&mut self, path: &str) -> Result<ListenerId, TransportError> {
        let id = self.id;
        self.shared.with_state(|state, _| -> Result<ListenerId, TransportError> {
            let listener = ListenerId(state.next_listener);
            let entry = state
                .clients
                .get_mut(&id)
                .filter(|entry| entry.connected)
                .ok_or(TransportError::NotConnected)?;
            entry.listeners.push((listener, String::from(path)));
            state.next_listener = state.next_listener.wrapping_add(1);
            Ok(listener)
        })
    }

    fn remove_listener(&mut self, listener: ListenerId) -> Result<(), TransportError> {
        let id = self.id;
        self.shared.with_state(|state, _| -> Result<(), TransportError> {
            let entry = state
                .clients
                .get_mut(&id)
                .ok_or(TransportError::UnknownListener(listener.0))?;
            let before = entry.listeners.len();
            entry.listeners.retain(|(existing, _)| *existing != listener);
            if entry.listeners.len() == before {
                return Err(TransportError::UnknownListener(listener.0));
            }
            Ok(())
        })
    }
}

impl Drop for LoopbackClient {
    fn drop(&mut self) {
        let id = self.id;
        self.shared.with_state(|state, _| {
            state.clients.remove(&id);
        });
        debug!(" Released loopback client {}", id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::payload::{DATA_PATH, KEY_MIN_TEMP};
    use embassy_sync::channel::Channel;

    type Queue = Channel<CriticalSectionRawMutex, TransportEvent, 8>;

    fn drain(queue: &Queue) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while let Ok(event) = queue.try_receive() {
            events.push(event);
        }
        events
    }

    fn map_with_min(min: i32) -> DataMap {
        let mut map = DataMap::new();
        map.put_int(KEY_MIN_TEMP, min);
        map
    }

    #[test]
    fn test_connect_reports_connected() {
        let mut hub = SyncHub::new();
        let queue = Arc::new(Queue::new());
        let mut client = hub.build(queue.clone());

        client.connect();
        assert!(client.is_connected());
        assert_eq!(
            drain(&queue),
            vec![TransportEvent::Connection(ConnectionEvent::Connected)]
        );
    }

    #[test]
    fn test_unreachable_hub_fails_connect() {
        let mut hub = SyncHub::new();
        hub.set_reachable(false);
        let queue = Arc::new(Queue::new());
        let mut client = hub.build(queue.clone());

        client.connect();
        assert!(!client.is_connected());
        assert_eq!(
            drain(&queue),
            vec![TransportEvent::Connection(ConnectionEvent::Failed(
                TransportError::Unreachable
            ))]
        );
    }

    #[test]
    fn test_put_reaches_listener_and_dedups() {
        let mut hub = SyncHub::new();
        let writer_queue = Arc::new(Queue::new());
        let reader_queue = Arc::new(Queue::new());
        let mut writer = hub.build(writer_queue.clone());
        let mut reader = hub.build(reader_queue.clone());
        writer.connect();
        reader.connect();
        reader.add_listener(DATA_PATH).unwrap();
        drain(&reader_queue);

        writer.put_item(DATA_PATH, &map_with_min(5)).unwrap();
        writer.put_item(DATA_PATH, &map_with_min(5)).unwrap();

        let events = drain(&reader_queue);
        assert_eq!(events.len(), 1);
        let TransportEvent::Data(batch) = &events[0] else {
            panic!("expected a data batch");
        };
        let DataEvent::Changed(item) = &batch[0] else {
            panic!("expected a change");
        };
        assert_eq!(item.version, 1);
        assert_eq!(hub.item(DATA_PATH).map(|item| item.version), Some(1));
    }

    #[test]
    fn test_versions_increase() {
        let mut hub = SyncHub::new();
        let queue = Arc::new(Queue::new());
        let mut client = hub.build(queue);
        client.connect();

        client.put_item(DATA_PATH, &map_with_min(1)).unwrap();
        client.put_item(DATA_PATH, &map_with_min(2)).unwrap();
        assert_eq!(client.get_item(DATA_PATH).map(|item| item.version), Some(2));
    }

    #[test]
    fn test_put_requires_connection() {
        let mut hub = SyncHub::new();
        let mut client = hub.build(Arc::new(Queue::new()));
        assert_eq!(
            client.put_item(DATA_PATH, &map_with_min(1)),
            Err(TransportError::NotConnected)
        );
    }

    #[test]
    fn test_remove_unknown_listener() {
        let mut hub = SyncHub::new();
        let mut client = hub.build(Arc::new(Queue::new()));
        client.connect();
        let id = client.add_listener(DATA_PATH).unwrap();

        assert_eq!(client.remove_listener(id), Ok(()));
        assert_eq!(
            client.remove_listener(id),
            Err(TransportError::UnknownListener(id.0))
        );
    }

    #[test]
    fn test_suspend_and_drop() {
        let mut hub = SyncHub::new();
        let queue = Arc::new(Queue::new());
        let mut client = hub.build(queue.clone());
        client.connect();
        client.add_listener(DATA_PATH).unwrap();
        drain(&queue);

        hub.suspend_all(SuspendCause::NetworkLost);
        assert_eq!(
            drain(&queue),
            vec![TransportEvent::Connection(ConnectionEvent::Suspended {
                cause: SuspendCause::NetworkLost
            })]
        );
        assert_eq!(hub.listener_count(), 0);

        drop(client);
        assert_eq!(hub.client_count(), 0);
    }
}
