//! Events delivered to the face engine and the mailbox that carries them.
//!
//! Transport callbacks and refresh completions can originate on any thread.
//! They only ever post into the engine's mailbox; the engine drains it on
//! its own thread.
//!
//! When the channel is full, events spill into a backlog that the engine
//! drains after the channel. Only [`FaceEvent::TimeTick`] is ever dropped:
//! the hub does not redeliver data, so losing a batch would leave the cache
//! stale. Consecutive data batches in the backlog are merged key by key.

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::RefCell;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use log::{trace, warn};

use crate::clock::Zone;
use crate::error::RefreshError;
use crate::forecast::{RefreshOutcome, RefreshTicket};
use crate::sync::{DataEvent, TransportEvent, TransportSink};

/// Mailbox capacity.
pub const MAILBOX_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapKind {
    Touch,
    TouchCancel,
    Tap,
}

/// Host and background callbacks, in the order the engine sees them.
#[derive(Debug, Clone, PartialEq)]
pub enum FaceEvent {
    PropertiesChanged { low_bit_ambient: bool },
    ApplyWindowInsets { is_round: bool },
    VisibilityChanged(bool),
    AmbientModeChanged(bool),
    /// Once-a-minute tick the host delivers in ambient mode
    TimeTick,
    Tap { kind: TapKind, x: i32, y: i32 },
    /// Time-zone broadcast
    TimezoneChanged(Zone),
    /// Callback of the transport client built for `session`
    Transport {
        session: u32,
        event: TransportEvent,
    },
    RefreshCompleted {
        ticket: RefreshTicket,
        result: Result<RefreshOutcome, RefreshError>,
    },
    Destroy,
}

pub type FaceMailbox = Channel<CriticalSectionRawMutex, FaceEvent, MAILBOX_CAPACITY>;

type Backlog = Mutex<CriticalSectionRawMutex, RefCell<VecDeque<FaceEvent>>>;

/// Shared sending side of a [`FaceMailbox`], plus its overflow backlog.
#[derive(Clone)]
pub struct MailboxHandle {
    mailbox: Arc<FaceMailbox>,
    backlog: Arc<Backlog>,
}

impl MailboxHandle {
    pub fn new(mailbox: Arc<FaceMailbox>) -> Self {
        Self {
            mailbox,
            backlog: Arc::new(Mutex::new(RefCell::new(VecDeque::new()))),
        }
    }

    pub fn mailbox(&self) -> &FaceMailbox {
        &self.mailbox
    }

    /// Enqueue without blocking. Once the channel is full, events go to
    /// the backlog until the engine drains it, which keeps them in order.
    pub fn post(&self, event: FaceEvent) {
        self.backlog.lock(|backlog| {
            let mut backlog = backlog.borrow_mut();
            let event = if backlog.is_empty() {
                match self.mailbox.try_send(event) {
                    Ok(()) => return,
                    Err(TrySendError::Full(event)) => event,
                }
            } else {
                event
            };

            if event == FaceEvent::TimeTick {
                warn!(" Face mailbox full, dropping time tick");
                return;
            }
            trace!(" Face mailbox full, holding {:?}", event);
            push_coalesced(&mut backlog, event);
        });
    }

    /// Events that overflowed the channel, oldest first.
    pub fn take_backlog(&self) -> VecDeque<FaceEvent> {
        self.backlog
            .lock(|backlog| core::mem::take(&mut *backlog.borrow_mut()))
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.lock(|backlog| backlog.borrow().len())
    }
}

/// Append `event`, folding a data batch into a directly preceding batch of
/// the same session.
fn push_coalesced(backlog: &mut VecDeque<FaceEvent>, event: FaceEvent) {
    if let FaceEvent::Transport {
        session,
        event: TransportEvent::Data(events),
    } = &event
        && let Some(FaceEvent::Transport {
            session: last_session,
            event: TransportEvent::Data(pending),
        }) = backlog.back_mut()
        && *last_session == *session
    {
        merge_data(pending, events);
        return;
    }
    backlog.push_back(event);
}

/// Later values win per key; keys only present earlier are kept.
fn merge_data(pending: &mut Vec<DataEvent>, events: &[DataEvent]) {
    for event in events {
        let DataEvent::Changed(item) = event else {
            pending.push(event.clone());
            continue;
        };
        let existing = pending.iter_mut().rev().find_map(|pending| match pending {
            DataEvent::Changed(held) if held.path == item.path => Some(held),
            _ => None,
        });
        match existing {
            Some(held) => {
                for key in item.map.keys() {
                    if let Some(value) = item.map.get(key) {
                        held.map.put(key, value.clone());
                    }
                }
                held.version = held.version.max(item.version);
            }
            None => pending.push(event.clone()),
        }
    }
}

/// Transport sink that forwards callbacks into the mailbox stamped with
/// the session of the client they came from.
pub struct MailboxSink {
    handle: MailboxHandle,
    session: u32,
}

impl MailboxSink {
    pub fn new(handle: MailboxHandle, session: u32) -> Self {
        Self { handle, session }
    }
}

impl TransportSink for MailboxSink {
    fn deliver(&self, event: TransportEvent) {
        self.handle.post(FaceEvent::Transport {
            session: self.session,
            event,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{ConnectionEvent, DATA_PATH, DataItem, DataMap, KEY_MAX_TEMP, KEY_MIN_TEMP};
    use alloc::string::String;

    #[test]
    fn test_sink_stamps_session() {
        let mailbox = Arc::new(FaceMailbox::new());
        let sink = MailboxSink::new(MailboxHandle::new(mailbox.clone()), 7);

        sink.deliver(TransportEvent::Connection(ConnectionEvent::Connected));
        assert_eq!(
            mailbox.try_receive(),
            Ok(FaceEvent::Transport {
                session: 7,
                event: TransportEvent::Connection(ConnectionEvent::Connected),
            })
        );
    }

    fn data(session: u32, version: u64, entries: &[(&str, i32)]) -> FaceEvent {
        let mut map = DataMap::new();
        for (key, value) in entries {
            map.put_int(key, *value);
        }
        FaceEvent::Transport {
            session,
            event: TransportEvent::Data(vec![DataEvent::Changed(DataItem {
                path: String::from(DATA_PATH),
                map,
                version,
            })]),
        }
    }

    fn fill(handle: &MailboxHandle) {
        for _ in 0..MAILBOX_CAPACITY {
            handle.post(FaceEvent::TimeTick);
        }
    }

    #[test]
    fn test_full_mailbox_drops_only_ticks() {
        let mailbox = Arc::new(FaceMailbox::new());
        let handle = MailboxHandle::new(mailbox.clone());
        fill(&handle);

        handle.post(FaceEvent::TimeTick);
        handle.post(FaceEvent::Destroy);
        handle.post(FaceEvent::TimeTick);

        assert_eq!(mailbox.len(), MAILBOX_CAPACITY);
        assert_eq!(handle.take_backlog(), VecDeque::from([FaceEvent::Destroy]));
        assert_eq!(handle.backlog_len(), 0);
    }

    #[test]
    fn test_backlog_keeps_order_after_channel_drains() {
        let mailbox = Arc::new(FaceMailbox::new());
        let handle = MailboxHandle::new(mailbox.clone());
        fill(&handle);
        handle.post(FaceEvent::VisibilityChanged(true));

        // Room in the channel again, but the backlog is not drained yet
        assert_eq!(mailbox.try_receive(), Ok(FaceEvent::TimeTick));
        handle.post(FaceEvent::VisibilityChanged(false));

        assert_eq!(mailbox.len(), MAILBOX_CAPACITY - 1);
        assert_eq!(
            handle.take_backlog(),
            VecDeque::from([
                FaceEvent::VisibilityChanged(true),
                FaceEvent::VisibilityChanged(false),
            ])
        );
    }

    #[test]
    fn test_backlog_merges_data_per_key() {
        let mailbox = Arc::new(FaceMailbox::new());
        let handle = MailboxHandle::new(mailbox.clone());
        fill(&handle);

        handle.post(data(1, 1, &[(KEY_MIN_TEMP, 1), (KEY_MAX_TEMP, 9)]));
        for min in 2..=20 {
            handle.post(data(1, min as u64, &[(KEY_MIN_TEMP, min)]));
        }
        handle.post(data(2, 30, &[(KEY_MIN_TEMP, -1)]));

        let backlog = handle.take_backlog();
        assert_eq!(backlog.len(), 2);
        let Some(FaceEvent::Transport {
            session: 1,
            event: TransportEvent::Data(events),
        }) = backlog.front()
        else {
            panic!("expected a merged data batch");
        };
        let [DataEvent::Changed(item)] = events.as_slice() else {
            panic!("expected one item");
        };
        assert_eq!(item.map.get_int(KEY_MIN_TEMP), Ok(Some(20)));
        assert_eq!(item.map.get_int(KEY_MAX_TEMP), Ok(Some(9)));
        assert_eq!(item.version, 20);
    }
}
