//! Background forecast refresh on the wearable.
//!
//! A refresh reads today's row for the preferred location from the content
//! store while holding a wake lock, and hands the result back to the face
//! engine through its mailbox. The engine never runs a refresh inline.
//!
//! Requests carry a [`CancelToken`]; once the engine cancels a request its
//! completion is dropped without touching the mailbox.

use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::sync::Arc;
use core::fmt::Write;
use core::sync::atomic::{AtomicBool, Ordering};
use log::{debug, warn};

use super::assets::{AssetResolver, WeatherArt, display_degrees};
use super::source::{ContentSource, ForecastQuery, PreferenceStore};
use crate::clock::Zone;
use crate::config::TemperatureUnit;
use crate::error::RefreshError;
use crate::face::events::{FaceEvent, MailboxHandle};
use crate::sync::WirePayload;

/// Keeps the device awake while held.
pub trait WakeLock: Send + Sync {
    fn acquire(&self, tag: &str);
    fn release(&self);
}

impl<T: WakeLock + ?Sized> WakeLock for Arc<T> {
    fn acquire(&self, tag: &str) {
        (**self).acquire(tag)
    }

    fn release(&self) {
        (**self).release()
    }
}

/// Scoped wake-lock acquisition; dropping the guard releases the lock.
pub struct WakeLockGuard<'a, W: WakeLock + ?Sized> {
    lock: &'a W,
}

impl<'a, W: WakeLock + ?Sized> WakeLockGuard<'a, W> {
    pub fn acquire(lock: &'a W, tag: &str) -> Self {
        lock.acquire(tag);
        Self { lock }
    }
}

impl<W: WakeLock + ?Sized> Drop for WakeLockGuard<'_, W> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

/// Shared cancellation flag of one refresh request.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Today's forecast ready for display.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSummary {
    /// Whole degrees in `unit`
    pub max_temp: i32,
    /// Whole degrees in `unit`
    pub min_temp: i32,
    pub condition_id: i32,
    /// `"max min"`, e.g. `"12° 3°"`
    pub label: heapless::String<32>,
    pub art: Option<WeatherArt>,
    pub unit: TemperatureUnit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Fetched(ForecastSummary),
    /// The store had no row for today
    Empty,
    Cancelled,
}

/// Everything one refresh needs.
pub struct RefreshTask<S, P, W, A> {
    source: S,
    prefs: P,
    wake_lock: W,
    assets: A,
    wake_lock_tag: String,
}

impl<S, P, W, A> RefreshTask<S, P, W, A>
where
    S: ContentSource,
    P: PreferenceStore,
    W: WakeLock,
    A: AssetResolver,
{
    pub fn new(source: S, prefs: P, wake_lock: W, assets: A, wake_lock_tag: &str) -> Self {
        Self {
            source,
            prefs,
            wake_lock,
            assets,
            wake_lock_tag: String::from(wake_lock_tag),
        }
    }

    /// Run one refresh. The wake lock is held for the whole call and
    /// released on every return path, including unwinding.
    pub fn run(
        &self,
        now_millis: i64,
        zone: &Zone,
        cancel: &CancelToken,
    ) -> Result<RefreshOutcome, RefreshError> {
        let _wake = WakeLockGuard::acquire(&self.wake_lock, &self.wake_lock_tag);

        if cancel.is_cancelled() {
            return Ok(RefreshOutcome::Cancelled);
        }

        let location = self.prefs.location_or_default();
        let query = ForecastQuery::today(&location, now_millis, zone);
        let row = self.source.query(&query)?;

        if cancel.is_cancelled() {
            debug!(" Refresh cancelled after query");
            return Ok(RefreshOutcome::Cancelled);
        }

        let Some(row) = row else {
            return Ok(RefreshOutcome::Empty);
        };

        let payload = WirePayload::from_row(&row)?;
        let unit = self.prefs.temperature_unit();
        let max_temp = display_degrees(row.max_temp, unit)?;
        let min_temp = display_degrees(row.min_temp, unit)?;

        let mut label = heapless::String::new();
        let _ = write!(
            label,
            "{} {}",
            self.assets.format_degrees(max_temp),
            self.assets.format_degrees(min_temp)
        );

        Ok(RefreshOutcome::Fetched(ForecastSummary {
            max_temp,
            min_temp,
            condition_id: payload.cond,
            label,
            art: self.assets.art_for_condition(payload.cond),
            unit,
        }))
    }
}

/// Identifies a refresh request within an engine's visibility session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    pub session: u32,
    pub seq: u32,
}

/// A refresh handed to a worker.
///
/// A request dropped without [`RefreshRequest::complete`], because its
/// worker panicked or shut down, cancels itself and reports
/// [`RefreshError::Aborted`] so the engine does not wait on it.
pub struct RefreshRequest {
    pub ticket: RefreshTicket,
    pub now_millis: i64,
    pub zone: Zone,
    pub cancel: CancelToken,
    reply: MailboxHandle,
    reported: bool,
}

impl RefreshRequest {
    pub(crate) fn new(
        ticket: RefreshTicket,
        now_millis: i64,
        zone: Zone,
        cancel: CancelToken,
        reply: MailboxHandle,
    ) -> Self {
        Self {
            ticket,
            now_millis,
            zone,
            cancel,
            reply,
            reported: false,
        }
    }

    /// Execute `task` for this request and report back.
    pub fn run_with<S, P, W, A>(self, task: &RefreshTask<S, P, W, A>)
    where
        S: ContentSource,
        P: PreferenceStore,
        W: WakeLock,
        A: AssetResolver,
    {
        let result = task.run(self.now_millis, &self.zone, &self.cancel);
        self.complete(result);
    }

    /// Post the result to the engine's mailbox, unless the request was
    /// cancelled in the meantime.
    pub fn complete(mut self, result: Result<RefreshOutcome, RefreshError>) {
        self.report(result);
    }

    fn report(&mut self, result: Result<RefreshOutcome, RefreshError>) {
        self.reported = true;
        if self.cancel.is_cancelled() {
            debug!(" Dropping result of cancelled refresh {:?}", self.ticket);
            return;
        }
        if let Err(err) = &result {
            warn!(" Forecast refresh failed: {}", err);
        }
        self.reply.post(FaceEvent::RefreshCompleted {
            ticket: self.ticket,
            result,
        });
    }
}

impl Drop for RefreshRequest {
    fn drop(&mut self) {
        if self.reported {
            return;
        }
        self.report(Err(RefreshError::Aborted));
        self.cancel.cancel();
    }
}

/// Executes refresh requests away from the engine.
pub trait RefreshWorker {
    fn start(&mut self, request: RefreshRequest);
}

/// Worker that queues requests until the host calls
/// [`QueuedWorker::run_pending`], for single-threaded hosts.
pub struct QueuedWorker<S, P, W, A> {
    task: RefreshTask<S, P, W, A>,
    queue: VecDeque<RefreshRequest>,
}

impl<S, P, W, A> QueuedWorker<S, P, W, A>
where
    S: ContentSource,
    P: PreferenceStore,
    W: WakeLock,
    A: AssetResolver,
{
    pub fn new(task: RefreshTask<S, P, W, A>) -> Self {
        Self {
            task,
            queue: VecDeque::new(),
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Run every queued request; returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Some(request) = self.queue.pop_front() {
            request.run_with(&self.task);
            ran += 1;
        }
        ran
    }
}

impl<S, P, W, A> RefreshWorker for QueuedWorker<S, P, W, A> {
    fn start(&mut self, request: RefreshRequest) {
        self.queue.push_back(request);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::assets::SunshineAssets;
    use crate::forecast::source::{FixedPreferences, ForecastTable};
    use crate::face::events::FaceMailbox;
    use crate::forecast::ForecastRow;
    use core::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingLock {
        held: AtomicUsize,
        acquired: AtomicUsize,
    }

    impl WakeLock for CountingLock {
        fn acquire(&self, _tag: &str) {
            self.held.fetch_add(1, Ordering::SeqCst);
            self.acquired.fetch_add(1, Ordering::SeqCst);
        }

        fn release(&self) {
            self.held.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn table_with(row: Option<ForecastRow>) -> ForecastTable {
        let table = ForecastTable::new();
        if let Some(row) = row {
            table.insert("94043", row);
        }
        table
    }

    fn sample_row() -> ForecastRow {
        ForecastRow {
            condition_id: 501,
            short_desc: String::from("Rain"),
            min_temp: 3.4,
            max_temp: 11.6,
            obs_time: 1_000,
        }
    }

    fn task(
        table: ForecastTable,
        lock: Arc<CountingLock>,
    ) -> RefreshTask<ForecastTable, FixedPreferences, Arc<CountingLock>, SunshineAssets> {
        RefreshTask::new(
            table,
            FixedPreferences::default(),
            lock,
            SunshineAssets,
            "test",
        )
    }

    #[test]
    fn test_fetch_builds_summary() {
        let lock = Arc::new(CountingLock::default());
        let task = task(table_with(Some(sample_row())), lock.clone());

        let outcome = task.run(1_000, &Zone::utc(), &CancelToken::new()).unwrap();
        let RefreshOutcome::Fetched(summary) = outcome else {
            panic!("expected a fetched summary");
        };
        assert_eq!(summary.label.as_str(), "12° 3°");
        assert_eq!(summary.max_temp, 12);
        assert_eq!(summary.min_temp, 3);
        assert_eq!(summary.art, Some(WeatherArt::Rain));
        assert_eq!(lock.held.load(Ordering::SeqCst), 0);
        assert_eq!(lock.acquired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_half_way_minimum_rounds_up() {
        let lock = Arc::new(CountingLock::default());
        let mut row = sample_row();
        row.min_temp = -2.5;
        let task = task(table_with(Some(row)), lock);

        let outcome = task.run(1_000, &Zone::utc(), &CancelToken::new()).unwrap();
        let RefreshOutcome::Fetched(summary) = outcome else {
            panic!("expected a fetched summary");
        };
        assert_eq!(summary.label.as_str(), "12° -2°");
        assert_eq!(summary.min_temp, -2);
    }

    #[test]
    fn test_imperial_summary_converts_before_rounding() {
        let lock = Arc::new(CountingLock::default());
        let task = RefreshTask::new(
            table_with(Some(sample_row())),
            FixedPreferences {
                location: None,
                unit: TemperatureUnit::Imperial,
            },
            lock,
            SunshineAssets,
            "test",
        );

        let outcome = task.run(1_000, &Zone::utc(), &CancelToken::new()).unwrap();
        let RefreshOutcome::Fetched(summary) = outcome else {
            panic!("expected a fetched summary");
        };
        assert_eq!(summary.label.as_str(), "53° 38°");
        assert_eq!(summary.max_temp, 53);
        assert_eq!(summary.min_temp, 38);
        assert_eq!(summary.unit, TemperatureUnit::Imperial);
    }

    #[test]
    fn test_empty_store_is_empty_outcome() {
        let lock = Arc::new(CountingLock::default());
        let task = task(table_with(None), lock.clone());

        let outcome = task.run(1_000, &Zone::utc(), &CancelToken::new());
        assert_eq!(outcome, Ok(RefreshOutcome::Empty));
        assert_eq!(lock.held.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_query_releases_lock() {
        let lock = Arc::new(CountingLock::default());
        let table = table_with(Some(sample_row()));
        table.set_available(false);
        let task = task(table, lock.clone());

        assert!(task.run(1_000, &Zone::utc(), &CancelToken::new()).is_err());
        assert_eq!(lock.held.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancelled_before_start() {
        let lock = Arc::new(CountingLock::default());
        let task = task(table_with(Some(sample_row())), lock.clone());
        let cancel = CancelToken::new();
        cancel.cancel();

        let outcome = task.run(1_000, &Zone::utc(), &cancel);
        assert_eq!(outcome, Ok(RefreshOutcome::Cancelled));
        assert_eq!(lock.held.load(Ordering::SeqCst), 0);
    }

    fn request(mailbox: &Arc<FaceMailbox>) -> RefreshRequest {
        RefreshRequest::new(
            RefreshTicket { session: 1, seq: 1 },
            1_000,
            Zone::utc(),
            CancelToken::new(),
            MailboxHandle::new(mailbox.clone()),
        )
    }

    #[test]
    fn test_dropped_request_reports_abort() {
        let mailbox = Arc::new(FaceMailbox::new());
        let request = request(&mailbox);
        let cancel = request.cancel.clone();

        drop(request);
        assert!(cancel.is_cancelled());
        assert_eq!(
            mailbox.try_receive(),
            Ok(FaceEvent::RefreshCompleted {
                ticket: RefreshTicket { session: 1, seq: 1 },
                result: Err(RefreshError::Aborted),
            })
        );
    }

    #[test]
    fn test_completed_request_reports_once() {
        let mailbox = Arc::new(FaceMailbox::new());
        request(&mailbox).complete(Ok(RefreshOutcome::Empty));
        assert_eq!(mailbox.len(), 1);

        let cancelled = request(&mailbox);
        cancelled.cancel.cancel();
        drop(cancelled);
        assert_eq!(mailbox.len(), 1);
    }

    #[test]
    fn test_inverted_row_rejected() {
        let lock = Arc::new(CountingLock::default());
        let mut row = sample_row();
        row.min_temp = 20.0;
        let task = task(table_with(Some(row)), lock.clone());

        assert!(matches!(
            task.run(1_000, &Zone::utc(), &CancelToken::new()),
            Err(RefreshError::InvalidRow(_))
        ));
        assert_eq!(lock.held.load(Ordering::SeqCst), 0);
    }
}
