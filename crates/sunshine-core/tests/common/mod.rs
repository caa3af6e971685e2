//! Fakes shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;

use sunshine_core::clock::{Clock, Zone};
use sunshine_core::error::RefreshError;
use sunshine_core::face::{FaceEngine, FaceMailbox};
use sunshine_core::forecast::{
    AssetResolver, ContentSource, ForecastQuery, ForecastRow, PreferenceStore, RefreshRequest,
    RefreshTask, RefreshWorker, SunshineAssets, WakeLock,
};
use sunshine_core::sync::SyncHub;
use sunshine_core::FaceConfig;

/// 2026-10-19 12:34:56.000 UTC
pub const NOON_ISH: i64 = 1_792_413_296_000;
pub const HOUR_MS: i64 = 3_600_000;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

pub struct ScriptedClock {
    now: AtomicI64,
    zone: Mutex<Zone>,
}

impl ScriptedClock {
    pub fn at(now_millis: i64) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicI64::new(now_millis),
            zone: Mutex::new(Zone::utc()),
        })
    }

    pub fn set(&self, now_millis: i64) {
        self.now.store(now_millis, Ordering::SeqCst);
    }

    pub fn set_zone(&self, zone: Zone) {
        *self.zone.lock().unwrap() = zone;
    }
}

impl Clock for ScriptedClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    fn local_zone(&self) -> Zone {
        self.zone.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// Wake lock
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct CountingLock {
    pub held: AtomicUsize,
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
}

impl WakeLock for CountingLock {
    fn acquire(&self, _tag: &str) {
        self.held.fetch_add(1, Ordering::SeqCst);
        self.acquired.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        self.held.fetch_sub(1, Ordering::SeqCst);
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

/// Holds requests until the test completes them by hand.
#[derive(Default)]
pub struct ManualWorker {
    pub requests: Vec<RefreshRequest>,
}

impl RefreshWorker for ManualWorker {
    fn start(&mut self, request: RefreshRequest) {
        self.requests.push(request);
    }
}

/// Runs every request on its own thread.
pub struct ThreadWorker<S, P, W, A> {
    task: Arc<RefreshTask<S, P, W, A>>,
    handles: Vec<JoinHandle<()>>,
}

impl<S, P, W, A> ThreadWorker<S, P, W, A>
where
    S: ContentSource + Send + Sync + 'static,
    P: PreferenceStore + Send + Sync + 'static,
    W: WakeLock + 'static,
    A: AssetResolver + Send + Sync + 'static,
{
    pub fn new(task: RefreshTask<S, P, W, A>) -> Self {
        Self {
            task: Arc::new(task),
            handles: Vec::new(),
        }
    }

    pub fn join_all(&mut self) {
        for handle in self.handles.drain(..) {
            handle.join().unwrap();
        }
    }

    /// Join every thread, returning how many of them panicked.
    pub fn join_panicked(&mut self) -> usize {
        self.handles
            .drain(..)
            .map(JoinHandle::join)
            .filter(Result::is_err)
            .count()
    }
}

impl<S, P, W, A> RefreshWorker for ThreadWorker<S, P, W, A>
where
    S: ContentSource + Send + Sync + 'static,
    P: PreferenceStore + Send + Sync + 'static,
    W: WakeLock + 'static,
    A: AssetResolver + Send + Sync + 'static,
{
    fn start(&mut self, request: RefreshRequest) {
        let task = self.task.clone();
        self.handles
            .push(std::thread::spawn(move || request.run_with(task.as_ref())));
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Source whose query parks until the test lets it go.
pub struct BlockingSource {
    row: ForecastRow,
    entered: mpsc::Sender<()>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl BlockingSource {
    /// Returns the source, a receiver signalled when a query starts, and a
    /// sender that lets the query finish.
    pub fn new(row: ForecastRow) -> (Self, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let source = Self {
            row,
            entered: entered_tx,
            release: Mutex::new(release_rx),
        };
        (source, entered_rx, release_tx)
    }
}

impl ContentSource for BlockingSource {
    fn query(&self, _query: &ForecastQuery) -> Result<Option<ForecastRow>, RefreshError> {
        self.entered.send(()).unwrap();
        self.release.lock().unwrap().recv().unwrap();
        Ok(Some(self.row.clone()))
    }
}

/// Source whose query panics, as a crashing content provider would.
pub struct PanickingSource;

impl ContentSource for PanickingSource {
    fn query(&self, _query: &ForecastQuery) -> Result<Option<ForecastRow>, RefreshError> {
        panic!("content provider crashed");
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn row(condition_id: i32, min_temp: f64, max_temp: f64, obs_time: i64) -> ForecastRow {
    ForecastRow {
        condition_id,
        short_desc: String::from("Rain"),
        min_temp,
        max_temp,
        obs_time,
    }
}

pub type ManualEngine = FaceEngine<SyncHub, ManualWorker, Arc<ScriptedClock>, SunshineAssets>;

pub fn engine_with<W: RefreshWorker>(
    hub: &SyncHub,
    worker: W,
    clock: &Arc<ScriptedClock>,
) -> FaceEngine<SyncHub, W, Arc<ScriptedClock>, SunshineAssets> {
    FaceEngine::create(
        FaceConfig::default(),
        hub.clone(),
        worker,
        clock.clone(),
        SunshineAssets,
        Arc::new(FaceMailbox::new()),
    )
}

pub fn manual_engine(hub: &SyncHub, clock: &Arc<ScriptedClock>) -> ManualEngine {
    engine_with(hub, ManualWorker::default(), clock)
}
