//! Desktop simulator for the Sunshine weather watch face.
//!
//! Runs the companion publisher and the wearable face in one process, joined
//! by the in-process loopback transport. The face renders into an
//! `embedded-graphics-simulator` display: an SDL2 window with the `window`
//! feature, otherwise a scripted session saved as PNG snapshots.
//!
//! # Environment
//!
//! | Variable             | Meaning                                  |
//! |----------------------|------------------------------------------|
//! | `SUNSHINE_CONFIG`    | Path to a postcard-encoded face config   |
//! | `SUNSHINE_LOCATION`  | Preferred forecast location              |
//! | `SUNSHINE_TZ_OFFSET` | Local zone offset from UTC in seconds    |
//! | `SUNSHINE_OUT`       | Snapshot directory (headless only)       |
//!
//! # Key bindings (`window` feature)
//!
//! | Key | Action                         |
//! |-----|--------------------------------|
//! | V   | Toggle visibility              |
//! | A   | Toggle ambient mode            |
//! | L   | Toggle low-bit ambient         |
//! | R   | Toggle round screen insets     |
//! | Z   | Move the time zone one hour on |
//! | Q   | Quit                           |
//!
//! Mouse clicks are forwarded as taps.

#[cfg(not(feature = "window"))]
use std::path::{Path, PathBuf};
#[cfg(feature = "window")]
use std::sync::atomic::AtomicBool;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics_simulator::{OutputSettingsBuilder, SimulatorDisplay};
use log::{debug, error, info, warn};

use sunshine_core::clock::{Clock, Zone};
use sunshine_core::face::{FaceEngine, FaceEvent, FaceMailbox, FaceRunner};
use sunshine_core::forecast::{
    FixedPreferences, ForecastRow, ForecastTable, RefreshRequest, RefreshTask, RefreshWorker,
    SunshineAssets, WakeLock,
};
use sunshine_core::sync::{SyncHub, TransportEvent, WeatherPublisher};
use sunshine_core::FaceConfig;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Pixel scale factor for the window and snapshots.
const WINDOW_SCALE: u32 = 2;

/// Target frame duration (~30 FPS).
#[cfg(feature = "window")]
const FRAME_DURATION: Duration = Duration::from_millis(33);

/// Interval between companion forecast publishes.
#[cfg(feature = "window")]
const COMPANION_INTERVAL: Duration = Duration::from_secs(10);

/// Forecast codes the companion cycles through.
const MOCK_CONDITIONS: [i32; 6] = [800, 801, 500, 211, 601, 741];

// ---------------------------------------------------------------------------
// Host services
// ---------------------------------------------------------------------------

/// System time plus a skew the simulator can push forward.
struct SimClock {
    started: Instant,
    base_millis: i64,
    skew_millis: AtomicI64,
    zone: Mutex<Zone>,
}

impl SimClock {
    fn new(zone: Zone) -> Self {
        let base_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        Self {
            started: Instant::now(),
            base_millis,
            skew_millis: AtomicI64::new(0),
            zone: Mutex::new(zone),
        }
    }

    #[cfg(not(feature = "window"))]
    fn advance(&self, millis: i64) {
        self.skew_millis.fetch_add(millis, Ordering::SeqCst);
    }

    #[cfg(feature = "window")]
    fn set_zone(&self, zone: Zone) {
        if let Ok(mut current) = self.zone.lock() {
            *current = zone;
        }
    }
}

impl Clock for SimClock {
    fn now_millis(&self) -> i64 {
        self.base_millis
            + self.started.elapsed().as_millis() as i64
            + self.skew_millis.load(Ordering::SeqCst)
    }

    fn local_zone(&self) -> Zone {
        self.zone
            .lock()
            .map(|zone| zone.clone())
            .unwrap_or_else(|_| Zone::utc())
    }
}

/// Wake lock that only logs.
#[derive(Default)]
struct LoggingWakeLock {
    held: AtomicUsize,
}

impl WakeLock for LoggingWakeLock {
    fn acquire(&self, tag: &str) {
        let held = self.held.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Wake lock {} acquired ({} held)", tag, held);
    }

    fn release(&self) {
        let held = self.held.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!("Wake lock released ({} held)", held);
    }
}

type SimTask = RefreshTask<Arc<ForecastTable>, FixedPreferences, Arc<LoggingWakeLock>, SunshineAssets>;

/// Runs every refresh on its own thread.
struct ThreadWorker {
    task: Arc<SimTask>,
    handles: Vec<JoinHandle<()>>,
}

impl ThreadWorker {
    fn new(task: SimTask) -> Self {
        Self {
            task: Arc::new(task),
            handles: Vec::new(),
        }
    }
}

impl RefreshWorker for ThreadWorker {
    fn start(&mut self, request: RefreshRequest) {
        self.handles.retain(|handle| !handle.is_finished());
        let task = self.task.clone();
        self.handles
            .push(std::thread::spawn(move || request.run_with(task.as_ref())));
    }
}

// ---------------------------------------------------------------------------
// Mock data generation
// ---------------------------------------------------------------------------

/// Produces a different forecast row on every call.
struct MockForecastGenerator {
    step: usize,
}

impl MockForecastGenerator {
    fn new() -> Self {
        Self { step: 0 }
    }

    fn next_row(&mut self, now_millis: i64) -> ForecastRow {
        let t = self.step as f64;
        self.step += 1;

        // 8–20 °C highs with a 4–8 °C spread
        let max_temp = 14.0 + 6.0 * (t / 3.0).sin();
        let min_temp = max_temp - 6.0 + 2.0 * (t / 2.0).cos();

        ForecastRow {
            condition_id: MOCK_CONDITIONS[self.step % MOCK_CONDITIONS.len()],
            short_desc: String::from("Simulated"),
            min_temp,
            max_temp,
            obs_time: now_millis,
        }
    }
}

// ---------------------------------------------------------------------------
// Companion
// ---------------------------------------------------------------------------

type CompanionInbox = Channel<CriticalSectionRawMutex, TransportEvent, 8>;

/// The phone side: writes a forecast row into the content table and
/// publishes it over the transport.
struct Companion {
    publisher: WeatherPublisher<SyncHub>,
    inbox: Arc<CompanionInbox>,
    table: Arc<ForecastTable>,
    prefs: FixedPreferences,
    generator: MockForecastGenerator,
}

impl Companion {
    fn new(hub: &SyncHub, table: Arc<ForecastTable>, prefs: FixedPreferences, path: &str) -> Self {
        let inbox = Arc::new(CompanionInbox::new());
        Self {
            publisher: WeatherPublisher::new(hub.clone(), inbox.clone(), path),
            inbox,
            table,
            prefs,
            generator: MockForecastGenerator::new(),
        }
    }

    fn cycle(&mut self, clock: &SimClock) {
        let now = clock.now_millis();
        let zone = clock.local_zone();
        let row = self.generator.next_row(now);
        info!(
            "Companion forecast: {} {:.1}/{:.1}",
            row.condition_id, row.max_temp, row.min_temp
        );

        let location = self.prefs.location.clone().unwrap_or_default();
        self.table.clear();
        self.table.insert(&location, row);

        if let Err(e) = self.publisher.refresh(&*self.table, &self.prefs, now, &zone) {
            warn!("Companion refresh failed: {}", e);
        }
        self.pump();
    }

    /// Feed the publisher's transport callbacks back into it.
    fn pump(&mut self) {
        while let Ok(event) = self.inbox.try_receive() {
            self.publisher.on_transport_event(&event);
        }
    }
}

#[cfg(feature = "window")]
fn spawn_companion(
    mut companion: Companion,
    clock: Arc<SimClock>,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while !stop.load(Ordering::SeqCst) {
            companion.cycle(&clock);

            let started = Instant::now();
            while started.elapsed() < COMPANION_INTERVAL && !stop.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(50));
                companion.pump();
            }
        }
        companion.publisher.shutdown();
        info!("Companion stopped");
    })
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

type SimRunner =
    FaceRunner<SyncHub, ThreadWorker, Arc<SimClock>, SunshineAssets, SimulatorDisplay<Rgb565>>;

fn load_config() -> FaceConfig {
    let Ok(path) = std::env::var("SUNSHINE_CONFIG") else {
        return FaceConfig::default();
    };
    match std::fs::read(&path).map(|bytes| FaceConfig::from_bytes(&bytes)) {
        Ok(Ok(config)) => {
            info!("Loaded config from {}", path);
            config
        }
        Ok(Err(e)) => {
            warn!("Invalid config {}: {}, using defaults", path, e);
            FaceConfig::default()
        }
        Err(e) => {
            warn!("Cannot read config {}: {}, using defaults", path, e);
            FaceConfig::default()
        }
    }
}

fn local_zone_from_env() -> Zone {
    std::env::var("SUNSHINE_TZ_OFFSET")
        .ok()
        .and_then(|value| value.parse::<i32>().ok())
        .map(|offset| Zone::new("Local", offset))
        .unwrap_or_else(Zone::utc)
}

#[cfg(feature = "window")]
fn shift_zone(zone: &Zone, hours: i32) -> Zone {
    let offset = zone.offset_secs() + hours * 3600;
    // Wrap within the ±14h range real zones use
    let wrapped = if offset > 14 * 3600 { offset - 26 * 3600 } else { offset };
    Zone::new("Local", wrapped)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();
    info!("Starting Sunshine simulator");

    let config = load_config();
    let clock = Arc::new(SimClock::new(local_zone_from_env()));
    let hub = SyncHub::new();
    let table = Arc::new(ForecastTable::new());
    let prefs = FixedPreferences {
        location: Some(
            std::env::var("SUNSHINE_LOCATION")
                .unwrap_or_else(|_| config.refresh.default_location.clone()),
        ),
        unit: config.refresh.unit,
    };
    info!(
        "Display: {}×{} (scale {}×), location {:?}",
        config.layout.width, config.layout.height, WINDOW_SCALE, prefs.location
    );

    let companion = Companion::new(&hub, table.clone(), prefs.clone(), &config.sync.data_path);

    let task = RefreshTask::new(
        table,
        prefs,
        Arc::new(LoggingWakeLock::default()),
        SunshineAssets,
        &config.refresh.wake_lock_tag,
    );
    let display = SimulatorDisplay::<Rgb565>::new(Size::new(
        config.layout.width,
        config.layout.height,
    ));
    let engine = FaceEngine::create(
        config,
        hub,
        ThreadWorker::new(task),
        clock.clone(),
        SunshineAssets,
        Arc::new(FaceMailbox::new()),
    );
    let runner = FaceRunner::new(engine, display);

    #[cfg(feature = "window")]
    run_window(runner, companion, clock);

    #[cfg(not(feature = "window"))]
    run_headless(runner, companion, clock);

    info!("Simulator exiting");
}

// ---------------------------------------------------------------------------
// Headless session
// ---------------------------------------------------------------------------

#[cfg(not(feature = "window"))]
fn run_headless(mut runner: SimRunner, mut companion: Companion, clock: Arc<SimClock>) {
    let out_dir = std::env::var("SUNSHINE_OUT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."));

    let engine = runner.engine_mut();
    engine.handle(FaceEvent::ApplyWindowInsets { is_round: false });
    engine.handle(FaceEvent::VisibilityChanged(true));
    settle(&mut runner);

    // Publish a forecast and let the refresh thread report back
    companion.cycle(&clock);
    settle(&mut runner);
    snapshot(&runner, &out_dir.join("sunshine-interactive.png"));

    clock.advance(1_000);
    settle(&mut runner);

    runner.engine_mut().handle(FaceEvent::Tap {
        kind: sunshine_core::face::TapKind::Tap,
        x: 120,
        y: 120,
    });
    settle(&mut runner);
    snapshot(&runner, &out_dir.join("sunshine-tapped.png"));

    runner.engine_mut().handle(FaceEvent::AmbientModeChanged(true));
    settle(&mut runner);
    snapshot(&runner, &out_dir.join("sunshine-ambient.png"));

    runner.engine_mut().handle(FaceEvent::Destroy);
    companion.publisher.shutdown();
}

/// Step the runner until refresh threads and transport callbacks are quiet.
#[cfg(not(feature = "window"))]
fn settle(runner: &mut SimRunner) {
    for _ in 0..20 {
        if let Err(e) = runner.step() {
            error!("Draw error: {:?}", e);
        }
        if runner.engine().in_flight_refresh().is_none()
            && runner.engine().mailbox().mailbox().is_empty()
        {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[cfg(not(feature = "window"))]
fn snapshot(runner: &SimRunner, path: &Path) {
    let settings = OutputSettingsBuilder::new().scale(WINDOW_SCALE).build();
    match runner
        .display()
        .to_rgb_output_image(&settings)
        .save_png(path)
    {
        Ok(()) => info!("Saved {}", path.display()),
        Err(e) => error!("Cannot save {}: {}", path.display(), e),
    }
}

// ---------------------------------------------------------------------------
// Interactive window
// ---------------------------------------------------------------------------

#[cfg(feature = "window")]
fn run_window(mut runner: SimRunner, companion: Companion, clock: Arc<SimClock>) {
    use embedded_graphics_simulator::{SimulatorEvent, Window, sdl2::Keycode};
    use sunshine_core::face::TapKind;

    info!("Keys: V=Visibility  A=Ambient  L=LowBit  R=Round  Z=Zone  Q=Quit");

    let output_settings = OutputSettingsBuilder::new().scale(WINDOW_SCALE).build();
    let mut window = Window::new("Sunshine Simulator", &output_settings);

    let stop = Arc::new(AtomicBool::new(false));
    let companion_thread = spawn_companion(companion, clock.clone(), stop.clone());

    let mut visible = true;
    let mut ambient = false;
    let mut low_bit = false;
    let mut round = false;

    runner.engine_mut().handle(FaceEvent::VisibilityChanged(true));

    // The SDL window is lazily initialized on the first `update()` call.
    // We must call `update()` once before `events()` or it will panic.
    if let Err(e) = runner.step() {
        error!("Draw error: {:?}", e);
    }
    window.update(runner.display());

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------
    'running: loop {
        let frame_start = Instant::now();

        // --- SDL events ---------------------------------------------------
        for event in window.events() {
            let engine = runner.engine_mut();
            match event {
                SimulatorEvent::Quit => break 'running,

                SimulatorEvent::KeyDown { keycode, .. } => match keycode {
                    Keycode::Q | Keycode::Escape => break 'running,
                    Keycode::V => {
                        visible = !visible;
                        engine.handle(FaceEvent::VisibilityChanged(visible));
                    }
                    Keycode::A => {
                        ambient = !ambient;
                        engine.handle(FaceEvent::AmbientModeChanged(ambient));
                    }
                    Keycode::L => {
                        low_bit = !low_bit;
                        engine.handle(FaceEvent::PropertiesChanged {
                            low_bit_ambient: low_bit,
                        });
                    }
                    Keycode::R => {
                        round = !round;
                        engine.handle(FaceEvent::ApplyWindowInsets { is_round: round });
                    }
                    Keycode::Z => {
                        let zone = shift_zone(&clock.local_zone(), 1);
                        info!("Time zone offset now {}s", zone.offset_secs());
                        clock.set_zone(zone.clone());
                        engine.handle(FaceEvent::TimezoneChanged(zone));
                    }
                    _ => {}
                },

                SimulatorEvent::MouseButtonDown { point, .. } => {
                    engine.handle(FaceEvent::Tap {
                        kind: TapKind::Tap,
                        x: point.x,
                        y: point.y,
                    });
                }

                _ => {}
            }
        }

        // --- Engine step --------------------------------------------------
        if let Err(e) = runner.step() {
            error!("Draw error: {:?}", e);
        }

        window.update(runner.display());

        // --- Frame pacing -------------------------------------------------
        let elapsed = frame_start.elapsed();
        if elapsed < FRAME_DURATION {
            std::thread::sleep(FRAME_DURATION - elapsed);
        }
    }

    runner.engine_mut().handle(FaceEvent::Destroy);
    stop.store(true, Ordering::SeqCst);
    if companion_thread.join().is_err() {
        error!("Companion thread panicked");
    }
}
