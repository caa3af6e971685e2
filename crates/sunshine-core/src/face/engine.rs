//! The watch-face state machine.
//!
//! [`FaceEngine`] owns the mode flags, the forecast cache, the paints and
//! the two tick timers. Hosts feed it [`FaceEvent`]s (directly through
//! [`FaceEngine::handle`] or via its mailbox), call
//! [`FaceEngine::fire_due`] when a deadline passes, and redraw whenever
//! [`FaceEngine::take_invalidation`] reports a pending invalidation.
//!
//! Nothing outside the engine holds a reference to it. The transport client
//! and the refresh worker reach it only through the mailbox, and each
//! message carries the session or ticket it belongs to. Messages from a
//! torn-down connection or a superseded refresh are discarded, so hiding or
//! destroying the face never races with a late callback.

use alloc::sync::Arc;
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use log::{debug, info, trace, warn};

use super::events::{FaceEvent, FaceMailbox, MailboxHandle, MailboxSink, TapKind};
use super::paint::FacePaints;
use super::render::{FaceRenderer, FaceView, Frame};
use super::scheduler::{TickKind, TickScheduler, delay_to_boundary};
use super::state::{FaceState, PowerMode, Visibility, WatchFaceStyle};
use crate::clock::{Clock, WallTime, Zone};
use crate::config::{FaceConfig, TemperatureUnit};
use crate::error::RefreshError;
use crate::forecast::{
    AssetResolver, CancelToken, ForecastCache, RefreshOutcome, RefreshRequest, RefreshTicket,
    RefreshWorker,
};
use crate::sync::{ConnectionEvent, Transport, TransportBuilder, TransportEvent, WeatherSubscriber};

pub struct FaceEngine<B, W, C, A>
where
    B: TransportBuilder,
    W: RefreshWorker,
    C: Clock,
    A: AssetResolver,
{
    config: FaceConfig,
    builder: B,
    worker: W,
    clock: C,
    assets: A,
    mailbox: MailboxHandle,
    renderer: FaceRenderer,

    style: WatchFaceStyle,
    state: FaceState,
    paints: FacePaints,
    cache: ForecastCache,
    unit: TemperatureUnit,
    scheduler: TickScheduler,
    zone: Zone,
    tz_registered: bool,

    client: Option<B::Client>,
    subscriber: WeatherSubscriber,
    /// Bumped whenever a transport client is built
    session: u32,
    in_flight: Option<(RefreshTicket, CancelToken)>,
    refresh_seq: u32,

    needs_redraw: bool,
    destroyed: bool,
}

impl<B, W, C, A> FaceEngine<B, W, C, A>
where
    B: TransportBuilder,
    W: RefreshWorker,
    C: Clock,
    A: AssetResolver,
{
    /// Create the engine: paints, style and geometry are set up here, so
    /// every later event finds them initialized.
    pub fn create(
        config: FaceConfig,
        builder: B,
        worker: W,
        clock: C,
        assets: A,
        mailbox: Arc<FaceMailbox>,
    ) -> Self {
        let zone = clock.local_zone();
        let state = FaceState {
            x_offset: config.layout.x_offset_square,
            y_offset: config.layout.y_offset,
            ..FaceState::default()
        };
        info!(
            " Creating face {}x{} in zone {}",
            config.layout.width,
            config.layout.height,
            zone.id()
        );

        Self {
            renderer: FaceRenderer::new(config.layout.clone()),
            subscriber: WeatherSubscriber::new(&config.sync.data_path),
            unit: config.refresh.unit,
            config,
            builder,
            worker,
            clock,
            assets,
            mailbox: MailboxHandle::new(mailbox),
            style: WatchFaceStyle::default(),
            state,
            paints: FacePaints::new(),
            cache: ForecastCache::default(),
            scheduler: TickScheduler::new(),
            zone,
            tz_registered: false,
            client: None,
            session: 0,
            in_flight: None,
            refresh_seq: 0,
            needs_redraw: true,
            destroyed: false,
        }
    }

    // -----------------------------------------------------------------------
    // Event handling
    // -----------------------------------------------------------------------

    pub fn handle(&mut self, event: FaceEvent) {
        if self.destroyed {
            trace!(" Face destroyed, ignoring {:?}", event);
            return;
        }

        match event {
            FaceEvent::PropertiesChanged { low_bit_ambient } => {
                debug!(" Low-bit ambient: {}", low_bit_ambient);
                self.state.low_bit_ambient = low_bit_ambient;
            }
            FaceEvent::ApplyWindowInsets { is_round } => self.apply_insets(is_round),
            FaceEvent::VisibilityChanged(true) => self.on_visible(),
            FaceEvent::VisibilityChanged(false) => self.on_hidden(),
            FaceEvent::AmbientModeChanged(ambient) => self.on_ambient_changed(ambient),
            FaceEvent::TimeTick => self.invalidate(),
            FaceEvent::Tap { kind, x, y } => self.on_tap(kind, x, y),
            FaceEvent::TimezoneChanged(zone) => {
                if self.tz_registered {
                    debug!(" Time zone now {}", zone.id());
                    self.zone = zone;
                    self.invalidate();
                }
            }
            FaceEvent::Transport { session, event } => self.on_transport(session, event),
            FaceEvent::RefreshCompleted { ticket, result } => {
                self.on_forecast_data_received(ticket, result)
            }
            FaceEvent::Destroy => self.destroy(),
        }
    }

    /// Handle everything currently queued in the mailbox, then whatever
    /// overflowed into its backlog.
    pub fn process_mailbox(&mut self) -> usize {
        let mut handled = 0;
        loop {
            while let Ok(event) = self.mailbox.mailbox().try_receive() {
                self.handle(event);
                handled += 1;
            }
            let backlog = self.mailbox.take_backlog();
            if backlog.is_empty() {
                return handled;
            }
            debug!(" Draining {} overflowed events", backlog.len());
            for event in backlog {
                self.handle(event);
                handled += 1;
            }
        }
    }

    fn apply_insets(&mut self, is_round: bool) {
        self.state.is_round = is_round;
        self.state.x_offset = if is_round {
            self.config.layout.x_offset_round
        } else {
            self.config.layout.x_offset_square
        };
        self.paints.apply_shape(is_round);
        self.invalidate();
    }

    fn on_visible(&mut self) {
        if self.state.is_visible() {
            return;
        }
        self.state.visibility = Visibility::Visible;
        self.tz_registered = true;

        self.session = self.session.wrapping_add(1);
        let sink = Arc::new(MailboxSink::new(self.mailbox.clone(), self.session));
        let mut client = self.builder.build(sink);
        client.connect();
        self.client = Some(client);
        debug!(" Visible, connecting transport session {}", self.session);

        self.zone = self.clock.local_zone();

        if self.scheduler.pending(TickKind::Forecast).is_none() && self.in_flight.is_none() {
            let now = self.clock.now_millis();
            self.scheduler.post(TickKind::Forecast, now);
        }

        self.invalidate();
        self.update_timer();
    }

    fn on_hidden(&mut self) {
        if !self.state.is_visible() {
            return;
        }
        debug!(" Hidden, tearing down session {}", self.session);
        self.teardown();
        self.state.visibility = Visibility::Hidden;
        self.update_timer();
    }

    /// Stop everything that could call back into the engine: timers first,
    /// then the refresh, then the listener, then the connection.
    fn teardown(&mut self) {
        self.tz_registered = false;
        self.scheduler.cancel_all();

        if let Some((ticket, cancel)) = self.in_flight.take() {
            debug!(" Cancelling refresh {:?}", ticket);
            cancel.cancel();
        }

        if let Some(client) = self.client.as_mut() {
            self.subscriber.detach(client);
        }
        if let Some(mut client) = self.client.take() {
            client.disconnect();
        }
    }

    fn on_ambient_changed(&mut self, ambient: bool) {
        let power = if ambient {
            PowerMode::Ambient
        } else {
            PowerMode::Interactive
        };
        if self.state.power != power {
            self.state.power = power;
            if self.state.low_bit_ambient {
                self.paints.set_anti_alias(!ambient);
            }
            self.invalidate();
        }
        self.update_timer();
    }

    fn on_tap(&mut self, kind: TapKind, x: i32, y: i32) {
        if kind == TapKind::Tap {
            self.state.tap_parity = !self.state.tap_parity;
            self.paints.set_tap_parity(self.state.tap_parity);
            trace!(" Tap at ({}, {})", x, y);
        }
        self.invalidate();
    }

    fn on_transport(&mut self, session: u32, event: TransportEvent) {
        let Some(client) = self.client.as_mut() else {
            trace!(" No transport client, dropping event");
            return;
        };
        if session != self.session {
            trace!(" Dropping event from stale session {}", session);
            return;
        }

        match event {
            TransportEvent::Connection(ConnectionEvent::Connected) => {
                self.subscriber.on_connected(client);
            }
            TransportEvent::Connection(ConnectionEvent::Suspended { cause }) => {
                info!(" Transport suspended ({:?})", cause);
                self.subscriber.on_connection_lost();
            }
            TransportEvent::Connection(ConnectionEvent::Failed(err)) => {
                info!(" Transport failed: {}", err);
                self.subscriber.on_connection_lost();
            }
            TransportEvent::Data(events) => {
                if self.subscriber.apply(&events, &mut self.cache, self.unit) {
                    debug!(" Forecast cache updated: {:?}", self.cache);
                    self.invalidate();
                }
            }
        }
    }

    fn on_forecast_data_received(
        &mut self,
        ticket: RefreshTicket,
        result: Result<RefreshOutcome, RefreshError>,
    ) {
        if self.in_flight.as_ref().map(|(current, _)| *current) != Some(ticket) {
            trace!(" Dropping stale refresh {:?}", ticket);
            return;
        }
        self.in_flight = None;

        match result {
            Ok(RefreshOutcome::Fetched(summary)) => {
                info!(" Forecast refreshed: {}", summary.label);
                self.unit = summary.unit;
                self.cache
                    .fill(summary.max_temp, summary.min_temp, summary.condition_id);
                self.invalidate();
            }
            Ok(RefreshOutcome::Empty) => debug!(" No forecast for today"),
            Ok(RefreshOutcome::Cancelled) => debug!(" Refresh cancelled"),
            Err(err) => warn!(" Refresh failed: {}", err),
        }

        if self.state.is_visible() {
            self.schedule_forecast(self.clock.now_millis());
        }
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    /// Replace any pending TIME tick with one due now, if ticking is allowed.
    pub fn update_timer(&mut self) {
        self.scheduler.cancel(TickKind::Time);
        if self.state.tick_eligible() {
            self.scheduler.post(TickKind::Time, self.clock.now_millis());
        }
    }

    /// Run every tick whose deadline is at or before `now_millis`.
    pub fn fire_due(&mut self, now_millis: i64) {
        if self.destroyed {
            return;
        }
        for kind in self.scheduler.fire_due(now_millis) {
            match kind {
                TickKind::Time => self.on_time_fired(now_millis),
                TickKind::Forecast => self.on_forecast_fired(now_millis),
            }
        }
    }

    fn on_time_fired(&mut self, now: i64) {
        self.invalidate();
        if self.state.tick_eligible() {
            let delay = delay_to_boundary(now, self.config.tick_interval_ms);
            self.scheduler.post(TickKind::Time, now + delay);
        }
    }

    fn on_forecast_fired(&mut self, now: i64) {
        if let Some((ticket, cancel)) = self.in_flight.take() {
            debug!(" Superseding refresh {:?}", ticket);
            cancel.cancel();
        }
        if !self.state.is_visible() {
            return;
        }

        self.refresh_seq = self.refresh_seq.wrapping_add(1);
        let ticket = RefreshTicket {
            session: self.session,
            seq: self.refresh_seq,
        };
        let cancel = CancelToken::new();
        let request = RefreshRequest::new(
            ticket,
            now,
            self.zone.clone(),
            cancel.clone(),
            self.mailbox.clone(),
        );
        self.in_flight = Some((ticket, cancel));
        debug!(" Starting refresh {:?}", ticket);
        self.worker.start(request);

        // Keeps the hourly cadence even if this refresh never reports back
        self.schedule_forecast(now);
    }

    fn schedule_forecast(&mut self, now: i64) {
        let delay = delay_to_boundary(now, self.config.forecast_interval_ms);
        self.scheduler.post(TickKind::Forecast, now + delay);
    }

    /// Earliest pending tick deadline.
    pub fn next_deadline(&self) -> Option<i64> {
        self.scheduler.next_deadline()
    }

    pub fn pending_tick(&self, kind: TickKind) -> Option<i64> {
        self.scheduler.pending(kind)
    }

    pub fn pending_tick_count(&self) -> usize {
        self.scheduler.pending_count()
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    fn invalidate(&mut self) {
        self.needs_redraw = true;
    }

    /// Whether a redraw was requested since the last call.
    pub fn take_invalidation(&mut self) -> bool {
        core::mem::take(&mut self.needs_redraw)
    }

    pub fn compose(&self, now_millis: i64) -> Frame {
        let view = FaceView {
            state: &self.state,
            paints: &self.paints,
            cache: &self.cache,
            time: WallTime::at(now_millis, &self.zone),
        };
        self.renderer.compose(&view, &self.assets)
    }

    /// Draw the full frame for `now_millis`.
    pub fn draw<D>(&self, target: &mut D, now_millis: i64) -> Result<Frame, D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        debug!(" Rendering face");
        let frame = self.compose(now_millis);
        frame.draw(target)?;
        Ok(frame)
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Tear everything down and clear the cache. Later events are ignored.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        info!(" Destroying face");
        self.teardown();
        self.state.visibility = Visibility::Hidden;
        self.cache.clear();
        self.needs_redraw = false;
        self.destroyed = true;
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn state(&self) -> &FaceState {
        &self.state
    }

    pub fn cache(&self) -> &ForecastCache {
        &self.cache
    }

    pub fn paints(&self) -> &FacePaints {
        &self.paints
    }

    pub fn style(&self) -> &WatchFaceStyle {
        &self.style
    }

    pub fn zone(&self) -> &Zone {
        &self.zone
    }

    pub fn unit(&self) -> TemperatureUnit {
        self.unit
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn worker_mut(&mut self) -> &mut W {
        &mut self.worker
    }

    pub fn mailbox(&self) -> &MailboxHandle {
        &self.mailbox
    }

    pub fn has_transport(&self) -> bool {
        self.client.is_some()
    }

    pub fn is_listening(&self) -> bool {
        self.subscriber.is_attached()
    }

    pub fn in_flight_refresh(&self) -> Option<RefreshTicket> {
        self.in_flight.as_ref().map(|(ticket, _)| *ticket)
    }

    pub fn is_timezone_registered(&self) -> bool {
        self.tz_registered
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl<B, W, C, A> Drop for FaceEngine<B, W, C, A>
where
    B: TransportBuilder,
    W: RefreshWorker,
    C: Clock,
    A: AssetResolver,
{
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::paint::{BACKGROUND, BACKGROUND_ALT};
    use crate::forecast::SunshineAssets;
    use crate::sync::SyncHub;
    use alloc::vec::Vec;
    use core::cell::Cell;

    struct FixedClock {
        now: Cell<i64>,
    }

    impl Clock for FixedClock {
        fn now_millis(&self) -> i64 {
            self.now.get()
        }

        fn local_zone(&self) -> Zone {
            Zone::utc()
        }
    }

    #[derive(Default)]
    struct HeldRequests(Vec<RefreshRequest>);

    impl RefreshWorker for HeldRequests {
        fn start(&mut self, request: RefreshRequest) {
            self.0.push(request);
        }
    }

    type Engine<'a> = FaceEngine<SyncHub, HeldRequests, &'a FixedClock, SunshineAssets>;

    fn engine(clock: &FixedClock) -> Engine<'_> {
        FaceEngine::create(
            FaceConfig::default(),
            SyncHub::new(),
            HeldRequests::default(),
            clock,
            SunshineAssets,
            Arc::new(FaceMailbox::new()),
        )
    }

    #[test]
    fn test_created_hidden_without_ticks() {
        let clock = FixedClock { now: Cell::new(0) };
        let engine = engine(&clock);
        assert!(!engine.state().is_visible());
        assert_eq!(engine.pending_tick_count(), 0);
        assert_eq!(engine.paints().background, BACKGROUND);
    }

    #[test]
    fn test_visible_posts_time_and_forecast_now() {
        let clock = FixedClock { now: Cell::new(5_250) };
        let mut engine = engine(&clock);
        engine.handle(FaceEvent::VisibilityChanged(true));

        assert_eq!(engine.pending_tick(TickKind::Time), Some(5_250));
        assert_eq!(engine.pending_tick(TickKind::Forecast), Some(5_250));
        assert!(engine.has_transport());
        assert!(engine.is_timezone_registered());
    }

    #[test]
    fn test_time_fire_aligns_to_next_second() {
        let clock = FixedClock { now: Cell::new(5_250) };
        let mut engine = engine(&clock);
        engine.handle(FaceEvent::VisibilityChanged(true));
        engine.take_invalidation();

        engine.fire_due(5_250);
        assert!(engine.take_invalidation());
        assert_eq!(engine.pending_tick(TickKind::Time), Some(6_000));
    }

    #[test]
    fn test_tap_toggles_background() {
        let clock = FixedClock { now: Cell::new(0) };
        let mut engine = engine(&clock);
        let tap = FaceEvent::Tap {
            kind: TapKind::Tap,
            x: 10,
            y: 10,
        };

        engine.handle(tap.clone());
        assert_eq!(engine.paints().background, BACKGROUND_ALT);
        engine.handle(tap);
        assert_eq!(engine.paints().background, BACKGROUND);
    }

    #[test]
    fn test_touch_does_not_toggle() {
        let clock = FixedClock { now: Cell::new(0) };
        let mut engine = engine(&clock);
        engine.handle(FaceEvent::Tap {
            kind: TapKind::Touch,
            x: 0,
            y: 0,
        });
        assert_eq!(engine.paints().background, BACKGROUND);
    }

    #[test]
    fn test_round_insets_move_clock() {
        let clock = FixedClock { now: Cell::new(0) };
        let mut engine = engine(&clock);
        engine.handle(FaceEvent::ApplyWindowInsets { is_round: true });
        assert!(engine.state().is_round);
        assert_eq!(
            engine.state().x_offset,
            FaceConfig::default().layout.x_offset_round
        );
    }

    #[test]
    fn test_timezone_only_while_registered() {
        let clock = FixedClock { now: Cell::new(0) };
        let mut engine = engine(&clock);
        let tokyo = Zone::new("Asia/Tokyo", 9 * 3600);

        engine.handle(FaceEvent::TimezoneChanged(tokyo.clone()));
        assert_eq!(engine.zone(), &Zone::utc());

        engine.handle(FaceEvent::VisibilityChanged(true));
        engine.handle(FaceEvent::TimezoneChanged(tokyo.clone()));
        assert_eq!(engine.zone(), &tokyo);
    }

    #[test]
    fn test_forecast_fire_supersedes_in_flight() {
        let clock = FixedClock { now: Cell::new(0) };
        let mut engine = engine(&clock);
        engine.handle(FaceEvent::VisibilityChanged(true));

        engine.fire_due(0);
        let first = engine.in_flight_refresh().unwrap();
        engine.fire_due(3_600_000);
        let second = engine.in_flight_refresh().unwrap();

        assert_ne!(first, second);
        let requests = &engine.worker_mut().0;
        assert!(requests[0].cancel.is_cancelled());
        assert!(!requests[1].cancel.is_cancelled());
    }
}
