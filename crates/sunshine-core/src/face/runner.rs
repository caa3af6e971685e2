//! Drives a [`FaceEngine`] against a display.

use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Timer};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use log::{debug, error, info};

use super::engine::FaceEngine;
use super::render::Frame;
use crate::clock::Clock;
use crate::forecast::{AssetResolver, RefreshWorker};
use crate::framebuffer::FrameBuffer;
use crate::sync::TransportBuilder;

/// Owns the engine, an off-screen buffer and the display it flushes to.
pub struct FaceRunner<B, W, C, A, D>
where
    B: TransportBuilder,
    W: RefreshWorker,
    C: Clock,
    A: AssetResolver,
    D: DrawTarget<Color = Rgb565>,
{
    engine: FaceEngine<B, W, C, A>,
    framebuffer: FrameBuffer,
    display: D,
    last_frame: Option<Frame>,
}

impl<B, W, C, A, D> FaceRunner<B, W, C, A, D>
where
    B: TransportBuilder,
    W: RefreshWorker,
    C: Clock,
    A: AssetResolver,
    D: DrawTarget<Color = Rgb565>,
{
    pub fn new(engine: FaceEngine<B, W, C, A>, display: D) -> Self {
        let size = display.bounding_box().size;
        Self {
            engine,
            framebuffer: FrameBuffer::new(size.width, size.height),
            display,
            last_frame: None,
        }
    }

    /// Handle queued events, fire due ticks and redraw if invalidated.
    /// Returns whether a frame was drawn.
    pub fn step(&mut self) -> Result<bool, D::Error> {
        self.engine.process_mailbox();
        let now = self.engine.clock().now_millis();
        self.engine.fire_due(now);

        if !self.engine.take_invalidation() {
            return Ok(false);
        }

        let Ok(frame) = self.engine.draw(&mut self.framebuffer, now);
        self.framebuffer.flush(&mut self.display)?;
        self.last_frame = Some(frame);
        Ok(true)
    }

    /// Milliseconds until the next tick is due, if one is pending.
    pub fn time_to_next_tick(&self) -> Option<u64> {
        let now = self.engine.clock().now_millis();
        self.engine
            .next_deadline()
            .map(|deadline| deadline.saturating_sub(now).max(0) as u64)
    }

    /// Run until the face is destroyed, sleeping between ticks and waking
    /// early for mailbox events.
    pub async fn run(&mut self)
    where
        D::Error: core::fmt::Debug,
    {
        info!(" Face runner started");
        let mailbox = self.engine.mailbox().clone();

        while !self.engine.is_destroyed() {
            if let Err(e) = self.step() {
                error!(" Display flush error: {:?}", e);
            }

            let event = match self.time_to_next_tick() {
                Some(wait) => {
                    match select(
                        mailbox.mailbox().receive(),
                        Timer::after(Duration::from_millis(wait)),
                    )
                    .await
                    {
                        Either::First(event) => Some(event),
                        Either::Second(()) => None,
                    }
                }
                None => Some(mailbox.mailbox().receive().await),
            };

            if let Some(event) = event {
                self.engine.handle(event);
            }
        }
        debug!(" Face runner stopped");
    }

    pub fn engine(&self) -> &FaceEngine<B, W, C, A> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut FaceEngine<B, W, C, A> {
        &mut self.engine
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    /// The most recently drawn frame.
    pub fn last_frame(&self) -> Option<&Frame> {
        self.last_frame.as_ref()
    }
}
