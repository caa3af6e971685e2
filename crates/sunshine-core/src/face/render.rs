//! Frame composition and drawing.
//!
//! Composition is separate from drawing: [`FaceRenderer::compose`] turns
//! the face's state into a short list of [`DrawOp`]s, and [`Frame::draw`]
//! rasterizes them onto any RGB565 draw target. Every frame starts with a
//! full-screen fill, so a frame never depends on what was drawn before.

use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Circle, Line, PrimitiveStyle, Rectangle, Triangle};
use embedded_graphics::text::{Alignment, Baseline, Text, TextStyleBuilder};
use heapless::String;
use log::debug;

use super::paint::{AMBIENT_BACKGROUND, FacePaints, Paint};
use super::state::FaceState;
use crate::clock::WallTime;
use crate::config::LayoutConfig;
use crate::forecast::{AssetResolver, ForecastCache, WeatherArt};

/// Horizontal anchor of a text op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextRole {
    Clock,
    Date,
    HighTemp,
    LowTemp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    /// Fill the whole surface
    Fill(Rgb565),
    Text {
        role: TextRole,
        text: String<32>,
        /// Baseline position of the anchor
        position: Point,
        anchor: Anchor,
        /// Final color after alpha blending against the background
        color: Rgb565,
        paint: Paint,
    },
    Icon {
        art: WeatherArt,
        area: Rectangle,
    },
}

/// One composed frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    ops: heapless::Vec<DrawOp, 8>,
}

impl Frame {
    fn push(&mut self, op: DrawOp) {
        if self.ops.push(op).is_err() {
            debug!(" Frame full, dropping draw op");
        }
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn background(&self) -> Option<Rgb565> {
        self.ops.iter().find_map(|op| match op {
            DrawOp::Fill(color) => Some(*color),
            _ => None,
        })
    }

    /// Text drawn in `role`, if any.
    pub fn text(&self, role: TextRole) -> Option<&str> {
        self.ops.iter().find_map(|op| match op {
            DrawOp::Text { role: r, text, .. } if *r == role => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn icon(&self) -> Option<(WeatherArt, Rectangle)> {
        self.ops.iter().find_map(|op| match op {
            DrawOp::Icon { art, area } => Some((*art, *area)),
            _ => None,
        })
    }

    /// Whether any part of the weather row is present.
    pub fn has_weather_row(&self) -> bool {
        self.icon().is_some()
            || self.text(TextRole::HighTemp).is_some()
            || self.text(TextRole::LowTemp).is_some()
    }

    pub fn draw<D>(&self, target: &mut D) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        for op in &self.ops {
            match op {
                DrawOp::Fill(color) => target.clear(*color)?,
                DrawOp::Text {
                    text,
                    position,
                    anchor,
                    color,
                    paint,
                    ..
                } => draw_text(target, text, *position, *anchor, *color, paint.font)?,
                DrawOp::Icon { art, area } => draw_art(target, *art, *area)?,
            }
        }
        Ok(())
    }
}

/// Everything a frame is composed from.
pub struct FaceView<'a> {
    pub state: &'a FaceState,
    pub paints: &'a FacePaints,
    pub cache: &'a ForecastCache,
    pub time: WallTime,
}

pub struct FaceRenderer {
    layout: LayoutConfig,
}

impl FaceRenderer {
    pub fn new(layout: LayoutConfig) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    pub fn compose<A: AssetResolver + ?Sized>(&self, view: &FaceView<'_>, assets: &A) -> Frame {
        let mut frame = Frame::default();
        let ambient = view.state.is_ambient();
        let paints = view.paints;

        let background = if ambient {
            AMBIENT_BACKGROUND
        } else {
            paints.background
        };
        frame.push(DrawOp::Fill(background));

        let text_op = |role, text: &str, position, anchor, paint: &Paint| DrawOp::Text {
            role,
            text: bounded(text),
            position,
            anchor,
            color: paint.color_over(background),
            paint: *paint,
        };

        // Clock, seconds only while interactive
        let clock = view.time.clock_text(!ambient);
        frame.push(text_op(
            TextRole::Clock,
            &clock,
            Point::new(view.state.x_offset, view.state.y_offset),
            Anchor::Left,
            &paints.clock,
        ));

        let center_x = self.layout.width as i32 / 2;
        let center_y = self.layout.height as i32 / 2;

        let date = view.time.date_text();
        let date_x = center_x - paints.date.text_width(&date) / 2;
        let date_y = center_y - paints.date.text_height() + self.layout.date_nudge;
        frame.push(text_op(
            TextRole::Date,
            &date,
            Point::new(date_x, date_y),
            Anchor::Left,
            &paints.date,
        ));

        if ambient || view.cache.is_empty() {
            return frame;
        }

        let icon_size = self.layout.icon_size as i32;
        let icon_left = center_x - icon_size / 2;
        let row_y = date_y + self.layout.weather_row_offset;

        if let Some(art) = view.cache.cond.and_then(|cond| assets.art_for_condition(cond)) {
            frame.push(DrawOp::Icon {
                art,
                area: Rectangle::new(
                    Point::new(icon_left, date_y + self.layout.icon_top_gap),
                    Size::new_equal(self.layout.icon_size),
                ),
            });
        }

        if let Some(max) = view.cache.max {
            let text = assets.format_degrees(max);
            frame.push(text_op(
                TextRole::HighTemp,
                &text,
                Point::new(icon_left, row_y),
                Anchor::Right,
                &paints.high_temp,
            ));
        }

        if let Some(min) = view.cache.min {
            let text = assets.format_degrees(min);
            frame.push(text_op(
                TextRole::LowTemp,
                &text,
                Point::new(icon_left + icon_size + self.layout.low_temp_gap, row_y),
                Anchor::Left,
                &paints.low_temp,
            ));
        }

        frame
    }
}

fn bounded(text: &str) -> String<32> {
    let mut out = String::new();
    for ch in text.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

fn draw_text<D>(
    target: &mut D,
    text: &str,
    position: Point,
    anchor: Anchor,
    color: Rgb565,
    font: &'static MonoFont<'static>,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let alignment = match anchor {
        Anchor::Left => Alignment::Left,
        Anchor::Right => Alignment::Right,
    };
    let style = TextStyleBuilder::new()
        .alignment(alignment)
        .baseline(Baseline::Alphabetic)
        .build();
    Text::with_text_style(text, position, MonoTextStyle::new(font, color), style).draw(target)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Weather artwork
// ---------------------------------------------------------------------------

const SUN: Rgb565 = Rgb565::new(31, 52, 0);
const CLOUD: Rgb565 = Rgb565::new(28, 57, 28);
const DARK_CLOUD: Rgb565 = Rgb565::new(15, 31, 16);
const RAIN: Rgb565 = Rgb565::new(4, 20, 31);
const SNOW: Rgb565 = Rgb565::WHITE;
const FOG: Rgb565 = Rgb565::new(22, 45, 22);

fn draw_art<D>(target: &mut D, art: WeatherArt, area: Rectangle) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let s = area.size.width as i32;
    let o = area.top_left;
    let at = |x: i32, y: i32| o + Point::new(x * s / 60, y * s / 60);
    let len = |v: i32| (v * s / 60).max(1) as u32;

    match art {
        WeatherArt::Clear => sun(target, at(12, 12), len(36)),
        WeatherArt::LightClouds => {
            sun(target, at(4, 4), len(30))?;
            cloud(target, at, len, CLOUD)
        }
        WeatherArt::Clouds => cloud(target, at, len, CLOUD),
        WeatherArt::LightRain => {
            cloud(target, at, len, CLOUD)?;
            streaks(target, at, len, &[(20, 44), (38, 44)])
        }
        WeatherArt::Rain => {
            cloud(target, at, len, DARK_CLOUD)?;
            streaks(target, at, len, &[(14, 44), (26, 46), (38, 44), (50, 46)])
        }
        WeatherArt::Snow => {
            cloud(target, at, len, CLOUD)?;
            for (x, y) in [(16, 46), (28, 52), (40, 46), (22, 56), (46, 54)] {
                Circle::new(at(x, y), len(4))
                    .into_styled(PrimitiveStyle::with_fill(SNOW))
                    .draw(target)?;
            }
            Ok(())
        }
        WeatherArt::Storm => {
            cloud(target, at, len, DARK_CLOUD)?;
            Triangle::new(at(30, 38), at(22, 52), at(30, 50))
                .into_styled(PrimitiveStyle::with_fill(SUN))
                .draw(target)?;
            Triangle::new(at(30, 50), at(36, 48), at(26, 60))
                .into_styled(PrimitiveStyle::with_fill(SUN))
                .draw(target)
        }
        WeatherArt::Fog => {
            for y in [18, 28, 38, 48] {
                Line::new(at(8, y), at(52, y))
                    .into_styled(PrimitiveStyle::with_stroke(FOG, len(4)))
                    .draw(target)?;
            }
            Ok(())
        }
    }
}

fn sun<D>(target: &mut D, top_left: Point, diameter: u32) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    Circle::new(top_left, diameter)
        .into_styled(PrimitiveStyle::with_fill(SUN))
        .draw(target)
}

fn cloud<D>(
    target: &mut D,
    at: impl Fn(i32, i32) -> Point,
    len: impl Fn(i32) -> u32,
    color: Rgb565,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let style = PrimitiveStyle::with_fill(color);
    Circle::new(at(8, 20), len(22)).into_styled(style).draw(target)?;
    Circle::new(at(20, 12), len(28)).into_styled(style).draw(target)?;
    Circle::new(at(34, 18), len(22)).into_styled(style).draw(target)?;
    Rectangle::new(at(18, 28), Size::new(len(28), len(12)))
        .into_styled(style)
        .draw(target)
}

fn streaks<D>(
    target: &mut D,
    at: impl Fn(i32, i32) -> Point,
    len: impl Fn(i32) -> u32,
    starts: &[(i32, i32)],
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    for &(x, y) in starts {
        Line::new(at(x, y), at(x - 4, y + 10))
            .into_styled(PrimitiveStyle::with_stroke(RAIN, len(3)))
            .draw(target)?;
    }
    Ok(())
}
