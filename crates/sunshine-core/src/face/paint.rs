//! Paints and palette of the face.

use embedded_graphics::mono_font::MonoFont;
use embedded_graphics::mono_font::iso_8859_1::{FONT_7X13, FONT_10X20};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use profont::{PROFONT_18_POINT, PROFONT_24_POINT};

// ---------------------------------------------------------------------------
// Palette
// ---------------------------------------------------------------------------

/// Sunshine light blue (#03A9F4)
pub const BACKGROUND: Rgb565 = Rgb565::new(0, 42, 30);
/// Sunshine dark blue (#0288D1), shown after an odd number of taps
pub const BACKGROUND_ALT: Rgb565 = Rgb565::new(0, 34, 26);
pub const DIGITAL_TEXT: Rgb565 = Rgb565::WHITE;
pub const AMBIENT_BACKGROUND: Rgb565 = Rgb565::BLACK;

pub const OPAQUE: u8 = 255;
pub const HALF_ALPHA: u8 = 127;

/// Text paint.
#[derive(Debug, Clone, Copy)]
pub struct Paint {
    pub color: Rgb565,
    pub alpha: u8,
    /// Without anti-aliasing the paint draws only its own solid colour,
    /// never a blend with the background. Low-bit ambient screens can show
    /// nothing in between.
    pub anti_alias: bool,
    pub font: &'static MonoFont<'static>,
}

impl Paint {
    pub fn new(color: Rgb565, font: &'static MonoFont<'static>) -> Self {
        Self {
            color,
            alpha: OPAQUE,
            anti_alias: true,
            font,
        }
    }

    pub fn with_alpha(mut self, alpha: u8) -> Self {
        self.alpha = alpha;
        self
    }

    /// Color as seen over `background`; RGB565 has no alpha channel.
    pub fn color_over(&self, background: Rgb565) -> Rgb565 {
        if !self.anti_alias {
            return self.color;
        }
        blend(self.color, background, self.alpha)
    }

    /// Glyph cell height, used as the text height for layout.
    pub fn text_height(&self) -> i32 {
        self.font.character_size.height as i32
    }

    pub fn text_width(&self, text: &str) -> i32 {
        let cell = self.font.character_size.width + self.font.character_spacing;
        (text.chars().count() as u32 * cell) as i32
    }
}

impl PartialEq for Paint {
    fn eq(&self, other: &Self) -> bool {
        self.color == other.color
            && self.alpha == other.alpha
            && self.anti_alias == other.anti_alias
            && core::ptr::eq(self.font, other.font)
    }
}

/// Mix `fg` over `bg` with `alpha` in 0..=255.
pub fn blend(fg: Rgb565, bg: Rgb565, alpha: u8) -> Rgb565 {
    let a = u16::from(alpha);
    let mix = |f: u8, b: u8| ((u16::from(f) * a + u16::from(b) * (255 - a)) / 255) as u8;
    Rgb565::new(mix(fg.r(), bg.r()), mix(fg.g(), bg.g()), mix(fg.b(), bg.b()))
}

/// Every paint the face draws with.
#[derive(Debug, Clone, PartialEq)]
pub struct FacePaints {
    pub background: Rgb565,
    pub clock: Paint,
    pub date: Paint,
    pub high_temp: Paint,
    pub low_temp: Paint,
}

impl Default for FacePaints {
    fn default() -> Self {
        Self::new()
    }
}

impl FacePaints {
    pub fn new() -> Self {
        Self {
            background: BACKGROUND,
            clock: Paint::new(DIGITAL_TEXT, &PROFONT_18_POINT),
            date: Paint::new(DIGITAL_TEXT, &FONT_7X13),
            high_temp: Paint::new(DIGITAL_TEXT, &FONT_10X20),
            low_temp: Paint::new(DIGITAL_TEXT, &FONT_10X20).with_alpha(HALF_ALPHA),
        }
    }

    /// Round screens get the larger clock digits.
    pub fn apply_shape(&mut self, is_round: bool) {
        self.clock.font = if is_round {
            &PROFONT_24_POINT
        } else {
            &PROFONT_18_POINT
        };
    }

    pub fn set_anti_alias(&mut self, anti_alias: bool) {
        for paint in self.text_paints_mut() {
            paint.anti_alias = anti_alias;
        }
    }

    /// Background for the given tap parity.
    pub fn set_tap_parity(&mut self, odd: bool) {
        self.background = if odd { BACKGROUND_ALT } else { BACKGROUND };
    }

    pub fn text_paints(&self) -> [&Paint; 4] {
        [&self.clock, &self.date, &self.high_temp, &self.low_temp]
    }

    fn text_paints_mut(&mut self) -> [&mut Paint; 4] {
        [
            &mut self.clock,
            &mut self.date,
            &mut self.high_temp,
            &mut self.low_temp,
        ]
    }
}
