//! RGBA colors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// RGBA color with 8-bit components.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    #[inline]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    #[inline]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(hex.get(range)?, 16).ok();

        match hex.len() {
            3 => Some(Self::rgb(channel(0..1)? * 17, channel(1..2)? * 17, channel(2..3)? * 17)),
            6 => Some(Self::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?)),
            8 => Some(Self::rgba(channel(0..2)?, channel(2..4)?, channel(4..6)?, channel(6..8)?)),
            _ => None,
        }
    }

    /// Alpha-composite `self` over `background`.
    pub fn blend_over(&self, background: Color) -> Color {
        let fg_a = self.a as f32 / 255.0;
        let bg_a = background.a as f32 / 255.0;
        let out_a = fg_a + bg_a * (1.0 - fg_a);

        if out_a == 0.0 {
            return Color::TRANSPARENT;
        }

        let blend = |fg: u8, bg: u8| -> u8 {
            let out = (fg as f32 * fg_a + bg as f32 * bg_a * (1.0 - fg_a)) / out_a;
            out.round().clamp(0.0, 255.0) as u8
        };

        Color::rgba(
            blend(self.r, background.r),
            blend(self.g, background.g),
            blend(self.b, background.b),
            (out_a * 255.0).round() as u8,
        )
    }

    /// Lighten (positive factor) or darken (negative factor).
    pub fn adjust_lightness(&self, factor: f32) -> Color {
        let adjust = |c: u8| -> u8 {
            if factor > 0.0 {
                (c as f32 + (255.0 - c as f32) * factor).min(255.0) as u8
            } else {
                (c as f32 * (1.0 + factor)).max(0.0) as u8
            }
        };

        Color::rgba(adjust(self.r), adjust(self.g), adjust(self.b), self.a)
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hex() {
        assert_eq!(Color::from_hex("#ff0000"), Some(Color::rgb(255, 0, 0)));
        assert_eq!(Color::from_hex("#f00"), Some(Color::rgb(255, 0, 0)));
        assert_eq!(Color::from_hex("#ffffff80"), Some(Color::rgba(255, 255, 255, 128)));
        assert_eq!(Color::from_hex("#zz0000"), None);
        assert_eq!(Color::from_hex("#12345"), None);
    }

    #[test]
    fn test_blend_opaque_wins() {
        let fg = Color::rgb(10, 20, 30);
        assert_eq!(fg.blend_over(Color::WHITE), fg);
        assert_eq!(Color::TRANSPARENT.blend_over(Color::TRANSPARENT), Color::TRANSPARENT);
    }

    #[test]
    fn test_adjust_lightness() {
        assert_eq!(Color::BLACK.adjust_lightness(0.5), Color::rgb(127, 127, 127));
        assert_eq!(Color::WHITE.adjust_lightness(-1.0), Color::BLACK);
    }
}
