//! # Color Codec
//!
//! Conversion between `#rrggbb` text and the packed wire integer the
//! contract stores. The contract keeps colors in a `uint32`; only the low
//! 24 bits carry RGB, the top byte is ignored on read and zero on write.

use std::fmt;
use std::str::FromStr;

use crate::error::{CanvasError, CanvasResult};

/// Mask selecting the 24 RGB bits of a wire color.
pub const RGB_MASK: u32 = 0x00FF_FFFF;

/// Default palette offered to players.
pub const PALETTE: [Rgb; 15] = [
    Rgb(0xFF_FFFF),
    Rgb(0x00_0000),
    Rgb(0xFF_0000),
    Rgb(0x00_FF00),
    Rgb(0x00_00FF),
    Rgb(0xFF_FF00),
    Rgb(0xFF_00FF),
    Rgb(0x00_FFFF),
    Rgb(0xFF_A500),
    Rgb(0x80_0080),
    Rgb(0x80_8080),
    Rgb(0xC0_C0C0),
    Rgb(0x80_0000),
    Rgb(0x00_8000),
    Rgb(0x00_0080),
];

/// A normalized 24-bit RGB color.
///
/// The inner value is always `< 2^24`; every constructor masks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rgb(u32);

impl Rgb {
    /// Black, the color of an untouched pixel.
    pub const BLACK: Self = Self(0);
    /// White.
    pub const WHITE: Self = Self(RGB_MASK);

    /// Builds a color from its channels.
    #[inline]
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self(((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    /// Builds a color from a wire integer, ignoring the top byte.
    #[inline]
    #[must_use]
    pub const fn from_wire(wire: u32) -> Self {
        Self(wire & RGB_MASK)
    }

    /// The wire representation (top byte always zero).
    #[inline]
    #[must_use]
    pub const fn to_wire(self) -> u32 {
        self.0
    }

    /// Red channel.
    #[inline]
    #[must_use]
    pub const fn r(self) -> u8 {
        (self.0 >> 16) as u8
    }

    /// Green channel.
    #[inline]
    #[must_use]
    pub const fn g(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Blue channel.
    #[inline]
    #[must_use]
    pub const fn b(self) -> u8 {
        self.0 as u8
    }

    /// Parses `rrggbb` or `#rrggbb`, case-insensitive.
    ///
    /// # Errors
    ///
    /// `InvalidColorFormat` when the text is not exactly six hex digits
    /// after the optional marker.
    pub fn parse(text: &str) -> CanvasResult<Self> {
        let digits = text.strip_prefix('#').unwrap_or(text);
        if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CanvasError::InvalidColorFormat(text.to_string()));
        }
        u32::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| CanvasError::InvalidColorFormat(text.to_string()))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06x}", self.0)
    }
}

impl FromStr for Rgb {
    type Err = CanvasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl PartialEq<&str> for Rgb {
    fn eq(&self, other: &&str) -> bool {
        Self::parse(other).is_ok_and(|c| c == *self)
    }
}

/// Encodes color text into the wire integer.
///
/// # Errors
///
/// `InvalidColorFormat` on malformed input.
pub fn encode(color_text: &str) -> CanvasResult<u32> {
    Rgb::parse(color_text).map(Rgb::to_wire)
}

/// Decodes any wire integer into lowercase `#rrggbb`.
///
/// Bits above the low 24 are discarded.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn decode(wire: u64) -> String {
    Rgb::from_wire((wire & u64::from(RGB_MASK)) as u32).to_string()
}
