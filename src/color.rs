//! Conversion of CLUT entries to displayable colors.

use std::fmt::{Debug, Formatter};

/// An 8-bit per channel, straight alpha color.
#[derive(Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    /// Fully transparent white; the color every sink palette entry starts out as.
    pub const TRANSPARENT: Rgba = Rgba::new(255, 255, 255, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Debug for Rgba {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{:02x}{:02x}{:02x}{:02x}",
            self.r, self.g, self.b, self.a
        )
    }
}

// Truncates toward zero like an integer assignment, then clamps.
fn channel(value: f64) -> u8 {
    (value as i32).max(0).min(255) as u8
}

/// Converts a Y/Cr/Cb/T quadruple (ITU-R BT.601 studio range) to RGBA.
///
/// `t` is transparency, so alpha is `255 - t`.
pub fn ycbcr_to_rgba(y: u8, cr: u8, cb: u8, t: u8) -> Rgba {
    let y = 1.164 * (f64::from(y) - 16.0);
    let cr = f64::from(cr) - 128.0;
    let cb = f64::from(cb) - 128.0;
    Rgba {
        r: channel(y + 1.596 * cr),
        g: channel(y - 0.813 * cr - 0.391 * cb),
        b: channel(y + 2.018 * cb),
        a: 255 - t,
    }
}

#[test]
fn test_black_fully_transparent() {
    assert_eq!(ycbcr_to_rgba(16, 128, 128, 255), Rgba::new(0, 0, 0, 0));
}

#[test]
fn test_studio_white_opaque() {
    assert_eq!(ycbcr_to_rgba(235, 128, 128, 0), Rgba::new(254, 254, 254, 255));
}

#[test]
fn test_channels_clamp() {
    assert_eq!(
        ycbcr_to_rgba(235, 240, 128, 0x80),
        Rgba::new(255, 163, 254, 0x7f)
    );
    assert_eq!(ycbcr_to_rgba(16, 240, 128, 0), Rgba::new(178, 0, 0, 255));
}
