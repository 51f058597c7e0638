//! Presentation sinks receive palette and bitmap updates from the decoder.

use super::color::Rgba;
use std::fmt::{Debug, Formatter};

/// A rectangle of pixel codes, row-major, `width * height` bytes.
#[derive(Copy, Clone)]
pub struct BitmapUpdate<'a> {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
    pub pixels: &'a [u8],
}

impl Debug for BitmapUpdate<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitmapUpdate")
            .field("x", &self.x)
            .field("y", &self.y)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixels.len()", &self.pixels.len())
            .finish()
    }
}

/// Overlay-like display device driven by the decoder.
///
/// Calls happen synchronously on the decoding thread. The bitmap passed to
/// [`PresentationSink::show`] is reused by the decoder afterwards, so implementations must
/// copy whatever they keep.
pub trait PresentationSink {
    /// Programs one palette entry.
    fn set_palette(&mut self, entry_id: u8, color: Rgba);
    /// Replaces the displayed bitmap and shows it.
    fn show(&mut self, update: BitmapUpdate<'_>);
}

impl<S: PresentationSink + ?Sized> PresentationSink for &mut S {
    fn set_palette(&mut self, entry_id: u8, color: Rgba) {
        (**self).set_palette(entry_id, color)
    }

    fn show(&mut self, update: BitmapUpdate<'_>) {
        (**self).show(update)
    }
}

/// Discards everything.
#[derive(Debug, Default, Copy, Clone)]
pub struct NullSink;

impl PresentationSink for NullSink {
    fn set_palette(&mut self, _entry_id: u8, _color: Rgba) {}

    fn show(&mut self, _update: BitmapUpdate<'_>) {}
}

/// Keeps the programmed palette and a copy of the last shown bitmap.
pub struct MemorySink {
    palette: Box<[Rgba; 256]>,
    width: usize,
    height: usize,
    pixels: Vec<u8>,
    updates: usize,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self {
            palette: Box::new([Rgba::default(); 256]),
            width: 0,
            height: 0,
            pixels: Vec::new(),
            updates: 0,
        }
    }
}

impl Debug for MemorySink {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySink")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("updates", &self.updates)
            .finish()
    }
}

impl MemorySink {
    pub fn palette(&self) -> &[Rgba; 256] {
        &self.palette
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixel codes of the last shown bitmap.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Number of [`PresentationSink::show`] calls received.
    pub fn updates(&self) -> usize {
        self.updates
    }

    /// Resolves the last shown bitmap through the palette, 4 bytes per pixel.
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels.len() * 4);
        for &code in &self.pixels {
            out.extend_from_slice(&self.palette[code as usize].to_array());
        }
        out
    }
}

impl PresentationSink for MemorySink {
    fn set_palette(&mut self, entry_id: u8, color: Rgba) {
        self.palette[entry_id as usize] = color;
    }

    fn show(&mut self, update: BitmapUpdate<'_>) {
        self.width = update.width;
        self.height = update.height;
        self.pixels.clear();
        self.pixels.extend_from_slice(update.pixels);
        self.updates += 1;
    }
}

#[test]
fn test_memory_sink_copies() {
    let mut sink = MemorySink::default();
    sink.set_palette(3, Rgba::new(1, 2, 3, 255));
    let pixels = [0u8, 3, 3, 0];
    sink.show(BitmapUpdate {
        x: 0,
        y: 0,
        width: 2,
        height: 2,
        pixels: &pixels,
    });
    assert_eq!(sink.updates(), 1);
    assert_eq!(sink.pixels(), &pixels);
    assert_eq!(
        &sink.to_rgba()[..8],
        &[0, 0, 0, 0, 1, 2, 3, 255]
    );
}
