//! The page bitmap that decoded pixel runs are painted into.

use super::sink::BitmapUpdate;
use log::warn;

/// Position of the next pixel to paint while decoding one pixel data sub-block.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct PaintCursor {
    pub x: i32,
    pub y: i32,
    origin_x: i32,
}

impl PaintCursor {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y, origin_x: x }
    }

    pub fn origin_x(&self) -> i32 {
        self.origin_x
    }

    /// Returns to the object's left edge, two rows down (the next line of the same field).
    pub fn end_of_line(&mut self) {
        self.x = self.origin_x;
        self.y += 2;
    }
}

/// Fixed-size grid of pixel codes, one byte per cell, row-major.
#[derive(Clone, PartialEq, Eq)]
pub struct CompositionBuffer {
    width: usize,
    height: usize,
    cells: Vec<u8>,
}

impl std::fmt::Debug for CompositionBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositionBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("cells.len()", &self.cells.len())
            .finish()
    }
}

impl CompositionBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![0; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    pub fn fill(&mut self, code: u8) {
        for cell in self.cells.iter_mut() {
            *cell = code;
        }
    }

    pub fn get(&self, x: usize, y: usize) -> Option<u8> {
        if x < self.width && y < self.height {
            Some(self.cells[y * self.width + x])
        } else {
            None
        }
    }

    pub fn row(&self, y: usize) -> Option<&[u8]> {
        if y < self.height {
            Some(&self.cells[y * self.width..(y + 1) * self.width])
        } else {
            None
        }
    }

    /// Paints `run_length` cells of `code` starting at the cursor and advances it.
    ///
    /// Cells right of the buffer are dropped. A run on a row outside the buffer is dropped
    /// entirely with a warning; returns `false` in that case.
    pub fn plot(&mut self, cursor: &mut PaintCursor, run_length: usize, code: u8) -> bool {
        let start = cursor.x;
        cursor.x = cursor.x.saturating_add(run_length as i32);
        if cursor.y < 0 || cursor.y as usize >= self.height {
            warn!("plot out of region: x={}, y={}", start, cursor.y);
            return false;
        }
        let row = cursor.y as usize * self.width;
        let from = start.max(0) as usize;
        let to = (cursor.x.max(0) as usize).min(self.width);
        if from < to {
            for cell in &mut self.cells[row + from..row + to] {
                *cell = code;
            }
        }
        true
    }

    /// Full-buffer update for the presentation sink.
    pub fn update(&self) -> BitmapUpdate<'_> {
        BitmapUpdate {
            x: 0,
            y: 0,
            width: self.width,
            height: self.height,
            pixels: &self.cells,
        }
    }
}

#[test]
fn test_fill_and_plot() {
    let mut buffer = CompositionBuffer::new(16, 4);
    buffer.fill(15);
    let mut cursor = PaintCursor::new(2, 1);
    assert!(buffer.plot(&mut cursor, 3, 7));
    assert_eq!(cursor.x, 5);
    assert_eq!(
        buffer.row(1).unwrap(),
        &[15, 15, 7, 7, 7, 15, 15, 15, 15, 15, 15, 15, 15, 15, 15, 15]
    );
    assert!(buffer.row(0).unwrap().iter().all(|&c| c == 15));
}

#[test]
fn test_plot_clips() {
    let mut buffer = CompositionBuffer::new(8, 2);
    let mut cursor = PaintCursor::new(6, 0);
    assert!(buffer.plot(&mut cursor, 4, 1));
    assert_eq!(buffer.row(0).unwrap(), &[0, 0, 0, 0, 0, 0, 1, 1]);
    assert_eq!(buffer.row(1).unwrap(), &[0; 8]);

    let mut cursor = PaintCursor::new(0, 2);
    assert!(!buffer.plot(&mut cursor, 3, 1));
    assert_eq!(cursor.x, 3);
    let mut cursor = PaintCursor::new(0, -1);
    assert!(!buffer.plot(&mut cursor, 3, 1));
    assert!(buffer.cells().iter().filter(|&&c| c == 1).count() == 2);
}

#[test]
fn test_end_of_line() {
    let mut cursor = PaintCursor::new(10, 11);
    cursor.x = 300;
    cursor.end_of_line();
    assert_eq!(cursor, PaintCursor::new(10, 13));
}
