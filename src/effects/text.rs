use crate::{
    effects::{
        font::{self, GLYPH_HEIGHT, GLYPH_WIDTH},
        traits::FrameEffect,
    },
    error::Result,
    jobs::params::{TextOverlay, TextPosition},
    video::types::Frame,
};

const OUTLINE_COLOR: [u8; 3] = [0, 0, 0];
const OUTLINE_OFFSETS: [(i64, i64); 4] = [(-1, -1), (1, -1), (-1, 1), (1, 1)];

/// Largest font cell in pixels
pub const MAX_UNIT: u32 = 64;

/// Bitmap text stamped onto every frame
pub struct TextOverlayEffect {
    overlay: TextOverlay,
    /// Pixels per font cell
    unit: u32,
}

/// Pixel extent of a laid-out text block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextBlock {
    pub width: u32,
    pub height: u32,
}

impl TextOverlayEffect {
    pub fn new(overlay: TextOverlay) -> Self {
        let unit = (overlay.scale * 3.0).round().clamp(1.0, MAX_UNIT as f32) as u32;
        Self { overlay, unit }
    }

    fn lines(&self) -> impl Iterator<Item = &str> {
        self.overlay.text.lines()
    }

    pub fn block_size(&self) -> TextBlock {
        let columns = self.lines().map(|line| line.chars().count() as u64).max().unwrap_or(0);
        let rows = self.lines().count() as u64;
        let unit = self.unit as u64;
        let advance = (GLYPH_WIDTH as u64 + 1) * unit;
        let line_height = (GLYPH_HEIGHT as u64 + 1) * unit;

        TextBlock {
            width: saturate((columns * advance).saturating_sub(unit)),
            height: saturate((rows * line_height).saturating_sub(unit)),
        }
    }

    /// Top-left corner of the block on a frame of the given size
    pub fn origin(&self, frame_width: u32, frame_height: u32) -> (i64, i64) {
        let block = self.block_size();
        let centered_x = (frame_width as i64 - block.width as i64) / 2;
        let margin = (frame_height as i64 / 20).max(2 * self.unit as i64);

        match self.overlay.position {
            TextPosition::Center => (centered_x, (frame_height as i64 - block.height as i64) / 2),
            TextPosition::Top => (centered_x, margin),
            TextPosition::Bottom => (centered_x, frame_height as i64 - block.height as i64 - margin),
            TextPosition::At { x, y } => (x as i64, y as i64),
        }
    }

    fn stamp(&self, frame: &mut Frame, origin: (i64, i64), color: [u8; 3]) {
        let (width, height) = (frame.width() as i64, frame.height() as i64);
        let unit = self.unit as i64;
        let advance = (GLYPH_WIDTH as i64 + 1) * unit;
        let line_height = (GLYPH_HEIGHT as i64 + 1) * unit;
        let dot = unit + self.overlay.thickness.saturating_sub(1) as i64;

        for (row, line) in self.lines().enumerate() {
            let top = origin.1 + row as i64 * line_height;
            if top >= height {
                break;
            }
            for (column, c) in line.chars().enumerate() {
                let left = origin.0 + column as i64 * advance;
                if left >= width {
                    break;
                }
                for (cx, cy) in font::lit_cells(c) {
                    let x0 = left + cx as i64 * unit;
                    let y0 = top + cy as i64 * unit;
                    // Only the on-frame part of each dot is visited
                    for y in y0.max(0)..(y0 + dot).min(height) {
                        for x in x0.max(0)..(x0 + dot).min(width) {
                            frame.set_pixel(x as u32, y as u32, color);
                        }
                    }
                }
            }
        }
    }
}

fn saturate(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

impl FrameEffect for TextOverlayEffect {
    fn name(&self) -> &str {
        "text"
    }

    fn apply(&self, frame: &mut Frame) -> Result<()> {
        let (x, y) = self.origin(frame.width(), frame.height());
        for (ox, oy) in OUTLINE_OFFSETS {
            self.stamp(frame, (x + ox, y + oy), OUTLINE_COLOR);
        }
        self.stamp(frame, (x, y), self.overlay.color);
        Ok(())
    }
}
