//! Synthetic colour-bar frames shown while no live source is available

use tracing::warn;

use crate::types::{Frame, PixelFormat};

/// Bar colours, top to bottom
pub const BAR_COLORS: [[u8; 3]; 8] = [
    [255, 255, 255], // white
    [255, 255, 0],   // yellow
    [0, 255, 255],   // cyan
    [0, 255, 0],     // green
    [255, 0, 255],   // magenta
    [255, 0, 0],     // red
    [0, 0, 255],     // blue
    [0, 0, 0],       // black
];

/// Generates the placeholder test pattern
pub struct PlaceholderGenerator;

impl PlaceholderGenerator {
    /// Eight horizontal bands of `height / 8` rows each, the last band taking the
    /// remainder rows. Heights below eight produce an all-black frame.
    pub fn generate(width: u32, height: u32) -> Frame {
        let band_height = height / BAR_COLORS.len() as u32;
        if band_height == 0 {
            return Self::black(width, height);
        }

        let row_len = width as usize * 3;
        let mut data = Vec::with_capacity(row_len * height as usize);
        for y in 0..height {
            let band = Self::band_of_row(y, band_height);
            let color = BAR_COLORS[band];
            data.extend(color.iter().copied().cycle().take(row_len));
        }

        Frame::from_parts(width, height, PixelFormat::Rgb24, data)
    }

    /// Band index covering row `y`
    pub fn band_of_row(y: u32, band_height: u32) -> usize {
        let last = BAR_COLORS.len() - 1;
        if band_height == 0 {
            return last;
        }
        ((y / band_height) as usize).min(last)
    }

    fn black(width: u32, height: u32) -> Frame {
        if height > 0 {
            warn!(width, height, "Placeholder too short for colour bars, using black frame");
        }
        Frame::solid(width, height, PixelFormat::Rgb24, [0, 0, 0])
    }
}
