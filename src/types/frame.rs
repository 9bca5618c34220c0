//! Frame types shared by ingestion and delivery

use std::sync::Arc;

use crate::{RelayError, Result};

/// Channel order of a 3-channel, 8-bit-per-channel frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Red, green, blue. What output devices expect.
    Rgb24,
    /// Blue, green, red. Common decoder output.
    Bgr24,
}

impl PixelFormat {
    /// Bytes per pixel
    pub const fn channels(self) -> usize {
        3
    }
}

/// Immutable rectangular pixel buffer
///
/// The pixel data is shared (zero-copy via Arc), so cloning a frame to hand it
/// across a task boundary only bumps a reference count. Nothing mutates a frame
/// after construction.
#[derive(Debug, Clone)]
pub struct Frame {
    data: Arc<[u8]>,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl Frame {
    /// Create a frame, validating the buffer length against the dimensions
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        let expected = Self::byte_len(width, height, format);
        if data.len() != expected {
            return Err(RelayError::FrameLayout { width, height, expected, actual: data.len() });
        }
        Ok(Self { data: data.into(), width, height, format })
    }

    /// Create a frame filled with a single colour, given in `format` channel order
    pub fn solid(width: u32, height: u32, format: PixelFormat, pixel: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let data: Vec<u8> = pixel.iter().copied().cycle().take(pixels * 3).collect();
        Self { data: data.into(), width, height, format }
    }

    /// Build from an already validated buffer
    pub(crate) fn from_parts(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), Self::byte_len(width, height, format));
        Self { data: data.into(), width, height, format }
    }

    /// Number of bytes a frame of these dimensions occupies
    pub fn byte_len(width: u32, height: u32, format: PixelFormat) -> usize {
        width as usize * height as usize * format.channels()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Raw pixel bytes, row-major, tightly packed
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Pixel at (x, y) in the frame's own channel order
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        let px = self.data.get(offset..offset + 3)?;
        Some([px[0], px[1], px[2]])
    }

    /// Whether both frames share the same pixel buffer
    pub fn same_buffer(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Return an RGB-ordered frame
    ///
    /// RGB frames are returned as a cheap clone sharing the same buffer; BGR
    /// frames are converted into a new buffer.
    pub fn to_rgb(&self) -> Frame {
        match self.format {
            PixelFormat::Rgb24 => self.clone(),
            PixelFormat::Bgr24 => {
                let mut data = self.data.to_vec();
                for px in data.chunks_exact_mut(3) {
                    px.swap(0, 2);
                }
                Self { data: data.into(), width: self.width, height: self.height, format: PixelFormat::Rgb24 }
            }
        }
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.format == other.format
            && (self.same_buffer(other) || self.data == other.data)
    }
}

impl Eq for Frame {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_mismatched_buffers() {
        let err = Frame::new(4, 2, PixelFormat::Rgb24, vec![0; 10]).unwrap_err();
        assert!(matches!(err, RelayError::FrameLayout { expected: 24, actual: 10, .. }));

        let frame = Frame::new(4, 2, PixelFormat::Rgb24, vec![0; 24]).unwrap();
        assert_eq!(frame.data().len(), 24);
    }

    #[test]
    fn bgr_frames_convert_to_rgb() {
        let bgr = Frame::solid(3, 3, PixelFormat::Bgr24, [10, 20, 30]);
        let rgb = bgr.to_rgb();

        assert_eq!(rgb.format(), PixelFormat::Rgb24);
        assert_eq!(rgb.pixel(2, 2), Some([30, 20, 10]));
        assert!(!rgb.same_buffer(&bgr));
    }

    #[test]
    fn rgb_conversion_shares_the_buffer() {
        let rgb = Frame::solid(2, 2, PixelFormat::Rgb24, [1, 2, 3]);
        assert!(rgb.to_rgb().same_buffer(&rgb));
    }

    #[test]
    fn pixel_access_is_bounds_checked() {
        let frame = Frame::solid(2, 2, PixelFormat::Rgb24, [9, 8, 7]);
        assert_eq!(frame.pixel(1, 1), Some([9, 8, 7]));
        assert_eq!(frame.pixel(2, 0), None);
        assert_eq!(frame.pixel(0, 2), None);
    }
}
