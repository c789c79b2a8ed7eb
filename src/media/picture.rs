use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb, RgbImage};

/// A decoded RGB still
///
/// Thin wrapper around an RGB image buffer with the load/save/resize helpers
/// the pipeline stages and filters share.
#[derive(Clone, Debug, PartialEq)]
pub struct Picture {
    buffer: RgbImage,
}

impl Picture {
    /// Create a new picture from an RGB image buffer
    pub fn new(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    /// Create a new picture with the given dimensions filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        let buffer = ImageBuffer::from_fn(width, height, |_, _| Rgb(color));
        Self { buffer }
    }

    /// Decode any supported image file into RGB
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, image::ImageError> {
        Ok(Self::new(image::open(path)?.to_rgb8()))
    }

    /// Decode an in-memory encoded image (PNG/JPEG) into RGB
    pub fn from_encoded(bytes: &[u8]) -> Result<Self, image::ImageError> {
        Ok(Self::new(image::load_from_memory(bytes)?.to_rgb8()))
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// Get a pixel at the given coordinates (returns RGB array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        self.buffer.put_pixel(x, y, Rgb(color));
    }

    pub fn as_image(&self) -> &RgbImage {
        &self.buffer
    }

    pub fn into_image(self) -> RgbImage {
        self.buffer
    }

    /// Resample to exactly `width` x `height`; a no-op when already that size
    pub fn resized(self, width: u32, height: u32) -> Self {
        if self.width() == width && self.height() == height {
            return self;
        }
        Self::new(imageops::resize(&self.buffer, width, height, FilterType::Triangle))
    }

    /// Encode as JPEG at the given quality (1-100)
    pub fn save_jpeg<P: AsRef<Path>>(&self, path: P, quality: u8) -> Result<(), image::ImageError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
        encoder.encode_image(&self.buffer)
    }
}

/// Largest even size with the longest side at most `max_dimension`,
/// keeping the aspect ratio.
pub fn fit_even(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let (mut w, mut h) = (width, height);
    if width > max_dimension || height > max_dimension {
        let scale = max_dimension as f64 / width.max(height) as f64;
        w = (width as f64 * scale) as u32;
        h = (height as f64 * scale) as u32;
    }
    (round_down_even(w), round_down_even(h))
}

/// Encoders require even dimensions
pub fn round_down_even(value: u32) -> u32 {
    (value / 2 * 2).max(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_jpeg_roundtrip_preserves_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("still.jpg");

        let picture = Picture::new_filled(33, 17, [200, 10, 10]);
        picture.save_jpeg(&path, 30).unwrap();

        let loaded = Picture::open(&path).unwrap();
        assert_eq!((loaded.width(), loaded.height()), (33, 17));
        let [r, g, b] = loaded.get_pixel(16, 8);
        assert!(r > 150 && g < 60 && b < 60);
    }

    #[test]
    fn test_fit_even() {
        assert_eq!(fit_even(1920, 1080, 240), (240, 134));
        assert_eq!(fit_even(101, 51, 240), (100, 50));
        assert_eq!(fit_even(1, 1, 240), (2, 2));
    }

    #[test]
    fn test_resized_noop_when_same_size() {
        let picture = Picture::new_filled(8, 8, [1, 2, 3]);
        let resized = picture.clone().resized(8, 8);
        assert_eq!(picture, resized);
        assert_eq!(picture.resized(4, 2).width(), 4);
    }
}
