use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::trace;

/// Frame format enumeration supporting the pixel layouts a counter camera hands us
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// Motion JPEG format - compressed JPEG frames
    Mjpeg,
    /// YUV 4:2:2 format - uncompressed YUV data
    Yuyv,
    /// RGB24 format - uncompressed RGB data
    Rgb24,
    /// 8-bit greyscale
    Gray8,
}

impl FrameFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Mjpeg => 0, // Variable size, compressed
            FrameFormat::Yuyv => 2,
            FrameFormat::Rgb24 => 3,
            FrameFormat::Gray8 => 1,
        }
    }

    /// Check if format is compressed
    pub fn is_compressed(&self) -> bool {
        matches!(self, FrameFormat::Mjpeg)
    }
}

/// Frame data structure containing raw frame data and metadata
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Unique frame identifier, increasing per source
    pub id: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    /// Raw frame data (shared ownership so pulls stay cheap)
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frame format
    pub format: FrameFormat,
}

impl FrameData {
    /// Create a new frame data instance
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    /// Wrap an already decoded greyscale image
    pub fn from_gray(id: u64, image: GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(
            id,
            SystemTime::now(),
            image.into_raw(),
            width,
            height,
            FrameFormat::Gray8,
        )
    }

    /// Get the expected frame size for uncompressed formats
    pub fn expected_size(&self) -> Option<usize> {
        if self.format.is_compressed() {
            None
        } else {
            Some(self.width as usize * self.height as usize * self.format.bytes_per_pixel())
        }
    }

    /// Validate frame data size against expected size
    pub fn validate_size(&self) -> bool {
        match self.expected_size() {
            Some(expected) => self.data.len() == expected,
            None => true, // Compressed formats have variable size
        }
    }

    /// Whether the frame carries no usable pixels at all
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() || (!self.format.is_compressed() && (self.width == 0 || self.height == 0))
    }

    /// Convert the frame to a luminance image.
    ///
    /// Returns `None` for empty, truncated or undecodable frames; callers treat
    /// that exactly like a frame with no code in it.
    pub fn to_luma(&self) -> Option<GrayImage> {
        if self.is_empty() || !self.validate_size() {
            trace!(
                "Frame {} unusable ({}x{} {:?}, {} bytes)",
                self.id,
                self.width,
                self.height,
                self.format,
                self.data.len()
            );
            return None;
        }

        match self.format {
            FrameFormat::Gray8 => GrayImage::from_raw(self.width, self.height, self.data.to_vec()),
            FrameFormat::Rgb24 => {
                let luma = self
                    .data
                    .chunks_exact(3)
                    .map(|px| rgb_to_luma(px[0], px[1], px[2]))
                    .collect();
                GrayImage::from_raw(self.width, self.height, luma)
            }
            // Y0 U Y1 V: every even byte is a luminance sample
            FrameFormat::Yuyv => {
                let luma = self.data.iter().step_by(2).copied().collect();
                GrayImage::from_raw(self.width, self.height, luma)
            }
            FrameFormat::Mjpeg => image::load_from_memory(&self.data)
                .map(|img| img.to_luma8())
                .map_err(|e| trace!("Frame {} JPEG decode failed: {}", self.id, e))
                .ok(),
        }
    }
}

fn rgb_to_luma(r: u8, g: u8, b: u8) -> u8 {
    // ITU-R BT.601 weights in fixed point
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_format_properties() {
        assert_eq!(FrameFormat::Mjpeg.bytes_per_pixel(), 0);
        assert_eq!(FrameFormat::Yuyv.bytes_per_pixel(), 2);
        assert_eq!(FrameFormat::Rgb24.bytes_per_pixel(), 3);
        assert_eq!(FrameFormat::Gray8.bytes_per_pixel(), 1);

        assert!(FrameFormat::Mjpeg.is_compressed());
        assert!(!FrameFormat::Gray8.is_compressed());
    }

    #[test]
    fn test_frame_size_validation() {
        let valid = FrameData::new(1, SystemTime::now(), vec![0u8; 640 * 480 * 2], 640, 480, FrameFormat::Yuyv);
        assert!(valid.validate_size());

        let invalid = FrameData::new(2, SystemTime::now(), vec![0u8; 100], 640, 480, FrameFormat::Yuyv);
        assert!(!invalid.validate_size());
        assert!(invalid.to_luma().is_none());
    }

    #[test]
    fn test_zero_sized_frames_have_no_luma() {
        let empty = FrameData::new(1, SystemTime::now(), Vec::new(), 0, 0, FrameFormat::Gray8);
        assert!(empty.is_empty());
        assert!(empty.to_luma().is_none());

        let empty_jpeg = FrameData::new(2, SystemTime::now(), Vec::new(), 640, 480, FrameFormat::Mjpeg);
        assert!(empty_jpeg.to_luma().is_none());
    }

    #[test]
    fn test_garbage_jpeg_has_no_luma() {
        let frame = FrameData::new(3, SystemTime::now(), vec![0xAB; 512], 640, 480, FrameFormat::Mjpeg);
        assert!(frame.to_luma().is_none());
    }

    #[test]
    fn test_rgb_and_yuyv_luma_conversion() {
        let rgb = FrameData::new(
            4,
            SystemTime::now(),
            vec![255, 255, 255, 0, 0, 0],
            2,
            1,
            FrameFormat::Rgb24,
        );
        let luma = rgb.to_luma().unwrap();
        assert_eq!(luma.get_pixel(0, 0).0[0], 255);
        assert_eq!(luma.get_pixel(1, 0).0[0], 0);

        let yuyv = FrameData::new(5, SystemTime::now(), vec![10, 128, 200, 128], 2, 1, FrameFormat::Yuyv);
        let luma = yuyv.to_luma().unwrap();
        assert_eq!(luma.as_raw(), &vec![10, 200]);
    }
}
