use super::{CodeDecoder, DecodePolicy};
use crate::code::RawCode;
use crate::frame::FrameData;
use image::imageops::{self, FilterType};
use image::GrayImage;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Matrix-code decoder backed by `rqrr`
pub struct QrDecoder {
    policy: DecodePolicy,
    stats: DecodeStatsCounters,
}

#[derive(Debug, Default)]
struct DecodeStatsCounters {
    frames: AtomicU64,
    unusable_frames: AtomicU64,
    hits: AtomicU64,
    variant_hits: AtomicU64,
}

/// Snapshot of decoder statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeStats {
    pub frames: u64,
    pub unusable_frames: u64,
    pub hits: u64,
    pub variant_hits: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Plain,
    Inverted,
    Equalized,
}

impl QrDecoder {
    pub fn new(policy: DecodePolicy) -> Self {
        debug!("Creating QR decoder with policy {:?}", policy);
        Self {
            policy,
            stats: DecodeStatsCounters::default(),
        }
    }

    pub fn policy(&self) -> DecodePolicy {
        self.policy
    }

    pub fn stats(&self) -> DecodeStats {
        DecodeStats {
            frames: self.stats.frames.load(Ordering::Relaxed),
            unusable_frames: self.stats.unusable_frames.load(Ordering::Relaxed),
            hits: self.stats.hits.load(Ordering::Relaxed),
            variant_hits: self.stats.variant_hits.load(Ordering::Relaxed),
        }
    }

    /// Decode an already prepared luminance image
    pub fn decode_luma(&self, luma: &GrayImage) -> Option<String> {
        let luma = self.fit(luma);

        self.enabled_passes().find_map(|pass| {
            let content = match pass {
                Pass::Plain => decode_grids(&luma),
                Pass::Inverted => {
                    let mut inverted = luma.clone();
                    imageops::invert(&mut inverted);
                    decode_grids(&inverted)
                }
                Pass::Equalized => decode_grids(&imageproc::contrast::equalize_histogram(&luma)),
            }?;

            if pass != Pass::Plain {
                self.stats.variant_hits.fetch_add(1, Ordering::Relaxed);
                debug!("Code recovered by {:?} pass", pass);
            }
            Some(content)
        })
    }

    fn enabled_passes(&self) -> impl Iterator<Item = Pass> + '_ {
        [
            (Pass::Plain, true),
            (Pass::Inverted, self.policy.try_inverted),
            (Pass::Equalized, self.policy.try_equalized),
        ]
        .into_iter()
        .filter_map(|(pass, enabled)| enabled.then_some(pass))
    }

    /// Downscale so the longest edge fits the policy limit
    fn fit(&self, luma: &GrayImage) -> GrayImage {
        let (width, height) = luma.dimensions();
        let longest = width.max(height);
        if longest <= self.policy.max_dimension {
            return luma.clone();
        }

        let scale = self.policy.max_dimension as f64 / longest as f64;
        let target_w = ((width as f64 * scale).round() as u32).max(1);
        let target_h = ((height as f64 * scale).round() as u32).max(1);
        trace!("Downscaling {}x{} to {}x{}", width, height, target_w, target_h);
        imageops::resize(luma, target_w, target_h, FilterType::Triangle)
    }
}

impl Default for QrDecoder {
    fn default() -> Self {
        Self::new(DecodePolicy::default())
    }
}

impl CodeDecoder for QrDecoder {
    fn name(&self) -> &str {
        "qr"
    }

    fn decode(&self, frame: &FrameData) -> Option<RawCode> {
        self.stats.frames.fetch_add(1, Ordering::Relaxed);

        let Some(luma) = frame.to_luma() else {
            self.stats.unusable_frames.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let content = self.decode_luma(&luma)?;
        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        trace!("Frame {} decoded to {:?}", frame.id, content);
        Some(RawCode::new(content))
    }
}

fn decode_grids(luma: &GrayImage) -> Option<String> {
    let (width, height) = luma.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
        width as usize,
        height as usize,
        |x, y| luma.get_pixel(x as u32, y as u32).0[0],
    );

    prepared
        .detect_grids()
        .into_iter()
        .filter_map(|grid| grid.decode().ok())
        .map(|(_meta, content)| content)
        .find(|content| !content.trim().is_empty())
}
