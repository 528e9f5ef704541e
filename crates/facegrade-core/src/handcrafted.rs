//! Handcrafted face descriptor: texture + gradient + color histograms.
//!
//! The face crop is resized to a 128×128 canonical size, then three
//! normalized histogram blocks are computed and concatenated:
//! a 256-bin local binary pattern histogram, a 9-bin magnitude-weighted
//! gradient-orientation histogram, and per-channel HSV color histograms.
//! The concatenation is L2-normalized so cosine similarity is well-behaved.

use crate::extractor::{crop_region, l2_normalize, DescriptorExtractor, ExtractError};
use crate::types::{Descriptor, DescriptorTag, FaceRegion};
use image::{DynamicImage, GrayImage, RgbImage};

// --- Named constants ---
const CANONICAL_SIZE: u32 = 128;
const LBP_BINS: usize = 256;
const HOG_BINS: usize = 9;
const HOG_ANGLE_RANGE_DEG: f32 = 180.0;
const HUE_BINS: usize = 30;
const SAT_BINS: usize = 32;
const VAL_BINS: usize = 32;
/// Guards histogram normalization against all-zero input.
const HIST_EPSILON: f32 = 1e-7;
/// Guards the final L2 normalization.
const NORM_EPSILON: f32 = 1e-7;

/// Total descriptor length: LBP + HOG + H/S/V histograms.
pub const HANDCRAFTED_DESCRIPTOR_LEN: usize = LBP_BINS + HOG_BINS + HUE_BINS + SAT_BINS + VAL_BINS;

/// Handcrafted histogram descriptor extractor. Deterministic and
/// stateless: the same crop always yields the same vector.
#[derive(Debug, Default)]
pub struct HandcraftedExtractor;

impl HandcraftedExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl DescriptorExtractor for HandcraftedExtractor {
    fn tag(&self) -> DescriptorTag {
        DescriptorTag::Handcrafted
    }

    fn extract(
        &mut self,
        image: &DynamicImage,
        region: &FaceRegion,
    ) -> Result<Descriptor, ExtractError> {
        let face = crop_region(image, region)?
            .resize_exact(
                CANONICAL_SIZE,
                CANONICAL_SIZE,
                image::imageops::FilterType::Triangle,
            )
            .to_rgb8();
        let gray = DynamicImage::ImageRgb8(face.clone()).to_luma8();

        let mut values = Vec::with_capacity(HANDCRAFTED_DESCRIPTOR_LEN);
        values.extend_from_slice(&lbp_histogram(&gray));
        values.extend_from_slice(&hog_histogram(&gray));
        values.extend_from_slice(&color_histograms(&face));

        l2_normalize(&mut values, NORM_EPSILON);

        Ok(Descriptor::new(DescriptorTag::Handcrafted, values))
    }
}

/// 256-bin local binary pattern histogram over interior pixels.
///
/// Each interior pixel is compared against its 8 neighbors, clockwise from
/// the top-left, forming an 8-bit pattern code. L1-normalized.
fn lbp_histogram(gray: &GrayImage) -> Vec<f32> {
    let (w, h) = gray.dimensions();
    let mut hist = vec![0.0f32; LBP_BINS];

    let at = |x: u32, y: u32| gray.get_pixel(x, y)[0];

    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let center = at(x, y);
            let mut code = 0u8;
            code |= ((at(x - 1, y - 1) > center) as u8) << 7;
            code |= ((at(x, y - 1) > center) as u8) << 6;
            code |= ((at(x + 1, y - 1) > center) as u8) << 5;
            code |= ((at(x + 1, y) > center) as u8) << 4;
            code |= ((at(x + 1, y + 1) > center) as u8) << 3;
            code |= ((at(x, y + 1) > center) as u8) << 2;
            code |= ((at(x - 1, y + 1) > center) as u8) << 1;
            code |= (at(x - 1, y) > center) as u8;
            hist[code as usize] += 1.0;
        }
    }

    l1_normalize(&mut hist);
    hist
}

/// 9-bin gradient-orientation histogram over 0–180°, magnitude-weighted.
///
/// Gradients come from a 3×3 Sobel over interior pixels; each pixel's
/// gradient magnitude is accumulated into the bin of its orientation.
fn hog_histogram(gray: &GrayImage) -> Vec<f32> {
    let (w, h) = gray.dimensions();
    let mut hist = vec![0.0f32; HOG_BINS];
    let bin_width = HOG_ANGLE_RANGE_DEG / HOG_BINS as f32;

    let at = |x: u32, y: u32| gray.get_pixel(x, y)[0] as f32;

    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let gx = (at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x - 1, y) + at(x - 1, y + 1));
            let gy = (at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x, y - 1) + at(x + 1, y - 1));

            let magnitude = (gx * gx + gy * gy).sqrt();
            if magnitude == 0.0 {
                continue;
            }

            let mut angle = gy.atan2(gx).to_degrees();
            if angle < 0.0 {
                angle += 360.0;
            }
            let bin = (angle / bin_width) as usize % HOG_BINS;
            hist[bin] += magnitude;
        }
    }

    l1_normalize(&mut hist);
    hist
}

/// Independent H/S/V histograms (30/32/32 bins), each L1-normalized,
/// concatenated.
fn color_histograms(rgb: &RgbImage) -> Vec<f32> {
    let mut hue = vec![0.0f32; HUE_BINS];
    let mut sat = vec![0.0f32; SAT_BINS];
    let mut val = vec![0.0f32; VAL_BINS];

    for pixel in rgb.pixels() {
        let (h, s, v) = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
        let h_bin = ((h / 360.0 * HUE_BINS as f32) as usize).min(HUE_BINS - 1);
        let s_bin = ((s * SAT_BINS as f32) as usize).min(SAT_BINS - 1);
        let v_bin = ((v * VAL_BINS as f32) as usize).min(VAL_BINS - 1);
        hue[h_bin] += 1.0;
        sat[s_bin] += 1.0;
        val[v_bin] += 1.0;
    }

    l1_normalize(&mut hue);
    l1_normalize(&mut sat);
    l1_normalize(&mut val);

    let mut out = Vec::with_capacity(HUE_BINS + SAT_BINS + VAL_BINS);
    out.extend_from_slice(&hue);
    out.extend_from_slice(&sat);
    out.extend_from_slice(&val);
    out
}

/// Convert an 8-bit RGB pixel to (hue in degrees 0–360, saturation 0–1,
/// value 0–1).
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    let saturation = if max == 0.0 { 0.0 } else { delta / max };

    (hue, saturation, max)
}

fn l1_normalize(hist: &mut [f32]) {
    let sum: f32 = hist.iter().sum();
    let denom = sum + HIST_EPSILON;
    for v in hist.iter_mut() {
        *v /= denom;
    }
}
