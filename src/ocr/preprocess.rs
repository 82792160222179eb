//! Plate crop preprocessing for the second OCR pass.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::adaptive_threshold;
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::open;

const MIN_HEIGHT: u32 = 30;
const MIN_WIDTH: u32 = 80;
const BLUR_SIGMA: f32 = 0.8;
const CLAHE_CLIP_LIMIT: f32 = 2.0;
const CLAHE_GRID: (u32, u32) = (8, 8);
const THRESHOLD_BLOCK_RADIUS: u32 = 17;
/// Below this share of white pixels the binarized plate is assumed to be
/// dark-on-light inverted and gets flipped.
const MIN_WHITE_RATIO: f32 = 0.4;

/// Produce a binarized, contrast-normalized variant of a plate crop.
///
/// Returns `None` for empty crops.
pub fn preprocess_plate(crop: &DynamicImage) -> Option<GrayImage> {
    let (w, h) = (crop.width(), crop.height());
    if w == 0 || h == 0 {
        return None;
    }

    let resized;
    let crop = if h < MIN_HEIGHT || w < MIN_WIDTH {
        let scale = (MIN_HEIGHT as f32 / h as f32).max(MIN_WIDTH as f32 / w as f32);
        let new_w = (w as f32 * scale) as u32;
        let new_h = (h as f32 * scale) as u32;
        resized = crop.resize_exact(new_w.max(1), new_h.max(1), FilterType::Triangle);
        &resized
    } else {
        crop
    };

    let gray = crop.to_luma8();
    let blurred = gaussian_blur_f32(&gray, BLUR_SIGMA);
    let equalized = clahe(&blurred, CLAHE_CLIP_LIMIT, CLAHE_GRID);
    let binary = adaptive_threshold(&equalized, THRESHOLD_BLOCK_RADIUS);
    let mut cleaned = open(&binary, Norm::LInf, 1);

    if white_ratio(&cleaned) < MIN_WHITE_RATIO {
        imageops::invert(&mut cleaned);
    }

    Some(cleaned)
}

/// Fraction of non-zero pixels.
pub fn white_ratio(image: &GrayImage) -> f32 {
    let total = image.width() as usize * image.height() as usize;
    if total == 0 {
        return 0.0;
    }
    let white = image.pixels().filter(|p| p[0] > 0).count();
    white as f32 / total as f32
}

/// Contrast-limited adaptive histogram equalization.
///
/// Each tile of a `grid.0 x grid.1` layout gets its own clipped equalization
/// table; pixels blend the tables of the four nearest tile centers.
pub fn clahe(image: &GrayImage, clip_limit: f32, grid: (u32, u32)) -> GrayImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return image.clone();
    }

    let tile_w = w.div_ceil(grid.0.clamp(1, w));
    let tile_h = h.div_ceil(grid.1.clamp(1, h));
    let tiles_x = w.div_ceil(tile_w);
    let tiles_y = h.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);
            luts.push(tile_lut(image, x0, y0, x1, y1, clip_limit));
        }
    }

    let lut_at = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];
    let neighbours = |pos: u32, tile: u32, count: u32| -> (u32, u32, f32) {
        let f = (pos as f32 + 0.5) / tile as f32 - 0.5;
        let lo = (f.floor().max(0.0) as u32).min(count - 1);
        let hi = (lo + 1).min(count - 1);
        let weight = (f - lo as f32).clamp(0.0, 1.0);
        (lo, hi, weight)
    };

    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        let (ty0, ty1, wy) = neighbours(y, tile_h, tiles_y);
        for x in 0..w {
            let (tx0, tx1, wx) = neighbours(x, tile_w, tiles_x);
            let v = image.get_pixel(x, y)[0] as usize;

            let top = lut_at(tx0, ty0)[v] as f32 * (1.0 - wx) + lut_at(tx1, ty0)[v] as f32 * wx;
            let bottom = lut_at(tx0, ty1)[v] as f32 * (1.0 - wx) + lut_at(tx1, ty1)[v] as f32 * wx;
            let value = top * (1.0 - wy) + bottom * wy;

            out.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}

fn tile_lut(image: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f32) -> [u8; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[image.get_pixel(x, y)[0] as usize] += 1;
        }
    }

    let area = (x1 - x0) * (y1 - y0);
    let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);

    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }

    // Redistribute the clipped mass evenly.
    let bonus = excess / 256;
    let residual = (excess % 256) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += bonus;
        if i < residual {
            *bin += 1;
        }
    }

    let mut lut = [0u8; 256];
    let scale = 255.0 / area.max(1) as f32;
    let mut cdf = 0u32;
    for (i, bin) in hist.iter().enumerate() {
        cdf += bin;
        lut[i] = (cdf as f32 * scale).round().min(255.0) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_small_crop_is_upscaled() {
        let crop = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 20, Rgb([200, 200, 200])));
        let out = preprocess_plate(&crop).unwrap();
        assert!(out.width() >= MIN_WIDTH);
        assert!(out.height() >= MIN_HEIGHT);
    }

    #[test]
    fn test_empty_crop() {
        let crop = DynamicImage::new_rgb8(0, 0);
        assert!(preprocess_plate(&crop).is_none());
    }

    #[test]
    fn test_output_is_binary_and_mostly_white() {
        // Dark characters on a light plate.
        let mut img = RgbImage::from_pixel(120, 40, Rgb([220, 220, 220]));
        for x in (10..110).step_by(12) {
            for y in 8..32 {
                for dx in 0..4 {
                    img.put_pixel(x + dx, y, Rgb([20, 20, 20]));
                }
            }
        }
        let out = preprocess_plate(&DynamicImage::ImageRgb8(img)).unwrap();
        assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert!(white_ratio(&out) >= MIN_WHITE_RATIO);
    }

    #[test]
    fn test_clahe_keeps_dimensions() {
        let img = GrayImage::from_fn(37, 23, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]));
        let out = clahe(&img, 2.0, (8, 8));
        assert_eq!(out.dimensions(), (37, 23));
    }

    #[test]
    fn test_clahe_stretches_low_contrast() {
        let img = GrayImage::from_fn(64, 64, |x, _| Luma([100 + (x % 8) as u8]));
        let out = clahe(&img, 40.0, (1, 1));
        let min = out.pixels().map(|p| p[0]).min().unwrap();
        let max = out.pixels().map(|p| p[0]).max().unwrap();
        assert!(max - min > 7);
    }

    #[test]
    fn test_white_ratio() {
        let mut img = GrayImage::new(10, 10);
        for x in 0..10 {
            for y in 0..4 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        assert!((white_ratio(&img) - 0.4).abs() < 1e-6);
    }
}
