//! Pixel building blocks shared by the filter recipes

use image::imageops;
use image::{GrayImage, Luma, Rgb, RgbImage};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

pub fn gray(image: &RgbImage) -> GrayImage {
    imageops::grayscale(image)
}

pub fn to_rgb(gray: &GrayImage) -> RgbImage {
    RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y).0[0];
        Rgb([v, v, v])
    })
}

pub fn invert(gray: &GrayImage) -> GrayImage {
    let mut out = gray.clone();
    imageops::invert(&mut out);
    out
}

pub fn blur(gray: &GrayImage, sigma: f32) -> GrayImage {
    imageops::blur(gray, sigma)
}

/// Colour dodge of `base` by `blend`: `base * 255 / (255 - blend)`
pub fn dodge(base: &GrayImage, blend: &GrayImage, scale: f32) -> GrayImage {
    GrayImage::from_fn(base.width(), base.height(), |x, y| {
        let b = base.get_pixel(x, y).0[0] as f32;
        let d = 255.0 - blend.get_pixel(x, y).0[0] as f32;
        let v = if d <= 0.0 { 255.0 } else { b * scale / d };
        Luma([v.min(255.0) as u8])
    })
}

/// Pencil sketch: grayscale dodged by its own blurred negative
pub fn pencil(image: &RgbImage, sigma: f32) -> GrayImage {
    let g = gray(image);
    let blurred = blur(&invert(&g), sigma);
    dodge(&g, &blurred, 255.0)
}

/// Sobel gradient magnitude, saturated to 255
pub fn sobel(gray: &GrayImage) -> GrayImage {
    let (w, h) = gray.dimensions();
    let at = |x: i64, y: i64| -> f32 {
        let cx = x.clamp(0, w as i64 - 1) as u32;
        let cy = y.clamp(0, h as i64 - 1) as u32;
        gray.get_pixel(cx, cy).0[0] as f32
    };

    GrayImage::from_fn(w, h, |x, y| {
        let (x, y) = (x as i64, y as i64);
        let gx = at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1)
            - at(x - 1, y - 1) - 2.0 * at(x - 1, y) - at(x - 1, y + 1);
        let gy = at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1)
            - at(x - 1, y - 1) - 2.0 * at(x, y - 1) - at(x + 1, y - 1);
        Luma([(gx * gx + gy * gy).sqrt().min(255.0) as u8])
    })
}

pub fn threshold(gray: &GrayImage, level: u8) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([if gray.get_pixel(x, y).0[0] > level { 255 } else { 0 }])
    })
}

/// White where a pixel is brighter than its blurred neighbourhood minus `offset`
pub fn adaptive_threshold(gray: &GrayImage, sigma: f32, offset: i16) -> GrayImage {
    let local = blur(gray, sigma);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y).0[0] as i16;
        let mean = local.get_pixel(x, y).0[0] as i16;
        Luma([if v > mean - offset { 255 } else { 0 }])
    })
}

/// Darken `image` wherever `mask` is dark
pub fn mask(image: &RgbImage, mask: &GrayImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let m = mask.get_pixel(x, y).0[0] as u16;
        let [r, g, b] = image.get_pixel(x, y).0;
        Rgb([(r as u16 * m / 255) as u8, (g as u16 * m / 255) as u8, (b as u16 * m / 255) as u8])
    })
}

pub fn posterize(image: &RgbImage, levels: u8) -> RgbImage {
    let step = 255 / levels.max(2) as u16;
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let p = image.get_pixel(x, y).0;
        Rgb(p.map(|c| ((c as u16 / step) * step).min(255) as u8))
    })
}

/// Linear contrast stretch around mid gray
pub fn contrast(gray: &GrayImage, factor: f32) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y).0[0] as f32;
        Luma([((v - 128.0) * factor + 128.0).clamp(0.0, 255.0) as u8])
    })
}

/// Blend deterministic paper grain into `gray`
pub fn grain(gray: &GrayImage, amount: u8, seed: u64) -> GrayImage {
    let mut rng = SmallRng::seed_from_u64(seed);
    let amount = amount as i16;
    let mut out = gray.clone();
    for pixel in out.pixels_mut() {
        let noise = rng.gen_range(-amount..=amount);
        pixel.0[0] = (pixel.0[0] as i16 + noise).clamp(0, 255) as u8;
    }
    out
}

/// Saturation of an RGB pixel in `[0, 1]`
pub fn saturation([r, g, b]: [u8; 3]) -> f32 {
    let max = r.max(g).max(b) as f32;
    let min = r.min(g).min(b) as f32;
    if max == 0.0 { 0.0 } else { (max - min) / max }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sobel_flat_image_has_no_edges() {
        let flat = GrayImage::from_pixel(8, 8, Luma([90]));
        assert!(sobel(&flat).pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn test_sobel_finds_vertical_edge() {
        let step = GrayImage::from_fn(8, 8, |x, _| Luma([if x < 4 { 0 } else { 255 }]));
        let edges = sobel(&step);
        assert_eq!(edges.get_pixel(4, 4).0[0], 255);
        assert_eq!(edges.get_pixel(0, 4).0[0], 0);
    }

    #[test]
    fn test_pencil_of_flat_image_is_white() {
        let flat = RgbImage::from_pixel(8, 8, Rgb([120, 120, 120]));
        // A flat field dodged by its own blurred negative saturates
        assert!(pencil(&flat, 3.0).pixels().all(|p| p.0[0] >= 250));
    }

    #[test]
    fn test_grain_is_deterministic() {
        let flat = GrayImage::from_pixel(4, 4, Luma([128]));
        assert_eq!(grain(&flat, 10, 7), grain(&flat, 10, 7));
    }

    #[test]
    fn test_posterize_reduces_levels() {
        let ramp = RgbImage::from_fn(256, 1, |x, _| Rgb([x as u8, x as u8, x as u8]));
        let out = posterize(&ramp, 4);
        let mut levels: Vec<u8> = out.pixels().map(|p| p.0[0]).collect();
        levels.dedup();
        assert!(levels.len() <= 5);
    }
}
