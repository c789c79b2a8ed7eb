//! RGB to 4:2:0 conversion for encoder input buffers.

use image::RgbImage;

#[inline]
fn luma(r: i32, g: i32, b: i32) -> u8 {
    (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16).clamp(0, 255) as u8
}

#[inline]
fn chroma_u(r: i32, g: i32, b: i32) -> u8 {
    (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128).clamp(0, 255) as u8
}

#[inline]
fn chroma_v(r: i32, g: i32, b: i32) -> u8 {
    (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128).clamp(0, 255) as u8
}

/// Size in bytes of a `width` x `height` 4:2:0 buffer
pub fn planar_size(width: u32, height: u32) -> usize {
    let (w, h) = (width as usize, height as usize);
    w * h + 2 * w.div_ceil(2) * h.div_ceil(2)
}

/// Convert an RGB image to BT.601 studio-range 4:2:0.
///
/// Layout: all Y samples row-major, then one interleaved U/V pair per 2x2
/// block, sampled from the block's top-left pixel. The image must be at
/// least `width` x `height`.
pub fn to_planar_yuv(image: &RgbImage, width: u32, height: u32) -> Vec<u8> {
    debug_assert!(image.width() >= width && image.height() >= height);

    let luma_len = width as usize * height as usize;
    let mut yuv = vec![0u8; planar_size(width, height)];
    let (y_plane, uv_plane) = yuv.split_at_mut(luma_len);

    let mut y_index = 0;
    let mut uv_index = 0;
    for y in 0..height {
        for x in 0..width {
            let [r, g, b] = image.get_pixel(x, y).0;
            let (r, g, b) = (r as i32, g as i32, b as i32);

            y_plane[y_index] = luma(r, g, b);
            y_index += 1;

            if y % 2 == 0 && x % 2 == 0 {
                uv_plane[uv_index] = chroma_u(r, g, b);
                uv_plane[uv_index + 1] = chroma_v(r, g, b);
                uv_index += 2;
            }
        }
    }

    yuv
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn uniform(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
        ImageBuffer::from_pixel(width, height, Rgb(color))
    }

    #[test]
    fn test_mid_gray_is_neutral() {
        let image = uniform(16, 8, [128, 128, 128]);
        let yuv = to_planar_yuv(&image, 16, 8);

        // BT.601 studio range: Y = 16 + 219 * 128/255 ~= 126
        let expected_y = 126i32;
        for &y in &yuv[..16 * 8] {
            assert!((y as i32 - expected_y).abs() <= 2, "luma {} out of range", y);
        }
        for &c in &yuv[16 * 8..] {
            assert_eq!(c, 128);
        }
    }

    #[test]
    fn test_layout_size() {
        let image = uniform(6, 4, [0, 0, 0]);
        let yuv = to_planar_yuv(&image, 6, 4);
        assert_eq!(yuv.len(), 6 * 4 * 3 / 2);
        assert_eq!(planar_size(5, 3), 15 + 2 * 3 * 2);
    }

    #[test]
    fn test_extremes_are_clamped_to_studio_range() {
        let black = to_planar_yuv(&uniform(2, 2, [0, 0, 0]), 2, 2);
        assert_eq!(&black[..4], &[16, 16, 16, 16]);

        let white = to_planar_yuv(&uniform(2, 2, [255, 255, 255]), 2, 2);
        assert_eq!(&white[..4], &[235, 235, 235, 235]);
    }

    #[test]
    fn test_chroma_sampled_from_block_top_left() {
        let mut image = uniform(2, 2, [0, 0, 0]);
        image.put_pixel(0, 0, Rgb([0, 0, 255]));
        let yuv = to_planar_yuv(&image, 2, 2);

        // Pure blue pushes U up and V down
        assert!(yuv[4] > 200);
        assert!(yuv[5] < 128);
    }
}
