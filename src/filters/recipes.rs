use image::{Rgb, RgbImage};

use crate::error::Result;
use crate::filters::ops;
use crate::filters::{Filter, FilterKind};
use crate::media::picture::Picture;

/// Passes frames through untouched; used for unknown tokens
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityFilter;

impl Filter for IdentityFilter {
    fn name(&self) -> &str {
        FilterKind::Identity.token()
    }

    fn description(&self) -> &str {
        FilterKind::Identity.description()
    }

    fn apply(&self, picture: &Picture) -> Result<Picture> {
        Ok(picture.clone())
    }
}

/// One of the built-in cosmetic styles
#[derive(Debug, Clone, Copy)]
pub struct RecipeFilter {
    kind: FilterKind,
}

impl RecipeFilter {
    pub fn new(kind: FilterKind) -> Self {
        Self { kind }
    }

    fn render(&self, src: &RgbImage) -> RgbImage {
        match self.kind {
            FilterKind::Identity => src.clone(),
            FilterKind::Sketch => ops::to_rgb(&ops::pencil(src, 20.0)),
            FilterKind::CharcoalSketch => {
                let edges = ops::sobel(&ops::blur(&ops::gray(src), 2.0));
                ops::to_rgb(&ops::threshold(&ops::invert(&edges), 10))
            }
            FilterKind::InkPen => {
                let edges = ops::sobel(&ops::blur(&ops::gray(src), 1.5));
                ops::to_rgb(&ops::invert(&ops::threshold(&edges, 50)))
            }
            FilterKind::ColorSketch => {
                let edges = ops::adaptive_threshold(&ops::gray(src), 3.0, 10);
                ops::mask(&image::imageops::blur(src, 2.0), &edges)
            }
            FilterKind::Cartoon => {
                let edges = ops::adaptive_threshold(&ops::blur(&ops::gray(src), 1.5), 3.0, 2);
                ops::mask(&ops::posterize(&image::imageops::blur(src, 1.5), 6), &edges)
            }
            FilterKind::SoftPen => {
                let soft = ops::pencil(src, 6.0);
                ops::to_rgb(&ops::blur(&soft, 0.8))
            }
            FilterKind::NoirSketch => {
                let sketch = ops::pencil(src, 12.0);
                ops::to_rgb(&ops::contrast(&sketch, 1.8))
            }
            FilterKind::Storyboard => {
                let sketch = ops::pencil(src, 10.0);
                let edges = ops::invert(&ops::threshold(&ops::sobel(&ops::gray(src)), 80));
                ops::mask(&ops::to_rgb(&ops::contrast(&sketch, 1.3)), &edges)
            }
            FilterKind::Chalk => {
                // Light strokes on a dark board
                let edges = ops::sobel(&ops::blur(&ops::gray(src), 1.0));
                ops::to_rgb(&ops::grain(&ops::contrast(&edges, 1.5), 18, 0xC4A1))
            }
            FilterKind::FeltPen => {
                let edges = ops::invert(&ops::threshold(&ops::sobel(&ops::blur(&ops::gray(src), 2.5)), 40));
                ops::mask(&ops::posterize(src, 4), &edges)
            }
            FilterKind::MonochromeSketch => {
                let sketch = ops::pencil(src, 15.0);
                ops::to_rgb(&ops::grain(&sketch, 12, 0x9A9E))
            }
            FilterKind::SplashSketch => splash(src),
            FilterKind::ColoringBook => {
                let edges = ops::adaptive_threshold(&ops::blur(&ops::gray(src), 2.0), 4.0, 6);
                ops::to_rgb(&edges)
            }
            FilterKind::PaperSketch => {
                let sketch = ops::pencil(src, 14.0);
                tint(&ops::grain(&sketch, 8, 0xFA9E), [250, 240, 220])
            }
            FilterKind::NeonSketch => {
                let edges = ops::sobel(&ops::blur(&ops::gray(src), 1.2));
                let glow = ops::blur(&edges, 2.0);
                RgbImage::from_fn(src.width(), src.height(), |x, y| {
                    let e = edges.get_pixel(x, y).0[0].max(glow.get_pixel(x, y).0[0]) as u16;
                    let [r, g, b] = src.get_pixel(x, y).0;
                    Rgb([
                        (r as u16 * e / 255).max(e / 3) as u8,
                        (g as u16 * e / 255) as u8,
                        (b as u16 * e / 255).max(e) as u8,
                    ])
                })
            }
        }
    }
}

/// Pencil sketch everywhere except strongly coloured areas
fn splash(src: &RgbImage) -> RgbImage {
    let sketch = ops::pencil(src, 15.0);
    RgbImage::from_fn(src.width(), src.height(), |x, y| {
        let pixel = src.get_pixel(x, y).0;
        if ops::saturation(pixel) > 0.45 {
            Rgb(pixel)
        } else {
            let v = sketch.get_pixel(x, y).0[0];
            Rgb([v, v, v])
        }
    })
}

/// Multiply a gray image onto a paper colour
fn tint(gray: &image::GrayImage, paper: [u8; 3]) -> RgbImage {
    RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y).0[0] as u16;
        Rgb(paper.map(|c| (c as u16 * v / 255) as u8))
    })
}

impl Filter for RecipeFilter {
    fn name(&self) -> &str {
        self.kind.token()
    }

    fn description(&self) -> &str {
        self.kind.description()
    }

    fn apply(&self, picture: &Picture) -> Result<Picture> {
        Ok(Picture::new(self.render(picture.as_image())))
    }
}
