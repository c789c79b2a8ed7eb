//! # Filters Module
//!
//! Cosmetic per-frame filters. Each filter is identified by a string token
//! from a closed set; an unrecognized token resolves to the identity filter.

pub mod ops;
pub mod recipes;
pub mod registry;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::media::picture::Picture;

pub use recipes::{IdentityFilter, RecipeFilter};
pub use registry::FilterRegistry;

/// A pure `picture -> picture` transformation
pub trait Filter: Send + Sync {
    /// Returns the token this filter is registered under
    fn name(&self) -> &str;

    /// Returns a human-readable description of this filter
    fn description(&self) -> &str;

    /// Produce the filtered picture; the input is left untouched
    fn apply(&self, picture: &Picture) -> Result<Picture>;
}

/// The closed set of built-in filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterKind {
    Identity,
    Sketch,
    CharcoalSketch,
    InkPen,
    ColorSketch,
    Cartoon,
    SoftPen,
    NoirSketch,
    Storyboard,
    Chalk,
    FeltPen,
    MonochromeSketch,
    SplashSketch,
    ColoringBook,
    PaperSketch,
    NeonSketch,
}

impl FilterKind {
    pub const ALL: [FilterKind; 16] = [
        FilterKind::Identity,
        FilterKind::Sketch,
        FilterKind::CharcoalSketch,
        FilterKind::InkPen,
        FilterKind::ColorSketch,
        FilterKind::Cartoon,
        FilterKind::SoftPen,
        FilterKind::NoirSketch,
        FilterKind::Storyboard,
        FilterKind::Chalk,
        FilterKind::FeltPen,
        FilterKind::MonochromeSketch,
        FilterKind::SplashSketch,
        FilterKind::ColoringBook,
        FilterKind::PaperSketch,
        FilterKind::NeonSketch,
    ];

    pub fn token(self) -> &'static str {
        match self {
            FilterKind::Identity => "identity",
            FilterKind::Sketch => "sketch",
            FilterKind::CharcoalSketch => "charcoalSketch",
            FilterKind::InkPen => "inkPen",
            FilterKind::ColorSketch => "colorSketch",
            FilterKind::Cartoon => "cartoon",
            FilterKind::SoftPen => "softPen",
            FilterKind::NoirSketch => "noirSketch",
            FilterKind::Storyboard => "storyboard",
            FilterKind::Chalk => "chalk",
            FilterKind::FeltPen => "feltPen",
            FilterKind::MonochromeSketch => "monochromeSketch",
            FilterKind::SplashSketch => "splashSketch",
            FilterKind::ColoringBook => "coloringBook",
            FilterKind::PaperSketch => "paperSketch",
            FilterKind::NeonSketch => "neonSketch",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            FilterKind::Identity => "Frames pass through unchanged",
            FilterKind::Sketch => "Classic pencil sketch from a colour-dodged blur",
            FilterKind::CharcoalSketch => "Thresholded gradient strokes like charcoal",
            FilterKind::InkPen => "Crisp black ink outlines on white",
            FilterKind::ColorSketch => "Smoothed colour with sketched outlines",
            FilterKind::Cartoon => "Flat posterized colour with bold edges",
            FilterKind::SoftPen => "Light, softened pencil strokes",
            FilterKind::NoirSketch => "High contrast black and white sketch",
            FilterKind::Storyboard => "Pencil shading with heavy outlines",
            FilterKind::Chalk => "Bright strokes on a dark board",
            FilterKind::FeltPen => "Reduced palette with marker outlines",
            FilterKind::MonochromeSketch => "Grainy monochrome pencil",
            FilterKind::SplashSketch => "Pencil sketch keeping strongly coloured areas",
            FilterKind::ColoringBook => "Clean outlines ready for colouring",
            FilterKind::PaperSketch => "Pencil sketch on warm paper",
            FilterKind::NeonSketch => "Glowing edges on black",
        }
    }

    /// Look up a token; `None` for anything outside the closed set
    pub fn from_token(token: &str) -> Option<FilterKind> {
        FilterKind::ALL.into_iter().find(|kind| kind.token() == token)
    }
}
