//! Boolean pixel masks.
//!
//! A [`Mask`] is a per-pixel boolean array matching an image's dimensions,
//! stored row-major (height x width). The same type serves both roles in the
//! annotation cycle: the transient candidate returned by the segmentation
//! oracle, and the individual label planes of a persisted composite.

use image::{Rgba, RgbaImage};
use ndarray::Array2;

/// Alpha applied to colorized mask overlays (70% opacity).
pub const OVERLAY_ALPHA: u8 = 178;

/// A boolean pixel mask, indexed as (y, x).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    data: Array2<bool>,
}

impl Mask {
    /// Create an all-false mask of the given dimensions.
    pub fn zeros(width: u32, height: u32) -> Self {
        Self {
            data: Array2::from_elem((height as usize, width as usize), false),
        }
    }

    /// Wrap an existing boolean array.
    pub fn from_array(data: Array2<bool>) -> Self {
        Self { data }
    }

    pub fn as_array(&self) -> &Array2<bool> {
        &self.data
    }

    pub fn into_array(self) -> Array2<bool> {
        self.data
    }

    pub fn width(&self) -> u32 {
        self.data.ncols() as u32
    }

    pub fn height(&self) -> u32 {
        self.data.nrows() as u32
    }

    /// Whether another mask has the same pixel dimensions.
    pub fn same_size(&self, other: &Mask) -> bool {
        self.data.dim() == other.data.dim()
    }

    /// Read one pixel. Panics when (x, y) is outside the mask.
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.data[[y as usize, x as usize]]
    }

    /// Set one pixel. Panics when (x, y) is outside the mask.
    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        self.data[[y as usize, x as usize]] = value;
    }

    /// Set-union with another mask of the same dimensions.
    pub fn union_with(&mut self, other: &Mask) {
        assert!(self.same_size(other), "mask dimensions differ");
        self.data
            .zip_mut_with(&other.data, |a, &b| *a = *a || b);
    }

    /// Remove every pixel set in `other` (AND-NOT).
    pub fn subtract(&mut self, other: &Mask) {
        assert!(self.same_size(other), "mask dimensions differ");
        self.data
            .zip_mut_with(&other.data, |a, &b| *a = *a && !b);
    }

    /// Whether any pixel is set.
    pub fn any(&self) -> bool {
        self.data.iter().any(|&v| v)
    }

    /// Number of set pixels.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }
}

/// Render a mask as a transparent overlay in a single color.
///
/// Unset pixels stay fully transparent; set pixels get `color` at
/// [`OVERLAY_ALPHA`]. Used for candidate previews.
pub fn colorize(mask: &Mask, color: [u8; 3]) -> RgbaImage {
    let mut image = RgbaImage::new(mask.width(), mask.height());
    for ((y, x), &set) in mask.as_array().indexed_iter() {
        if set {
            image.put_pixel(
                x as u32,
                y as u32,
                Rgba([color[0], color[1], color[2], OVERLAY_ALPHA]),
            );
        }
    }
    image
}
