use super::ImageShape;
use crate::{common::*, error::Error};

/// The image area with valid ground truth, as a half-open pixel box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub top: usize,
    pub left: usize,
    pub bottom: usize,
    pub right: usize,
}

impl Region {
    pub fn new(top: usize, left: usize, bottom: usize, right: usize) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }

    pub fn validate(&self, shape: &ImageShape) -> Result<()> {
        let Self {
            top,
            left,
            bottom,
            right,
        } = *self;

        if top >= bottom || left >= right {
            return Err(Error::config(format!("region {:?} is empty", self)));
        }
        if bottom > shape.height || right > shape.width {
            return Err(Error::config(format!(
                "region {:?} lies outside of the image shape {}",
                self, shape
            )));
        }
        Ok(())
    }

    pub fn rows(&self) -> Range<usize> {
        self.top..self.bottom
    }

    pub fn cols(&self) -> Range<usize> {
        self.left..self.right
    }

    pub fn contains_pixel(&self, y: usize, x: usize) -> bool {
        self.rows().contains(&y) && self.cols().contains(&x)
    }

    /// Check whether a sub-pixel position lies inside of the region.
    pub fn contains(&self, y: R64, x: R64) -> bool {
        (self.top as f64..self.bottom as f64).contains(&y.raw())
            && (self.left as f64..self.right as f64).contains(&x.raw())
    }
}
