use crate::common::*;

/// A per-pixel segmentation mask holding one class id per pixel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mask {
    height: usize,
    width: usize,
    classes: Vec<u8>,
}

impl Mask {
    /// The class id of pixels that carry no valid ground truth.
    pub const IGNORE: u8 = 255;

    pub fn new(height: usize, width: usize, classes: Vec<u8>) -> Result<Self> {
        ensure!(
            height > 0 && width > 0,
            "mask height and width must be positive"
        );
        ensure!(
            classes.len() == height * width,
            "expect {} mask pixels, but found {}",
            height * width,
            classes.len()
        );
        Ok(Self {
            height,
            width,
            classes,
        })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn classes(&self) -> &[u8] {
        &self.classes
    }

    pub fn get(&self, y: usize, x: usize) -> Option<u8> {
        (y < self.height && x < self.width).then(|| self.classes[y * self.width + x])
    }

    /// Mark every pixel outside of the given rows and columns as [Mask::IGNORE].
    pub fn retain_region(&mut self, rows: Range<usize>, cols: Range<usize>) {
        let width = self.width;
        self.classes
            .iter_mut()
            .enumerate()
            .filter(|(offset, _)| {
                let (y, x) = (offset / width, offset % width);
                !(rows.contains(&y) && cols.contains(&x))
            })
            .for_each(|(_, class)| *class = Self::IGNORE);
    }
}
