use super::{FeatureSchema, ImageShape, Region, Split};
use crate::common::*;

pub const MAGIC: [u8; 8] = *b"artifice";
pub const FORMAT_VERSION: u32 = 1;

/// The header of a record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreHeader {
    pub magic: [u8; 8],
    pub version: u32,
    pub image_shape: ImageShape,
    pub schema: FeatureSchema,
    pub split: Split,
    pub region: Option<Region>,
    pub num_examples: usize,
}
