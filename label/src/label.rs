use crate::{common::*, Mask, NoiseProfile, ObjectFeatures};

/// Where a label comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LabelSource {
    /// Exact annotation produced by the generator.
    GroundTruth,
    /// Noisy annotation produced by the simulated annotator.
    Oracle { profile: NoiseProfile, seed: u64 },
}

/// The annotation attached to an example.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub source: LabelSource,
    pub objects: Vec<ObjectFeatures>,
    pub mask: Option<Mask>,
}

impl Label {
    pub fn ground_truth(objects: Vec<ObjectFeatures>, mask: Option<Mask>) -> Self {
        Self {
            source: LabelSource::GroundTruth,
            objects,
            mask,
        }
    }

    pub fn is_ground_truth(&self) -> bool {
        matches!(self.source, LabelSource::GroundTruth)
    }

    /// Compare the annotation content while ignoring the label source.
    pub fn same_annotation(&self, other: &Label) -> bool {
        self.objects == other.objects && self.mask == other.mask
    }
}
