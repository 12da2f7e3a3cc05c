use crate::common::*;

/// The selection strategy of a run.
///
/// Strategies are mutually exclusive. Scores of different strategies are
/// never combined.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SelectionStrategy {
    /// Uncertainty of the predicted segmentation mask.
    SegmentationUncertainty {
        measure: PixelMeasure,
        #[serde(default)]
        reduction: Reduction,
    },
    /// Dispersion of the regressed per-object features.
    FeatureUncertainty {
        #[serde(default)]
        reduction: Reduction,
    },
    /// Seeded uniform priorities, a baseline that ignores the model.
    Random { seed: u64 },
}

impl SelectionStrategy {
    pub fn requires_predictions(&self) -> bool {
        !matches!(self, Self::Random { .. })
    }
}

/// The uncertainty measure of one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelMeasure {
    /// `-Σ p ln p` over class probabilities.
    Entropy,
    /// `1 - (p_top1 - p_top2)`.
    Margin,
}

impl PixelMeasure {
    pub fn measure(&self, probs: &[f32]) -> f64 {
        match self {
            Self::Entropy => probs
                .iter()
                .map(|&prob| prob as f64)
                .filter(|&prob| prob > 0.0)
                .map(|prob| -prob * prob.ln())
                .sum(),
            Self::Margin => {
                let (top1, top2) = probs.iter().map(|&prob| prob as f64).fold(
                    (0.0, 0.0),
                    |(top1, top2), prob| {
                        if prob > top1 {
                            (prob, top1)
                        } else if prob > top2 {
                            (top1, prob)
                        } else {
                            (top1, top2)
                        }
                    },
                );
                1.0 - (top1 - top2)
            }
        }
    }
}

/// Reduces a sequence of per-element values into a scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reduction {
    Mean,
    Max,
}

impl Default for Reduction {
    fn default() -> Self {
        Self::Mean
    }
}

impl Reduction {
    /// Reduce the values. An empty sequence reduces to zero.
    pub fn reduce(&self, values: impl IntoIterator<Item = f64>) -> f64 {
        match self {
            Self::Mean => {
                let (sum, count) = values
                    .into_iter()
                    .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
                if count == 0 {
                    0.0
                } else {
                    sum / count as f64
                }
            }
            Self::Max => values.into_iter().fold(0.0, f64::max),
        }
    }
}
