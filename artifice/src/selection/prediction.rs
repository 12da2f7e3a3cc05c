use crate::{common::*, error::Error};

/// Per-pixel class probabilities in row-major `(h, w, classes)` layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityMap {
    pub height: usize,
    pub width: usize,
    pub num_classes: usize,
    pub probs: Vec<f32>,
}

impl ProbabilityMap {
    pub fn new(height: usize, width: usize, num_classes: usize, probs: Vec<f32>) -> Result<Self> {
        let map = Self {
            height,
            width,
            num_classes,
            probs,
        };
        map.validate()?;
        Ok(map)
    }

    pub fn validate(&self) -> Result<()> {
        let Self {
            height,
            width,
            num_classes,
            ref probs,
        } = *self;

        if height == 0 || width == 0 || num_classes == 0 {
            return Err(Error::schema(format!(
                "probability map size ({}, {}, {}) must be non-zero",
                height, width, num_classes
            )));
        }
        if probs.len() != height * width * num_classes {
            return Err(Error::schema(format!(
                "expect {} probabilities, but found {}",
                height * width * num_classes,
                probs.len()
            )));
        }
        if let Some(prob) = probs.iter().find(|prob| !prob.is_finite() || **prob < 0.0) {
            return Err(Error::schema(format!("invalid probability {}", prob)));
        }
        Ok(())
    }

    /// The class probabilities at a pixel.
    pub fn pixel(&self, y: usize, x: usize) -> &[f32] {
        let begin = (y * self.width + x) * self.num_classes;
        &self.probs[begin..(begin + self.num_classes)]
    }
}

/// The output of the training collaborator for one pool example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub index: usize,
    #[serde(default)]
    pub mask_probs: Option<ProbabilityMap>,
    #[serde(default)]
    pub objects: Vec<ObjectFeatures>,
    /// Flattened feature vectors, one per ensemble member.
    #[serde(default)]
    pub feature_samples: Vec<Vec<R64>>,
    /// Per-coordinate predictive variance of the flattened feature vector.
    #[serde(default)]
    pub feature_variance: Option<Vec<R64>>,
}

impl Prediction {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            mask_probs: None,
            objects: vec![],
            feature_samples: vec![],
            feature_variance: None,
        }
    }

    /// The per-coordinate dispersion of the regressed features.
    ///
    /// The predictive variance is preferred when the model supplies it.
    /// Otherwise the population variance across ensemble members is used.
    pub fn feature_dispersion(&self) -> Result<Vec<R64>> {
        if let Some(variance) = &self.feature_variance {
            return Ok(variance.clone());
        }

        let samples = &self.feature_samples;
        if samples.len() < 2 {
            return Err(Error::MissingPrediction {
                index: self.index,
                reason: "neither predictive variance nor an ensemble of feature vectors",
            }
            .into());
        }
        let dim = samples[0].len();
        if let Some(sample) = samples.iter().find(|sample| sample.len() != dim) {
            return Err(Error::schema(format!(
                "ensemble members of example {} have feature lengths {} and {}",
                self.index,
                dim,
                sample.len()
            )));
        }

        let count = samples.len() as f64;
        let variance = (0..dim)
            .map(|coord| {
                let mean = samples.iter().map(|sample| sample[coord].raw()).sum::<f64>() / count;
                let variance = samples
                    .iter()
                    .map(|sample| (sample[coord].raw() - mean).powi(2))
                    .sum::<f64>()
                    / count;
                r64(variance)
            })
            .collect();
        Ok(variance)
    }
}
