use super::{Prediction, SelectionStrategy};
use crate::{common::*, dataset::Region, error::Error, utils};

/// A pool index with its informativeness score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScoredIndex {
    pub index: usize,
    pub score: R64,
}

/// Ranks pool examples by the configured strategy.
///
/// The engine holds no state besides its configuration.
#[derive(Debug, Clone)]
pub struct SelectionEngine {
    strategy: SelectionStrategy,
    region: Option<Region>,
}

impl SelectionEngine {
    pub fn new(strategy: SelectionStrategy, region: Option<Region>) -> Self {
        Self { strategy, region }
    }

    pub fn strategy(&self) -> &SelectionStrategy {
        &self.strategy
    }

    /// Score every pool index.
    ///
    /// The output is sorted by descending score, and ties are sorted by
    /// ascending index.
    pub fn score(&self, pool: &[usize], predictions: &[Prediction]) -> Result<Vec<ScoredIndex>> {
        let by_index: HashMap<usize, &Prediction> = predictions
            .iter()
            .map(|prediction| (prediction.index, prediction))
            .collect();

        let mut scored: Vec<ScoredIndex> = pool
            .par_iter()
            .map(|&index| {
                let score = self.score_one(index, by_index.get(&index).copied())?;
                Ok(ScoredIndex {
                    index,
                    score: r64(score),
                })
            })
            .collect::<Result<_>>()?;

        scored.sort_by(|lhs, rhs| {
            rhs.score
                .cmp(&lhs.score)
                .then_with(|| lhs.index.cmp(&rhs.index))
        });
        scored.dedup_by_key(|scored| scored.index);

        trace!("scored {} pool examples", scored.len());
        Ok(scored)
    }

    fn score_one(&self, index: usize, prediction: Option<&Prediction>) -> Result<f64> {
        let missing = |reason| -> AnyError { Error::MissingPrediction { index, reason }.into() };

        let score = match self.strategy {
            SelectionStrategy::Random { seed } => utils::seeded_rng(seed, index as u64).gen(),
            SelectionStrategy::SegmentationUncertainty { measure, reduction } => {
                let prediction = prediction.ok_or_else(|| missing("no prediction"))?;
                let map = prediction
                    .mask_probs
                    .as_ref()
                    .ok_or_else(|| missing("no probability map"))?;
                map.validate()
                    .with_context(|| format!("bad probability map for example {}", index))?;

                let region = self.region;
                let pixels = (0..map.height)
                    .cartesian_product(0..map.width)
                    .filter(|&(y, x)| {
                        region
                            .as_ref()
                            .map_or(true, |region| region.contains_pixel(y, x))
                    })
                    .map(|(y, x)| measure.measure(map.pixel(y, x)));
                reduction.reduce(pixels)
            }
            SelectionStrategy::FeatureUncertainty { reduction } => {
                let prediction = prediction.ok_or_else(|| missing("no prediction"))?;
                let dispersion = prediction.feature_dispersion()?;
                reduction.reduce(dispersion.into_iter().map(|value| value.raw()))
            }
        };

        if !score.is_finite() {
            return Err(Error::schema(format!(
                "non-finite score {} for example {}",
                score, index
            )));
        }
        Ok(score)
    }
}

/// Keep the `k` best entries of a ranked sequence.
///
/// It selects everything if fewer than `k` entries are available.
pub fn select(mut scored: Vec<ScoredIndex>, k: usize) -> Vec<ScoredIndex> {
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{error_kind, ErrorKind},
        selection::{PixelMeasure, ProbabilityMap, Reduction},
    };
    use proptest::prelude::*;

    fn segmentation_engine(region: Option<Region>) -> SelectionEngine {
        SelectionEngine::new(
            SelectionStrategy::SegmentationUncertainty {
                measure: PixelMeasure::Entropy,
                reduction: Reduction::Mean,
            },
            region,
        )
    }

    fn map_prediction(index: usize, probs: [f32; 8]) -> Prediction {
        Prediction {
            mask_probs: Some(ProbabilityMap::new(2, 2, 2, probs.to_vec()).unwrap()),
            ..Prediction::new(index)
        }
    }

    fn variance_prediction(index: usize, variance: f64) -> Prediction {
        Prediction {
            feature_variance: Some(vec![r64(variance)]),
            ..Prediction::new(index)
        }
    }

    #[test]
    fn rank_by_segmentation_entropy() -> Result<()> {
        let certain = [1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        let uncertain = [0.5; 8];
        let predictions = vec![
            map_prediction(1, certain),
            map_prediction(2, uncertain),
            map_prediction(3, uncertain),
        ];

        let scored = segmentation_engine(None).score(&[3, 1, 2], &predictions)?;
        let order: Vec<_> = scored.iter().map(|scored| scored.index).collect();
        assert_eq!(order, vec![2, 3, 1]);
        let indices = |selected: Vec<ScoredIndex>| selected.iter().map(|scored| scored.index).collect_vec();
        assert_eq!(indices(select(scored.clone(), 2)), vec![2, 3]);
        assert_eq!(indices(select(scored, 10)), vec![2, 3, 1]);
        Ok(())
    }

    #[test]
    fn region_restricts_pixels() -> Result<()> {
        // only the top-left pixel is uncertain
        let probs = [0.5, 0.5, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        let predictions = vec![map_prediction(0, probs)];

        let full = segmentation_engine(None).score(&[0], &predictions)?;
        let inside = segmentation_engine(Some(Region::new(0, 0, 1, 1))).score(&[0], &predictions)?;
        let outside = segmentation_engine(Some(Region::new(1, 1, 2, 2))).score(&[0], &predictions)?;

        assert!(inside[0].score > full[0].score);
        assert_eq!(outside[0].score, r64(0.0));
        Ok(())
    }

    #[test]
    fn empty_pool() -> Result<()> {
        let scored = segmentation_engine(None).score(&[], &[])?;
        assert!(scored.is_empty());
        Ok(())
    }

    #[test]
    fn missing_prediction() {
        let engine = segmentation_engine(None);

        let err = engine.score(&[0, 1], &[map_prediction(0, [0.5; 8])]).unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::MissingPrediction);

        let err = engine.score(&[0], &[Prediction::new(0)]).unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::MissingPrediction);

        let engine = SelectionEngine::new(
            SelectionStrategy::FeatureUncertainty {
                reduction: Reduction::Max,
            },
            None,
        );
        let err = engine.score(&[0], &[Prediction::new(0)]).unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::MissingPrediction);
    }

    #[test]
    fn random_strategy_is_seeded() -> Result<()> {
        let pool: Vec<usize> = (0..50).collect();
        let engine = SelectionEngine::new(SelectionStrategy::Random { seed: 3 }, None);

        let lhs = engine.score(&pool, &[])?;
        let rhs = engine.score(&pool, &[])?;
        assert_eq!(lhs, rhs);

        let other = SelectionEngine::new(SelectionStrategy::Random { seed: 4 }, None);
        assert_ne!(lhs, other.score(&pool, &[])?);
        Ok(())
    }

    proptest! {
        #[test]
        fn ordering_is_deterministic(variances in prop::collection::vec(0u8..4, 0..64)) {
            let engine = SelectionEngine::new(
                SelectionStrategy::FeatureUncertainty { reduction: Reduction::Mean },
                None,
            );
            let predictions: Vec<_> = variances
                .iter()
                .enumerate()
                .map(|(index, &variance)| variance_prediction(index, variance as f64))
                .collect();
            let pool: Vec<usize> = (0..variances.len()).rev().collect();

            let scored = engine.score(&pool, &predictions).unwrap();
            prop_assert_eq!(scored.len(), pool.len());

            for (lhs, rhs) in scored.iter().tuple_windows() {
                prop_assert!(lhs.score >= rhs.score);
                if lhs.score == rhs.score {
                    prop_assert!(lhs.index < rhs.index);
                }
            }
        }
    }
}
