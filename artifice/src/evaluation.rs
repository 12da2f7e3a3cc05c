//! Object-level comparison of predictions against ground truth.

use crate::{common::*, dataset::RecordStore, selection::Prediction};

/// A ground-truth object matched to a predicted object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchedPair {
    pub truth: usize,
    pub predicted: usize,
    pub distance: R64,
}

/// Greedily match predicted objects to ground-truth objects.
///
/// Closest pairs are matched first and each object is used at most once.
/// Pairs farther than `max_distance` are never matched.
pub fn match_objects(
    truth: &[ObjectFeatures],
    predicted: &[ObjectFeatures],
    max_distance: R64,
) -> Vec<MatchedPair> {
    let mut candidates: Vec<MatchedPair> = truth
        .iter()
        .enumerate()
        .cartesian_product(predicted.iter().enumerate())
        .map(|((ti, lhs), (pi, rhs))| MatchedPair {
            truth: ti,
            predicted: pi,
            distance: lhs.distance(rhs),
        })
        .filter(|pair| pair.distance <= max_distance)
        .collect();
    candidates.sort_by_key(|pair| (pair.distance, pair.truth, pair.predicted));

    let mut truth_used = vec![false; truth.len()];
    let mut predicted_used = vec![false; predicted.len()];

    candidates
        .into_iter()
        .filter(|pair| {
            if truth_used[pair.truth] || predicted_used[pair.predicted] {
                return false;
            }
            truth_used[pair.truth] = true;
            predicted_used[pair.predicted] = true;
            true
        })
        .collect()
}

/// Summary statistics of a set of errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorStats {
    pub mean: R64,
    pub std: R64,
    pub min: R64,
    pub max: R64,
}

impl ErrorStats {
    pub fn from_errors(errors: &[R64]) -> Option<Self> {
        let min = errors.iter().copied().min()?;
        let max = errors.iter().copied().max()?;
        let count = errors.len() as f64;
        let mean = errors.iter().map(|err| err.raw()).sum::<f64>() / count;
        let var = errors
            .iter()
            .map(|err| (err.raw() - mean).powi(2))
            .sum::<f64>()
            / count;

        Some(Self {
            mean: r64(mean),
            std: r64(var.sqrt()),
            min,
            max,
        })
    }
}

/// The evaluation summary over a set of examples.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub num_examples: usize,
    pub num_objects: usize,
    pub num_detected: usize,
    pub num_failed: usize,
    /// Predicted objects without a ground-truth counterpart.
    pub num_spurious: usize,
    pub position_error: Option<ErrorStats>,
    pub mean_orientation_error: Option<R64>,
}

/// Evaluate `(ground truth, prediction)` object lists of examples.
pub fn evaluate<'a, I>(examples: I, max_distance: R64) -> EvaluationReport
where
    I: IntoIterator<Item = (&'a [ObjectFeatures], &'a [ObjectFeatures])>,
{
    let mut num_examples = 0;
    let mut num_objects = 0;
    let mut num_predicted = 0;
    let mut position_errors = vec![];
    let mut orientation_errors = vec![];

    for (truth, predicted) in examples {
        num_examples += 1;
        num_objects += truth.len();
        num_predicted += predicted.len();

        for pair in match_objects(truth, predicted, max_distance) {
            position_errors.push(pair.distance);
            orientation_errors
                .push(truth[pair.truth].orientation_error(&predicted[pair.predicted]));
        }
    }

    let num_detected = position_errors.len();
    let mean_orientation_error = (!orientation_errors.is_empty()).then(|| {
        r64(orientation_errors.iter().map(|err| err.raw()).sum::<f64>()
            / orientation_errors.len() as f64)
    });

    EvaluationReport {
        num_examples,
        num_objects,
        num_detected,
        num_failed: num_objects - num_detected,
        num_spurious: num_predicted - num_detected,
        position_error: ErrorStats::from_errors(&position_errors),
        mean_orientation_error,
    }
}

/// Evaluate predictions against the ground truth kept in a store.
pub fn evaluate_store(
    store: &RecordStore,
    predictions: &[Prediction],
    max_distance: R64,
) -> Result<EvaluationReport> {
    let truths: Vec<Vec<ObjectFeatures>> = predictions
        .par_iter()
        .map(|prediction| -> Result<_> { Ok(store.get(prediction.index)?.objects) })
        .collect::<Result<_>>()?;

    let report = evaluate(
        truths
            .iter()
            .zip(predictions)
            .map(|(truth, prediction)| (truth.as_slice(), prediction.objects.as_slice())),
        max_distance,
    );
    info!(
        "evaluated {} examples, {}/{} objects detected",
        report.num_examples, report.num_detected, report.num_objects
    );
    Ok(report)
}
