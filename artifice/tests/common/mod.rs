#![allow(dead_code)]

use anyhow::{bail, Result};
use artifice::{
    config::{
        ActiveLearningConfig, DatasetConfig, Mode, OracleConfig, RunConfig, TrainingConfig,
    },
    dataset::{FeatureSchema, Image, ImageShape, RawExample, RecordStore, Split},
    selection::{Prediction, Reduction, SelectionStrategy},
    trainer::Trainer,
};
use label::{Mask, NoiseProfile, ObjectFeatures};
use noisy_float::prelude::*;
use std::{
    f64::consts::PI,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

/// Generate raw examples the way the scene generator would.
pub fn raw_examples(count: usize, shape: ImageShape, num_objects: usize) -> Vec<RawExample> {
    (0..count)
        .map(|nth| {
            let objects: Vec<_> = (0..num_objects)
                .map(|obj| {
                    let y = ((nth * 7 + obj * 13) % shape.height) as f64 + 0.5;
                    let x = ((nth * 11 + obj * 5) % shape.width) as f64 + 0.25;
                    let orientation = ((nth + obj) as f64 * 0.7) % (2.0 * PI) - PI;
                    ObjectFeatures::new(r64(y), r64(x), r64(orientation), vec![])
                })
                .collect();

            let mut image = Image::zeros(shape);
            image
                .pixels
                .iter_mut()
                .enumerate()
                .for_each(|(offset, value)| *value = ((offset + nth) % 17) as f32 / 16.0);

            let classes = (0..shape.num_pixels())
                .map(|offset| ((offset / shape.width + nth) % 3) as u8)
                .collect();
            let mask = Mask::new(shape.height, shape.width, classes).unwrap();

            RawExample {
                image,
                mask: Some(mask),
                objects,
            }
        })
        .collect()
}

pub fn build_store(
    dir: &Path,
    count: usize,
    shape: ImageShape,
    num_objects: usize,
    split: Split,
) -> Result<RecordStore> {
    let schema = FeatureSchema::new(num_objects, 0)?;
    let examples = raw_examples(count, shape, num_objects).into_iter().map(Ok);
    RecordStore::convert(dir.join("store"), examples, shape, schema, split, None)
}

pub fn run_config(store: &RecordStore, run_dir: &Path, mode: Mode) -> RunConfig {
    let header = store.header();
    RunConfig {
        dataset: DatasetConfig {
            store_dir: store.path().to_owned(),
            image_shape: header.image_shape,
            schema: header.schema,
        },
        oracle: OracleConfig {
            noise: NoiseProfile::noiseless(),
            seed: 13,
        },
        selection: SelectionStrategy::FeatureUncertainty {
            reduction: Reduction::Mean,
        },
        active_learning: ActiveLearningConfig {
            mode,
            seed: 5,
            run_dir: run_dir.to_owned(),
        },
        training: TrainingConfig {
            epochs_per_round: 1,
            epoch_budget: None,
            fit_timeout_secs: None,
            predict_timeout_secs: None,
            max_retries: 1,
            retry_backoff_secs: r64(0.0),
            trainer: None,
        },
    }
}

/// A deterministic stand-in for the trainable model.
///
/// Its predictive variance depends on the example index and the size of the
/// last fitted labeled set, unless a fixed variance per index is given.
#[derive(Debug, Clone, Default)]
pub struct MockTrainer {
    pub fits: Arc<Mutex<Vec<Vec<usize>>>>,
    pub failing_fits: Arc<AtomicUsize>,
    pub variance: Option<fn(usize) -> f64>,
    last_fit_size: usize,
}

impl MockTrainer {
    pub fn with_variance(variance: fn(usize) -> f64) -> Self {
        Self {
            variance: Some(variance),
            ..Default::default()
        }
    }

    pub fn num_fits(&self) -> usize {
        self.fits.lock().unwrap().len()
    }

    pub fn fail_next_fits(&self, count: usize) {
        self.failing_fits.store(count, Ordering::SeqCst);
    }
}

impl Trainer for MockTrainer {
    fn fit(&mut self, _store: &RecordStore, labeled: &[usize], _epochs: usize) -> Result<()> {
        let failing = self.failing_fits.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_fits.store(failing - 1, Ordering::SeqCst);
            bail!("the device is busy");
        }
        self.fits.lock().unwrap().push(labeled.to_vec());
        self.last_fit_size = labeled.len();
        Ok(())
    }

    fn predict(&mut self, _store: &RecordStore, pool: &[usize]) -> Result<Vec<Prediction>> {
        let predictions = pool
            .iter()
            .map(|&index| {
                let variance = match self.variance {
                    Some(variance) => variance(index),
                    None => ((index * 7919 + self.last_fit_size * 31) % 23) as f64,
                };
                Prediction {
                    feature_variance: Some(vec![r64(variance), r64(1.0)]),
                    ..Prediction::new(index)
                }
            })
            .collect();
        Ok(predictions)
    }
}
