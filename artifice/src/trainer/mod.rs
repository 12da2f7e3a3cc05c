//! The handoff to the training collaborator.

mod command;
mod worker;

pub use command::*;
pub use worker::*;

use crate::{common::*, dataset::RecordStore, selection::Prediction};

/// A trainable two-stage model seen through its fit and predict contract.
///
/// Both calls may block for an arbitrarily long time.
pub trait Trainer
where
    Self: Send + 'static,
{
    /// Fit the model on the labeled examples of the store.
    fn fit(&mut self, store: &RecordStore, labeled: &[usize], epochs: usize) -> Result<()>;

    /// Predict on the pool examples of the store.
    fn predict(&mut self, store: &RecordStore, pool: &[usize]) -> Result<Vec<Prediction>>;
}

impl Trainer for Box<dyn Trainer> {
    fn fit(&mut self, store: &RecordStore, labeled: &[usize], epochs: usize) -> Result<()> {
        (**self).fit(store, labeled, epochs)
    }

    fn predict(&mut self, store: &RecordStore, pool: &[usize]) -> Result<Vec<Prediction>> {
        (**self).predict(store, pool)
    }
}
