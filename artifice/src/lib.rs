//! Active learning for two-stage image models.
//!
//! The crate converts generated examples into a [dataset::RecordStore],
//! simulates a noisy annotator with [oracle::Oracle], ranks unlabeled
//! examples with [selection::SelectionEngine] and drives the query rounds
//! with a resumable [controller::Controller].

mod common;

pub mod config;
pub mod controller;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod oracle;
pub mod selection;
pub mod trainer;
pub mod utils;

pub use error::{error_kind, Error, ErrorKind};
