//! Informativeness scoring of unlabeled examples.

mod engine;
mod prediction;
mod strategy;

pub use engine::*;
pub use prediction::*;
pub use strategy::*;
