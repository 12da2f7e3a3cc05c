//! Per-object features, segmentation masks and the labels attached to examples.

mod common;

pub mod label;
pub use label::*;

pub mod mask;
pub use mask::*;

pub mod noise;
pub use noise::*;

pub mod object;
pub use object::*;
