//! The active learning query loop.

mod checkpoint;
mod pool;
mod runner;

pub use checkpoint::*;
pub use pool::*;
pub use runner::*;
