//! The record store and its data model.

mod example;
mod header;
mod raw;
mod region;
mod split;
mod store;

pub use example::*;
pub use header::*;
pub use raw::*;
pub use region::*;
pub use split::*;
pub use store::*;
