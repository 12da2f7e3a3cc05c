pub use anyhow::{ensure, Result};
pub use noisy_float::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::{f64::consts::PI, ops::Range};
