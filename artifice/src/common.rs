//! Common imports from external crates.

pub use anyhow::{bail, ensure, format_err, Context as _, Error as AnyError, Result};
pub use chrono::{DateTime, Local};
pub use itertools::Itertools as _;
pub use label::{Label, LabelSource, Mask, NoiseProfile, ObjectFeatures};
pub use noisy_float::prelude::*;
pub use rand::{prelude::*, rngs::StdRng};
pub use rayon::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::{
    collections::{BTreeSet, HashMap},
    f64::consts::PI,
    fmt::Debug,
    fs,
    io::{BufRead, BufReader, Write as _},
    iter,
    num::NonZeroUsize,
    ops::Range,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};
pub use tracing::{debug, info, info_span, trace, warn};
