//! Active learning run configuration format.

use crate::{
    common::*,
    dataset::{FeatureSchema, ImageShape},
    error::Error,
    selection::SelectionStrategy,
};

pub use active_learning::*;
pub use training::*;

/// The largest accepted initial retry backoff.
pub const MAX_RETRY_BACKOFF_SECS: f64 = 3600.0;

/// The immutable configuration of an active learning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    pub selection: SelectionStrategy,
    pub active_learning: ActiveLearningConfig,
    pub training: TrainingConfig,
}

impl RunConfig {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        let config: Self = json5::from_str(&text).map_err(|err| {
            Error::config(format!("unable to parse '{}': {}", path.display(), err))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject invalid values before any IO happens.
    pub fn validate(&self) -> Result<()> {
        let Self {
            dataset,
            oracle,
            active_learning,
            training,
            ..
        } = self;

        dataset.image_shape.validate()?;
        dataset.schema.validate()?;
        oracle
            .noise
            .validate()
            .map_err(|err| Error::config(format!("bad noise profile: {}", err)))?;

        if let Mode::Active {
            subset_size,
            query_size,
            num_candidates,
        } = active_learning.mode
        {
            if subset_size == 0 {
                return Err(Error::config("subset_size must be positive, but get 0"));
            }
            if query_size == 0 {
                return Err(Error::config("query_size must be positive, but get 0"));
            }
            if let Some(num_candidates) = num_candidates {
                if num_candidates < subset_size {
                    return Err(Error::config(format!(
                        "num_candidates must be at least subset_size {}, but get {}",
                        subset_size, num_candidates
                    )));
                }
            }
        }

        if training.epochs_per_round == 0 {
            return Err(Error::config("epochs_per_round must be positive, but get 0"));
        }
        if !(0.0..=MAX_RETRY_BACKOFF_SECS).contains(&training.retry_backoff_secs.raw()) {
            return Err(Error::config(format!(
                "retry_backoff_secs must be within [0, {}], but get {}",
                MAX_RETRY_BACKOFF_SECS, training.retry_backoff_secs
            )));
        }
        Ok(())
    }
}

/// The record store used by a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub store_dir: PathBuf,
    pub image_shape: ImageShape,
    pub schema: FeatureSchema,
}

/// Simulated annotator options.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub noise: NoiseProfile,
    #[serde(default)]
    pub seed: u64,
}

mod active_learning {
    use super::*;

    /// Query loop options.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ActiveLearningConfig {
        pub mode: Mode,
        /// The seed of the initial candidate pool.
        #[serde(default)]
        pub seed: u64,
        /// The directory keeping the checkpoint and round logs.
        pub run_dir: PathBuf,
    }

    /// The labeling mode of a run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum Mode {
        /// Label the whole train split with ground truth and fit once.
        Full,
        /// Grow a labeled subset by querying the oracle.
        Active {
            /// The number of labeled examples at which the run stops.
            subset_size: usize,
            query_size: usize,
            /// The number of unlabeled train examples considered for
            /// queries. Defaults to `subset_size`.
            #[serde(default)]
            num_candidates: Option<usize>,
        },
    }

    impl Mode {
        /// The size of the candidate pool drawn from a train split of
        /// `train_size` examples.
        pub fn num_candidates(&self, train_size: usize) -> usize {
            match *self {
                Self::Full => train_size,
                Self::Active {
                    subset_size,
                    num_candidates,
                    ..
                } => num_candidates.unwrap_or(subset_size),
            }
        }
    }
}

mod training {
    use super::*;

    /// Training collaborator options.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct TrainingConfig {
        /// The number of epochs charged per fit.
        #[serde(default = "default_epochs_per_round")]
        pub epochs_per_round: usize,
        /// If set, the run stops before a fit that would exceed it.
        pub epoch_budget: Option<usize>,
        /// The timeout of a fit call. It blocks indefinitely if unset.
        #[serde(default)]
        pub fit_timeout_secs: Option<u64>,
        /// The timeout of a predict call. It blocks indefinitely if unset.
        #[serde(default)]
        pub predict_timeout_secs: Option<u64>,
        /// The number of retries after the first failed attempt.
        #[serde(default = "default_max_retries")]
        pub max_retries: usize,
        /// The backoff before the first retry. It doubles per retry.
        #[serde(default = "default_retry_backoff_secs")]
        pub retry_backoff_secs: R64,
        /// The external trainer program.
        pub trainer: Option<TrainerConfig>,
    }

    impl TrainingConfig {
        pub fn fit_timeout(&self) -> Option<Duration> {
            self.fit_timeout_secs.map(Duration::from_secs)
        }

        pub fn predict_timeout(&self) -> Option<Duration> {
            self.predict_timeout_secs.map(Duration::from_secs)
        }

        /// The backoff before the `nth` retry, counting from zero.
        pub fn retry_backoff(&self, nth: usize) -> Duration {
            let secs = self.retry_backoff_secs.raw() * 2f64.powi(nth.min(16) as i32);
            Duration::from_secs_f64(secs)
        }
    }

    /// Variants of training collaborators.
    #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum TrainerConfig {
        /// Run an external program per fit and predict call.
        Command {
            program: PathBuf,
            #[serde(default)]
            args: Vec<String>,
        },
    }

    fn default_epochs_per_round() -> usize {
        1
    }

    fn default_max_retries() -> usize {
        2
    }

    fn default_retry_backoff_secs() -> R64 {
        r64(1.0)
    }
}
