use super::{Checkpoint, PoolState, RoundLog};
use crate::{
    common::*,
    config::{Mode, RunConfig},
    dataset::{Example, RecordStore},
    error::Error,
    oracle::Oracle,
    selection::{self, ScoredIndex, SelectionEngine},
    trainer::{Trainer, TrainingWorker},
    utils,
};

const LABEL_CHUNK_SIZE: usize = 256;

/// The states of the query loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerState {
    Initializing,
    Querying,
    Labeling { selected: Vec<ScoredIndex> },
    Updating { selected: Vec<ScoredIndex> },
    Converged,
}

/// The reason why [Controller::run] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunOutcome {
    /// The labeled subset reached its target size or no candidate is left.
    Converged,
    /// The next fit would exceed the epoch budget.
    BudgetExhausted,
    /// The requested number of rounds is committed.
    Paused,
}

/// Builds a [Controller].
#[derive(Debug, Clone)]
pub struct ControllerInit {
    pub config: Arc<RunConfig>,
    pub store: RecordStore,
    /// Discard the checkpoint of the run directory instead of resuming.
    pub overwrite: bool,
}

impl ControllerInit {
    pub fn build<T>(self, trainer: T) -> Result<Controller>
    where
        T: Trainer,
    {
        let Self {
            config,
            store,
            overwrite,
        } = self;

        config.validate()?;
        store.check_schema(&config.dataset.image_shape, &config.dataset.schema)?;

        let train_size = store.split().train_range().len();
        match config.active_learning.mode {
            Mode::Full => {
                if train_size == 0 {
                    return Err(Error::config("the train split of the store is empty"));
                }
            }
            mode @ Mode::Active { subset_size, .. } => {
                if subset_size > train_size {
                    return Err(Error::config(format!(
                        "subset_size {} exceeds the train split size {}",
                        subset_size, train_size
                    )));
                }
                let num_candidates = mode.num_candidates(train_size);
                if num_candidates > train_size {
                    return Err(Error::config(format!(
                        "num_candidates {} exceeds the train split size {}",
                        num_candidates, train_size
                    )));
                }
            }
        }

        let region = store.region().copied();
        let oracle = Oracle::new(config.oracle.noise.clone(), region)?;
        let engine = SelectionEngine::new(config.selection.clone(), region);
        let worker = TrainingWorker::spawn(trainer, store.clone())?;

        Ok(Controller {
            config,
            store,
            oracle,
            engine,
            worker,
            overwrite,
            state: ControllerState::Initializing,
            pool: PoolState::unlabeled(iter::empty()),
            round: 0,
            epochs_used: 0,
            rng_stream: 0,
        })
    }
}

/// Drives the query rounds of an active learning run.
///
/// It is the only mutator of the pool state. The pool state is persisted
/// only after a round is fully committed, so an interruption at any other
/// point redoes at most one round on resume.
pub struct Controller {
    config: Arc<RunConfig>,
    store: RecordStore,
    oracle: Oracle,
    engine: SelectionEngine,
    worker: TrainingWorker,
    overwrite: bool,
    state: ControllerState,
    pool: PoolState,
    round: usize,
    epochs_used: usize,
    rng_stream: u64,
}

impl Controller {
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn pool(&self) -> &PoolState {
        &self.pool
    }

    /// The number of committed rounds.
    pub fn round(&self) -> usize {
        self.round
    }

    pub fn epochs_used(&self) -> usize {
        self.epochs_used
    }

    /// Run until convergence, budget exhaustion or until `max_rounds`
    /// rounds in total are committed.
    ///
    /// Errors carry the last committed round.
    pub fn run(&mut self, max_rounds: Option<usize>) -> Result<RunOutcome> {
        let _span = info_span!("active_learning").entered();

        loop {
            let reached = max_rounds.map_or(false, |max| self.round >= max);
            if self.state == ControllerState::Querying && reached && !self.is_finished() {
                info!("pause after round {}", self.round);
                return Ok(RunOutcome::Paused);
            }

            let outcome = self.step().with_context(|| {
                format!(
                    "the active learning run halted, the last committed round is {}",
                    self.round
                )
            })?;
            if let Some(outcome) = outcome {
                return Ok(outcome);
            }
        }
    }

    /// Advance the state machine by one transition.
    ///
    /// It returns an outcome if the run cannot proceed.
    pub fn step(&mut self) -> Result<Option<RunOutcome>> {
        match self.state.clone() {
            ControllerState::Initializing => self.initialize(),
            ControllerState::Querying => self.query(),
            ControllerState::Labeling { selected } => {
                self.label(&selected)?;
                self.state = ControllerState::Updating { selected };
                Ok(None)
            }
            ControllerState::Updating { selected } => {
                self.update(selected)?;
                self.state = ControllerState::Querying;
                Ok(None)
            }
            ControllerState::Converged => Ok(Some(RunOutcome::Converged)),
        }
    }

    fn initialize(&mut self) -> Result<Option<RunOutcome>> {
        let config = self.config.clone();
        let run_dir = &config.active_learning.run_dir;
        fs::create_dir_all(run_dir)
            .with_context(|| format!("failed to create '{}'", run_dir.display()))?;

        if self.overwrite && Checkpoint::remove(run_dir)? {
            info!("discard the checkpoint in '{}'", run_dir.display());
        }

        if let Some(checkpoint) = Checkpoint::load(run_dir)? {
            self.resume(checkpoint)?;
            self.state = ControllerState::Querying;
            return Ok(None);
        }

        let train_range = self.store.split().train_range();

        match config.active_learning.mode {
            Mode::Full => {
                if let Some(outcome) = self.check_budget() {
                    return Ok(Some(outcome));
                }

                for example in self.store.read(train_range.clone())? {
                    let example = example?;
                    self.store
                        .attach_label(example.index, &example.ground_truth())?;
                }

                let labeled: Vec<usize> = train_range.collect();
                let epochs = config.training.epochs_per_round;
                self.fit(&labeled, epochs)?;

                self.pool = PoolState::labeled(labeled);
                self.epochs_used += epochs;
                self.commit_round(vec![])?;
            }
            Mode::Active { subset_size, .. } if subset_size == train_range.len() => {
                // the subset covers the train split, so there is nothing to select
                if let Some(outcome) = self.check_budget() {
                    return Ok(Some(outcome));
                }
                info!(
                    "subset_size {} covers the train split, label every example at once",
                    subset_size
                );

                let labeled: Vec<usize> = train_range.collect();
                for chunk in labeled.chunks(LABEL_CHUNK_SIZE) {
                    let examples: Vec<Example> =
                        self.store.read(chunk.iter().copied())?.try_collect()?;
                    self.attach_oracle_labels(&examples)?;
                }

                let epochs = config.training.epochs_per_round;
                self.fit(&labeled, epochs)?;

                self.pool = PoolState::labeled(labeled);
                self.epochs_used += epochs;
                self.commit_round(vec![])?;
            }
            mode @ Mode::Active { .. } => {
                let train_size = train_range.len();
                let num_candidates = mode.num_candidates(train_size);
                let mut rng = utils::seeded_rng(config.active_learning.seed, self.rng_stream);
                self.rng_stream += 1;
                let candidates = train_range.choose_multiple(&mut rng, num_candidates);
                self.pool = PoolState::unlabeled(candidates);

                info!(
                    "start a new run with {} candidates from the train split of {} examples",
                    num_candidates, train_size
                );
            }
        }

        self.state = ControllerState::Querying;
        Ok(None)
    }

    fn resume(&mut self, checkpoint: Checkpoint) -> Result<()> {
        let config = self.config.clone();
        let run_dir = &config.active_learning.run_dir;

        let Checkpoint {
            mode,
            seed,
            rng_stream,
            round,
            epochs_used,
            pool,
            saved_at,
        } = checkpoint;

        if mode != config.active_learning.mode || seed != config.active_learning.seed {
            return Err(Error::config(format!(
                "the checkpoint in '{}' was written with mode {:?} and seed {}, set overwrite to start over",
                run_dir.display(),
                mode,
                seed
            )));
        }
        let train_range = self.store.split().train_range();
        pool.check(&train_range)?;
        let num_candidates = mode.num_candidates(train_range.len());
        if pool.len() != num_candidates {
            return Err(Error::config(format!(
                "the checkpoint has {} candidates, but {} are configured",
                pool.len(),
                num_candidates
            )));
        }

        info!(
            "resume from round {} saved at {}, {} labeled and {} unlabeled",
            round,
            saved_at,
            pool.labeled_set().len(),
            pool.unlabeled_set().len()
        );

        self.pool = pool;
        self.round = round;
        self.epochs_used = epochs_used;
        self.rng_stream = rng_stream;

        // warm start the model unless no more queries follow
        if !self.is_finished() && !self.pool.labeled_set().is_empty() {
            let labeled = self.pool.labeled_indices();
            self.fit(&labeled, config.training.epochs_per_round)?;
        }
        Ok(())
    }

    /// Whether no more queries follow.
    fn is_finished(&self) -> bool {
        self.pool.is_exhausted() || self.remaining_subset_size() == 0
    }

    /// The number of examples to label before the subset reaches its size.
    fn remaining_subset_size(&self) -> usize {
        match self.config.active_learning.mode {
            Mode::Full => 0,
            Mode::Active { subset_size, .. } => {
                subset_size.saturating_sub(self.pool.labeled_set().len())
            }
        }
    }

    fn query(&mut self) -> Result<Option<RunOutcome>> {
        if self.is_finished() {
            info!(
                "converged after {} rounds with {} labeled examples",
                self.round,
                self.pool.labeled_set().len()
            );
            self.state = ControllerState::Converged;
            return Ok(Some(RunOutcome::Converged));
        }
        if let Some(outcome) = self.check_budget() {
            return Ok(Some(outcome));
        }

        let pool = self.pool.unlabeled_indices();
        let predictions = if self.engine.strategy().requires_predictions() {
            let timeout = self.config.training.predict_timeout();
            self.with_retry("predict", |worker| worker.predict(&pool, timeout))?
        } else {
            vec![]
        };

        let scored = self.engine.score(&pool, &predictions)?;
        let query_size = match self.config.active_learning.mode {
            Mode::Full => pool.len(),
            Mode::Active { query_size, .. } => query_size.min(self.remaining_subset_size()),
        };
        let selected = selection::select(scored, query_size);
        debug!(
            "round {} selects {:?}",
            self.round + 1,
            selected.iter().map(|scored| scored.index).collect_vec()
        );

        self.state = ControllerState::Labeling { selected };
        Ok(None)
    }

    fn label(&mut self, selected: &[ScoredIndex]) -> Result<()> {
        let examples: Vec<Example> = self
            .store
            .read(selected.iter().map(|scored| scored.index))?
            .try_collect()?;
        self.attach_oracle_labels(&examples)
    }

    fn attach_oracle_labels(&self, examples: &[Example]) -> Result<()> {
        let labels = self.oracle.label_batch(examples, self.config.oracle.seed);

        let num_changed = labels
            .iter()
            .map(|(index, label)| self.store.attach_label(*index, label))
            .fold_ok(0, |count, changed| count + changed as usize)?;
        debug!(
            "attach {} labels, {} of them changed",
            labels.len(),
            num_changed
        );
        Ok(())
    }

    fn update(&mut self, selected: Vec<ScoredIndex>) -> Result<()> {
        let indices: Vec<usize> = selected.iter().map(|scored| scored.index).collect();
        let mut pool = self.pool.clone();
        pool.commit(&indices)?;

        let labeled = pool.labeled_indices();
        let epochs = self.config.training.epochs_per_round;
        self.fit(&labeled, epochs)?;

        self.pool = pool;
        self.epochs_used += epochs;
        self.commit_round(selected)
    }

    fn check_budget(&self) -> Option<RunOutcome> {
        let training = &self.config.training;
        let budget = training.epoch_budget?;
        if self.epochs_used + training.epochs_per_round > budget {
            info!(
                "the epoch budget {} is exhausted after {} epochs",
                budget, self.epochs_used
            );
            return Some(RunOutcome::BudgetExhausted);
        }
        None
    }

    fn commit_round(&mut self, selected: Vec<ScoredIndex>) -> Result<()> {
        let run_dir = &self.config.active_learning.run_dir;
        let round = self.round + 1;
        let now = Local::now();

        Checkpoint {
            mode: self.config.active_learning.mode,
            seed: self.config.active_learning.seed,
            rng_stream: self.rng_stream,
            round,
            epochs_used: self.epochs_used,
            pool: self.pool.clone(),
            saved_at: now,
        }
        .save(run_dir)?;
        self.round = round;

        RoundLog {
            round,
            selected,
            num_labeled: self.pool.labeled_set().len(),
            num_unlabeled: self.pool.unlabeled_set().len(),
            epochs_used: self.epochs_used,
            finished_at: now,
        }
        .save(run_dir)?;

        info!(
            "round {} committed, {} labeled, {} unlabeled, {} epochs used",
            round,
            self.pool.labeled_set().len(),
            self.pool.unlabeled_set().len(),
            self.epochs_used
        );
        Ok(())
    }

    fn fit(&mut self, labeled: &[usize], epochs: usize) -> Result<()> {
        let timeout = self.config.training.fit_timeout();
        self.with_retry("fit", |worker| worker.fit(labeled, epochs, timeout))
    }

    fn with_retry<T, F>(&mut self, what: &str, mut f: F) -> Result<T>
    where
        F: FnMut(&mut TrainingWorker) -> Result<T>,
    {
        let training = &self.config.training;
        let attempts = training.max_retries + 1;
        let mut last_error = None;

        for nth in 0..attempts {
            if nth > 0 {
                let backoff = training.retry_backoff(nth - 1);
                debug!("retry {} in {:?}", what, backoff);
                thread::sleep(backoff);
            }

            match f(&mut self.worker) {
                Ok(output) => return Ok(output),
                Err(err) => {
                    warn!("{} attempt {}/{} failed: {:#}", what, nth + 1, attempts, err);
                    last_error = Some(err);
                }
            }
        }

        Err(Error::TrainingUnavailable {
            attempts,
            reason: last_error
                .map(|err| format!("{:#}", err))
                .unwrap_or_default(),
        }
        .into())
    }
}
