use super::PoolState;
use crate::{common::*, config::Mode, error::Error, selection::ScoredIndex, utils};

const CHECKPOINT_FILE: &str = "checkpoint.json";
const ROUNDS_DIR: &str = "rounds";

/// The resumable state of a run, saved after every committed round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub mode: Mode,
    pub seed: u64,
    /// The next unused rng stream of the run seed.
    pub rng_stream: u64,
    /// The number of committed rounds.
    pub round: usize,
    pub epochs_used: usize,
    pub pool: PoolState,
    pub saved_at: DateTime<Local>,
}

impl Checkpoint {
    pub fn path(run_dir: &Path) -> PathBuf {
        run_dir.join(CHECKPOINT_FILE)
    }

    /// Load the checkpoint of a run directory if there is one.
    pub fn load(run_dir: &Path) -> Result<Option<Self>> {
        let path = Self::path(run_dir);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read '{}'", path.display()))
            }
        };
        let checkpoint = serde_json::from_str(&text).map_err(|err| {
            Error::schema(format!("unable to parse '{}': {}", path.display(), err))
        })?;
        Ok(Some(checkpoint))
    }

    pub fn save(&self, run_dir: &Path) -> Result<()> {
        let path = Self::path(run_dir);
        utils::atomic_write(&path, &serde_json::to_vec_pretty(self)?)
    }

    /// Delete the checkpoint and round logs of a run directory.
    ///
    /// Returns `false` if there was no checkpoint.
    pub fn remove(run_dir: &Path) -> Result<bool> {
        let rounds_dir = run_dir.join(ROUNDS_DIR);
        if rounds_dir.exists() {
            fs::remove_dir_all(&rounds_dir)
                .with_context(|| format!("failed to remove '{}'", rounds_dir.display()))?;
        }

        let path = Self::path(run_dir);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("failed to remove '{}'", path.display())),
        }
    }
}

/// The record of one committed round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundLog {
    pub round: usize,
    pub selected: Vec<ScoredIndex>,
    pub num_labeled: usize,
    pub num_unlabeled: usize,
    pub epochs_used: usize,
    pub finished_at: DateTime<Local>,
}

impl RoundLog {
    pub fn save(&self, run_dir: &Path) -> Result<()> {
        let dir = run_dir.join(ROUNDS_DIR);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("round-{:05}.json", self.round));
        utils::atomic_write(&path, &serde_json::to_vec_pretty(self)?)
    }

    /// Load every round log of a run directory in round order.
    pub fn load_all(run_dir: &Path) -> Result<Vec<Self>> {
        let dir = run_dir.join(ROUNDS_DIR);
        if !dir.exists() {
            return Ok(vec![]);
        }

        let mut logs: Vec<Self> = fs::read_dir(&dir)?
            .map(|entry| -> Result<_> {
                let path = entry?.path();
                let is_log = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map_or(false, |name| name.starts_with("round-") && name.ends_with(".json"));
                if !is_log {
                    return Ok(None);
                }
                let log = serde_json::from_slice(&fs::read(&path)?)
                    .with_context(|| format!("unable to parse '{}'", path.display()))?;
                Ok(Some(log))
            })
            .filter_map(|result| result.transpose())
            .try_collect()?;
        logs.sort_by_key(|log| log.round);
        Ok(logs)
    }
}
