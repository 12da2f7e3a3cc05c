use super::Trainer;
use crate::{common::*, dataset::RecordStore, selection::Prediction, utils};
use std::process::Stdio;
use tokio::process::Command;

/// A [Trainer] backed by an external program.
///
/// The program is invoked as `<program> <args..> fit <request>` and
/// `<program> <args..> predict <request> --output <file>`. Requests are JSON
/// files naming the store and the indices. The predict command writes a JSON
/// array of predictions to the output file.
///
/// A program that outlives its timeout is killed.
#[derive(Debug, Clone)]
pub struct CommandTrainer {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
    pub fit_timeout: Option<Duration>,
    pub predict_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitRequest {
    pub store_dir: PathBuf,
    pub labeled: Vec<usize>,
    pub epochs: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub store_dir: PathBuf,
    pub pool: Vec<usize>,
}

impl CommandTrainer {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, work_dir: impl Into<PathBuf>) -> Result<Self> {
        let work_dir = work_dir.into();
        fs::create_dir_all(&work_dir)
            .with_context(|| format!("failed to create '{}'", work_dir.display()))?;
        Ok(Self {
            program: program.into(),
            args,
            work_dir,
            fit_timeout: None,
            predict_timeout: None,
        })
    }

    fn run(
        &self,
        subcommand: &str,
        extra_args: &[&Path],
        timeout: Option<Duration>,
    ) -> Result<()> {
        let since = Instant::now();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let output = runtime.block_on(async {
            let child = Command::new(&self.program)
                .args(&self.args)
                .arg(subcommand)
                .args(extra_args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .with_context(|| format!("failed to run '{}'", self.program.display()))?;

            // the child is dropped and killed on timeout
            let output = match timeout {
                Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
                    .await
                    .map_err(|_| {
                        format_err!(
                            "'{} {}' timed out after {:?}",
                            self.program.display(),
                            subcommand,
                            timeout
                        )
                    })??,
                None => child.wait_with_output().await?,
            };
            Ok::<_, AnyError>(output)
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            debug!("{}: {}", subcommand, line);
        }

        ensure!(
            output.status.success(),
            "'{} {}' exited with {}: {}",
            self.program.display(),
            subcommand,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        debug!("'{}' finished in {:?}", subcommand, since.elapsed());
        Ok(())
    }
}

impl Trainer for CommandTrainer {
    fn fit(&mut self, store: &RecordStore, labeled: &[usize], epochs: usize) -> Result<()> {
        let request = FitRequest {
            store_dir: store.path().to_owned(),
            labeled: labeled.to_vec(),
            epochs,
        };
        let request_path = self.work_dir.join("fit-request.json");
        utils::atomic_write(&request_path, &serde_json::to_vec_pretty(&request)?)?;

        self.run("fit", &[request_path.as_path()], self.fit_timeout)
    }

    fn predict(&mut self, store: &RecordStore, pool: &[usize]) -> Result<Vec<Prediction>> {
        let request = PredictRequest {
            store_dir: store.path().to_owned(),
            pool: pool.to_vec(),
        };
        let request_path = self.work_dir.join("predict-request.json");
        let output_path = self.work_dir.join("predictions.json");
        utils::atomic_write(&request_path, &serde_json::to_vec_pretty(&request)?)?;
        if output_path.exists() {
            fs::remove_file(&output_path)?;
        }

        self.run(
            "predict",
            &[
                request_path.as_path(),
                Path::new("--output"),
                output_path.as_path(),
            ],
            self.predict_timeout,
        )?;

        let reader = BufReader::new(
            fs::File::open(&output_path)
                .with_context(|| format!("the trainer did not write '{}'", output_path.display()))?,
        );
        let predictions: Vec<Prediction> = serde_json::from_reader(reader)
            .with_context(|| format!("unable to parse '{}'", output_path.display()))?;
        Ok(predictions)
    }
}
