use super::Trainer;
use crate::{common::*, dataset::RecordStore, selection::Prediction};
use std::panic::{self, AssertUnwindSafe};

enum Job {
    Fit { labeled: Vec<usize>, epochs: usize },
    Predict { pool: Vec<usize> },
}

enum Output {
    Fit(Result<()>),
    Predict(Result<Vec<Prediction>>),
}

struct WorkerJob {
    job_index: usize,
    job: Job,
}

struct WorkerOutput {
    job_index: usize,
    output: Output,
}

/// Runs a [Trainer] on a dedicated thread.
///
/// Callers block until the job completes or the timeout elapses. Outputs of
/// jobs that timed out are discarded when they arrive later.
pub struct TrainingWorker {
    job_tx: flume::Sender<WorkerJob>,
    output_rx: flume::Receiver<WorkerOutput>,
    next_job_index: usize,
}

impl TrainingWorker {
    pub fn spawn<T>(trainer: T, store: RecordStore) -> Result<Self>
    where
        T: Trainer,
    {
        let (job_tx, job_rx) = flume::unbounded::<WorkerJob>();
        let (output_tx, output_rx) = flume::unbounded();

        thread::Builder::new()
            .name("training-worker".into())
            .spawn(move || {
                let mut trainer = trainer;

                for WorkerJob { job_index, job } in job_rx.iter() {
                    let output = match job {
                        Job::Fit { labeled, epochs } => Output::Fit(catch(|| {
                            trainer.fit(&store, &labeled, epochs)
                        })),
                        Job::Predict { pool } => {
                            Output::Predict(catch(|| trainer.predict(&store, &pool)))
                        }
                    };

                    if output_tx.send(WorkerOutput { job_index, output }).is_err() {
                        break;
                    }
                }
                debug!("training worker exits");
            })?;

        Ok(Self {
            job_tx,
            output_rx,
            next_job_index: 0,
        })
    }

    pub fn fit(&mut self, labeled: &[usize], epochs: usize, timeout: Option<Duration>) -> Result<()> {
        let job = Job::Fit {
            labeled: labeled.to_vec(),
            epochs,
        };
        match self.call(job, timeout)? {
            Output::Fit(result) => result,
            Output::Predict(_) => unreachable!(),
        }
    }

    pub fn predict(&mut self, pool: &[usize], timeout: Option<Duration>) -> Result<Vec<Prediction>> {
        let job = Job::Predict {
            pool: pool.to_vec(),
        };
        match self.call(job, timeout)? {
            Output::Predict(result) => result,
            Output::Fit(_) => unreachable!(),
        }
    }

    fn call(&mut self, job: Job, timeout: Option<Duration>) -> Result<Output> {
        let job_index = self.next_job_index;
        self.next_job_index += 1;

        self.job_tx
            .send(WorkerJob { job_index, job })
            .map_err(|_| format_err!("the training worker has terminated"))?;

        let deadline = timeout.map(|timeout| Instant::now() + timeout);

        loop {
            let received = match deadline {
                Some(deadline) => self.output_rx.recv_deadline(deadline),
                None => self
                    .output_rx
                    .recv()
                    .map_err(|_| flume::RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(WorkerOutput {
                    job_index: index,
                    output,
                }) => {
                    if index == job_index {
                        return Ok(output);
                    }
                    debug!("discard the stale output of training job {}", index);
                }
                Err(flume::RecvTimeoutError::Timeout) => {
                    bail!(
                        "training job {} timed out after {:?}",
                        job_index,
                        timeout.unwrap_or_default()
                    );
                }
                Err(flume::RecvTimeoutError::Disconnected) => {
                    bail!("the training worker has terminated");
                }
            }
        }
    }
}

fn catch<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|msg| msg.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".into());
        Err(format_err!("the trainer panicked: {}", msg))
    })
}
