use anyhow::{format_err, Context, Result};
use artifice::{
    config::{RunConfig, TrainerConfig},
    controller::{Checkpoint, ControllerInit, RunOutcome},
    dataset::{load_raw_jsonl, FeatureSchema, ImageShape, RecordStoreInit, RecordStore, Region, Split},
    error::{error_kind, Error, ErrorKind},
    evaluation,
    selection::Prediction,
    trainer::CommandTrainer,
    utils::FILE_STRFTIME,
};
use chrono::Local;
use clap::Parser;
use noisy_float::prelude::*;
use prettytable::{cell, row, Table};
use std::{env, fs, path::PathBuf, process, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
/// Active learning toolkit for two-stage image models
enum Opts {
    /// Build a record store from generator output
    Convert {
        /// JSON Lines file of raw examples
        #[clap(long)]
        raw_file: PathBuf,
        /// output store directory
        #[clap(long)]
        output_dir: PathBuf,
        /// image shape as HEIGHT,WIDTH,CHANNELS
        #[clap(long, parse(try_from_str = parse_triple))]
        image_shape: (usize, usize, usize),
        /// number of objects per example
        #[clap(long)]
        num_objects: usize,
        /// number of attributes per object
        #[clap(long, default_value = "0")]
        num_attributes: usize,
        /// split as TRAIN,VALIDATION,TEST
        #[clap(long, parse(try_from_str = parse_triple))]
        split: (usize, usize, usize),
        /// region with valid ground truth as TOP,LEFT,BOTTOM,RIGHT
        #[clap(long, parse(try_from_str = parse_region))]
        region: Option<Region>,
        /// replace an existing store
        #[clap(long)]
        overwrite: bool,
    },
    /// Show record store information
    Info {
        /// store directory
        store_dir: PathBuf,
    },
    /// Run the active learning loop
    Train {
        /// configuration file
        #[clap(long, default_value = "artifice.json5")]
        config_file: PathBuf,
        /// discard the checkpoint and start over
        #[clap(long)]
        overwrite: bool,
        /// pause after this many committed rounds
        #[clap(long)]
        max_rounds: Option<usize>,
    },
    /// Compare predicted objects with the ground truth of a store
    Evaluate {
        /// store directory
        #[clap(long)]
        store_dir: PathBuf,
        /// JSON file of predictions
        #[clap(long)]
        predictions_file: PathBuf,
        /// maximum matching distance in pixels
        #[clap(long, default_value = "5.0")]
        max_distance: f64,
    },
    /// Remove the checkpoint of a run
    Clean {
        /// configuration file
        #[clap(long, default_value = "artifice.json5")]
        config_file: PathBuf,
    },
}

fn main() {
    // setup tracing
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true).compact();
    let filter_layer = {
        let filter = EnvFilter::from_default_env();
        if env::var("RUST_LOG").is_err() {
            filter.add_directive(LevelFilter::INFO.into())
        } else {
            filter
        }
    };
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    if let Err(err) = run(Opts::parse()) {
        error!("{:#}", err);
        process::exit(exit_code(&err));
    }
}

fn run(opts: Opts) -> Result<()> {
    match opts {
        Opts::Convert {
            raw_file,
            output_dir,
            image_shape: (height, width, channels),
            num_objects,
            num_attributes,
            split: (train, validation, test),
            region,
            overwrite,
        } => {
            let store = RecordStoreInit {
                image_shape: ImageShape::new(height, width, channels)?,
                schema: FeatureSchema::new(num_objects, num_attributes)?,
                split: Split::new(train, validation, test),
                region,
                overwrite,
                examples: load_raw_jsonl(&raw_file)?,
            }
            .write(&output_dir)?;
            info!(
                "wrote {} examples to '{}'",
                store.len(),
                store.path().display()
            );
        }
        Opts::Info { store_dir } => {
            print_info(&RecordStore::open(&store_dir)?)?;
        }
        Opts::Train {
            config_file,
            overwrite,
            max_rounds,
        } => {
            train(config_file, overwrite, max_rounds)?;
        }
        Opts::Evaluate {
            store_dir,
            predictions_file,
            max_distance,
        } => {
            let store = RecordStore::open(&store_dir)?;
            let text = fs::read_to_string(&predictions_file).with_context(|| {
                format!("failed to read '{}'", predictions_file.display())
            })?;
            let predictions: Vec<Prediction> = serde_json::from_str(&text)
                .with_context(|| format!("unable to parse '{}'", predictions_file.display()))?;
            let max_distance = R64::try_new(max_distance)
                .ok_or_else(|| Error::InvalidConfiguration("max_distance must be finite".into()))?;

            let report = evaluation::evaluate_store(&store, &predictions, max_distance)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Opts::Clean { config_file } => {
            let config = RunConfig::open(&config_file)?;
            let run_dir = &config.active_learning.run_dir;
            if Checkpoint::remove(run_dir)? {
                info!("removed the checkpoint in '{}'", run_dir.display());
            } else {
                info!("no checkpoint in '{}'", run_dir.display());
            }
        }
    }

    Ok(())
}

fn train(config_file: PathBuf, overwrite: bool, max_rounds: Option<usize>) -> Result<()> {
    let config = Arc::new(
        RunConfig::open(&config_file)
            .with_context(|| format!("failed to load config file '{}'", config_file.display()))?,
    );
    let store = RecordStore::open_expecting(
        &config.dataset.store_dir,
        &config.dataset.image_shape,
        &config.dataset.schema,
    )?;

    let trainer = match &config.training.trainer {
        Some(TrainerConfig::Command { program, args }) => {
            let work_dir = config
                .active_learning
                .run_dir
                .join("trainer")
                .join(Local::now().format(FILE_STRFTIME).to_string());
            CommandTrainer {
                fit_timeout: config.training.fit_timeout(),
                predict_timeout: config.training.predict_timeout(),
                ..CommandTrainer::new(program, args.clone(), work_dir)?
            }
        }
        None => {
            return Err(Error::InvalidConfiguration(
                "training.trainer is not configured".into(),
            )
            .into())
        }
    };

    let mut controller = ControllerInit {
        config,
        store,
        overwrite,
    }
    .build(trainer)?;

    let outcome = controller.run(max_rounds)?;
    let pool = controller.pool();
    let message = match outcome {
        RunOutcome::Converged => "converged",
        RunOutcome::BudgetExhausted => "stopped at the epoch budget",
        RunOutcome::Paused => "paused",
    };
    info!(
        "{} after {} rounds, {} labeled, {} unlabeled, {} epochs used",
        message,
        controller.round(),
        pool.labeled_set().len(),
        pool.unlabeled_set().len(),
        controller.epochs_used()
    );
    Ok(())
}

fn print_info(store: &RecordStore) -> Result<()> {
    let header = store.header();
    let split = header.split;
    let labeled = store.labeled_indices()?;

    let mut table = Table::new();
    table.add_row(row!["path", store.path().display()]);
    table.add_row(row!["format version", header.version]);
    table.add_row(row!["examples", header.num_examples]);
    table.add_row(row!["image shape", header.image_shape]);
    table.add_row(row!["objects", header.schema.num_objects]);
    table.add_row(row!["attributes", header.schema.num_attributes]);
    table.add_row(row![
        "split",
        format!(
            "train {:?}, validation {:?}, test {:?}",
            split.train_range(),
            split.validation_range(),
            split.test_range()
        )
    ]);
    table.add_row(row![
        "region",
        header
            .region
            .map(|region| format!("{:?}", region))
            .unwrap_or_else(|| "none".into())
    ]);
    table.add_row(row!["labeled", labeled.len()]);
    table.printstd();

    Ok(())
}

/// Map an error to the process exit status.
///
/// 1 is a runtime failure, 2 a configuration error and 3 a data or schema
/// error.
fn exit_code(err: &anyhow::Error) -> i32 {
    match error_kind(err) {
        ErrorKind::InvalidConfiguration => 2,
        ErrorKind::SchemaMismatch
        | ErrorKind::NotFound
        | ErrorKind::IndexOutOfRange
        | ErrorKind::MissingPrediction => 3,
        ErrorKind::TrainingUnavailable | ErrorKind::Other => 1,
    }
}

fn parse_numbers<const N: usize>(text: &str) -> Result<[usize; N]> {
    let numbers: Vec<usize> = text
        .split(',')
        .map(|token| token.trim().parse::<usize>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("'{}' is not a list of integers", text))?;
    let numbers: [usize; N] = numbers
        .try_into()
        .map_err(|_| format_err!("expect {} comma-separated integers, but get '{}'", N, text))?;
    Ok(numbers)
}

fn parse_triple(text: &str) -> Result<(usize, usize, usize)> {
    let [a, b, c] = parse_numbers::<3>(text)?;
    Ok((a, b, c))
}

fn parse_region(text: &str) -> Result<Region> {
    let [top, left, bottom, right] = parse_numbers::<4>(text)?;
    Ok(Region::new(top, left, bottom, right))
}
