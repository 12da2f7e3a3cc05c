mod common;

use anyhow::Result;
use artifice::{
    config::Mode,
    controller::{Checkpoint, ControllerInit, ControllerState, PoolState, RoundLog, RunOutcome},
    dataset::{ImageShape, RecordStore, Split},
    error::{error_kind, ErrorKind},
};
use common::{build_store, run_config, MockTrainer};
use label::LabelSource;
use std::{collections::BTreeSet, path::Path, sync::Arc};

fn active(subset_size: usize, query_size: usize) -> Mode {
    Mode::Active {
        subset_size,
        query_size,
        num_candidates: None,
    }
}

fn active_with_candidates(subset_size: usize, query_size: usize, num_candidates: usize) -> Mode {
    Mode::Active {
        subset_size,
        query_size,
        num_candidates: Some(num_candidates),
    }
}

fn small_store(dir: &Path) -> Result<RecordStore> {
    build_store(dir, 40, ImageShape::new(8, 8, 1)?, 2, Split::new(30, 5, 5))
}

/// The committed selections of every round.
fn selections(run_dir: &Path) -> Result<Vec<Vec<usize>>> {
    let logs = RoundLog::load_all(run_dir)?;
    Ok(logs
        .into_iter()
        .map(|log| log.selected.into_iter().map(|scored| scored.index).collect())
        .collect())
}

#[test]
fn end_to_end_scenario() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = build_store(
        dir.path(),
        100,
        ImageShape::new(64, 64, 1)?,
        2,
        Split::new(80, 0, 20),
    )?;
    let run_dir = dir.path().join("run");
    let config = Arc::new(run_config(&store, &run_dir, active(20, 5)));

    let trainer = MockTrainer::default();
    let mut controller = ControllerInit {
        config,
        store: store.clone(),
        overwrite: false,
    }
    .build(trainer.clone())?;

    let outcome = controller.run(None)?;
    assert_eq!(outcome, RunOutcome::Converged);
    assert_eq!(controller.state(), &ControllerState::Converged);
    assert_eq!(controller.round(), 4);
    assert_eq!(controller.epochs_used(), 4);

    let pool = controller.pool();
    assert_eq!(pool.labeled_set().len(), 20);
    assert!(pool.unlabeled_set().is_empty());
    assert!(pool.labeled_set().iter().all(|&index| index < 80));

    for &index in pool.labeled_set() {
        let label = store.label(index)?.unwrap();
        let example = store.get(index)?;
        assert!(label.same_annotation(&example.ground_truth()));
        assert!(matches!(label.source, LabelSource::Oracle { seed: 13, .. }));
    }
    assert_eq!(store.labeled_indices()?, *pool.labeled_set());

    // one fit per committed round, each on the grown labeled set
    let fits = trainer.fits.lock().unwrap().clone();
    assert_eq!(fits.iter().map(|fit| fit.len()).collect::<Vec<_>>(), vec![5, 10, 15, 20]);

    let checkpoint = Checkpoint::load(&run_dir)?.unwrap();
    assert_eq!(checkpoint.round, 4);
    assert_eq!(&checkpoint.pool, pool);
    Ok(())
}

#[test]
fn resume_is_equivalent_to_uninterrupted_run() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = small_store(dir.path())?;

    let reference_dir = dir.path().join("reference");
    let mut controller = ControllerInit {
        config: Arc::new(run_config(&store, &reference_dir, active(12, 3))),
        store: store.clone(),
        overwrite: false,
    }
    .build(MockTrainer::default())?;
    assert_eq!(controller.run(None)?, RunOutcome::Converged);
    let expected_pool = controller.pool().clone();
    let expected_selections = selections(&reference_dir)?;
    assert_eq!(expected_selections.len(), 4);

    for k in 0..=4 {
        let run_dir = dir.path().join(format!("resumed-{}", k));
        let config = Arc::new(run_config(&store, &run_dir, active(12, 3)));

        let mut first = ControllerInit {
            config: config.clone(),
            store: store.clone(),
            overwrite: false,
        }
        .build(MockTrainer::default())?;
        let outcome = first.run(Some(k))?;
        assert_eq!(first.round(), k);
        if k < 4 {
            assert_eq!(outcome, RunOutcome::Paused);
        }
        drop(first);

        let mut second = ControllerInit {
            config,
            store: store.clone(),
            overwrite: false,
        }
        .build(MockTrainer::default())?;
        assert_eq!(second.run(None)?, RunOutcome::Converged);

        assert_eq!(second.pool(), &expected_pool, "k = {}", k);
        assert_eq!(second.round(), 4);
        assert_eq!(selections(&run_dir)?, expected_selections, "k = {}", k);
    }
    Ok(())
}

#[test]
fn query_size_larger_than_remaining_pool() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = small_store(dir.path())?;
    let run_dir = dir.path().join("run");

    let mut controller = ControllerInit {
        config: Arc::new(run_config(&store, &run_dir, active(7, 5))),
        store,
        overwrite: false,
    }
    .build(MockTrainer::default())?;
    assert_eq!(controller.run(None)?, RunOutcome::Converged);

    let sizes: Vec<_> = selections(&run_dir)?.iter().map(|batch| batch.len()).collect();
    assert_eq!(sizes, vec![5, 2]);
    assert_eq!(controller.pool().labeled_set().len(), 7);
    Ok(())
}

#[test]
fn whole_train_split_converges_in_one_round() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = small_store(dir.path())?;

    for query_size in [5, 30] {
        let run_dir = dir.path().join(format!("run-{}", query_size));
        let trainer = MockTrainer::default();
        let mut controller = ControllerInit {
            config: Arc::new(run_config(&store, &run_dir, active(30, query_size))),
            store: store.clone(),
            overwrite: false,
        }
        .build(trainer.clone())?;
        assert_eq!(controller.run(None)?, RunOutcome::Converged);

        assert_eq!(controller.round(), 1, "query_size = {}", query_size);
        assert_eq!(trainer.num_fits(), 1);
        assert!(controller.pool().is_exhausted());
        assert_eq!(
            *controller.pool().labeled_set(),
            (0..30).collect::<BTreeSet<_>>()
        );
        for index in 0..30 {
            let label = store.label(index)?.unwrap();
            assert!(matches!(label.source, LabelSource::Oracle { .. }));
            assert!(label.same_annotation(&store.get(index)?.ground_truth()));
        }

        // resuming the converged run does nothing
        let mut resumed = ControllerInit {
            config: Arc::new(run_config(&store, &run_dir, active(30, query_size))),
            store: store.clone(),
            overwrite: false,
        }
        .build(MockTrainer::default())?;
        assert_eq!(resumed.run(None)?, RunOutcome::Converged);
        assert_eq!(resumed.round(), 1);
    }
    Ok(())
}

#[test]
fn selection_strategy_decides_labeled_subset() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = small_store(dir.path())?;

    // every train example is a candidate, so the subset depends on the scores
    let run = |name: &str, variance: fn(usize) -> f64| -> Result<(BTreeSet<usize>, PoolState)> {
        let run_dir = dir.path().join(name);
        let mut controller = ControllerInit {
            config: Arc::new(run_config(&store, &run_dir, active_with_candidates(6, 3, 30))),
            store: store.clone(),
            overwrite: false,
        }
        .build(MockTrainer::with_variance(variance))?;
        assert_eq!(controller.run(None)?, RunOutcome::Converged);
        assert_eq!(controller.round(), 2);
        Ok((controller.pool().labeled_set().clone(), controller.pool().clone()))
    };

    let (prefer_high, pool) = run("prefer-high", |index| index as f64)?;
    let (prefer_low, _) = run("prefer-low", |index| 100.0 - index as f64)?;

    assert_eq!(prefer_high, (24..30).collect::<BTreeSet<_>>());
    assert_eq!(prefer_low, (0..6).collect::<BTreeSet<_>>());
    assert_eq!(pool.unlabeled_set().len(), 24);
    assert_eq!(pool.len(), 30);
    Ok(())
}

#[test]
fn resume_with_candidates_beyond_subset_size() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = small_store(dir.path())?;
    let mode = active_with_candidates(9, 3, 20);

    let reference_dir = dir.path().join("reference");
    let mut controller = ControllerInit {
        config: Arc::new(run_config(&store, &reference_dir, mode)),
        store: store.clone(),
        overwrite: false,
    }
    .build(MockTrainer::default())?;
    assert_eq!(controller.run(None)?, RunOutcome::Converged);
    let expected_pool = controller.pool().clone();
    assert_eq!(expected_pool.labeled_set().len(), 9);
    assert_eq!(expected_pool.unlabeled_set().len(), 11);

    for k in 0..=3 {
        let run_dir = dir.path().join(format!("resumed-{}", k));
        let config = Arc::new(run_config(&store, &run_dir, mode));

        let mut first = ControllerInit {
            config: config.clone(),
            store: store.clone(),
            overwrite: false,
        }
        .build(MockTrainer::default())?;
        first.run(Some(k))?;
        drop(first);

        let mut second = ControllerInit {
            config,
            store: store.clone(),
            overwrite: false,
        }
        .build(MockTrainer::default())?;
        assert_eq!(second.run(None)?, RunOutcome::Converged);
        assert_eq!(second.pool(), &expected_pool, "k = {}", k);
        assert_eq!(selections(&run_dir)?, selections(&reference_dir)?, "k = {}", k);
    }
    Ok(())
}

#[test]
fn training_failure_preserves_committed_pool() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = small_store(dir.path())?;
    let run_dir = dir.path().join("run");

    let trainer = MockTrainer::default();
    let mut controller = ControllerInit {
        config: Arc::new(run_config(&store, &run_dir, active(12, 3))),
        store: store.clone(),
        overwrite: false,
    }
    .build(trainer.clone())?;
    assert_eq!(controller.run(Some(2))?, RunOutcome::Paused);
    let committed = Checkpoint::load(&run_dir)?.unwrap();

    // the first attempt and its single retry both fail
    trainer.fail_next_fits(2);
    let err = controller.run(None).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::TrainingUnavailable);
    assert!(format!("{:#}", err).contains("last committed round is 2"));

    let checkpoint = Checkpoint::load(&run_dir)?.unwrap();
    assert_eq!(checkpoint, committed);
    assert_eq!(controller.pool(), &committed.pool);
    assert_eq!(controller.round(), 2);

    // a single failure is absorbed by the retry
    trainer.fail_next_fits(1);
    let mut resumed = ControllerInit {
        config: Arc::new(run_config(&store, &run_dir, active(12, 3))),
        store,
        overwrite: false,
    }
    .build(trainer)?;
    assert_eq!(resumed.run(None)?, RunOutcome::Converged);
    assert_eq!(resumed.pool().labeled_set().len(), 12);
    Ok(())
}

#[test]
fn full_mode_labels_train_split() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = small_store(dir.path())?;
    let run_dir = dir.path().join("run");

    let trainer = MockTrainer::default();
    let mut config = run_config(&store, &run_dir, Mode::Full);
    config.training.epochs_per_round = 10;

    let mut controller = ControllerInit {
        config: Arc::new(config),
        store: store.clone(),
        overwrite: false,
    }
    .build(trainer.clone())?;
    assert_eq!(controller.run(None)?, RunOutcome::Converged);

    assert_eq!(trainer.num_fits(), 1);
    assert_eq!(controller.epochs_used(), 10);
    assert_eq!(controller.pool(), &PoolState::labeled(0..30));
    assert_eq!(store.labeled_indices()?, (0..30).collect::<BTreeSet<_>>());
    assert!(store.label(29)?.unwrap().is_ground_truth());
    assert!(store.label(30)?.is_none());
    Ok(())
}

#[test]
fn stop_at_epoch_budget() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = small_store(dir.path())?;
    let run_dir = dir.path().join("run");

    let mut config = run_config(&store, &run_dir, active(20, 5));
    config.training.epochs_per_round = 2;
    config.training.epoch_budget = Some(5);

    let mut controller = ControllerInit {
        config: Arc::new(config.clone()),
        store: store.clone(),
        overwrite: false,
    }
    .build(MockTrainer::default())?;
    assert_eq!(controller.run(None)?, RunOutcome::BudgetExhausted);
    assert_eq!(controller.round(), 2);
    assert_eq!(controller.epochs_used(), 4);

    // a larger budget continues from the checkpoint
    config.training.epoch_budget = Some(8);
    let mut resumed = ControllerInit {
        config: Arc::new(config),
        store,
        overwrite: false,
    }
    .build(MockTrainer::default())?;
    assert_eq!(resumed.run(None)?, RunOutcome::Converged);
    assert_eq!(resumed.round(), 4);
    assert_eq!(resumed.epochs_used(), 8);
    Ok(())
}

#[test]
fn checkpoint_of_other_configuration_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = small_store(dir.path())?;
    let run_dir = dir.path().join("run");

    let mut controller = ControllerInit {
        config: Arc::new(run_config(&store, &run_dir, active(12, 3))),
        store: store.clone(),
        overwrite: false,
    }
    .build(MockTrainer::default())?;
    controller.run(Some(1))?;

    let mut other = ControllerInit {
        config: Arc::new(run_config(&store, &run_dir, active(9, 3))),
        store: store.clone(),
        overwrite: false,
    }
    .build(MockTrainer::default())?;
    let err = other.run(None).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::InvalidConfiguration);

    // overwrite starts over
    let mut fresh = ControllerInit {
        config: Arc::new(run_config(&store, &run_dir, active(9, 3))),
        store,
        overwrite: true,
    }
    .build(MockTrainer::default())?;
    assert_eq!(fresh.run(None)?, RunOutcome::Converged);
    assert_eq!(fresh.round(), 3);
    assert_eq!(selections(&run_dir)?.len(), 3);
    Ok(())
}

#[test]
fn reject_invalid_run_options() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = small_store(dir.path())?;
    let run_dir = dir.path().join("run");

    for mode in [
        active(31, 5),
        active(10, 0),
        active(0, 5),
        active_with_candidates(10, 5, 31),
        active_with_candidates(10, 5, 9),
    ] {
        let err = ControllerInit {
            config: Arc::new(run_config(&store, &run_dir, mode)),
            store: store.clone(),
            overwrite: false,
        }
        .build(MockTrainer::default())
        .err()
        .unwrap();
        assert_eq!(error_kind(&err), ErrorKind::InvalidConfiguration);
    }

    let mut config = run_config(&store, &run_dir, active(10, 5));
    config.dataset.image_shape = ImageShape::new(8, 8, 3)?;
    let err = ControllerInit {
        config: Arc::new(config),
        store,
        overwrite: false,
    }
    .build(MockTrainer::default())
    .err()
    .unwrap();
    assert_eq!(error_kind(&err), ErrorKind::SchemaMismatch);

    // nothing was written
    assert!(!run_dir.exists());
    Ok(())
}
