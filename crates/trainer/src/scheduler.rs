//! The epoch control loop.
//!
//! ```text
//! Initializing -> Running -> Completed
//!                         -> Interrupted  (cancel observed between epochs)
//!                         -> Failed       (engine or checkpoint error)
//! ```
//!
//! Each epoch runs to completion, including its checkpoint and sample side
//! effects, before the next one starts. Every checkpoint therefore belongs
//! to a fully completed epoch.

use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::cadence;
use crate::cancel::CancelToken;
use crate::checkpoint::CheckpointStore;
use crate::config::{ResumeFrom, RunConfig};
use crate::dataset::DatasetManifest;
use crate::engine::{EngineParams, EngineState, EpochContext, Sampler, TrainingEngine};
use crate::error::{RunFailure, TrainerError};
use crate::progress::{EpochReport, ProgressSink};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Initializing,
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Initializing => "initializing",
            RunPhase::Running => "running",
            RunPhase::Completed => "completed",
            RunPhase::Interrupted => "interrupted",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Working state of a run. Passed into and returned from every step.
#[derive(Debug, Clone)]
pub struct RunState {
    /// Index of the next epoch to run.
    pub next_epoch: u32,
    pub last_completed: Option<u32>,
    /// Highest checkpoint present in the workspace.
    pub last_checkpoint: Option<u32>,
    pub elapsed: Duration,
    pub engine_state: EngineState,
    pub epochs_run: u32,
    /// Checkpoints written by this run, ascending.
    pub checkpoints: Vec<u32>,
    pub samples: u32,
    pub sample_failures: u32,
}

impl RunState {
    fn starting_at(
        next_epoch: u32,
        last_checkpoint: Option<u32>,
        engine_state: EngineState,
    ) -> Self {
        Self {
            next_epoch,
            last_completed: next_epoch.checked_sub(1),
            last_checkpoint,
            elapsed: Duration::ZERO,
            engine_state,
            epochs_run: 0,
            checkpoints: Vec::new(),
            samples: 0,
            sample_failures: 0,
        }
    }

    fn fail(&self, error: TrainerError) -> RunFailure {
        RunFailure::new(error, self.last_completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub last_completed_epoch: Option<u32>,
    pub epochs_run: u32,
    pub checkpoints: Vec<u32>,
    pub samples: u32,
    pub sample_failures: u32,
    pub elapsed: Duration,
}

impl RunSummary {
    fn new(outcome: RunOutcome, state: RunState) -> Self {
        Self {
            outcome,
            last_completed_epoch: state.last_completed,
            epochs_run: state.epochs_run,
            checkpoints: state.checkpoints,
            samples: state.samples,
            sample_failures: state.sample_failures,
            elapsed: state.elapsed,
        }
    }
}

pub struct Scheduler<'a, E, S> {
    config: &'a RunConfig,
    manifest: &'a DatasetManifest,
    workspace: &'a Workspace,
    store: CheckpointStore,
    engine: E,
    sampler: S,
    cancel: CancelToken,
    params: EngineParams,
    phase: RunPhase,
}

impl<'a, E: TrainingEngine, S: Sampler> Scheduler<'a, E, S> {
    pub fn new(
        config: &'a RunConfig,
        manifest: &'a DatasetManifest,
        workspace: &'a Workspace,
        store: CheckpointStore,
        engine: E,
        sampler: S,
        cancel: CancelToken,
    ) -> Self {
        Self {
            config,
            manifest,
            workspace,
            store,
            engine,
            sampler,
            cancel,
            params: EngineParams::from(config),
            phase: RunPhase::Initializing,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Drives the run to a terminal phase.
    pub fn run(&mut self, progress: &mut dyn ProgressSink) -> Result<RunSummary, RunFailure> {
        let state = self.start()?;
        self.drive(state, progress)
    }

    /// Resolves where the run starts without running any epoch. Workspace
    /// and resume problems surface here.
    pub fn start(&mut self) -> Result<RunState, RunFailure> {
        self.enter(RunPhase::Initializing);
        match self.initialize() {
            Ok(state) => Ok(state),
            Err(err) => {
                self.enter(RunPhase::Failed);
                error!("Could not start run: {}", err);
                Err(RunFailure::before_start(err))
            }
        }
    }

    /// Runs the remaining epochs from a state returned by [`Scheduler::start`].
    pub fn drive(
        &mut self,
        mut state: RunState,
        progress: &mut dyn ProgressSink,
    ) -> Result<RunSummary, RunFailure> {
        let total = self.config.epochs();
        if state.next_epoch >= total {
            info!(
                "Run already reached epoch {} of {}; nothing to do",
                state.next_epoch,
                total
            );
            return self.complete(state);
        }

        self.enter(RunPhase::Running);
        while state.next_epoch < total {
            if self.cancel.is_cancelled() {
                return Ok(self.interrupt(state));
            }
            state = match self.step(state, progress) {
                Ok(state) => state,
                Err(failure) => {
                    self.enter(RunPhase::Failed);
                    error!("{}", failure);
                    return Err(failure);
                }
            };
        }
        self.complete(state)
    }

    /// Resolves the starting epoch and engine state.
    fn initialize(&mut self) -> Result<RunState, TrainerError> {
        let on_disk = self.store.latest_epoch();

        let Some(resume) = self.config.resume() else {
            if let Some(latest) = on_disk {
                return Err(TrainerError::StaleCheckpoints {
                    dir: self.store.dir().to_path_buf(),
                    latest,
                });
            }
            let engine_state = self
                .engine
                .initial_state(&self.params)
                .map_err(|source| TrainerError::EngineFailure { epoch: 0, source })?;
            info!("Starting a fresh run of {} epochs", self.config.epochs());
            return Ok(RunState::starting_at(0, None, engine_state));
        };

        let checkpoint = match resume {
            ResumeFrom::Latest => self.store.load_latest(),
            ResumeFrom::Path(path) => CheckpointStore::load_from(path),
        }
        .map_err(TrainerError::resume)?;
        let next_epoch = checkpoint.epoch.checked_add(1).ok_or_else(|| {
            let path = match resume {
                ResumeFrom::Latest => self.store.path_for(checkpoint.epoch),
                ResumeFrom::Path(path) => path.clone(),
            };
            TrainerError::resume(TrainerError::CheckpointCorrupt {
                path,
                reason: format!("epoch index {} leaves no epoch to run", checkpoint.epoch),
            })
        })?;

        if let Some(latest) = on_disk {
            if latest > checkpoint.epoch {
                return Err(TrainerError::resume(TrainerError::CheckpointOutOfOrder {
                    epoch: checkpoint.epoch,
                    latest,
                }));
            }
        }

        let engine_state = self
            .engine
            .restore_state(checkpoint.state, &self.params)
            .map_err(|source| {
                TrainerError::resume(TrainerError::EngineFailure {
                    epoch: checkpoint.epoch,
                    source,
                })
            })?;
        info!(
            "Resuming after epoch {} (checkpoint from {})",
            next_epoch,
            checkpoint.saved_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        Ok(RunState::starting_at(next_epoch, on_disk, engine_state))
    }

    /// Runs the epoch at `state.next_epoch` and its cadence side effects.
    fn step(
        &mut self,
        mut state: RunState,
        progress: &mut dyn ProgressSink,
    ) -> Result<RunState, RunFailure> {
        let epoch = state.next_epoch;
        let ctx = EpochContext {
            epoch,
            total_epochs: self.config.epochs(),
            params: &self.params,
            manifest: self.manifest,
        };

        let started = Instant::now();
        let output = self
            .engine
            .run_epoch(&state.engine_state, &ctx)
            .map_err(|source| state.fail(TrainerError::EngineFailure { epoch, source }))?;
        let elapsed = started.elapsed();

        state.engine_state = output.state;
        state.last_completed = Some(epoch);
        state.next_epoch = epoch + 1;
        state.elapsed += elapsed;
        state.epochs_run += 1;

        if cadence::is_due(epoch, self.config.save_freq()) {
            self.save_checkpoint(&mut state, epoch)
                .map_err(|err| state.fail(err))?;
        }
        if cadence::is_due(epoch, self.config.sample_freq()) {
            self.render_sample(&mut state, epoch);
        }

        let report = EpochReport {
            epoch,
            total_epochs: self.config.epochs(),
            elapsed,
            metrics: output.metrics,
        };
        if let Err(err) = progress.report(&report) {
            warn!("Could not record progress for epoch {}: {}", epoch + 1, err);
        }
        Ok(state)
    }

    fn complete(&mut self, mut state: RunState) -> Result<RunSummary, RunFailure> {
        if let Some(last) = state.last_completed {
            if state.last_checkpoint != Some(last) {
                self.save_checkpoint(&mut state, last).map_err(|err| {
                    self.phase = RunPhase::Failed;
                    state.fail(err)
                })?;
            }
        }
        self.enter(RunPhase::Completed);
        info!(
            "Training completed: {} epochs run in {:.1}s",
            state.epochs_run,
            state.elapsed.as_secs_f64()
        );
        Ok(RunSummary::new(RunOutcome::Completed, state))
    }

    fn interrupt(&mut self, mut state: RunState) -> RunSummary {
        self.enter(RunPhase::Interrupted);
        match state.last_completed {
            Some(last) if state.last_checkpoint != Some(last) => {
                if let Err(err) = self.save_checkpoint(&mut state, last) {
                    warn!("Final checkpoint for epoch {} not saved: {}", last + 1, err);
                }
            }
            _ => {}
        }
        match state.last_completed {
            Some(last) => info!("Stopped after epoch {}", last + 1),
            None => info!("Stopped before the first epoch"),
        }
        RunSummary::new(RunOutcome::Interrupted, state)
    }

    fn save_checkpoint(&mut self, state: &mut RunState, epoch: u32) -> Result<(), TrainerError> {
        self.store.save(epoch, &state.engine_state)?;
        state.last_checkpoint = Some(epoch);
        state.checkpoints.push(epoch);
        Ok(())
    }

    fn render_sample(&mut self, state: &mut RunState, epoch: u32) {
        let target = self.workspace.sample_path(epoch);
        match self.sampler.render(epoch, &state.engine_state, &target) {
            Ok(()) => {
                debug!("Rendered samples for epoch {} to {:?}", epoch + 1, target);
                state.samples += 1;
            }
            Err(err) => {
                warn!("Sample generation failed for epoch {}: {}", epoch + 1, err);
                state.sample_failures += 1;
            }
        }
    }

    fn enter(&mut self, phase: RunPhase) {
        debug!("Run phase: {} -> {}", self.phase, phase);
        self.phase = phase;
    }
}
