//! Collaborator seams: the numeric backend that trains one epoch at a time
//! and the renderer that turns engine state into sample artifacts.

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::RunConfig;
use crate::dataset::DatasetManifest;
use crate::error::EngineError;

/// Opaque serialized training state. Only the engine that produced it
/// knows how to read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineState(Vec<u8>);

impl EngineState {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Named scalar metrics for one epoch, e.g. `gen_loss`, `disc_loss`.
pub type EpochMetrics = BTreeMap<String, f64>;

/// Hyperparameters handed to the engine. The orchestrator does not
/// interpret them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineParams {
    pub batch_size: u32,
    pub learning_rate: f64,
    pub lambda_cycle: f64,
    pub lambda_identity: f64,
}

impl From<&RunConfig> for EngineParams {
    fn from(config: &RunConfig) -> Self {
        Self {
            batch_size: config.batch_size(),
            learning_rate: config.learning_rate(),
            lambda_cycle: config.lambda_cycle(),
            lambda_identity: config.lambda_identity(),
        }
    }
}

/// Everything the engine learns about the epoch it is asked to run.
#[derive(Debug, Clone, Copy)]
pub struct EpochContext<'a> {
    /// 0-based epoch index.
    pub epoch: u32,
    pub total_epochs: u32,
    pub params: &'a EngineParams,
    pub manifest: &'a DatasetManifest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpochOutput {
    pub state: EngineState,
    pub metrics: EpochMetrics,
}

pub trait TrainingEngine {
    /// State of a run that starts from scratch.
    fn initial_state(&mut self, params: &EngineParams) -> Result<EngineState, EngineError>;

    /// Accepts state read back from a checkpoint. Engines that can detect an
    /// incompatible blob should reject it here.
    fn restore_state(
        &mut self,
        state: EngineState,
        params: &EngineParams,
    ) -> Result<EngineState, EngineError> {
        let _ = params;
        Ok(state)
    }

    /// Runs exactly one full pass over the dataset.
    fn run_epoch(
        &mut self,
        state: &EngineState,
        ctx: &EpochContext<'_>,
    ) -> Result<EpochOutput, EngineError>;
}

pub trait Sampler {
    /// Renders sample artifacts for `epoch` from a read-only view of the
    /// state into `target`.
    fn render(&mut self, epoch: u32, state: &EngineState, target: &Path) -> Result<(), EngineError>;
}

impl<T: TrainingEngine + ?Sized> TrainingEngine for &mut T {
    fn initial_state(&mut self, params: &EngineParams) -> Result<EngineState, EngineError> {
        (**self).initial_state(params)
    }

    fn restore_state(
        &mut self,
        state: EngineState,
        params: &EngineParams,
    ) -> Result<EngineState, EngineError> {
        (**self).restore_state(state, params)
    }

    fn run_epoch(
        &mut self,
        state: &EngineState,
        ctx: &EpochContext<'_>,
    ) -> Result<EpochOutput, EngineError> {
        (**self).run_epoch(state, ctx)
    }
}

impl<T: Sampler + ?Sized> Sampler for &mut T {
    fn render(
        &mut self,
        epoch: u32,
        state: &EngineState,
        target: &Path,
    ) -> Result<(), EngineError> {
        (**self).render(epoch, state, target)
    }
}
