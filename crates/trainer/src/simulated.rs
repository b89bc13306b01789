//! Stand-in training backend for running the orchestrator without a model.
//!
//! Loss curves are closed-form exponential decays with seeded jitter. No
//! numeric training happens here; a real backend implements
//! [`TrainingEngine`] the same way.

use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::engine::{
    EngineParams, EngineState, EpochContext, EpochMetrics, EpochOutput, TrainingEngine,
};
use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SimulatedState {
    epochs_trained: u32,
    seed: u64,
    last_gen_loss: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SimulatedEngine {
    seed: u64,
    epoch_delay: Duration,
}

impl SimulatedEngine {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            epoch_delay: Duration::ZERO,
        }
    }

    /// Sleeps this long per epoch so a run has observable duration.
    pub fn with_epoch_delay(mut self, delay: Duration) -> Self {
        self.epoch_delay = delay;
        self
    }
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new(42)
    }
}

fn decode(state: &EngineState) -> Result<SimulatedState, EngineError> {
    Ok(serde_json::from_slice(state.as_bytes())?)
}

fn encode(state: &SimulatedState) -> Result<EngineState, EngineError> {
    Ok(EngineState::new(serde_json::to_vec(state)?))
}

fn decay(start: f64, floor: f64, rate: f64, epoch: f64) -> f64 {
    floor + (start - floor) * (-rate * epoch).exp()
}

impl TrainingEngine for SimulatedEngine {
    fn initial_state(&mut self, _params: &EngineParams) -> Result<EngineState, EngineError> {
        encode(&SimulatedState {
            epochs_trained: 0,
            seed: self.seed,
            last_gen_loss: None,
        })
    }

    fn restore_state(
        &mut self,
        state: EngineState,
        _params: &EngineParams,
    ) -> Result<EngineState, EngineError> {
        decode(&state)?;
        Ok(state)
    }

    fn run_epoch(
        &mut self,
        state: &EngineState,
        ctx: &EpochContext<'_>,
    ) -> Result<EpochOutput, EngineError> {
        let mut sim = decode(state)?;
        if sim.epochs_trained != ctx.epoch {
            return Err(format!(
                "state has {} epochs trained but epoch {} was requested",
                sim.epochs_trained,
                ctx.epoch + 1
            )
            .into());
        }

        if !self.epoch_delay.is_zero() {
            thread::sleep(self.epoch_delay);
        }

        let mut rng = StdRng::seed_from_u64(sim.seed ^ u64::from(ctx.epoch));
        let mut jitter = |scale: f64| rng.gen_range(-scale..scale);
        let t = f64::from(ctx.epoch);

        let gen_loss = decay(2.5, 0.9, 0.12, t) + jitter(0.05);
        let disc_loss = decay(1.8, 0.45, 0.10, t) + jitter(0.05);
        let cycle_loss = ctx.params.lambda_cycle * decay(1.2, 0.15, 0.09, t);
        let identity_loss = ctx.params.lambda_identity * decay(0.6, 0.1, 0.1, t);

        let metrics: EpochMetrics = [
            ("gen_loss", gen_loss),
            ("disc_loss", disc_loss),
            ("cycle_loss", cycle_loss),
            ("identity_loss", identity_loss),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();

        sim.epochs_trained += 1;
        sim.last_gen_loss = Some(gen_loss);
        Ok(EpochOutput {
            state: encode(&sim)?,
            metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetManifest;
    use std::path::PathBuf;

    fn params() -> EngineParams {
        EngineParams {
            batch_size: 1,
            learning_rate: 2e-4,
            lambda_cycle: 10.0,
            lambda_identity: 0.5,
        }
    }

    fn manifest() -> DatasetManifest {
        DatasetManifest {
            data_dir: PathBuf::from("data"),
            partitions: Vec::new(),
        }
    }

    #[test]
    fn losses_trend_down_and_are_reproducible() {
        let params = params();
        let manifest = manifest();
        let mut engine = SimulatedEngine::new(7);
        let mut state = engine.initial_state(&params).unwrap();
        let mut cycle = Vec::new();
        for epoch in 0..10 {
            let ctx = EpochContext {
                epoch,
                total_epochs: 10,
                params: &params,
                manifest: &manifest,
            };
            let out = engine.run_epoch(&state, &ctx).unwrap();
            cycle.push(out.metrics["cycle_loss"]);
            state = out.state;
        }
        assert!(cycle.windows(2).all(|w| w[1] < w[0]), "{cycle:?}");
        assert!((cycle[0] - 12.0).abs() < 1e-9);

        let mut again = SimulatedEngine::new(7);
        let first = again.initial_state(&params).unwrap();
        let ctx = EpochContext {
            epoch: 0,
            total_epochs: 10,
            params: &params,
            manifest: &manifest,
        };
        let a = again.run_epoch(&first, &ctx).unwrap();
        let b = again.run_epoch(&first, &ctx).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn refuses_state_from_a_different_epoch() {
        let params = params();
        let manifest = manifest();
        let mut engine = SimulatedEngine::default();
        let state = engine.initial_state(&params).unwrap();
        let ctx = EpochContext {
            epoch: 3,
            total_epochs: 10,
            params: &params,
            manifest: &manifest,
        };
        assert!(engine.run_epoch(&state, &ctx).is_err());
    }

    #[test]
    fn rejects_foreign_blobs_on_restore() {
        let mut engine = SimulatedEngine::default();
        let blob = EngineState::new(b"not json".to_vec());
        assert!(engine.restore_state(blob, &params()).is_err());
    }
}
