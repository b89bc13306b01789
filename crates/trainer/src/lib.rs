pub mod cadence;
pub mod cancel;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod preview;
pub mod progress;
pub mod scheduler;
pub mod simulated;
pub mod workspace;

pub use cancel::CancelToken;
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use config::{ResumeFrom, RunConfig, RunParams};
pub use dataset::{validate_dataset, DatasetManifest};
pub use engine::{EngineParams, EngineState, EpochContext, EpochOutput, Sampler, TrainingEngine};
pub use error::{EngineError, RunFailure, TrainerError};
pub use pipeline::launch;
pub use progress::{EpochReport, ProgressSink};
pub use scheduler::{RunOutcome, RunPhase, RunState, RunSummary, Scheduler};
pub use workspace::Workspace;
