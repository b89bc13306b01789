use std::path::PathBuf;

use thiserror::Error;

/// Error type handed back by training-engine and sampler collaborators.
pub type EngineError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum TrainerError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("dataset partition '{partition}' not found at {}", .path.display())]
    DatasetMissing { partition: String, path: PathBuf },

    #[error("dataset partition '{partition}' at {} contains no images", .path.display())]
    DatasetEmpty { partition: String, path: PathBuf },

    #[error("workspace {} is not writable: {source}", .path.display())]
    WorkspaceUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "workspace {} already holds checkpoints up to epoch {}; \
         pass --resume or use a fresh output directory",
        .dir.display(),
        one_based(.latest)
    )]
    StaleCheckpoints { dir: PathBuf, latest: u32 },

    #[error("no checkpoint found under {}", .dir.display())]
    NoCheckpointFound { dir: PathBuf },

    #[error("checkpoint {} is corrupt: {reason}", .path.display())]
    CheckpointCorrupt { path: PathBuf, reason: String },

    #[error(
        "checkpoint for epoch {} rejected: store already holds epoch {}",
        one_based(.epoch),
        one_based(.latest)
    )]
    CheckpointOutOfOrder { epoch: u32, latest: u32 },

    #[error("resume failed: {source}")]
    ResumeFailed {
        #[source]
        source: Box<TrainerError>,
    },

    #[error("training engine failed at epoch {}: {source}", one_based(.epoch))]
    EngineFailure {
        epoch: u32,
        #[source]
        source: EngineError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML config error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl TrainerError {
    pub fn resume(source: TrainerError) -> Self {
        TrainerError::ResumeFailed {
            source: Box::new(source),
        }
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            TrainerError::InvalidConfiguration(_) | TrainerError::Yaml(_) => 2,
            TrainerError::DatasetMissing { .. } | TrainerError::DatasetEmpty { .. } => 3,
            TrainerError::WorkspaceUnwritable { .. } | TrainerError::StaleCheckpoints { .. } => 4,
            TrainerError::NoCheckpointFound { .. }
            | TrainerError::CheckpointCorrupt { .. }
            | TrainerError::CheckpointOutOfOrder { .. }
            | TrainerError::ResumeFailed { .. } => 5,
            TrainerError::EngineFailure { .. } => 6,
            TrainerError::Io(_) | TrainerError::Json(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, TrainerError>;

/// Terminal failure of a run, carrying the last epoch that fully completed
/// so a resume attempt is well defined.
#[derive(Error, Debug)]
#[error("{error} (last completed epoch: {})", describe_epoch(.last_completed_epoch))]
pub struct RunFailure {
    #[source]
    pub error: TrainerError,
    pub last_completed_epoch: Option<u32>,
}

impl RunFailure {
    pub fn new(error: TrainerError, last_completed_epoch: Option<u32>) -> Self {
        Self {
            error,
            last_completed_epoch,
        }
    }

    /// Failure raised before any epoch could be attributed to the run.
    pub fn before_start(error: TrainerError) -> Self {
        Self::new(error, None)
    }

    pub fn exit_code(&self) -> u8 {
        self.error.exit_code()
    }
}

/// 1-based epoch number for messages, widened to `u64`.
pub(crate) fn one_based(epoch: &u32) -> u64 {
    u64::from(*epoch) + 1
}

fn describe_epoch(epoch: &Option<u32>) -> String {
    match epoch {
        Some(epoch) => one_based(epoch).to_string(),
        None => "none".to_string(),
    }
}
