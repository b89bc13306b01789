use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainerError};

/// Where a resumed run takes its starting state from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResumeFrom {
    /// Highest-epoch checkpoint in the run's own workspace.
    Latest,
    Path(PathBuf),
}

impl ResumeFrom {
    pub const LATEST: &'static str = "latest";
}

impl From<String> for ResumeFrom {
    fn from(value: String) -> Self {
        if value == Self::LATEST {
            ResumeFrom::Latest
        } else {
            ResumeFrom::Path(PathBuf::from(value))
        }
    }
}

impl From<ResumeFrom> for String {
    fn from(value: ResumeFrom) -> Self {
        match value {
            ResumeFrom::Latest => ResumeFrom::LATEST.to_string(),
            ResumeFrom::Path(path) => path.to_string_lossy().into_owned(),
        }
    }
}

impl fmt::Display for ResumeFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResumeFrom::Latest => f.write_str(Self::LATEST),
            ResumeFrom::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Unvalidated run parameters, as read from a YAML file or the command line.
///
/// Missing keys in a config file fall back to the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunParams {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub epochs: u32,
    pub batch_size: u32,
    pub learning_rate: f64,
    pub lambda_cycle: f64,
    pub lambda_identity: f64,
    pub save_freq: u32,
    pub sample_freq: u32,
    pub resume: Option<ResumeFrom>,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            output_dir: PathBuf::from("./outputs"),
            epochs: 40,
            batch_size: 1,
            learning_rate: 2e-4,
            lambda_cycle: 10.0,
            lambda_identity: 0.5,
            save_freq: 5,
            sample_freq: 1,
            resume: None,
        }
    }
}

impl RunParams {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Checks every bound and freezes the parameters into a [`RunConfig`].
    pub fn validate(self) -> Result<RunConfig> {
        if self.epochs == 0 {
            return Err(invalid("epochs must be greater than 0"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size must be greater than 0"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(invalid(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        for (name, value) in [
            ("lambda_cycle", self.lambda_cycle),
            ("lambda_identity", self.lambda_identity),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if self.save_freq == 0 {
            return Err(invalid("save_freq must be greater than 0"));
        }
        if self.sample_freq == 0 {
            return Err(invalid("sample_freq must be greater than 0"));
        }
        if let Some(ResumeFrom::Path(path)) = &self.resume {
            if path.as_os_str().is_empty() {
                return Err(invalid("resume path must not be empty"));
            }
        }
        Ok(RunConfig { params: self })
    }
}

fn invalid(message: impl Into<String>) -> TrainerError {
    TrainerError::InvalidConfiguration(message.into())
}

/// Validated, immutable configuration of one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RunParams", into = "RunParams")]
pub struct RunConfig {
    params: RunParams,
}

impl TryFrom<RunParams> for RunConfig {
    type Error = TrainerError;

    fn try_from(params: RunParams) -> Result<Self> {
        params.validate()
    }
}

impl From<RunConfig> for RunParams {
    fn from(config: RunConfig) -> Self {
        config.params
    }
}

impl RunConfig {
    pub fn params(&self) -> &RunParams {
        &self.params
    }

    pub fn data_dir(&self) -> &Path {
        &self.params.data_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.params.output_dir
    }

    pub fn epochs(&self) -> u32 {
        self.params.epochs
    }

    pub fn batch_size(&self) -> u32 {
        self.params.batch_size
    }

    pub fn learning_rate(&self) -> f64 {
        self.params.learning_rate
    }

    pub fn lambda_cycle(&self) -> f64 {
        self.params.lambda_cycle
    }

    pub fn lambda_identity(&self) -> f64 {
        self.params.lambda_identity
    }

    pub fn save_freq(&self) -> u32 {
        self.params.save_freq
    }

    pub fn sample_freq(&self) -> u32 {
        self.params.sample_freq
    }

    pub fn resume(&self) -> Option<&ResumeFrom> {
        self.params.resume.as_ref()
    }

    /// Hyperparameters that differ from `previous`. `epochs` and `resume`
    /// are expected to change between a run and its continuation.
    pub fn changed_fields(&self, previous: &RunConfig) -> Vec<&'static str> {
        let (a, b) = (&self.params, &previous.params);
        let mut changed = Vec::new();
        if a.data_dir != b.data_dir {
            changed.push("data_dir");
        }
        if a.batch_size != b.batch_size {
            changed.push("batch_size");
        }
        if a.learning_rate != b.learning_rate {
            changed.push("learning_rate");
        }
        if a.lambda_cycle != b.lambda_cycle {
            changed.push("lambda_cycle");
        }
        if a.lambda_identity != b.lambda_identity {
            changed.push("lambda_identity");
        }
        if a.save_freq != b.save_freq {
            changed.push("save_freq");
        }
        if a.sample_freq != b.sample_freq {
            changed.push("sample_freq");
        }
        changed
    }

    /// `key: value` lines in field order, for the startup banner.
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        let p = &self.params;
        vec![
            ("data_dir", p.data_dir.display().to_string()),
            ("output_dir", p.output_dir.display().to_string()),
            ("epochs", p.epochs.to_string()),
            ("batch_size", p.batch_size.to_string()),
            ("learning_rate", p.learning_rate.to_string()),
            ("lambda_cycle", p.lambda_cycle.to_string()),
            ("lambda_identity", p.lambda_identity.to_string()),
            ("save_freq", p.save_freq.to_string()),
            ("sample_freq", p.sample_freq.to_string()),
            (
                "resume",
                p.resume
                    .as_ref()
                    .map_or_else(|| "none".to_string(), ToString::to_string),
            ),
        ]
    }
}
