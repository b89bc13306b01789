use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{ResumeFrom, RunParams};
use crate::error::Result;

/// Train CycleGAN for Monet style transfer.
///
/// Values are taken from, in order of precedence: explicit flags, the
/// `--config` YAML file, built-in defaults.
#[derive(Parser, Debug)]
#[command(name = "cyclegan-train", version, about, long_about = None)]
pub struct TrainArgs {
    /// YAML file with base run parameters
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Path to dataset directory [default: ./data]
    #[arg(long = "data_dir", value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Path to save outputs and checkpoints [default: ./outputs]
    #[arg(long = "output_dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Number of training epochs [default: 40]
    #[arg(long)]
    pub epochs: Option<u32>,

    /// Batch size for training [default: 1]
    #[arg(long = "batch_size")]
    pub batch_size: Option<u32>,

    /// Learning rate for optimizers [default: 0.0002]
    #[arg(long = "learning_rate")]
    pub learning_rate: Option<f64>,

    /// Weight for cycle consistency loss [default: 10.0]
    #[arg(long = "lambda_cycle")]
    pub lambda_cycle: Option<f64>,

    /// Weight for identity loss [default: 0.5]
    #[arg(long = "lambda_identity")]
    pub lambda_identity: Option<f64>,

    /// Save a checkpoint every N epochs [default: 5]
    #[arg(long = "save_freq")]
    pub save_freq: Option<u32>,

    /// Generate samples every N epochs [default: 1]
    #[arg(long = "sample_freq")]
    pub sample_freq: Option<u32>,

    /// Resume from a checkpoint file; without a value, from the latest
    /// checkpoint in the output directory
    #[arg(
        long,
        value_name = "CHECKPOINT",
        num_args = 0..=1,
        default_missing_value = ResumeFrom::LATEST
    )]
    pub resume: Option<String>,

    /// Simulated backend: wall time spent per epoch, in milliseconds
    #[arg(long = "epoch_delay_ms", default_value_t = 0)]
    pub epoch_delay_ms: u64,

    /// Simulated backend: seed for loss jitter
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

impl TrainArgs {
    /// Layers explicit flags over the config file (or defaults).
    pub fn run_params(&self) -> Result<RunParams> {
        let mut params = match &self.config {
            Some(path) => RunParams::from_yaml_file(path)?,
            None => RunParams::default(),
        };

        if let Some(v) = &self.data_dir {
            params.data_dir = v.clone();
        }
        if let Some(v) = &self.output_dir {
            params.output_dir = v.clone();
        }
        if let Some(v) = self.epochs {
            params.epochs = v;
        }
        if let Some(v) = self.batch_size {
            params.batch_size = v;
        }
        if let Some(v) = self.learning_rate {
            params.learning_rate = v;
        }
        if let Some(v) = self.lambda_cycle {
            params.lambda_cycle = v;
        }
        if let Some(v) = self.lambda_identity {
            params.lambda_identity = v;
        }
        if let Some(v) = self.save_freq {
            params.save_freq = v;
        }
        if let Some(v) = self.sample_freq {
            params.sample_freq = v;
        }
        if let Some(v) = &self.resume {
            params.resume = Some(ResumeFrom::from(v.clone()));
        }
        Ok(params)
    }

    pub fn epoch_delay(&self) -> Duration {
        Duration::from_millis(self.epoch_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn no_flags_gives_defaults() {
        let args = TrainArgs::parse_from(["cyclegan-train"]);
        assert_eq!(args.run_params().unwrap(), RunParams::default());
    }

    #[test]
    fn underscore_flags_are_accepted() {
        let args = TrainArgs::parse_from([
            "cyclegan-train",
            "--data_dir",
            "/tmp/data",
            "--epochs",
            "5",
            "--save_freq",
            "5",
            "--sample_freq",
            "1",
            "--learning_rate",
            "0.001",
        ]);
        let params = args.run_params().unwrap();
        assert_eq!(params.data_dir, PathBuf::from("/tmp/data"));
        assert_eq!(params.epochs, 5);
        assert_eq!(params.learning_rate, 0.001);
        assert_eq!(params.resume, None);
    }

    #[test]
    fn bare_resume_means_latest() {
        let args = TrainArgs::parse_from(["cyclegan-train", "--resume"]);
        assert_eq!(args.run_params().unwrap().resume, Some(ResumeFrom::Latest));

        let args = TrainArgs::parse_from([
            "cyclegan-train",
            "--resume",
            "out/checkpoints/checkpoint_epoch_0004.ckpt",
        ]);
        assert_eq!(
            args.run_params().unwrap().resume,
            Some(ResumeFrom::Path(PathBuf::from("out/checkpoints/checkpoint_epoch_0004.ckpt")))
        );
    }

    #[test]
    fn flags_override_the_config_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("run.yaml");
        fs::write(&file, "epochs: 12\nsave_freq: 3\nlambda_cycle: 5.0\n").unwrap();

        let args = TrainArgs::parse_from([
            "cyclegan-train",
            "--config",
            file.to_str().unwrap(),
            "--epochs",
            "20",
        ]);
        let params = args.run_params().unwrap();
        assert_eq!(params.epochs, 20);
        assert_eq!(params.save_freq, 3);
        assert_eq!(params.lambda_cycle, 5.0);
        assert_eq!(params.batch_size, 1);
    }
}
