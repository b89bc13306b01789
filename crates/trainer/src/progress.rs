use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::engine::EpochMetrics;

/// Outcome of one completed epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    /// 0-based epoch index.
    pub epoch: u32,
    pub total_epochs: u32,
    #[serde(rename = "elapsed_ms", with = "duration_ms")]
    pub elapsed: Duration,
    pub metrics: EpochMetrics,
}

impl EpochReport {
    /// One-line summary, e.g. `Epoch  3/40 - disc_loss: 1.412, gen_loss: 2.013 (1.02s)`.
    pub fn summary(&self) -> String {
        let metrics = self
            .metrics
            .iter()
            .map(|(name, value)| format!("{name}: {value:.3}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "Epoch {:2}/{} - {} ({:.2}s)",
            self.epoch + 1,
            self.total_epochs,
            metrics,
            self.elapsed.as_secs_f64()
        )
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Receives one report per completed epoch.
pub trait ProgressSink {
    fn report(&mut self, report: &EpochReport) -> io::Result<()>;
}

/// Writes each report as an info log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&mut self, report: &EpochReport) -> io::Result<()> {
        info!("{}", report.summary());
        Ok(())
    }
}

/// Appends reports as JSON lines, one per epoch, across resumed runs.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl RunLog {
    pub const FILE_NAME: &'static str = "epochs.jsonl";

    pub fn open(logs_dir: impl AsRef<Path>) -> io::Result<Self> {
        let path = logs_dir.as_ref().join(Self::FILE_NAME);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProgressSink for RunLog {
    fn report(&mut self, report: &EpochReport) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, report)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

/// Collects reports in memory.
impl ProgressSink for Vec<EpochReport> {
    fn report(&mut self, report: &EpochReport) -> io::Result<()> {
        self.push(report.clone());
        Ok(())
    }
}

impl<A: ProgressSink, B: ProgressSink> ProgressSink for (A, B) {
    fn report(&mut self, report: &EpochReport) -> io::Result<()> {
        let first = self.0.report(report);
        let second = self.1.report(report);
        first.and(second)
    }
}

impl<T: ProgressSink> ProgressSink for Option<T> {
    fn report(&mut self, report: &EpochReport) -> io::Result<()> {
        match self {
            Some(sink) => sink.report(report),
            None => Ok(()),
        }
    }
}

impl<T: ProgressSink + ?Sized> ProgressSink for &mut T {
    fn report(&mut self, report: &EpochReport) -> io::Result<()> {
        (**self).report(report)
    }
}
