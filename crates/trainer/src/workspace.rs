//! Output workspace: directory tree plus the persisted run configuration.
//!
//! Layout under the root:
//!
//! ```text
//! config.json
//! checkpoints/
//! samples/
//! logs/
//! ```
//!
//! Only one scheduler may target a workspace at a time. Nothing here locks
//! against a second one; two concurrent runs corrupt each other's checkpoints.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use tempfile::NamedTempFile;

use crate::config::RunConfig;
use crate::error::{Result, TrainerError};

pub const CONFIG_FILE: &str = "config.json";
pub const CHECKPOINTS_DIR: &str = "checkpoints";
pub const SAMPLES_DIR: &str = "samples";
pub const LOGS_DIR: &str = "logs";

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Creates the root and its subdirectories. Existing directories are
    /// left as they are.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let workspace = Self { root: root.into() };
        for dir in [
            workspace.root.clone(),
            workspace.checkpoints_dir(),
            workspace.samples_dir(),
            workspace.logs_dir(),
        ] {
            fs::create_dir_all(&dir).map_err(|source| TrainerError::WorkspaceUnwritable {
                path: dir.clone(),
                source,
            })?;
        }
        info!("Output directories ready at {:?}", workspace.root);
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.root.join(CHECKPOINTS_DIR)
    }

    pub fn samples_dir(&self) -> PathBuf {
        self.root.join(SAMPLES_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    /// Where the sampler writes its artifact for `epoch`.
    pub fn sample_path(&self, epoch: u32) -> PathBuf {
        self.samples_dir().join(format!("epoch_{:04}.png", epoch))
    }

    /// Writes `config.json` atomically: a crash leaves either the previous
    /// record or the new one, never a partial file.
    pub fn persist_config(&self, config: &RunConfig) -> Result<()> {
        let path = self.config_path();
        let json = serde_json::to_vec_pretty(config)?;
        write_durable(&path, &json, Replace::Allow).map_err(|source| {
            TrainerError::WorkspaceUnwritable {
                path: path.clone(),
                source,
            }
        })?;
        info!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// The configuration recorded by an earlier run, if there is one.
    pub fn read_config(&self) -> Result<Option<RunConfig>> {
        let path = self.config_path();
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_str(&json)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Replace {
    Allow,
    Forbid,
}

/// Writes `bytes` to a temp file beside `path`, syncs it, then renames it
/// into place. With `Replace::Forbid` an existing file is an
/// `AlreadyExists` error.
pub(crate) fn write_durable(path: &Path, bytes: &[u8], replace: Replace) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    match replace {
        Replace::Allow => tmp.persist(path)?,
        Replace::Forbid => tmp.persist_noclobber(path)?,
    };
    sync_dir(dir)?;
    debug!("Wrote {} bytes to {:?}", bytes.len(), path);
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
