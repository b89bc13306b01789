use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::engine::EngineState;
use crate::error::{one_based, Result, TrainerError};
use crate::workspace::{write_durable, Replace};

const FILE_PREFIX: &str = "checkpoint_epoch_";
const FILE_EXTENSION: &str = "ckpt";
const FORMAT_VERSION: u32 = 1;

/// Engine state captured after a fully completed epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub epoch: u32,
    pub saved_at: DateTime<Utc>,
    pub state: EngineState,
}

#[derive(Serialize, Deserialize)]
struct CheckpointRecord {
    format_version: u32,
    epoch: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    saved_at: DateTime<Utc>,
    state: Vec<u8>,
}

/// Write-once store of checkpoints, one file per epoch.
///
/// Epochs must be saved in ascending order; the latest checkpoint is always
/// the one with the highest epoch.
#[derive(Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
    latest: Option<u32>,
}

impl CheckpointStore {
    /// Opens the store rooted at `dir`, indexing what is already on disk.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let latest = list_epochs(&dir)?.last().copied();
        if let Some(epoch) = latest {
            debug!("Checkpoint store {:?} holds epochs up to {}", dir, one_based(&epoch));
        }
        Ok(Self { dir, latest })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn latest_epoch(&self) -> Option<u32> {
        self.latest
    }

    pub fn path_for(&self, epoch: u32) -> PathBuf {
        self.dir.join(file_name(epoch))
    }

    /// All persisted epochs, ascending.
    pub fn epochs(&self) -> Result<Vec<u32>> {
        list_epochs(&self.dir)
    }

    /// Persists `state` as the checkpoint for `epoch` and syncs it to disk
    /// before returning.
    pub fn save(&mut self, epoch: u32, state: &EngineState) -> Result<Checkpoint> {
        if let Some(latest) = self.latest {
            if epoch <= latest {
                return Err(TrainerError::CheckpointOutOfOrder { epoch, latest });
            }
        }

        let record = CheckpointRecord {
            format_version: FORMAT_VERSION,
            epoch,
            saved_at: Utc::now(),
            state: state.as_bytes().to_vec(),
        };
        let bytes = bincode::serialize(&record).map_err(|err| {
            TrainerError::Io(io::Error::new(io::ErrorKind::InvalidData, err))
        })?;

        let path = self.path_for(epoch);
        write_durable(&path, &bytes, Replace::Forbid).map_err(|err| {
            if err.kind() == io::ErrorKind::AlreadyExists {
                TrainerError::CheckpointOutOfOrder { epoch, latest: epoch }
            } else {
                TrainerError::Io(err)
            }
        })?;
        self.latest = Some(epoch);

        info!("Saved checkpoint for epoch {} to {:?}", one_based(&epoch), path);
        Ok(Checkpoint {
            epoch,
            saved_at: record.saved_at,
            state: state.clone(),
        })
    }

    /// The checkpoint with the highest epoch in this store.
    pub fn load_latest(&self) -> Result<Checkpoint> {
        let epoch = list_epochs(&self.dir)?
            .last()
            .copied()
            .ok_or_else(|| TrainerError::NoCheckpointFound {
                dir: self.dir.clone(),
            })?;

        let path = self.path_for(epoch);
        let checkpoint = Self::load_from(&path)?;
        if checkpoint.epoch != epoch {
            return Err(TrainerError::CheckpointCorrupt {
                path,
                reason: format!(
                    "file name says epoch {} but record holds epoch {}",
                    one_based(&epoch),
                    one_based(&checkpoint.epoch)
                ),
            });
        }
        Ok(checkpoint)
    }

    /// Reads the checkpoint stored at an explicit path.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Checkpoint> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;

        let record: CheckpointRecord =
            bincode::deserialize(&bytes).map_err(|err| TrainerError::CheckpointCorrupt {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;
        if record.format_version != FORMAT_VERSION {
            return Err(TrainerError::CheckpointCorrupt {
                path: path.to_path_buf(),
                reason: format!("unsupported format version {}", record.format_version),
            });
        }

        debug!(
            "Loaded checkpoint for epoch {} from {:?}",
            one_based(&record.epoch),
            path
        );
        Ok(Checkpoint {
            epoch: record.epoch,
            saved_at: record.saved_at,
            state: EngineState::new(record.state),
        })
    }
}

fn list_epochs(dir: &Path) -> Result<Vec<u32>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut epochs = Vec::new();
    for entry in entries {
        let entry = entry?;
        if let Some(epoch) = parse_epoch(&entry.path()) {
            epochs.push(epoch);
        }
    }
    epochs.sort_unstable();
    Ok(epochs)
}

fn file_name(epoch: u32) -> String {
    format!("{FILE_PREFIX}{:04}.{FILE_EXTENSION}", epoch)
}

/// Epoch of a checkpoint file, only if the name is exactly what
/// [`CheckpointStore::path_for`] would produce for it.
fn parse_epoch(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    let epoch: u32 = name
        .strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_EXTENSION)?
        .strip_suffix('.')?
        .parse()
        .ok()?;
    (file_name(epoch) == name).then_some(epoch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn state(tag: u8) -> EngineState {
        EngineState::new(vec![tag; 16])
    }

    #[test]
    fn latest_is_the_highest_epoch() {
        let dir = tempdir().unwrap();
        let mut store = CheckpointStore::open(dir.path()).unwrap();
        store.save(4, &state(4)).unwrap();
        store.save(9, &state(9)).unwrap();
        store.save(14, &state(14)).unwrap();

        assert_eq!(store.epochs().unwrap(), vec![4, 9, 14]);
        let latest = store.load_latest().unwrap();
        assert_eq!(latest.epoch, 14);
        assert_eq!(latest.state, state(14));

        let reopened = CheckpointStore::open(dir.path()).unwrap();
        assert_eq!(reopened.latest_epoch(), Some(14));
    }

    #[test]
    fn saves_must_ascend() {
        let dir = tempdir().unwrap();
        let mut store = CheckpointStore::open(dir.path()).unwrap();
        store.save(5, &state(5)).unwrap();

        for epoch in [5, 3] {
            match store.save(epoch, &state(0)) {
                Err(TrainerError::CheckpointOutOfOrder { latest, .. }) => assert_eq!(latest, 5),
                other => panic!("expected CheckpointOutOfOrder, got {other:?}"),
            }
        }
        assert_eq!(CheckpointStore::load_from(store.path_for(5)).unwrap().state, state(5));
    }

    #[test]
    fn empty_store_has_no_latest() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::open(dir.path().join("checkpoints")).unwrap();
        assert!(matches!(
            store.load_latest(),
            Err(TrainerError::NoCheckpointFound { .. })
        ));
    }

    #[test]
    fn garbage_is_reported_as_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoint_epoch_0002.ckpt");
        fs::write(&path, b"\x01\x00").unwrap();

        assert!(matches!(
            CheckpointStore::load_from(&path),
            Err(TrainerError::CheckpointCorrupt { .. })
        ));
    }

    #[test]
    fn truncated_record_is_corrupt() {
        let dir = tempdir().unwrap();
        let mut store = CheckpointStore::open(dir.path()).unwrap();
        store.save(0, &state(1)).unwrap();
        let path = store.path_for(0);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();

        assert!(matches!(
            store.load_latest(),
            Err(TrainerError::CheckpointCorrupt { .. })
        ));
    }

    #[test]
    fn unrelated_files_are_ignored() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::write(dir.path().join("checkpoint_epoch_abc.ckpt"), b"x").unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        assert_eq!(store.latest_epoch(), None);
    }

    #[test]
    fn names_that_do_not_round_trip_are_ignored() {
        let dir = tempdir().unwrap();
        let mut store = CheckpointStore::open(dir.path()).unwrap();
        store.save(2, &state(2)).unwrap();
        for name in [
            "checkpoint_epoch_5.ckpt",
            "checkpoint_epoch_+0007.ckpt",
            "checkpoint_epoch_00009.ckpt",
        ] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let reopened = CheckpointStore::open(dir.path()).unwrap();
        assert_eq!(reopened.latest_epoch(), Some(2));
        assert_eq!(reopened.epochs().unwrap(), vec![2]);
        assert_eq!(reopened.load_latest().unwrap().state, state(2));
    }

    #[test]
    fn wide_epoch_numbers_keep_their_natural_width() {
        let dir = tempdir().unwrap();
        let mut store = CheckpointStore::open(dir.path()).unwrap();
        store.save(12345, &state(7)).unwrap();
        assert!(store.path_for(12345).ends_with("checkpoint_epoch_12345.ckpt"));
        assert_eq!(store.load_latest().unwrap().epoch, 12345);
    }
}
