use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainerError};

/// Partitions every run needs: the style domain (Monet paintings) and the
/// content domain (photos).
pub const REQUIRED_PARTITIONS: [&str; 2] = ["monet_jpg", "photo_jpg"];

/// File extensions counted as images, compared case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub name: String,
    pub path: PathBuf,
    pub image_count: usize,
}

/// Validated description of the dataset partitions a run trains on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub data_dir: PathBuf,
    pub partitions: Vec<Partition>,
}

impl DatasetManifest {
    pub fn partition(&self, name: &str) -> Option<&Partition> {
        self.partitions.iter().find(|p| p.name == name)
    }

    pub fn total_images(&self) -> usize {
        self.partitions.iter().map(|p| p.image_count).sum()
    }
}

/// Checks the standard partitions under `data_dir`.
pub fn validate_dataset(data_dir: impl AsRef<Path>) -> Result<DatasetManifest> {
    validate_partitions(data_dir, &REQUIRED_PARTITIONS)
}

/// Checks that each named partition is a directory holding at least one
/// image. Read-only.
pub fn validate_partitions(data_dir: impl AsRef<Path>, names: &[&str]) -> Result<DatasetManifest> {
    let data_dir = data_dir.as_ref();
    let mut partitions = Vec::with_capacity(names.len());

    for &name in names {
        let path = data_dir.join(name);
        if !path.is_dir() {
            return Err(TrainerError::DatasetMissing {
                partition: name.to_string(),
                path,
            });
        }

        let image_count = count_images(&path)?;
        if image_count == 0 {
            return Err(TrainerError::DatasetEmpty {
                partition: name.to_string(),
                path,
            });
        }

        info!("Found {} images in {}", image_count, name);
        partitions.push(Partition {
            name: name.to_string(),
            path,
            image_count,
        });
    }

    debug!("Dataset under {:?} passed validation", data_dir);
    Ok(DatasetManifest {
        data_dir: data_dir.to_path_buf(),
        partitions,
    })
}

fn count_images(dir: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        // Follows symlinks.
        if path.is_file() && is_image(&path) {
            count += 1;
        }
    }
    Ok(count)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}
