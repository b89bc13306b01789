use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use trainer::dataset::validate_dataset;

/// Verify that a dataset directory holds the partitions training expects.
#[derive(Parser)]
#[command(name = "data_prep", version, about)]
struct Cli {
    /// Dataset root containing monet_jpg/ and photo_jpg/
    #[arg(long = "data_dir", default_value = "./data")]
    data_dir: PathBuf,

    /// Write the dataset manifest as JSON to this file
    #[arg(long = "manifest_out", value_name = "FILE")]
    manifest_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let manifest = validate_dataset(&cli.data_dir)
        .with_context(|| format!("Dataset check failed for {:?}", cli.data_dir))?;

    for partition in &manifest.partitions {
        println!(
            "{:<12} {:>6} images  {:?}",
            partition.name, partition.image_count, partition.path
        );
    }
    println!("Total: {} images", manifest.total_images());

    if let Some(path) = &cli.manifest_out {
        let json = serde_json::to_string_pretty(&manifest)?;
        fs::write(path, json).with_context(|| format!("Failed to write manifest to {:?}", path))?;
        info!("Manifest written to {:?}", path);
    }

    println!("Dataset ready for training.");
    Ok(())
}
