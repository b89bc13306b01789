use log::{info, warn};

use crate::cancel::CancelToken;
use crate::checkpoint::CheckpointStore;
use crate::config::RunConfig;
use crate::dataset::validate_dataset;
use crate::engine::{Sampler, TrainingEngine};
use crate::error::RunFailure;
use crate::progress::{LogProgress, RunLog};
use crate::scheduler::{RunSummary, Scheduler};
use crate::workspace::Workspace;

/// Runs the gates in order (dataset, workspace, scheduler start) and then
/// hands over to the scheduler. A gate failure means no epoch ran and no
/// checkpoint was written. `config.json` is only replaced after the
/// scheduler has started.
pub fn launch<E: TrainingEngine, S: Sampler>(
    config: &RunConfig,
    engine: E,
    sampler: S,
    cancel: CancelToken,
) -> Result<RunSummary, RunFailure> {
    info!("Checking dataset under {:?}", config.data_dir());
    let manifest = validate_dataset(config.data_dir()).map_err(RunFailure::before_start)?;

    let workspace = Workspace::create(config.output_dir()).map_err(RunFailure::before_start)?;
    match workspace.read_config() {
        Ok(Some(previous)) => {
            let changed = config.changed_fields(&previous);
            if !changed.is_empty() {
                warn!(
                    "Configuration differs from the previous run in this workspace: {}",
                    changed.join(", ")
                );
            }
        }
        Ok(None) => {}
        Err(err) => warn!("Ignoring unreadable previous configuration: {}", err),
    }

    let store =
        CheckpointStore::open(workspace.checkpoints_dir()).map_err(RunFailure::before_start)?;
    let mut scheduler =
        Scheduler::new(config, &manifest, &workspace, store, engine, sampler, cancel);
    let state = scheduler.start()?;
    workspace
        .persist_config(config)
        .map_err(RunFailure::before_start)?;

    let mut progress = match RunLog::open(workspace.logs_dir()) {
        Ok(log) => (LogProgress, Some(log)),
        Err(err) => {
            warn!("Epoch log unavailable, reporting to the console only: {}", err);
            (LogProgress, None)
        }
    };

    scheduler.drive(state, &mut progress)
}
