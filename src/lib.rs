//! Reproducible poisoning of line-oriented tabular datasets.
//!
//! A clean dataset, a pool of malicious rows and a JSON mutation profile go
//! in; a dataset comes out in which a chosen subset of rows has been
//! substituted, algorithmically mutated, or relabelled. Every random choice
//! comes from a logistic-map generator seeded by the profile, so the same
//! inputs always give byte-identical output, whatever the thread count.

pub mod chaos;
pub mod dataset;
pub mod error;
pub mod mutate;
pub mod pipeline;
pub mod plugin;
pub mod positions;
pub mod profile;

use std::path::PathBuf;

pub use chaos::ChaosGenerator;
pub use error::{Error, Result};
pub use mutate::{DefaultMutator, MutationMode, RowMutator};
pub use pipeline::{InjectionPipeline, InjectionSummary, PipelineState};
pub use plugin::{resolve_mutator, ExternalMutator};
pub use positions::{select_positions, InjectionPositions};
pub use profile::{InjectionProfile, PerformanceSettings};

/// File locations for one run.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub dataset: PathBuf,
    pub malicious_pool: PathBuf,
    pub output: PathBuf,
    pub profile: PathBuf,
    pub plugin: Option<PathBuf>,
}

/// Loads the profile and malicious pool, resolves the mutator and runs the
/// pipeline end to end.
pub fn inject(paths: &RunPaths) -> Result<InjectionSummary> {
    let profile = InjectionProfile::load(&paths.profile)?;
    let pool = dataset::read_lines(&paths.malicious_pool)?;
    let mutator = resolve_mutator(paths.plugin.as_deref(), &profile);
    let perf = &profile.performance;
    log::info!(
        "running in streaming mode with {} thread(s){}",
        perf.threads,
        if perf.use_gpu { " (GPU enabled)" } else { "" }
    );
    InjectionPipeline::new(profile, pool, mutator).run(&paths.dataset, &paths.output)
}
