/// End-to-end sampling run: load, subsample, draw calibrated batches, report.
use std::path::{Path, PathBuf};

use constants::sampling::INDEX_CELLS_PER_RADIUS;
use log::info;

use crate::cloud::PointCloud;
use crate::config::SamplingConfig;
use crate::epoch::EpochSampler;
use crate::error::{Result, SamplingError};
use crate::laz::load_subsampled;
use crate::progress::progress_bar;
use crate::report::{LayerReport, ReportWriter, SamplingReport};
use crate::stacked::build_layer_inputs;
use crate::subsampling::GridSubsampler;

pub struct SamplingPipeline {
    input_path: PathBuf,
    /// Directory receiving the report, the input's own directory.
    output_dir: PathBuf,
    output_name: String,
    config: SamplingConfig,
}

impl SamplingPipeline {
    pub fn new(input_path: &Path, config: SamplingConfig) -> Result<Self> {
        config.validate()?;
        if !input_path.is_file() {
            return Err(SamplingError::config(format!(
                "input cloud does not exist: {}",
                input_path.display()
            )));
        }

        let output_dir = input_path
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf();
        let output_name = input_path
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        Ok(Self {
            input_path: input_path.to_path_buf(),
            output_dir,
            output_name,
            config,
        })
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    /// Load the input, run it, and write the report next to it.
    pub fn run(&self) -> Result<SamplingReport> {
        println!("Sampling {}...", self.input_path.display());
        let loaded = load_subsampled(&self.input_path, self.config.dl_0)?;

        let mut report = sample_working(loaded.cloud, loaded.raw_points, &self.config)?;
        report.input = self.input_path.display().to_string();
        report.origin = loaded.origin;

        ReportWriter::new(&self.output_dir, &self.output_name).write(&report)?;
        println!("Sampling complete!");
        Ok(report)
    }
}

/// Subsample `raw` to the working cloud and emit batches until every working
/// point reaches the configured vote coverage or the batch budget runs out.
pub fn sample_cloud(raw: &PointCloud, config: &SamplingConfig) -> Result<SamplingReport> {
    config.validate()?;
    let working = GridSubsampler::new(config.dl_0)?.subsample(raw)?;
    sample_working(working, raw.len(), config)
}

/// Batch loop over a cloud already subsampled at `dl_0` from `raw_points` inputs.
pub fn sample_working(
    working: PointCloud,
    raw_points: usize,
    config: &SamplingConfig,
) -> Result<SamplingReport> {
    config.validate()?;

    let working = working.reindex(config.sphere_radius() / INDEX_CELLS_PER_RADIUS)?;
    info!(
        "Working cloud: {} -> {} points at dl_0={}",
        raw_points,
        working.len(),
        config.dl_0
    );

    let specs = config.layer_specs();
    let filter = config.neighborhood_filter()?;
    let mut layer_points = vec![0usize; specs.len()];
    let mut layer_neighbors = vec![0usize; specs.len()];
    let mut batches = Vec::new();

    let mut epoch = EpochSampler::from_config(&working, config)?;
    let pb = progress_bar(config.max_batches as u64, "batches", "Sampling batches");

    let outcome = epoch.run_until_covered(config.min_vote_coverage, config.max_batches, |batch| {
        for (l, inputs) in build_layer_inputs(&batch, &specs, &filter)?.iter().enumerate() {
            layer_points[l] += inputs.points.len();
            layer_neighbors[l] += inputs.neighbors.lists.iter().map(Vec::len).sum::<usize>();
        }
        batches.push(batch.summary());
        pb.inc(1);
        Ok(())
    })?;
    pb.finish_with_message("Batches sampled");

    let layers = specs
        .iter()
        .zip(layer_points.iter().zip(&layer_neighbors))
        .map(|(spec, (&points, &neighbors))| LayerReport {
            spec: *spec,
            points,
            mean_neighbors: if points > 0 {
                neighbors as f64 / points as f64
            } else {
                0.0
            },
        })
        .collect();

    Ok(SamplingReport {
        input: String::new(),
        raw_points,
        working_points: working.len(),
        channels: working.schema().channels.clone(),
        bounds: *working.bounds(),
        origin: [0.0; 3],
        config: config.clone(),
        layers,
        batches,
        outcome,
        coverage: epoch.coverage_stats(),
        calibration: *epoch.calibration_state(),
    })
}
