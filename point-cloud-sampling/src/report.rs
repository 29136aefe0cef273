/// Run report written next to the input cloud.
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::batch::BatchSummary;
use crate::bounds::PointCloudBounds;
use crate::calibration::CalibrationState;
use crate::config::{LayerSpec, SamplingConfig};
use crate::epoch::{CoverageOutcome, CoverageStats};
use crate::error::Result;

/// Per-layer point counts of the stacked inputs, summed over every batch.
#[derive(Debug, Clone, Serialize)]
pub struct LayerReport {
    pub spec: LayerSpec,
    pub points: usize,
    pub mean_neighbors: f64,
}

/// Everything needed to judge a sampling run after the fact.
#[derive(Debug, Clone, Serialize)]
pub struct SamplingReport {
    pub input: String,
    pub raw_points: usize,
    pub working_points: usize,
    pub channels: Vec<String>,
    /// Bounds of the working cloud in local coordinates.
    pub bounds: PointCloudBounds,
    pub origin: [f64; 3],
    pub config: SamplingConfig,
    pub layers: Vec<LayerReport>,
    pub batches: Vec<BatchSummary>,
    pub outcome: CoverageOutcome,
    pub coverage: CoverageStats,
    pub calibration: CalibrationState,
}

pub struct ReportWriter {
    output_dir: PathBuf,
    output_name: String,
}

impl ReportWriter {
    pub fn new(output_dir: &Path, output_name: &str) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            output_name: output_name.to_string(),
        }
    }

    pub fn report_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_sampling.json", self.output_name))
    }

    /// Write the report as pretty JSON and print a short summary.
    pub fn write(&self, report: &SamplingReport) -> Result<PathBuf> {
        let path = self.report_path();
        fs::write(&path, serde_json::to_string_pretty(report)?)?;

        println!("Generated sampling report: {}", path.display());
        print_summary(report);
        Ok(path)
    }
}

fn print_summary(report: &SamplingReport) {
    println!("Sampling Summary:");
    println!(
        "  Points: {} raw -> {} working",
        report.raw_points, report.working_points
    );
    let (dx, dy, dz) = report.bounds.dimensions();
    println!("  Extent: {:.2} x {:.2} x {:.2}", dx, dy, dz);
    println!(
        "  Batches: {} (coverage target reached: {})",
        report.outcome.batches, report.outcome.complete
    );

    if !report.batches.is_empty() {
        let points: usize = report.batches.iter().map(|b| b.points).sum();
        let spheres: usize = report.batches.iter().map(|b| b.spheres).sum();
        let n = report.batches.len() as f64;
        println!(
            "  Mean batch: {:.0} points in {:.1} spheres",
            points as f64 / n,
            spheres as f64 / n
        );
    }

    println!(
        "  Coverage: {:.1}% of points, mean {:.2}, cv {:.3}, min {}",
        report.coverage.covered_fraction * 100.0,
        report.coverage.mean,
        report.coverage.coefficient_of_variation,
        report.coverage.min
    );
    println!(
        "  Final max_points: {:.0} (average batch {:.0})",
        report.calibration.max_points, report.calibration.average_batch_size
    );
    for layer in &report.layers {
        println!(
            "  Layer {}: dl {:.3}, {} points, {:.1} neighbors",
            layer.spec.layer, layer.spec.dl, layer.points, layer.mean_neighbors
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_named_json_report() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path(), "street");
        let report = SamplingReport {
            input: "street.laz".into(),
            raw_points: 10,
            working_points: 8,
            channels: vec!["intensity".into(), "bias".into()],
            bounds: PointCloudBounds::from_positions(&[[0.0; 3], [1.0, 2.0, 3.0]]),
            origin: [0.0; 3],
            config: SamplingConfig::default(),
            layers: Vec::new(),
            batches: vec![BatchSummary {
                spheres: 2,
                points: 8,
                max_points: 10,
            }],
            outcome: CoverageOutcome {
                batches: 1,
                complete: true,
            },
            coverage: CoverageStats::from_counts(&[1; 8]),
            calibration: CalibrationState {
                max_points: 10.0,
                average_batch_size: 8.0,
                target_batch_size: 10,
                gain: 0.5,
                batches_observed: 1,
                pinned_streak: 0,
            },
        };

        let path = writer.write(&report).unwrap();
        assert_eq!(path, dir.path().join("street_sampling.json"));

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["working_points"], 8);
        assert_eq!(json["batches"][0]["spheres"], 2);
        assert_eq!(json["outcome"]["complete"], true);
    }
}
