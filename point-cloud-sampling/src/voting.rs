/// Per-point class score averaging across overlapping spheres.
use log::debug;

use crate::batch::Batch;
use crate::error::{Result, SamplingError};

/// Points near sphere borders are predicted with little context, so each point
/// collects scores from every batch that contained it and the final prediction
/// is the mean.
#[derive(Debug, Clone)]
pub struct VoteAccumulator {
    num_classes: usize,
    sums: Vec<f64>,
    counts: Vec<u32>,
}

impl VoteAccumulator {
    pub fn new(num_points: usize, num_classes: usize) -> Result<Self> {
        if num_classes == 0 {
            return Err(SamplingError::config("vote accumulator needs at least one class"));
        }
        Ok(Self {
            num_classes,
            sums: vec![0.0; num_points * num_classes],
            counts: vec![0; num_points],
        })
    }

    pub fn num_points(&self) -> usize {
        self.counts.len()
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Add the row-major `scores` predicted for every stacked point of `batch`.
    pub fn add_batch(&mut self, batch: &Batch, scores: &[f32]) -> Result<()> {
        let expected = [batch.len(), self.num_classes];
        if scores.len() != expected[0] * expected[1] {
            return Err(SamplingError::ShapeMismatch {
                expected: expected.to_vec(),
                got: vec![scores.len()],
            });
        }
        if let Some(&bad) = batch
            .point_indices
            .iter()
            .find(|&&i| i as usize >= self.counts.len())
        {
            return Err(SamplingError::ShapeMismatch {
                expected: vec![self.counts.len()],
                got: vec![bad as usize + 1],
            });
        }

        let k = self.num_classes;
        for (row, &i) in scores.chunks_exact(k).zip(&batch.point_indices) {
            let i = i as usize;
            for (sum, &s) in self.sums[i * k..(i + 1) * k].iter_mut().zip(row) {
                *sum += s as f64;
            }
            self.counts[i] += 1;
        }

        debug!("Accumulated votes for {} points", batch.len());
        Ok(())
    }

    pub fn vote_counts(&self) -> &[u32] {
        &self.counts
    }

    /// Mean scores, row-major; points without votes stay at zero.
    pub fn averaged(&self) -> Vec<f32> {
        let k = self.num_classes;
        self.sums
            .chunks_exact(k)
            .zip(&self.counts)
            .flat_map(|(row, &count)| {
                let n = count.max(1) as f64;
                row.iter().map(move |s| (s / n) as f32)
            })
            .collect()
    }

    /// Class with the highest mean score per point, `None` before the first vote.
    pub fn majority(&self) -> Vec<Option<usize>> {
        self.sums
            .chunks_exact(self.num_classes)
            .zip(&self.counts)
            .map(|(row, &count)| {
                (count > 0).then(|| {
                    row.iter()
                        .enumerate()
                        .fold((0, f64::NEG_INFINITY), |best, (c, &s)| {
                            if s > best.1 { (c, s) } else { best }
                        })
                        .0
                })
            })
            .collect()
    }

    /// Every point has received at least `min_votes` votes.
    pub fn is_complete(&self, min_votes: u32) -> bool {
        self.counts.iter().all(|&c| c >= min_votes)
    }
}
