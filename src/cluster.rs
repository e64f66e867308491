//! Consensus clustering of raw peaks by sorted m/z proximity.
//!
//! A flat pool of peaks, typically all fragments from one MS2 spectrum or
//! the pooled points of a spectrum collection, is reduced to consensus ions:
//! peaks are sorted by m/z and a new cluster starts wherever the gap to the
//! previous peak exceeds the tolerance. One linear pass after the sort, no
//! iterative re-clustering.

use mzpeaks::{CentroidPeak, Tolerance};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClusteringError {
    #[error("The m/z tolerance must be positive, got {0}")]
    NonPositiveTolerance(f64),
    #[error("Peak {0} has a non-finite m/z")]
    NonFiniteMz(usize),
}

/// How the intensities of a cluster's members combine into the consensus
/// peak's intensity
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntensityAggregation {
    #[default]
    Sum,
    Max,
}

/// The output of [`cluster_peaks`]: a cluster id per input peak plus one
/// consensus peak per cluster
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ClusteredPeaks {
    /// Cluster id for each input peak, in input order
    pub assignments: Vec<usize>,
    /// One consensus peak per cluster; its `index` is the cluster id
    pub consensus: Vec<CentroidPeak>,
    /// The input peak indices belonging to each cluster
    pub members: Vec<Vec<usize>>,
}

impl ClusteredPeaks {
    pub fn cluster_count(&self) -> usize {
        self.consensus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consensus.is_empty()
    }
}

/// Group `peaks` into consensus ions within `tolerance`.
///
/// Peaks are walked in ascending m/z order, ties keeping input order; a new
/// cluster opens when a peak falls outside the tolerance window around the
/// previous peak's m/z. The consensus m/z is the intensity-weighted mean of
/// the members. A non-positive tolerance or a non-finite m/z fails before
/// any grouping happens.
pub fn cluster_peaks(
    peaks: &[CentroidPeak],
    tolerance: Tolerance,
    aggregation: IntensityAggregation,
) -> Result<ClusteredPeaks, ClusteringError> {
    if tolerance.tol() <= 0.0 {
        return Err(ClusteringError::NonPositiveTolerance(tolerance.tol()));
    }
    for (index, peak) in peaks.iter().enumerate() {
        if !peak.mz.is_finite() {
            return Err(ClusteringError::NonFiniteMz(index));
        }
    }
    let mut clustered = ClusteredPeaks {
        assignments: vec![0; peaks.len()],
        ..Default::default()
    };
    if peaks.is_empty() {
        return Ok(clustered);
    }

    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&a, &b| {
        peaks[a]
            .mz
            .partial_cmp(&peaks[b].mz)
            .expect("m/z values were checked finite")
    });

    let mut previous_mz = peaks[order[0]].mz;
    let mut members: Vec<usize> = Vec::new();
    for &index in order.iter() {
        let mz = peaks[index].mz;
        let (_, upper) = tolerance.bounds(previous_mz);
        if !members.is_empty() && mz > upper {
            finish_cluster(&mut clustered, std::mem::take(&mut members), peaks, aggregation);
        }
        members.push(index);
        previous_mz = mz;
    }
    finish_cluster(&mut clustered, members, peaks, aggregation);
    Ok(clustered)
}

fn finish_cluster(
    clustered: &mut ClusteredPeaks,
    members: Vec<usize>,
    peaks: &[CentroidPeak],
    aggregation: IntensityAggregation,
) {
    let cluster_id = clustered.consensus.len();
    let mut weighted_mz = 0.0;
    let mut total_weight = 0.0;
    let mut summed = 0.0f64;
    let mut max = 0.0f64;
    for &index in members.iter() {
        let peak = &peaks[index];
        let weight = peak.intensity as f64;
        weighted_mz += peak.mz * weight;
        total_weight += weight;
        summed += weight;
        max = max.max(weight);
        clustered.assignments[index] = cluster_id;
    }
    let mz = if total_weight > 0.0 {
        weighted_mz / total_weight
    } else {
        members.iter().map(|&i| peaks[i].mz).sum::<f64>() / members.len() as f64
    };
    let intensity = match aggregation {
        IntensityAggregation::Sum => summed,
        IntensityAggregation::Max => max,
    };
    clustered
        .consensus
        .push(CentroidPeak::new(mz, intensity as f32, cluster_id as u32));
    clustered.members.push(members);
}

#[cfg(test)]
mod test {
    use super::*;

    fn peak(mz: f64, intensity: f32) -> CentroidPeak {
        CentroidPeak::new(mz, intensity, 0)
    }

    #[test]
    fn gap_rule_defines_clusters() {
        let peaks = vec![
            peak(100.000, 10.0),
            peak(100.004, 30.0),
            peak(100.009, 10.0),
            peak(100.050, 20.0),
            peak(200.000, 5.0),
        ];
        let clustered =
            cluster_peaks(&peaks, Tolerance::Da(0.01), IntensityAggregation::Sum).unwrap();
        // chained adjacency keeps the first three together
        assert_eq!(clustered.cluster_count(), 3);
        assert_eq!(clustered.assignments, vec![0, 0, 0, 1, 2]);
        assert_eq!(clustered.members[0], vec![0, 1, 2]);
        assert_eq!(clustered.consensus[0].intensity, 50.0);
        assert_eq!(clustered.consensus[0].index, 0);
    }

    #[test]
    fn unsorted_input_is_sorted_first() {
        let peaks = vec![peak(200.0, 5.0), peak(100.0, 10.0), peak(100.004, 30.0)];
        let clustered =
            cluster_peaks(&peaks, Tolerance::Da(0.01), IntensityAggregation::Sum).unwrap();
        assert_eq!(clustered.cluster_count(), 2);
        assert_eq!(clustered.assignments, vec![1, 0, 0]);
    }

    #[test]
    fn consensus_mz_is_intensity_weighted() {
        let peaks = vec![peak(100.0, 10.0), peak(100.01, 30.0)];
        let clustered =
            cluster_peaks(&peaks, Tolerance::Da(0.02), IntensityAggregation::Max).unwrap();
        assert_eq!(clustered.cluster_count(), 1);
        let consensus = &clustered.consensus[0];
        assert!((consensus.mz - 100.0075).abs() < 1e-9);
        assert_eq!(consensus.intensity, 30.0);
    }

    #[test]
    fn ppm_tolerance_scales_with_mz() {
        let peaks = vec![
            peak(100.0, 1.0),
            peak(100.0009, 1.0),
            peak(1000.0, 1.0),
            peak(1000.009, 1.0),
        ];
        let clustered =
            cluster_peaks(&peaks, Tolerance::PPM(10.0), IntensityAggregation::Sum).unwrap();
        // 10 ppm is 0.001 at m/z 100 and 0.01 at m/z 1000
        assert_eq!(clustered.cluster_count(), 2);
        assert_eq!(clustered.assignments, vec![0, 0, 1, 1]);
    }

    #[test]
    fn equal_mz_ties_keep_input_order() {
        let peaks = vec![peak(100.0, 1.0), peak(100.0, 2.0), peak(100.0, 3.0)];
        let clustered =
            cluster_peaks(&peaks, Tolerance::Da(0.001), IntensityAggregation::Sum).unwrap();
        assert_eq!(clustered.members[0], vec![0, 1, 2]);
    }

    #[test]
    fn non_positive_tolerance_is_rejected() {
        let peaks = vec![peak(100.0, 1.0)];
        let error =
            cluster_peaks(&peaks, Tolerance::Da(0.0), IntensityAggregation::Sum).unwrap_err();
        assert_eq!(error, ClusteringError::NonPositiveTolerance(0.0));
    }

    #[test]
    fn non_finite_mz_is_rejected() {
        let peaks = vec![peak(f64::NAN, 1.0)];
        let error =
            cluster_peaks(&peaks, Tolerance::Da(0.01), IntensityAggregation::Sum).unwrap_err();
        assert_eq!(error, ClusteringError::NonFiniteMz(0));
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let clustered =
            cluster_peaks(&[], Tolerance::Da(0.01), IntensityAggregation::Sum).unwrap();
        assert!(clustered.is_empty());
        assert!(clustered.assignments.is_empty());
    }
}
