//! Clustering traces into behavioral groups.
//!
//! Traces embed into a scaled feature space (see
//! [`crate::features::build_feature_matrix`]); groups come from either a
//! density scan that leaves outliers unassigned or a seeded centroid
//! partition. Noise points never appear in results.

use crate::error::{Error, Result};
use crate::features::build_feature_matrix;
use crate::models::{BadnessScore, ClusterResult, TraceFeatures, BAD_THRESHOLD};
use linfa::traits::{Fit, Predict, Transformer};
use linfa::DatasetBase;
use linfa_clustering::{Dbscan, KMeans};
use ndarray::{Array1, Array2, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Fixed seed so identical inputs partition identically across runs.
pub const KMEANS_SEED: u64 = 42;
/// Default neighbor count for the density method.
pub const DEFAULT_MIN_SAMPLES: usize = 5;
/// Members reported as examples per cluster.
const EXAMPLE_COUNT: usize = 5;
/// Restarts for the final partition fit.
const FINAL_FIT_RUNS: usize = 10;
/// Restarts per elbow probe.
const ELBOW_PROBE_RUNS: usize = 5;

/// Clustering strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterMethod {
    /// Density-based scan; sparse points become noise.
    Density {
        /// Minimum members for a group to survive.
        min_cluster_size: usize,
        /// Neighbors required around a core point.
        min_samples: usize,
    },
    /// Seeded centroid partition into `k` groups, estimated when absent.
    Partition {
        /// Number of groups; `None` engages the elbow estimate.
        k: Option<usize>,
    },
}

/// Named clustering strategy for configuration surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClusterMethodKind {
    /// Density-based scan.
    #[default]
    #[serde(rename = "hdbscan", alias = "density")]
    Density,
    /// Seeded centroid partition.
    #[serde(rename = "kmeans", alias = "partition")]
    Partition,
}

/// Clusters traces by feature similarity.
///
/// Fewer than `min_cluster_size` traces is not an error: there is nothing to
/// group, so the result is empty. Output is sorted by badness rate
/// descending; member IDs keep input order.
///
/// # Errors
///
/// Returns an error only when the clustering backend rejects its input.
pub fn cluster_traces(
    features: &[TraceFeatures],
    scores: &BTreeMap<String, BadnessScore>,
    method: ClusterMethod,
    min_cluster_size: usize,
) -> Result<Vec<ClusterResult>> {
    if features.len() < min_cluster_size {
        warn!("Too few traces ({}) for clustering", features.len());
        return Ok(Vec::new());
    }

    let include_embedding = features.iter().any(|f| f.text_embedding.is_some());
    let x = build_feature_matrix(features, include_embedding);
    let x = standardize(&x);

    let labels = match method {
        ClusterMethod::Density {
            min_cluster_size: min_size,
            min_samples,
        } => {
            let labels = run_density(&x, min_size, min_samples)?;
            if labels.iter().all(Option::is_none) {
                warn!("Density scan left every point unassigned, falling back to partitioning");
                run_partition(&x, None)?
            } else {
                labels
            }
        }
        ClusterMethod::Partition { k } => run_partition(&x, k)?,
    };

    Ok(build_cluster_results(features, scores, &labels, &x))
}

/// Scales every column to zero mean and unit variance.
///
/// Constant columns are shifted but not scaled, so they contribute zeros
/// instead of NaNs.
fn standardize(x: &Array2<f64>) -> Array2<f64> {
    let Some(mean) = x.mean_axis(Axis(0)) else {
        return x.clone();
    };
    let std = x
        .std_axis(Axis(0), 0.0)
        .mapv(|s| if s > 0.0 { s } else { 1.0 });
    (x - &mean) / &std
}

/// Density clustering labels; `None` marks noise.
fn run_density(
    x: &Array2<f64>,
    min_cluster_size: usize,
    min_samples: usize,
) -> Result<Vec<Option<usize>>> {
    let min_samples = min_samples.max(1);
    let radius = neighborhood_radius(x, min_samples);
    debug!("Density scan: min_samples={min_samples}, radius={radius:.4}");

    let assignments = Dbscan::params(min_samples)
        .tolerance(radius)
        .transform(x)
        .map_err(|e| Error::Clustering(e.to_string()))?;

    let mut labels: Vec<Option<usize>> = assignments.iter().copied().collect();

    // Groups below the minimum size degrade to noise.
    let mut sizes: BTreeMap<usize, usize> = BTreeMap::new();
    for label in labels.iter().flatten() {
        *sizes.entry(*label).or_insert(0) += 1;
    }
    for label in &mut labels {
        if label.is_some_and(|l| sizes.get(&l).copied().unwrap_or(0) < min_cluster_size) {
            *label = None;
        }
    }

    Ok(labels)
}

/// The k-distance heuristic: median distance to the `min_samples`-th
/// neighbor. A zero median (duplicate-heavy data) widens to 1.0 so the scan
/// still connects identical points.
fn neighborhood_radius(x: &Array2<f64>, min_samples: usize) -> f64 {
    let n = x.nrows();
    if n <= min_samples {
        return 1.0;
    }

    let mut kth_distances: Vec<f64> = Vec::with_capacity(n);
    for i in 0..n {
        let mut distances: Vec<f64> = (0..n)
            .filter(|&j| j != i)
            .map(|j| {
                let diff = &x.row(i) - &x.row(j);
                diff.dot(&diff).sqrt()
            })
            .collect();
        distances.sort_by(f64::total_cmp);
        kth_distances.push(distances[min_samples - 1]);
    }

    kth_distances.sort_by(f64::total_cmp);
    let median = kth_distances[kth_distances.len() / 2];
    if median > 0.0 {
        median
    } else {
        1.0
    }
}

/// Partition labels; every point is assigned.
fn run_partition(x: &Array2<f64>, k: Option<usize>) -> Result<Vec<Option<usize>>> {
    let k = k.unwrap_or_else(|| estimate_k(x));
    debug!("Partitioning into k={k}");
    let (labels, _) = run_kmeans(x, k, FINAL_FIT_RUNS)?;
    Ok(labels.iter().map(|&label| Some(label)).collect())
}

/// Runs one seeded KMeans fit, returning labels and inertia.
fn run_kmeans(x: &Array2<f64>, k: usize, n_runs: usize) -> Result<(Array1<usize>, f64)> {
    let k = k.clamp(1, x.nrows());

    // Identical rows cannot seed distinct centroids; partition them
    // round-robin into k near-equal zero-inertia groups instead of handing
    // the backend a degenerate init.
    if x.rows().into_iter().all(|row| row == x.row(0)) {
        let labels = Array1::from_iter((0..x.nrows()).map(|i| i % k));
        return Ok((labels, 0.0));
    }

    let rng = ChaCha8Rng::seed_from_u64(KMEANS_SEED);
    let dataset = DatasetBase::from(x.clone());
    let model = KMeans::params_with_rng(k, rng)
        .n_runs(n_runs)
        .max_n_iterations(300)
        .fit(&dataset)
        .map_err(|e| Error::Clustering(e.to_string()))?;

    let labels: Array1<usize> = model.predict(x);
    let centroids = model.centroids();
    let inertia = labels
        .iter()
        .enumerate()
        .map(|(i, &label)| {
            let diff = &x.row(i) - &centroids.row(label);
            diff.dot(&diff)
        })
        .sum();

    Ok((labels, inertia))
}

/// Estimates k with the elbow rule over seeded probe fits.
fn estimate_k(x: &Array2<f64>) -> usize {
    let n = x.nrows();
    let max_k = (n / 5).min(10);

    // Fewer than three probes cannot show an elbow.
    if max_k < 4 {
        return 3;
    }

    let mut inertias = Vec::with_capacity(max_k - 1);
    for k in 2..=max_k {
        match run_kmeans(x, k, ELBOW_PROBE_RUNS) {
            Ok((_, inertia)) => inertias.push(inertia),
            Err(_) => return 3,
        }
    }

    let max = inertias.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = inertias.iter().copied().fold(f64::INFINITY, f64::min);
    if max - min <= 1e-9 * max.abs().max(1.0) {
        // Flat curve, no elbow to pick.
        return 3;
    }

    let diffs: Vec<f64> = inertias.windows(2).map(|w| w[1] - w[0]).collect();
    let second_diffs: Vec<f64> = diffs.windows(2).map(|w| w[1] - w[0]).collect();

    let mut argmax = 0;
    for (i, value) in second_diffs.iter().enumerate() {
        if *value > second_diffs[argmax] {
            argmax = i;
        }
    }

    (argmax + 2).clamp(2, max_k)
}

/// Assembles per-cluster stats from labels.
#[allow(clippy::cast_precision_loss)]
fn build_cluster_results(
    features: &[TraceFeatures],
    scores: &BTreeMap<String, BadnessScore>,
    labels: &[Option<usize>],
    x: &Array2<f64>,
) -> Vec<ClusterResult> {
    let unique_labels: BTreeSet<usize> = labels.iter().flatten().copied().collect();

    let mut clusters = Vec::new();
    for cluster_id in unique_labels {
        let member_indices: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, label)| **label == Some(cluster_id))
            .map(|(i, _)| i)
            .collect();

        let members: Vec<&TraceFeatures> =
            member_indices.iter().map(|&i| &features[i]).collect();
        let trace_ids: Vec<String> = members.iter().map(|f| f.trace_id.clone()).collect();

        let member_scores: Vec<f64> = trace_ids
            .iter()
            .filter_map(|id| scores.get(id).map(|s| s.score))
            .collect();
        let (avg_badness, badness_rate) = if member_scores.is_empty() {
            (0.5, 0.0)
        } else {
            let avg = member_scores.iter().sum::<f64>() / member_scores.len() as f64;
            let rate = member_scores.iter().filter(|&&s| s > BAD_THRESHOLD).count() as f64
                / member_scores.len() as f64;
            (avg, rate)
        };

        let centroid = centroid_of(x, &member_indices);
        let example_trace_ids = nearest_members(&members, x, &member_indices, &centroid);

        clusters.push(ClusterResult {
            cluster_id,
            size: trace_ids.len(),
            trace_ids,
            badness_rate,
            avg_badness,
            dominant_intent: plurality(members.iter().map(|f| f.intent.as_str())),
            dominant_route: plurality(members.iter().map(|f| f.route.as_str())),
            dominant_model: plurality(members.iter().map(|f| f.model.as_str())),
            example_trace_ids,
            centroid: centroid.to_vec(),
        });
    }

    clusters.sort_by(|a, b| b.badness_rate.total_cmp(&a.badness_rate));
    clusters
}

/// Mean of the member rows in scaled space.
#[allow(clippy::cast_precision_loss)]
fn centroid_of(x: &Array2<f64>, indices: &[usize]) -> Array1<f64> {
    let mut centroid = Array1::zeros(x.ncols());
    for &i in indices {
        centroid += &x.row(i);
    }
    centroid / indices.len().max(1) as f64
}

/// Up to [`EXAMPLE_COUNT`] members closest to the centroid by L2 distance.
fn nearest_members(
    members: &[&TraceFeatures],
    x: &Array2<f64>,
    indices: &[usize],
    centroid: &Array1<f64>,
) -> Vec<String> {
    if members.len() <= EXAMPLE_COUNT {
        return members.iter().map(|f| f.trace_id.clone()).collect();
    }

    let mut by_distance: Vec<(f64, &str)> = indices
        .iter()
        .zip(members.iter())
        .map(|(&i, f)| {
            let diff = &x.row(i) - centroid;
            (diff.dot(&diff).sqrt(), f.trace_id.as_str())
        })
        .collect();
    by_distance.sort_by(|a, b| a.0.total_cmp(&b.0));

    by_distance
        .into_iter()
        .take(EXAMPLE_COUNT)
        .map(|(_, id)| id.to_string())
        .collect()
}

/// Most common value, first-seen winning ties.
fn plurality<'a>(values: impl Iterator<Item = &'a str>) -> String {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(seen, _)| *seen == value) {
            Some((_, count)) => *count += 1,
            None => counts.push((value, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((value, count));
        }
    }
    best.map_or_else(|| "unknown".to_string(), |(value, _)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::badness::{compute_badness_batch, BadnessWeights};
    use ndarray::array;

    /// Two well-separated blobs: `slow-*` traces have huge latency and
    /// errors, `fast-*` traces are clean.
    fn blob_features() -> Vec<TraceFeatures> {
        let mut features = Vec::new();
        for i in 0..10 {
            let mut f = TraceFeatures::new(format!("fast-{i}"));
            f.total_latency_ms = 100.0;
            f.intent = "chitchat".to_string();
            f.quality_score = Some(1.0);
            features.push(f);
        }
        for i in 0..10 {
            let mut f = TraceFeatures::new(format!("slow-{i}"));
            f.total_latency_ms = 90_000.0;
            f.error_count = 3;
            f.intent = "research".to_string();
            f.quality_score = Some(0.0);
            features.push(f);
        }
        features
    }

    fn blob_scores(features: &[TraceFeatures]) -> BTreeMap<String, BadnessScore> {
        compute_badness_batch(features, &BadnessWeights::default())
    }

    #[test]
    fn too_few_traces_cluster_to_nothing() {
        let features = vec![TraceFeatures::new("a"), TraceFeatures::new("b")];
        let clusters = cluster_traces(
            &features,
            &BTreeMap::new(),
            ClusterMethod::Partition { k: Some(2) },
            10,
        )
        .unwrap();
        assert!(clusters.is_empty());
    }

    #[test]
    fn standardize_centers_and_scales() {
        let x = array![[1.0, 5.0], [3.0, 5.0]];
        let scaled = standardize(&x);

        // First column: mean 2, std 1 -> [-1, 1]. Second column is constant
        // and must scale to zeros, not NaNs.
        assert!((scaled[[0, 0]] + 1.0).abs() < 1e-9);
        assert!((scaled[[1, 0]] - 1.0).abs() < 1e-9);
        assert!(scaled[[0, 1]].abs() < 1e-9);
        assert!(scaled.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn flat_inertia_curve_estimates_three() {
        let x = Array2::zeros((30, 4));
        assert_eq!(estimate_k(&x), 3);
    }

    #[test]
    fn partition_separates_blobs() {
        let features = blob_features();
        let scores = blob_scores(&features);

        let clusters = cluster_traces(
            &features,
            &scores,
            ClusterMethod::Partition { k: Some(2) },
            5,
        )
        .unwrap();

        assert_eq!(clusters.len(), 2);
        for cluster in &clusters {
            assert_eq!(cluster.trace_ids.len(), cluster.size);
            assert_eq!(cluster.size, 10);
            assert!(cluster.example_trace_ids.len() <= 5);
            for example in &cluster.example_trace_ids {
                assert!(cluster.trace_ids.contains(example));
            }
        }

        // Worst cluster first, and it is the slow/error blob.
        assert!(clusters[0].badness_rate >= clusters[1].badness_rate);
        assert_eq!(clusters[0].dominant_intent, "research");
        assert!(clusters[0].trace_ids.iter().all(|id| id.starts_with("slow-")));
    }

    #[test]
    fn density_separates_blobs_and_matches_partition_determinism() {
        let features = blob_features();
        let scores = blob_scores(&features);
        let method = ClusterMethod::Density {
            min_cluster_size: 5,
            min_samples: 3,
        };

        let first = cluster_traces(&features, &scores, method, 5).unwrap();
        let second = cluster_traces(&features, &scores, method, 5).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert!(first[0].badness_rate >= first[1].badness_rate);
    }

    #[test]
    fn identical_features_partition_into_equal_groups() {
        let features: Vec<TraceFeatures> = (0..30)
            .map(|i| TraceFeatures::new(format!("t-{i}")))
            .collect();
        let scores = blob_scores(&features);

        let clusters =
            cluster_traces(&features, &scores, ClusterMethod::Partition { k: None }, 10).unwrap();

        // A flat inertia curve falls back to k = 3, and the degenerate fit
        // spreads the rows into three equal groups.
        assert_eq!(clusters.len(), 3);
        let batch_rate = scores.values().filter(|s| s.is_bad()).count() as f64 / 30.0;
        for cluster in &clusters {
            assert_eq!(cluster.size, 10);
            assert_eq!(cluster.trace_ids.len(), cluster.size);
            // Every group shares the batch's badness rate.
            assert!((cluster.badness_rate - batch_rate).abs() < 1e-9);
        }
    }

    #[test]
    fn member_order_is_input_order() {
        let features = blob_features();
        let scores = blob_scores(&features);

        let clusters = cluster_traces(
            &features,
            &scores,
            ClusterMethod::Partition { k: Some(2) },
            5,
        )
        .unwrap();

        for cluster in &clusters {
            let mut sorted = cluster.trace_ids.clone();
            sorted.sort();
            // Input order for a blob is fast-0..9 / slow-0..9, which is
            // already lexicographic.
            assert_eq!(cluster.trace_ids, sorted);
        }
    }

    #[test]
    fn plurality_breaks_ties_by_first_seen() {
        assert_eq!(plurality(["b", "a", "a", "b"].into_iter()), "b");
        assert_eq!(plurality(["x"].into_iter()), "x");
        assert_eq!(plurality(std::iter::empty()), "unknown");
    }

    #[test]
    fn avg_badness_matches_member_mean() {
        let features = blob_features();
        let scores = blob_scores(&features);
        let clusters = cluster_traces(
            &features,
            &scores,
            ClusterMethod::Partition { k: Some(2) },
            5,
        )
        .unwrap();

        for cluster in &clusters {
            let expected: f64 = cluster
                .trace_ids
                .iter()
                .map(|id| scores[id].score)
                .sum::<f64>()
                / cluster.size as f64;
            assert!((cluster.avg_badness - expected).abs() < 1e-9);
        }
    }
}
