//! Slice mining: attribute conjunctions with elevated badness.
//!
//! Enumerates depth-1 and depth-2 combinations of the categorical
//! attributes, groups traces by their value tuples, and keeps the groups
//! whose badness rate is statistically above the population baseline.

use crate::models::{BadnessScore, Slice, TraceFeatures, BAD_THRESHOLD};
use crate::stats::SignificanceTest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Attributes sliced on when the caller does not choose.
pub const DEFAULT_SLICE_ATTRIBUTES: [&str; 4] = ["intent", "route", "model", "prompt_version"];

/// Lift substituted denominator when the population has no bad traces.
const BASELINE_EPSILON: f64 = 0.001;

/// Mining parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SliceOptions {
    /// Attribute names to slice on.
    pub attributes: Vec<String>,
    /// Minimum traces per slice.
    pub min_slice_size: usize,
    /// Maximum attributes per conjunction (1 or 2).
    pub max_slice_depth: usize,
    /// p-value cutoff for the significance filter.
    pub significance_threshold: f64,
}

impl Default for SliceOptions {
    fn default() -> Self {
        Self {
            attributes: DEFAULT_SLICE_ATTRIBUTES
                .iter()
                .map(ToString::to_string)
                .collect(),
            min_slice_size: 10,
            max_slice_depth: 2,
            significance_threshold: 0.05,
        }
    }
}

impl SliceOptions {
    /// Sets the attribute list.
    #[must_use]
    pub fn with_attributes(mut self, attributes: Vec<String>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Sets the minimum slice size.
    #[must_use]
    pub const fn with_min_slice_size(mut self, min_slice_size: usize) -> Self {
        self.min_slice_size = min_slice_size;
        self
    }

    /// Sets the maximum conjunction depth.
    #[must_use]
    pub const fn with_max_slice_depth(mut self, max_slice_depth: usize) -> Self {
        self.max_slice_depth = max_slice_depth;
        self
    }

    /// Sets the significance threshold.
    #[must_use]
    pub const fn with_significance_threshold(mut self, threshold: f64) -> Self {
        self.significance_threshold = threshold;
        self
    }
}

/// Finds attribute combinations that correlate with bad outcomes.
///
/// Returns slices sorted by lift descending. When no slice clears the
/// significance threshold every candidate is returned instead, so callers
/// can still see the (unconvincing) landscape; `Slice::is_significant`
/// distinguishes the two cases.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rank_slices(
    features: &[TraceFeatures],
    scores: &BTreeMap<String, BadnessScore>,
    options: &SliceOptions,
    test: &dyn SignificanceTest,
) -> Vec<Slice> {
    let all_scores: Vec<f64> = features
        .iter()
        .filter_map(|f| scores.get(&f.trace_id).map(|s| s.score))
        .collect();
    if all_scores.is_empty() {
        return Vec::new();
    }

    let pop_total = all_scores.len();
    let pop_bad = all_scores.iter().filter(|&&s| s > BAD_THRESHOLD).count();
    let mut baseline = pop_bad as f64 / pop_total as f64;
    if baseline == 0.0 {
        // Keep lift defined when nothing is bad.
        baseline = BASELINE_EPSILON;
    }

    let mut candidates = Vec::new();
    for depth in 1..=options.max_slice_depth.min(options.attributes.len()) {
        for combo in combinations(&options.attributes, depth) {
            for (key, trace_ids) in group_by_attributes(features, &combo) {
                if trace_ids.len() < options.min_slice_size {
                    continue;
                }

                let slice_scores: Vec<f64> = trace_ids
                    .iter()
                    .filter_map(|id| scores.get(id).map(|s| s.score))
                    .collect();
                if slice_scores.is_empty() {
                    continue;
                }

                let slice_total = slice_scores.len();
                let slice_bad = slice_scores.iter().filter(|&&s| s > BAD_THRESHOLD).count();
                let badness_rate = slice_bad as f64 / slice_total as f64;

                let p_value = significance(test, slice_bad, slice_total, pop_bad, pop_total);

                candidates.push(Slice {
                    attributes: combo
                        .iter()
                        .map(ToString::to_string)
                        .zip(key)
                        .collect(),
                    size: trace_ids.len(),
                    trace_ids,
                    badness_rate,
                    baseline_rate: baseline,
                    lift: badness_rate / baseline,
                    p_value,
                });
            }
        }
    }

    let significant: Vec<Slice> = candidates
        .iter()
        .filter(|s| s.p_value < options.significance_threshold)
        .cloned()
        .collect();

    let mut ranked = if significant.is_empty() {
        debug!("No significant slices, returning all {} candidates", candidates.len());
        candidates
    } else {
        significant
    };

    ranked.sort_by(|a, b| b.lift.total_cmp(&a.lift));
    ranked
}

/// Keeps the first `n` slices whose lift clears the floor.
#[must_use]
pub fn get_top_slices(slices: &[Slice], n: usize, min_lift: f64) -> Vec<Slice> {
    slices
        .iter()
        .filter(|s| s.lift >= min_lift)
        .take(n)
        .cloned()
        .collect()
}

/// Groups trace IDs by their tuple of attribute values.
///
/// Group keys iterate in sorted order; member IDs keep feature order.
fn group_by_attributes(
    features: &[TraceFeatures],
    attributes: &[&String],
) -> BTreeMap<Vec<String>, Vec<String>> {
    let mut groups: BTreeMap<Vec<String>, Vec<String>> = BTreeMap::new();
    for f in features {
        let key: Vec<String> = attributes
            .iter()
            .map(|name| f.attribute(name).to_string())
            .collect();
        groups.entry(key).or_default().push(f.trace_id.clone());
    }
    groups
}

/// Runs the significance test, guarding the degenerate arithmetic.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn significance(
    test: &dyn SignificanceTest,
    slice_bad: usize,
    slice_total: usize,
    pop_bad: usize,
    pop_total: usize,
) -> f64 {
    if slice_total == 0 || pop_total == 0 {
        return 1.0;
    }

    let slice_good = slice_total - slice_bad;
    let rest_bad = pop_bad as i64 - slice_bad as i64;
    let rest_good = (pop_total as i64 - slice_total as i64) - rest_bad;
    if rest_bad < 0 || rest_good < 0 {
        return 1.0;
    }

    test.p_value(
        slice_bad as u64,
        slice_good as u64,
        rest_bad as u64,
        rest_good as u64,
    )
}

/// All size-`depth` combinations of `items`, preserving list order.
fn combinations<'a>(items: &'a [String], depth: usize) -> Vec<Vec<&'a String>> {
    let mut result = Vec::new();
    let mut current = Vec::new();
    combine(items, depth, 0, &mut current, &mut result);
    result
}

fn combine<'a>(
    items: &'a [String],
    depth: usize,
    start: usize,
    current: &mut Vec<&'a String>,
    result: &mut Vec<Vec<&'a String>>,
) {
    if current.len() == depth {
        result.push(current.clone());
        return;
    }
    for i in start..items.len() {
        current.push(&items[i]);
        combine(items, depth, i + 1, current, result);
        current.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::ChiSquaredTest;

    fn feature(id: &str, intent: &str) -> TraceFeatures {
        let mut f = TraceFeatures::new(id);
        f.intent = intent.to_string();
        f
    }

    fn score(id: &str, value: f64) -> (String, BadnessScore) {
        (
            id.to_string(),
            BadnessScore {
                trace_id: id.to_string(),
                score: value,
                signals: BTreeMap::new(),
            },
        )
    }

    /// 20 bad research traces, 40 good chitchat traces.
    fn skewed_population() -> (Vec<TraceFeatures>, BTreeMap<String, BadnessScore>) {
        let mut features = Vec::new();
        let mut scores = BTreeMap::new();
        for i in 0..20 {
            let id = format!("research-{i}");
            features.push(feature(&id, "research"));
            scores.extend([score(&id, 0.8)]);
        }
        for i in 0..40 {
            let id = format!("chitchat-{i}");
            features.push(feature(&id, "chitchat"));
            scores.extend([score(&id, 0.1)]);
        }
        (features, scores)
    }

    #[test]
    fn elevated_intent_slice_leads_with_triple_lift() {
        let (features, scores) = skewed_population();
        let options = SliceOptions::default().with_max_slice_depth(1);

        let slices = rank_slices(&features, &scores, &options, &ChiSquaredTest);

        let research = &slices[0];
        assert_eq!(
            research.attributes,
            vec![("intent".to_string(), "research".to_string())]
        );
        assert!((research.badness_rate - 1.0).abs() < 1e-9);
        assert!((research.baseline_rate - 1.0 / 3.0).abs() < 1e-9);
        assert!((research.lift - 3.0).abs() < 1e-9);
        assert!(research.p_value < 0.001);
        assert!(research.is_significant());

        // Lifts are non-increasing.
        for pair in slices.windows(2) {
            assert!(pair[0].lift >= pair[1].lift);
        }
    }

    #[test]
    fn lift_is_exactly_rate_over_baseline() {
        let (features, scores) = skewed_population();
        let slices = rank_slices(&features, &scores, &SliceOptions::default(), &ChiSquaredTest);

        for slice in &slices {
            assert!((slice.lift - slice.badness_rate / slice.baseline_rate).abs() < 1e-9);
        }
    }

    #[test]
    fn all_unknown_population_falls_back_to_insignificant_slices() {
        // Identical attributes everywhere: every slice covers the whole
        // population, every test is degenerate, and the fallback keeps the
        // candidates with lift 1.
        let mut features = Vec::new();
        let mut scores = BTreeMap::new();
        for i in 0..30 {
            let id = format!("t-{i}");
            features.push(feature(&id, "unknown"));
            scores.extend([score(&id, if i < 10 { 0.9 } else { 0.1 })]);
        }

        let slices = rank_slices(&features, &scores, &SliceOptions::default(), &ChiSquaredTest);

        // 4 depth-1 combos + 6 depth-2 combos.
        assert_eq!(slices.len(), 10);
        for slice in &slices {
            assert_eq!(slice.size, 30);
            assert!((slice.badness_rate - slice.baseline_rate).abs() < 1e-9);
            assert!((slice.lift - 1.0).abs() < 1e-9);
            assert!((slice.p_value - 1.0).abs() < 1e-9);
            assert!(!slice.is_significant());
        }
    }

    #[test]
    fn uniformly_bad_population_has_unit_lift() {
        let mut features = Vec::new();
        let mut scores = BTreeMap::new();
        for i in 0..20 {
            let id = format!("r-{i}");
            features.push(feature(&id, "research"));
            scores.extend([score(&id, 0.9)]);
        }
        for i in 0..20 {
            let id = format!("c-{i}");
            features.push(feature(&id, "chitchat"));
            scores.extend([score(&id, 0.9)]);
        }

        let slices = rank_slices(&features, &scores, &SliceOptions::default(), &ChiSquaredTest);

        assert!(!slices.is_empty());
        for slice in &slices {
            assert!((slice.baseline_rate - 1.0).abs() < 1e-9);
            assert!((slice.lift - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn zero_baseline_is_substituted() {
        let mut features = Vec::new();
        let mut scores = BTreeMap::new();
        for i in 0..20 {
            let id = format!("t-{i}");
            features.push(feature(&id, "research"));
            scores.extend([score(&id, 0.1)]);
        }

        let slices = rank_slices(&features, &scores, &SliceOptions::default(), &ChiSquaredTest);

        for slice in &slices {
            assert!((slice.baseline_rate - 0.001).abs() < 1e-12);
            assert!(slice.lift.abs() < 1e-9);
        }
    }

    #[test]
    fn small_groups_are_skipped() {
        let (features, scores) = skewed_population();
        let options = SliceOptions::default()
            .with_max_slice_depth(1)
            .with_min_slice_size(25);

        let slices = rank_slices(&features, &scores, &options, &ChiSquaredTest);

        // Only the 40-strong chitchat group survives the size floor (the
        // all-unknown route/model/prompt_version groups cover everyone).
        assert!(slices
            .iter()
            .all(|s| s.size >= 25));
        assert!(slices
            .iter()
            .any(|s| s.attributes == vec![("intent".to_string(), "chitchat".to_string())]));
    }

    #[test]
    fn combination_enumeration_preserves_order() {
        let items: Vec<String> = ["a", "b", "c"].iter().map(ToString::to_string).collect();

        let singles = combinations(&items, 1);
        assert_eq!(singles.len(), 3);

        let pairs = combinations(&items, 2);
        let rendered: Vec<String> = pairs
            .iter()
            .map(|combo| {
                combo
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join("+")
            })
            .collect();
        assert_eq!(rendered, vec!["a+b", "a+c", "b+c"]);
    }

    #[test]
    fn top_slice_filter_applies_floor_and_count() {
        let (features, scores) = skewed_population();
        let slices = rank_slices(&features, &scores, &SliceOptions::default(), &ChiSquaredTest);

        let top = get_top_slices(&slices, 1, 2.0);
        assert_eq!(top.len(), 1);
        assert!(top[0].lift >= 2.0);

        assert!(get_top_slices(&slices, 10, 100.0).is_empty());
    }
}
