//! Discovery pipeline orchestration.
//!
//! The pipeline is synchronous between its three I/O points (span fetch,
//! annotation fetch, embedding calls); every stage hands immutable values to
//! the next. Dropping the returned future at an await point cancels the run
//! without producing a partial report.
//!
//! Clustering and slicing are CPU-bound and can run for seconds on large
//! batches. Async hosts should drive [`DiscoveryPipeline::run`] from a small
//! dedicated worker pool rather than their event loop.

use crate::badness::{compute_badness_batch, BadnessWeights};
use crate::cluster::{cluster_traces, ClusterMethod, ClusterMethodKind, DEFAULT_MIN_SAMPLES};
use crate::error::{Error, Result};
use crate::features::{embedding_text, extract_features};
use crate::models::{DiscoveryReport, TraceFeatures};
use crate::slicing::{rank_slices, SliceOptions, DEFAULT_SLICE_ATTRIBUTES};
use crate::stats::ChiSquaredTest;
use chrono::{DateTime, Duration, Utc};
use faultline_corpus::TraceStore;
use faultline_embed::Embedder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Slices reported at most per run.
const TOP_SLICE_COUNT: usize = 20;

/// Configuration for the discovery pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Clustering strategy.
    pub cluster_method: ClusterMethodKind,
    /// Minimum traces per cluster.
    pub min_cluster_size: usize,
    /// Forced group count for partitioning; estimated when absent.
    pub n_clusters: Option<usize>,

    /// Attributes to slice on.
    pub slice_attributes: Vec<String>,
    /// Minimum traces per slice.
    pub min_slice_size: usize,
    /// Maximum attributes per slice conjunction (1 or 2).
    pub max_slice_depth: usize,
    /// p-value cutoff for slice significance.
    pub significance_threshold: f64,

    /// Weights for the badness signals.
    pub badness_weights: BadnessWeights,

    /// Embedding model identifier.
    pub embedding_model: String,
    /// Skips the embedding phase entirely.
    pub skip_embeddings: bool,

    /// Fewer feature-bearing traces than this aborts the run.
    pub min_traces: usize,
    /// More traces than this are truncated in first-seen order.
    pub max_traces: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            cluster_method: ClusterMethodKind::Density,
            min_cluster_size: 10,
            n_clusters: None,
            slice_attributes: DEFAULT_SLICE_ATTRIBUTES
                .iter()
                .map(ToString::to_string)
                .collect(),
            min_slice_size: 10,
            max_slice_depth: 2,
            significance_threshold: 0.05,
            badness_weights: BadnessWeights::default(),
            embedding_model: faultline_embed::DEFAULT_MODEL.to_string(),
            skip_embeddings: false,
            min_traces: 50,
            max_traces: 10_000,
        }
    }
}

impl DiscoveryConfig {
    /// Sets the clustering strategy.
    #[must_use]
    pub const fn with_cluster_method(mut self, method: ClusterMethodKind) -> Self {
        self.cluster_method = method;
        self
    }

    /// Sets the minimum trace gate.
    #[must_use]
    pub const fn with_min_traces(mut self, min_traces: usize) -> Self {
        self.min_traces = min_traces;
        self
    }

    /// Sets the minimum cluster size.
    #[must_use]
    pub const fn with_min_cluster_size(mut self, min_cluster_size: usize) -> Self {
        self.min_cluster_size = min_cluster_size;
        self
    }

    /// Disables the embedding phase.
    #[must_use]
    pub const fn without_embeddings(mut self) -> Self {
        self.skip_embeddings = true;
        self
    }

    /// The cluster method variant this configuration selects.
    #[must_use]
    pub const fn cluster_method(&self) -> ClusterMethod {
        match self.cluster_method {
            ClusterMethodKind::Density => ClusterMethod::Density {
                min_cluster_size: self.min_cluster_size,
                min_samples: DEFAULT_MIN_SAMPLES,
            },
            ClusterMethodKind::Partition => ClusterMethod::Partition { k: self.n_clusters },
        }
    }
}

/// Pipeline for unsupervised failure discovery.
///
/// Fetches traces from the store, extracts features, scores badness,
/// clusters, and mines slices into one report.
pub struct DiscoveryPipeline {
    store: Box<dyn TraceStore>,
    embedder: Option<Arc<dyn Embedder>>,
    config: DiscoveryConfig,
}

impl DiscoveryPipeline {
    /// Creates a pipeline over the given store.
    #[must_use]
    pub fn new(store: Box<dyn TraceStore>, config: DiscoveryConfig) -> Self {
        Self {
            store,
            embedder: None,
            config,
        }
    }

    /// Attaches an embedding provider.
    #[must_use]
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Runs the full discovery pipeline.
    ///
    /// `end_time` defaults to now; `start_time` defaults to
    /// `end_time - days_back`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InsufficientData` when a gate finds fewer traces than
    /// `min_traces`, or a store error when the span fetch fails. Annotation
    /// and embedding failures degrade instead of aborting.
    #[allow(clippy::cast_precision_loss)]
    pub async fn run(
        &self,
        project: &str,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        days_back: i64,
    ) -> Result<DiscoveryReport> {
        let end_time = end_time.unwrap_or_else(Utc::now);
        let start_time = start_time.unwrap_or(end_time - Duration::days(days_back));

        info!("Running discovery for {project} from {start_time} to {end_time}");

        let spans = self
            .store
            .fetch_spans(project, self.config.max_traces.saturating_mul(10))
            .await?;
        if spans.is_empty() {
            return Err(Error::InsufficientData(format!(
                "no spans found for project {project}"
            )));
        }

        let mut trace_ids = spans.unique_trace_ids();
        info!("Found {} unique traces", trace_ids.len());

        if trace_ids.len() < self.config.min_traces {
            return Err(Error::InsufficientData(format!(
                "need at least {} traces, found {}",
                self.config.min_traces,
                trace_ids.len()
            )));
        }
        trace_ids.truncate(self.config.max_traces);

        let annotations = match self.store.fetch_annotations(project).await {
            Ok(annotations) => annotations,
            Err(e) => {
                warn!("Failed to fetch annotations: {e}, continuing without them");
                None
            }
        };

        info!("Extracting features...");
        let mut features: Vec<TraceFeatures> = trace_ids
            .iter()
            .filter_map(|trace_id| extract_features(&spans, trace_id, annotations.as_ref()))
            .collect();
        info!("Extracted features for {} traces", features.len());

        if features.len() < self.config.min_traces {
            return Err(Error::InsufficientData(format!(
                "need at least {} traces with features, got {}",
                self.config.min_traces,
                features.len()
            )));
        }

        if self.config.skip_embeddings {
            info!("Skipping embeddings (disabled in config)");
        } else if let Some(embedder) = &self.embedder {
            info!("Computing embeddings...");
            attach_embeddings(&mut features, embedder.as_ref()).await;
        } else {
            warn!("No embedding provider configured, skipping embeddings");
        }

        info!("Computing badness scores...");
        let scores = compute_badness_batch(&features, &self.config.badness_weights);

        info!("Clustering traces...");
        let clusters = cluster_traces(
            &features,
            &scores,
            self.config.cluster_method(),
            self.config.min_cluster_size,
        )?;
        info!("Found {} clusters", clusters.len());

        info!("Ranking slices...");
        let slice_options = SliceOptions::default()
            .with_attributes(self.config.slice_attributes.clone())
            .with_min_slice_size(self.config.min_slice_size)
            .with_max_slice_depth(self.config.max_slice_depth)
            .with_significance_threshold(self.config.significance_threshold);
        let mut slices = rank_slices(&features, &scores, &slice_options, &ChiSquaredTest);
        info!("Found {} slices", slices.len());
        slices.truncate(TOP_SLICE_COUNT);

        let baseline_badness =
            scores.values().map(|s| s.score).sum::<f64>() / scores.len() as f64;
        let num_bad_traces = scores.values().filter(|s| s.is_bad()).count();

        let report = DiscoveryReport::new(
            project,
            (start_time, end_time),
            features.len(),
            baseline_badness,
            clusters,
            slices,
            num_bad_traces,
        );

        info!(
            "Discovery complete: {} clusters, {} significant slices",
            report.num_clusters, report.num_significant_slices
        );

        Ok(report)
    }
}

/// Attaches embeddings in place.
///
/// A terminal provider error (disabled, bad credential) abandons the phase;
/// any other per-trace failure substitutes the zero vector so one flaky call
/// cannot abort the run.
async fn attach_embeddings(features: &mut [TraceFeatures], embedder: &dyn Embedder) {
    let dimension = embedder.dimension();
    for f in features.iter_mut() {
        let text = embedding_text(f);
        match embedder.embed(&text).await {
            Ok(vector) => f.text_embedding = Some(vector),
            Err(e) if e.is_terminal() => {
                warn!("Embedding provider unavailable: {e}, continuing without embeddings");
                return;
            }
            Err(e) => {
                warn!("Embedding failed for trace {}: {e}", f.trace_id);
                f.text_embedding = Some(vec![0.0; dimension]);
            }
        }
    }
}

/// Runs discovery with the given store and configuration.
///
/// # Errors
///
/// See [`DiscoveryPipeline::run`].
pub async fn run_discovery(
    store: Box<dyn TraceStore>,
    project: &str,
    days_back: i64,
    config: DiscoveryConfig,
) -> Result<DiscoveryReport> {
    DiscoveryPipeline::new(store, config)
        .run(project, None, None, days_back)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use faultline_corpus::{
        columns, AnnotationRow, AnnotationTable, MemoryStore, SpanRow, SpanTable,
    };
    use faultline_embed::DisabledEmbedder;

    /// 20 failing research traces (3 error spans each, quality 0) and 40
    /// clean chitchat traces (quality 1).
    fn skewed_tables() -> (SpanTable, AnnotationTable) {
        let mut spans = SpanTable::new();
        let mut annotations = AnnotationTable::new();

        for i in 0..60 {
            let (intent, quality, errors) = if i < 20 {
                ("research", 0.0, 3)
            } else {
                ("chitchat", 1.0, 0)
            };
            let trace_id = format!("t-{i:02}");
            let root_id = format!("{trace_id}-root");

            spans.push(
                SpanRow::new()
                    .with(columns::TRACE_ID, trace_id.clone())
                    .with(columns::SPAN_ID, root_id.clone())
                    .with(columns::NAME, "session")
                    .with(columns::SPAN_KIND, "CHAIN")
                    .with(columns::START_TIME, format!("2026-03-01T12:{i:02}:00Z"))
                    .with(columns::INPUT_VALUE, intent),
            );
            for e in 0..errors {
                spans.push(
                    SpanRow::new()
                        .with(columns::TRACE_ID, trace_id.clone())
                        .with(columns::SPAN_ID, format!("{trace_id}-step-{e}"))
                        .with(columns::PARENT_ID, root_id.clone())
                        .with(columns::NAME, "step")
                        .with(columns::SPAN_KIND, "CHAIN")
                        .with(columns::STATUS_CODE, "ERROR"),
                );
            }
            annotations.push(AnnotationRow::new(root_id, "answer_quality", quality));
        }

        (spans, annotations)
    }

    fn pipeline_over(spans: SpanTable, annotations: Option<AnnotationTable>) -> DiscoveryPipeline {
        DiscoveryPipeline::new(
            Box::new(MemoryStore::new(spans, annotations)),
            DiscoveryConfig::default().without_embeddings(),
        )
    }

    #[tokio::test]
    async fn empty_store_is_insufficient_data() {
        let pipeline = pipeline_over(SpanTable::new(), None);
        let err = pipeline.run("demo", None, None, 7).await.unwrap_err();
        assert!(matches!(err, Error::InsufficientData(_)));
    }

    #[tokio::test]
    async fn below_gate_is_insufficient_data() {
        let mut spans = SpanTable::new();
        for i in 0..10 {
            spans.push(
                SpanRow::new()
                    .with(columns::TRACE_ID, format!("t-{i}"))
                    .with(columns::SPAN_ID, format!("s-{i}"))
                    .with(columns::NAME, "session"),
            );
        }

        let pipeline = pipeline_over(spans, None);
        let err = pipeline.run("demo", None, None, 7).await.unwrap_err();
        assert!(matches!(err, Error::InsufficientData(_)));
    }

    #[tokio::test]
    async fn discovers_failing_slice_end_to_end() {
        let (spans, annotations) = skewed_tables();
        let pipeline = pipeline_over(spans, Some(annotations));

        let report = pipeline.run("demo", None, None, 7).await.unwrap();

        assert_eq!(report.total_traces, 60);
        assert_eq!(report.num_bad_traces, 20);
        // (20 * 0.6 + 40 * 0.1) / 60
        assert!((report.baseline_badness - 16.0 / 60.0).abs() < 1e-9);

        // The error-heavy research blob separates from the clean one.
        assert_eq!(report.num_clusters, 2);
        assert!((report.clusters[0].badness_rate - 1.0).abs() < 1e-9);
        assert_eq!(report.clusters[0].size, 20);
        assert!(report.clusters[0].badness_rate >= report.clusters[1].badness_rate);

        let worst = report.worst_slice().unwrap();
        assert_eq!(
            worst.attributes,
            vec![("intent".to_string(), "research".to_string())]
        );
        assert!((worst.lift - 3.0).abs() < 1e-9);
        assert!(worst.p_value < 0.001);
        assert!(report.top_slices.len() <= 20);
    }

    #[tokio::test]
    async fn repeated_runs_are_identical() {
        let (spans, annotations) = skewed_tables();
        let pipeline = pipeline_over(spans, Some(annotations));

        let first = pipeline.run("demo", None, None, 7).await.unwrap();
        let second = pipeline.run("demo", None, None, 7).await.unwrap();

        assert_eq!(first.clusters, second.clusters);
        assert_eq!(first.top_slices, second.top_slices);
        assert!((first.baseline_badness - second.baseline_badness).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn annotation_fetch_failure_degrades_to_neutral_evals() {
        /// Serves spans but refuses annotations.
        struct NoAnnotations(MemoryStore);

        #[async_trait]
        impl TraceStore for NoAnnotations {
            async fn fetch_spans(
                &self,
                project: &str,
                limit: usize,
            ) -> faultline_corpus::Result<SpanTable> {
                self.0.fetch_spans(project, limit).await
            }

            async fn fetch_annotations(
                &self,
                _project: &str,
            ) -> faultline_corpus::Result<Option<AnnotationTable>> {
                Err(faultline_corpus::Error::FetchFailed(
                    "annotation backend down".to_string(),
                ))
            }
        }

        let (spans, _) = skewed_tables();
        let pipeline = DiscoveryPipeline::new(
            Box::new(NoAnnotations(MemoryStore::new(spans, None))),
            DiscoveryConfig::default().without_embeddings(),
        );

        let report = pipeline.run("demo", None, None, 7).await.unwrap();
        // Without evals only the error spans separate the populations:
        // research traces sit at 0.45, nothing crosses the bad threshold.
        assert_eq!(report.num_bad_traces, 0);
        assert_eq!(report.total_traces, 60);
    }

    #[tokio::test]
    async fn disabled_embedder_does_not_abort_the_run() {
        let (spans, annotations) = skewed_tables();
        let pipeline = DiscoveryPipeline::new(
            Box::new(MemoryStore::new(spans, Some(annotations))),
            DiscoveryConfig::default(),
        )
        .with_embedder(Arc::new(DisabledEmbedder::default()));

        let report = pipeline.run("demo", None, None, 7).await.unwrap();
        assert_eq!(report.total_traces, 60);
    }

    #[tokio::test]
    async fn time_range_resolution_uses_days_back() {
        let (spans, annotations) = skewed_tables();
        let pipeline = pipeline_over(spans, Some(annotations));

        let end = Utc.with_ymd_and_hms(2026, 3, 8, 0, 0, 0).unwrap();
        let report = pipeline.run("demo", None, Some(end), 7).await.unwrap();

        assert_eq!(report.time_range.1, end);
        assert_eq!(report.time_range.0, end - Duration::days(7));
    }

    #[test]
    fn config_yaml_round_trip() {
        let yaml = "cluster_method: kmeans\nmin_traces: 5\nn_clusters: 4\nskip_embeddings: true\n";
        let config: DiscoveryConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.cluster_method, ClusterMethodKind::Partition);
        assert_eq!(config.min_traces, 5);
        assert_eq!(config.n_clusters, Some(4));
        assert!(config.skip_embeddings);
        // Untouched fields keep their defaults.
        assert_eq!(config.max_traces, 10_000);
        assert_eq!(config.min_cluster_size, 10);
    }
}
