//! Unsupervised failure discovery over AI-agent execution traces.
//!
//! This crate provides:
//! - Feature extraction from tabular span data
//! - Badness scoring that fuses eval, tool, latency, and error signals
//! - Behavioral clustering and problematic-slice mining
//! - The pipeline that composes the stages into a `DiscoveryReport`
//!
//! # Example
//!
//! ```rust,ignore
//! use faultline_discovery::{run_discovery, DiscoveryConfig};
//!
//! let report = run_discovery(store, "my-project", 7, DiscoveryConfig::default()).await?;
//! println!("{}", report.summary());
//! for cluster in &report.clusters {
//!     println!("cluster {}: {:.1}% bad", cluster.cluster_id, cluster.badness_rate * 100.0);
//! }
//! ```

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]

pub mod badness;
pub mod cluster;
pub mod error;
pub mod features;
pub mod models;
pub mod pipeline;
pub mod slicing;
pub mod stats;

pub use badness::{compute_badness, compute_badness_batch, get_bad_trace_ids, BadnessWeights};
pub use cluster::{cluster_traces, ClusterMethod, ClusterMethodKind};
pub use error::{Error, Result};
pub use features::{build_feature_matrix, compute_tool_ngrams, extract_features};
pub use models::{BadnessScore, ClusterResult, DiscoveryReport, Slice, TraceFeatures};
pub use pipeline::{run_discovery, DiscoveryConfig, DiscoveryPipeline};
pub use slicing::{get_top_slices, rank_slices, SliceOptions};
pub use stats::{ChiSquaredTest, SignificanceTest};
