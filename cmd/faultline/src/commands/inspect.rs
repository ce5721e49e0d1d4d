//! Inspect command implementation.

use anyhow::{Context, Result};
use faultline_corpus::{FileStore, TraceStore};
use std::collections::BTreeMap;

/// Runs the inspect command.
pub async fn run(project: &str, data_dir: &str) -> Result<()> {
    let store = FileStore::new(data_dir);
    let spans = store
        .fetch_spans(project, usize::MAX)
        .await
        .with_context(|| format!("Failed to load spans for project {project}"))?;

    let trace_ids = spans.unique_trace_ids();

    println!("Project: {project}");
    println!("Spans: {}", spans.len());
    println!("Traces: {}", trace_ids.len());
    if let Some((start, end)) = spans.time_range() {
        println!("Time range: {start} to {end}");
    }

    let mut name_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for row in spans.iter() {
        if let Some(name) = row.name() {
            *name_counts.entry(name).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(&str, usize)> = name_counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    if !ranked.is_empty() {
        println!("Top span names:");
        for (name, count) in ranked.into_iter().take(5) {
            println!("  {count:>6}  {name}");
        }
    }

    Ok(())
}
