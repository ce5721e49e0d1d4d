//! Feature extraction from span tables.
//!
//! Turns the wide span table of one trace into a `TraceFeatures` record:
//! text, tool sequence, scalar metrics, and the categorical attributes used
//! for slicing. Extraction never fails; missing columns degrade the affected
//! signal to its neutral default.

use crate::models::TraceFeatures;
use faultline_corpus::columns;
use faultline_corpus::{AnnotationTable, SpanRow, SpanTable};
use ndarray::Array2;
use std::collections::BTreeMap;

/// Width of the scalar feature block.
pub const SCALAR_FEATURES: usize = 9;
/// Number of globally most frequent n-grams kept in the matrix.
pub const NGRAM_FEATURES: usize = 20;
/// Maximum characters kept in the derived intent attribute.
const MAX_INTENT_CHARS: usize = 50;

/// Read-only view of one trace's rows, shared by the extraction strategies.
struct TraceView<'a> {
    root: &'a SpanRow,
    rows: &'a [&'a SpanRow],
    unique_tools: &'a [String],
}

/// One attribute-extraction strategy; strategies compose into ordered
/// fallback cascades.
type ExtractFn = for<'a> fn(&TraceView<'a>) -> Option<String>;

/// Intent sources, most specific first.
const INTENT_SOURCES: &[ExtractFn] = &[
    intent_from_orchestrator_inputs,
    intent_from_input_value,
    intent_from_intent_annotation,
    intent_from_root_name,
];

/// Route sources, most specific first.
const ROUTE_SOURCES: &[ExtractFn] = &[
    route_from_route_annotation,
    route_from_agent_span,
    route_from_tools,
    route_from_span_kind,
];

/// Extracts features for a single trace.
///
/// Returns `None` when the table holds no rows for the trace.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn extract_features(
    spans: &SpanTable,
    trace_id: &str,
    annotations: Option<&AnnotationTable>,
) -> Option<TraceFeatures> {
    let rows = spans.rows_for_trace(trace_id);
    if rows.is_empty() {
        return None;
    }

    // Root span: the parentless row, else the first in ingestion order.
    let root = rows.iter().copied().find(|r| r.is_root()).unwrap_or(rows[0]);

    let input_text = root
        .get_str(columns::INPUT_VALUE)
        .or_else(|| root.get_str(columns::LLM_INPUT_MESSAGES))
        .unwrap_or_default()
        .to_string();
    let output_text = root
        .get_str(columns::OUTPUT_VALUE)
        .or_else(|| root.get_str(columns::LLM_OUTPUT_MESSAGES))
        .unwrap_or_default()
        .to_string();

    let mut tool_rows: Vec<&SpanRow> = rows.iter().copied().filter(|r| is_tool_span(r)).collect();
    let llm_rows: Vec<&SpanRow> = rows.iter().copied().filter(|r| is_llm_span(r)).collect();

    // Chronological tool order; unparseable timestamps keep ingestion order.
    tool_rows.sort_by_key(|r| r.get_timestamp(columns::START_TIME));

    let tool_sequence: Vec<String> = tool_rows
        .iter()
        .map(|r| r.name().unwrap_or("unknown").to_string())
        .collect();

    let mut unique_tools: Vec<String> = Vec::new();
    for name in &tool_sequence {
        if !unique_tools.contains(name) {
            unique_tools.push(name.clone());
        }
    }

    let tool_calls = tool_rows.len();
    let failed_tools = tool_rows.iter().filter(|r| r.is_error()).count();
    let tool_success_rate = if tool_calls == 0 {
        1.0
    } else {
        1.0 - failed_tools as f64 / tool_calls as f64
    };

    let total_latency_ms = root.get_f64(columns::LATENCY_MS).unwrap_or_else(|| {
        match (
            root.get_timestamp(columns::START_TIME),
            root.get_timestamp(columns::END_TIME),
        ) {
            (Some(start), Some(end)) => (end - start).num_milliseconds().max(0) as f64,
            _ => 0.0,
        }
    });
    let llm_latency_ms: f64 = llm_rows
        .iter()
        .filter_map(|r| r.get_f64(columns::LATENCY_MS))
        .sum();
    let tool_latency_ms: f64 = tool_rows
        .iter()
        .filter_map(|r| r.get_f64(columns::LATENCY_MS))
        .sum();

    let total_tokens = llm_rows
        .iter()
        .filter_map(|r| r.get_f64(columns::LLM_TOKEN_COUNT_TOTAL))
        .sum::<f64>()
        .max(0.0) as u64;

    let error_count = rows.iter().filter(|r| r.is_error()).count();

    let view = TraceView {
        root,
        rows: &rows,
        unique_tools: &unique_tools,
    };

    let intent = clip(
        &first_match(INTENT_SOURCES, &view).unwrap_or_else(|| "unknown".to_string()),
        MAX_INTENT_CHARS,
    );
    let route = first_match(ROUTE_SOURCES, &view).unwrap_or_else(|| "unknown".to_string());

    let model = rows
        .iter()
        .find_map(|r| r.get_str(columns::LLM_MODEL_NAME))
        .unwrap_or("unknown")
        .to_string();
    let provider = rows
        .iter()
        .find_map(|r| r.get_str(columns::LLM_PROVIDER))
        .unwrap_or("unknown")
        .to_string();

    // No prompt store is wired in, so the model name stands in for version.
    let prompt_version = model.clone();

    let (quality_score, grounding_score) = annotations.map_or((None, None), |table| {
        let span_ids = spans.span_ids_for_trace(trace_id);
        let hits = table.for_spans(&span_ids);
        let quality = hits
            .iter()
            .find(|a| a.name.to_lowercase().contains("quality"))
            .map(|a| a.score);
        let grounding = hits
            .iter()
            .find(|a| a.name.to_lowercase().contains("grounding"))
            .map(|a| a.score);
        (quality, grounding)
    });

    Some(TraceFeatures {
        trace_id: trace_id.to_string(),
        input_text,
        output_text,
        text_embedding: None,
        tool_ngrams: compute_tool_ngrams(&tool_sequence),
        unique_tools_used: unique_tools.len(),
        tool_sequence,
        tool_success_rate,
        total_latency_ms,
        llm_latency_ms,
        tool_latency_ms,
        total_tokens,
        llm_calls: llm_rows.len(),
        tool_calls,
        error_count,
        intent,
        route,
        model,
        provider,
        prompt_version,
        quality_score,
        grounding_score,
    })
}

/// Computes unigram and bigram counts from a tool sequence.
///
/// Bigrams are transition tokens of the form `"a->b"`.
#[must_use]
pub fn compute_tool_ngrams(tool_sequence: &[String]) -> BTreeMap<String, u32> {
    let mut ngrams = BTreeMap::new();

    for tool in tool_sequence {
        *ngrams.entry(tool.clone()).or_insert(0) += 1;
    }

    for pair in tool_sequence.windows(2) {
        let bigram = format!("{}->{}", pair[0], pair[1]);
        *ngrams.entry(bigram).or_insert(0) += 1;
    }

    ngrams
}

/// The text submitted to the embedding provider for one trace.
#[must_use]
pub fn embedding_text(features: &TraceFeatures) -> String {
    format!("{}\n---\n{}", features.input_text, features.output_text)
}

/// Builds the dense feature matrix for a batch of traces.
///
/// Block layout per row: optional embedding block (zero-filled where a trace
/// has no vector), the 9 scalar metrics, then counts of the
/// [`NGRAM_FEATURES`] globally most frequent tool n-grams. With
/// `include_embedding` false the embedding block is omitted entirely.
#[must_use]
pub fn build_feature_matrix(features: &[TraceFeatures], include_embedding: bool) -> Array2<f64> {
    let n = features.len();
    let embedding_width = if include_embedding {
        features
            .iter()
            .find_map(|f| f.text_embedding.as_ref().map(Vec::len))
            .unwrap_or(faultline_embed::DEFAULT_DIMENSION)
    } else {
        0
    };

    let top = top_ngrams(features, NGRAM_FEATURES);
    let width = embedding_width + SCALAR_FEATURES + top.len();

    let mut matrix = Array2::zeros((n, width));
    for (i, f) in features.iter().enumerate() {
        let mut col = 0;

        if include_embedding {
            if let Some(embedding) = &f.text_embedding {
                for (j, value) in embedding.iter().take(embedding_width).enumerate() {
                    matrix[[i, col + j]] = *value;
                }
            }
            col += embedding_width;
        }

        for (j, value) in scalar_row(f).into_iter().enumerate() {
            matrix[[i, col + j]] = value;
        }
        col += SCALAR_FEATURES;

        for (j, ngram) in top.iter().enumerate() {
            matrix[[i, col + j]] = f64::from(f.tool_ngrams.get(ngram).copied().unwrap_or(0));
        }
    }

    matrix
}

/// The scalar metric block of one trace, in matrix column order.
#[allow(clippy::cast_precision_loss)]
fn scalar_row(f: &TraceFeatures) -> [f64; SCALAR_FEATURES] {
    [
        f.total_latency_ms,
        f.llm_latency_ms,
        f.tool_latency_ms,
        f.total_tokens as f64,
        f.llm_calls as f64,
        f.tool_calls as f64,
        f.tool_success_rate,
        f.error_count as f64,
        f.unique_tools_used as f64,
    ]
}

/// Ranks n-grams by how many traces they appear in.
///
/// Ties break lexicographically so the matrix layout is reproducible.
fn top_ngrams(features: &[TraceFeatures], limit: usize) -> Vec<String> {
    let mut document_counts: BTreeMap<&str, u32> = BTreeMap::new();
    for f in features {
        for ngram in f.tool_ngrams.keys() {
            *document_counts.entry(ngram).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(&str, u32)> = document_counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(limit)
        .map(|(ngram, _)| ngram.to_string())
        .collect()
}

/// Runs extraction strategies in order, taking the first non-blank value.
fn first_match(sources: &[ExtractFn], view: &TraceView<'_>) -> Option<String> {
    sources
        .iter()
        .find_map(|source| source(view).filter(|value| !value.trim().is_empty()))
}

/// Tool spans: TOOL kind, or a name mentioning "tool".
fn is_tool_span(row: &SpanRow) -> bool {
    row.get_str(columns::SPAN_KIND) == Some(columns::KIND_TOOL)
        || row
            .name()
            .is_some_and(|n| n.to_lowercase().contains("tool"))
}

/// LLM spans: LLM kind, or a name mentioning a known model vendor surface.
fn is_llm_span(row: &SpanRow) -> bool {
    if row.get_str(columns::SPAN_KIND) == Some(columns::KIND_LLM) {
        return true;
    }
    row.name().is_some_and(|n| {
        let lower = n.to_lowercase();
        ["llm", "openai", "anthropic", "chat"]
            .iter()
            .any(|marker| lower.contains(marker))
    })
}

/// Intent from orchestrator kickoff inputs: `question`, `topic`, or `task`.
fn intent_from_orchestrator_inputs(view: &TraceView<'_>) -> Option<String> {
    let raw = view.root.get_str(columns::CREW_INPUTS)?;
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let map = value.as_object()?;

    ["question", "topic", "task"].iter().find_map(|key| {
        map.get(*key).and_then(|v| match v {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    })
}

/// Intent from the root span's input payload.
fn intent_from_input_value(view: &TraceView<'_>) -> Option<String> {
    view.root
        .get_str(columns::INPUT_VALUE)
        .map(ToString::to_string)
}

/// Intent from a caller-supplied annotation column.
fn intent_from_intent_annotation(view: &TraceView<'_>) -> Option<String> {
    view.root
        .get_str(columns::OBS_INTENT)
        .map(ToString::to_string)
}

/// Intent from the root span name, treating UUID-bearing names as synthetic.
fn intent_from_root_name(view: &TraceView<'_>) -> Option<String> {
    let name = view.root.name().unwrap_or("unknown");
    if contains_uuid_fragment(name) {
        Some("crew_execution".to_string())
    } else {
        Some(name.to_string())
    }
}

/// Route from a caller-supplied annotation column.
fn route_from_route_annotation(view: &TraceView<'_>) -> Option<String> {
    view.root
        .get_str(columns::OBS_ROUTE)
        .map(ToString::to_string)
}

/// Route from an agent execution span: `"Planner._execute_core"` → `"Planner"`.
fn route_from_agent_span(view: &TraceView<'_>) -> Option<String> {
    let agent = view
        .rows
        .iter()
        .find(|r| r.name().is_some_and(|n| n.to_lowercase().contains("._execute")))?;
    let name = agent.name()?;
    Some(name.split("._").next().unwrap_or(name).to_string())
}

/// Route from the first three distinct tool names.
fn route_from_tools(view: &TraceView<'_>) -> Option<String> {
    if view.unique_tools.is_empty() {
        return None;
    }
    let head: Vec<&str> = view
        .unique_tools
        .iter()
        .take(3)
        .map(String::as_str)
        .collect();
    Some(format!("tools:{}", head.join(",")))
}

/// Route from the root span kind.
fn route_from_span_kind(view: &TraceView<'_>) -> Option<String> {
    view.root
        .get_str(columns::SPAN_KIND)
        .map(ToString::to_string)
}

/// Detects the `xxxxxxxx-xxxx` hex fragment of a UUID inside a name.
fn contains_uuid_fragment(name: &str) -> bool {
    const WINDOW: usize = 13;
    let bytes = name.as_bytes();
    if bytes.len() < WINDOW {
        return false;
    }
    (0..=bytes.len() - WINDOW).any(|i| {
        bytes[i..i + 8].iter().all(|&b| is_lower_hex(b))
            && bytes[i + 8] == b'-'
            && bytes[i + 9..i + WINDOW].iter().all(|&b| is_lower_hex(b))
    })
}

const fn is_lower_hex(byte: u8) -> bool {
    matches!(byte, b'0'..=b'9' | b'a'..=b'f')
}

/// Clips text to `max_chars` characters, appending an ellipsis when clipped.
fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}...", &text[..byte_index]),
        None => text.to_string(),
    }
}
