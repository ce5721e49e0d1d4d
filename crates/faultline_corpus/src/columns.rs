//! Well-known column names of the span export schema.
//!
//! Required columns must be present for a row to identify itself; optional
//! columns degrade the derived signals to neutral values when absent.

/// Trace identifier column (required).
pub const TRACE_ID: &str = "context.trace_id";
/// Span identifier column (required).
pub const SPAN_ID: &str = "context.span_id";
/// Parent span identifier; null/absent marks a root span.
pub const PARENT_ID: &str = "parent_id";
/// Operation name (required).
pub const NAME: &str = "name";
/// Span kind (`LLM`, `TOOL`, `CHAIN`, ...).
pub const SPAN_KIND: &str = "span_kind";
/// Status code (`OK`, `ERROR`, `UNSET`).
pub const STATUS_CODE: &str = "status_code";
/// Span start timestamp (RFC 3339).
pub const START_TIME: &str = "start_time";
/// Span end timestamp (RFC 3339).
pub const END_TIME: &str = "end_time";
/// Precomputed span latency in milliseconds (optional).
pub const LATENCY_MS: &str = "latency_ms";

/// Root-level input payload.
pub const INPUT_VALUE: &str = "attributes.input.value";
/// Root-level output payload.
pub const OUTPUT_VALUE: &str = "attributes.output.value";
/// Serialized LLM input messages (fallback input text).
pub const LLM_INPUT_MESSAGES: &str = "attributes.llm.input_messages";
/// Serialized LLM output messages (fallback output text).
pub const LLM_OUTPUT_MESSAGES: &str = "attributes.llm.output_messages";
/// LLM model name.
pub const LLM_MODEL_NAME: &str = "attributes.llm.model_name";
/// LLM provider name.
pub const LLM_PROVIDER: &str = "attributes.llm.provider";
/// Total token count for an LLM span.
pub const LLM_TOKEN_COUNT_TOTAL: &str = "attributes.llm.token_count.total";

/// Orchestration-framework kickoff inputs (JSON object).
pub const CREW_INPUTS: &str = "attributes.crew_inputs";
/// Caller-supplied intent annotation.
pub const OBS_INTENT: &str = "attributes.obs.intent";
/// Caller-supplied route annotation.
pub const OBS_ROUTE: &str = "attributes.obs.route";

/// ERROR status marker.
pub const STATUS_ERROR: &str = "ERROR";
/// TOOL span kind marker.
pub const KIND_TOOL: &str = "TOOL";
/// LLM span kind marker.
pub const KIND_LLM: &str = "LLM";
