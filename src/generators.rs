//! Language-model backed generators: outlines, lesson sections, and retrieval-grounded sections.

mod outliner;
mod rag;
mod writer;

pub use outliner::LlmOutliner;
pub use rag::LlmRagExecutor;
pub use writer::LlmContentWriter;

use crate::error::PipelineError;
use crate::index::RetrievedChunk;
use crate::outline::{parse_outline_entries, OutlineEntries};
use crate::types::LessonType;

/// Submodules requested per outline
pub(crate) const OUTLINE_SIZE_HINT: &str = "five or six";

/// Take the JSON object out of a model reply that may be wrapped in prose or code fences.
pub(crate) fn extract_json_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

/// Parse a model reply into raw outline entries.
pub(crate) fn parse_outline_reply(reply: &str) -> Result<OutlineEntries, PipelineError> {
    let json = extract_json_object(reply).ok_or_else(|| {
        PipelineError::OutlineGeneration("model reply contained no JSON object".to_string())
    })?;
    parse_outline_entries(json)
        .map_err(|e| PipelineError::OutlineGeneration(format!("invalid outline JSON: {}", e)))
}

/// Render retrieved chunks as numbered excerpts.
pub(crate) fn format_chunks(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("[{}] ({})\n{}", i + 1, chunk.source, chunk.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub(crate) fn lesson_style(lesson_type: LessonType) -> &'static str {
    match lesson_type {
        LessonType::Theoretical => "Explain concepts clearly with definitions and examples.",
        LessonType::Practical => {
            "Focus on hands-on steps, worked examples, and exercises the learner can follow."
        }
        LessonType::Training => {
            "Write as workplace training: objectives, procedures, and short checks for understanding."
        }
    }
}
