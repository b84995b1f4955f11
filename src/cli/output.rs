//! CLI output: error rendering and JSON formatting.

use crate::error::PipelineError;
use crate::types::GeneratedDocument;
use serde::Serialize;
use serde_json::json;
use std::path::Path;

/// Map a pipeline error to the message shown to the user.
pub fn map_error(e: &PipelineError) -> String {
    let outcome = e.outcome();
    let kind = serde_json::to_value(outcome.kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "error".to_string());
    format!("error [{} {}]: {}", outcome.status, kind, outcome.message)
}

pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<String, PipelineError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| PipelineError::Config(format!("Failed to render output: {}", e)))
}

/// Summary printed when the document was written to a file
pub fn format_written_document(path: &Path, document: &GeneratedDocument) -> Result<String, PipelineError> {
    to_pretty_json(&json!({
        "written": path,
        "sections": document.blocks.len(),
        "images": document.images,
    }))
}

/// Markdown followed by an image list when images were found
pub fn format_document(document: &GeneratedDocument) -> String {
    if document.images.is_empty() {
        return document.markdown.clone();
    }
    let images = document
        .images
        .iter()
        .map(|image| match &image.submodule_title {
            Some(title) => format!("- {}: {}", title, image.url),
            None => format!("- {}", image.url),
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("{}\n\n---\nImages:\n{}", document.markdown, images)
}
