//! Document assembly: join ordered content blocks into one markdown document.

use crate::error::PipelineError;
use crate::types::ContentBlock;
use std::collections::HashSet;
use tracing::debug;

const SECTION_SEPARATOR: &str = "\n\n";

/// Concatenates content blocks in ordinal order
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentAssembler;

impl DocumentAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Blocks must carry distinct ordinals; they are rendered sorted by ordinal.
    pub fn assemble(&self, blocks: &[ContentBlock]) -> Result<String, PipelineError> {
        let mut seen = HashSet::with_capacity(blocks.len());
        for block in blocks {
            if !seen.insert(block.ordinal) {
                return Err(PipelineError::Assembly(format!(
                    "duplicate ordinal {} (submodule '{}')",
                    block.ordinal, block.submodule_title
                )));
            }
        }

        let mut ordered: Vec<&ContentBlock> = blocks.iter().collect();
        ordered.sort_by_key(|block| block.ordinal);

        let document = ordered
            .into_iter()
            .map(render_section)
            .collect::<Vec<_>>()
            .join(SECTION_SEPARATOR);
        debug!(sections = blocks.len(), bytes = document.len(), "Document assembled");
        Ok(document)
    }
}

fn render_section(block: &ContentBlock) -> String {
    let text = block.rendered_text.trim();
    if text.starts_with('#') {
        text.to_string()
    } else if text.is_empty() {
        format!("## {}", block.submodule_title)
    } else {
        format!("## {}\n\n{}", block.submodule_title, text)
    }
}
