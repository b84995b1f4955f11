//! Upload staging: persist uploaded documents into a source directory owned by one
//! (company, course, lesson) context.

use crate::error::{PipelineError, StorageError};
use crate::request::UploadedDocument;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Writes uploads under `<root>/<scope>/`, where `scope` is a context storage id
#[derive(Debug, Clone)]
pub struct UploadStager {
    root: PathBuf,
}

impl UploadStager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory that holds one context's documents
    pub fn scope_dir(&self, scope: &str) -> PathBuf {
        self.root.join(scope)
    }

    /// Store the documents and return the scope directory, or `None` when there is nothing
    /// to stage. Files from earlier uploads for the same scope stay in place; a file with the
    /// same name is overwritten.
    pub fn stage(
        &self,
        scope: &str,
        documents: &[UploadedDocument],
    ) -> Result<Option<PathBuf>, PipelineError> {
        if documents.is_empty() {
            return Ok(None);
        }
        let names = documents
            .iter()
            .map(|doc| secure_filename(&doc.file_name))
            .collect::<Result<Vec<_>, _>>()?;

        let dir = self.scope_dir(scope);
        fs::create_dir_all(&dir).map_err(StorageError::from)?;
        for (doc, name) in documents.iter().zip(&names) {
            let target = dir.join(name);
            fs::write(&target, &doc.bytes).map_err(StorageError::from)?;
            debug!(file = %target.display(), bytes = doc.bytes.len(), "Staged upload");
        }
        info!(scope, documents = names.len(), dir = %dir.display(), "Uploads staged");
        Ok(Some(dir))
    }
}

/// Reduce an uploaded name to a safe basename.
pub fn secure_filename(raw: &str) -> Result<String, PipelineError> {
    let base = raw
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches(['.', '_']).to_string();
    if cleaned.is_empty() {
        return Err(PipelineError::Validation(format!(
            "uploaded file name '{}' is not usable",
            raw
        )));
    }
    Ok(cleaned)
}
