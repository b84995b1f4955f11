//! Retrieval index construction.
//!
//! Decides what source material goes into a lesson's index (uploaded documents, fetched links,
//! image files) and delegates chunking, embedding, and persistence to the injected
//! [`IndexingService`]. Indexes are keyed by the storage id of the owning (company, course,
//! lesson) context, and built locations are recorded under that key so a later rebuild
//! supersedes them.

use crate::classify::InputMode;
use crate::error::{PipelineError, StorageError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;
use walkdir::WalkDir;

const TREE_INDEX_CATALOG: &str = "index_catalog";

/// Persisted locations of a lesson's indexes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalIndex {
    pub text_index_location: PathBuf,
    pub image_index_location: Option<PathBuf>,
}

/// One similarity-search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Document path, URL, or image path the chunk came from
    pub source: String,
    pub text: String,
    pub score: f32,
}

/// A loaded index that answers similarity queries
#[async_trait]
pub trait SearchableIndex: Send + Sync {
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, PipelineError>;
}

pub type IndexHandle = Arc<dyn SearchableIndex>;

/// Indexing capability: chunking, embedding, and persistence live behind this trait
#[async_trait]
pub trait IndexingService: Send + Sync {
    /// `index_key` names the owning context; builds for different keys never share files.
    async fn build_text_index(
        &self,
        index_key: &str,
        documents: &[PathBuf],
        links: &[Url],
    ) -> Result<PathBuf, PipelineError>;

    async fn build_image_index(
        &self,
        index_key: &str,
        documents: &[PathBuf],
    ) -> Result<PathBuf, PipelineError>;

    async fn load_index(&self, location: &Path) -> Result<IndexHandle, PipelineError>;
}

/// Loaded handles alongside their persisted locations
#[derive(Clone)]
pub struct LoadedIndex {
    pub locations: RetrievalIndex,
    pub text: IndexHandle,
    pub images: Option<IndexHandle>,
}

/// Source material for one build
#[derive(Debug, Clone, Copy)]
pub struct IndexSources<'a> {
    /// Storage id of the owning context
    pub index_key: &'a str,
    pub lesson_name: &'a str,
    pub document_source_path: Option<&'a Path>,
    pub links: &'a [Url],
    pub include_images: bool,
}

/// Context storage id -> index location records in sled
#[derive(Clone)]
pub struct IndexCatalog {
    tree: sled::Tree,
}

impl IndexCatalog {
    pub fn new(db: &sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            tree: db.open_tree(TREE_INDEX_CATALOG)?,
        })
    }

    /// Overwrites any previous record for the key.
    pub fn record(&self, index_key: &str, index: &RetrievalIndex) -> Result<(), StorageError> {
        let value = serde_json::to_vec(index).map_err(|e| StorageError::Encode(e.to_string()))?;
        self.tree.insert(index_key.as_bytes(), value)?;
        Ok(())
    }

    pub fn lookup(&self, index_key: &str) -> Result<Option<RetrievalIndex>, StorageError> {
        let Some(raw) = self.tree.get(index_key.as_bytes())? else {
            return Ok(None);
        };
        let index = serde_json::from_slice(&raw).map_err(|e| StorageError::Decode(e.to_string()))?;
        Ok(Some(index))
    }
}

/// Builds and loads retrieval indexes for a lesson
#[derive(Clone)]
pub struct RetrievalIndexBuilder {
    indexing: Arc<dyn IndexingService>,
    catalog: Option<IndexCatalog>,
}

impl RetrievalIndexBuilder {
    pub fn new(indexing: Arc<dyn IndexingService>) -> Self {
        Self {
            indexing,
            catalog: None,
        }
    }

    pub fn with_catalog(mut self, catalog: IndexCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Build the text index (and the image index when images are requested and documents are
    /// present). Only valid for modes that use retrieval.
    pub async fn build(
        &self,
        mode: InputMode,
        sources: IndexSources<'_>,
    ) -> Result<RetrievalIndex, PipelineError> {
        if !mode.uses_retrieval() {
            return Err(PipelineError::IndexBuild(format!(
                "mode {} has no source material to index",
                mode
            )));
        }

        let documents = if mode.includes_documents() {
            let dir = sources.document_source_path.ok_or_else(|| {
                PipelineError::IndexBuild("no document directory for document input".to_string())
            })?;
            let documents = collect_documents(dir)?;
            if documents.is_empty() {
                return Err(PipelineError::IndexBuild(format!(
                    "no readable documents in {}",
                    dir.display()
                )));
            }
            documents
        } else {
            Vec::new()
        };
        let links: &[Url] = if mode.includes_links() {
            sources.links
        } else {
            &[]
        };
        if mode.includes_links() && links.is_empty() {
            return Err(PipelineError::IndexBuild(
                "link input without any links".to_string(),
            ));
        }

        info!(
            lesson = sources.lesson_name,
            index_key = sources.index_key,
            mode = %mode,
            documents = documents.len(),
            links = links.len(),
            "Building retrieval index"
        );

        let text_index_location = self
            .indexing
            .build_text_index(sources.index_key, &documents, links)
            .await
            .map_err(as_index_failure)?;

        let image_index_location = if sources.include_images && !documents.is_empty() {
            Some(
                self.indexing
                    .build_image_index(sources.index_key, &documents)
                    .await
                    .map_err(as_index_failure)?,
            )
        } else {
            None
        };

        let index = RetrievalIndex {
            text_index_location,
            image_index_location,
        };

        if let Some(catalog) = &self.catalog {
            catalog.record(sources.index_key, &index)?;
        }
        debug!(index_key = sources.index_key, index = ?index, "Retrieval index recorded");
        Ok(index)
    }

    pub async fn load(&self, index: &RetrievalIndex) -> Result<LoadedIndex, PipelineError> {
        let text = self
            .indexing
            .load_index(&index.text_index_location)
            .await
            .map_err(as_index_failure)?;
        let images = match &index.image_index_location {
            Some(location) => match self.indexing.load_index(location).await {
                Ok(handle) => Some(handle),
                Err(err) => {
                    warn!(location = %location.display(), error = %err, "Image index unavailable");
                    None
                }
            },
            None => None,
        };
        Ok(LoadedIndex {
            locations: index.clone(),
            text,
            images,
        })
    }

    /// Most recent index recorded under a key, if a catalog is attached
    pub fn recorded(&self, index_key: &str) -> Result<Option<RetrievalIndex>, PipelineError> {
        match &self.catalog {
            Some(catalog) => Ok(catalog.lookup(index_key)?),
            None => Ok(None),
        }
    }
}

fn as_index_failure(err: PipelineError) -> PipelineError {
    match err {
        PipelineError::IndexBuild(_) => err,
        other => PipelineError::IndexBuild(other.to_string()),
    }
}

/// Regular files under `dir`, sorted by path, hidden files skipped.
pub fn collect_documents(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    if !dir.is_dir() {
        return Err(PipelineError::IndexBuild(format!(
            "document directory {} does not exist",
            dir.display()
        )));
    }
    let mut documents = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| PipelineError::IndexBuild(e.to_string()))?;
        let hidden = entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false);
        if entry.file_type().is_file() && !hidden {
            documents.push(entry.into_path());
        }
    }
    Ok(documents)
}
