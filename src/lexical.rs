//! File-backed lexical retrieval index.
//!
//! Documents (plain text, HTML, PDF) and fetched link pages are split into overlapping
//! character chunks and written as JSON under `<index_path>/<index_key>/`. Similarity is the
//! fraction of query terms a chunk contains, which needs no embedding backend.

use crate::error::{PipelineError, StorageError};
use crate::index::{IndexHandle, IndexingService, RetrievedChunk, SearchableIndex};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

const TEXT_INDEX_FILE: &str = "text.json";
const IMAGE_INDEX_FILE: &str = "images.json";
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "rst", "csv", "json", "html", "htm"];
const PDF_EXTENSIONS: &[&str] = &["pdf"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg"];
const CONTENT_SELECTORS: &[&str] = &["article", "main", "[role=\"main\"]", ".content", "body"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Text,
    Images,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub source: String,
    pub text: String,
}

/// On-disk index layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexFile {
    pub kind: IndexKind,
    pub key: String,
    pub chunks: Vec<IndexedChunk>,
}

/// Builds lexical indexes under a root directory
#[derive(Clone)]
pub struct LexicalIndexer {
    root: PathBuf,
    client: Client,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl LexicalIndexer {
    pub fn new(root: impl Into<PathBuf>, chunk_size: usize, chunk_overlap: usize) -> Result<Self, PipelineError> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(PipelineError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            root: root.into(),
            client: crate::provider::build_http_client()?,
            chunk_size,
            chunk_overlap,
        })
    }

    fn key_dir(&self, index_key: &str) -> PathBuf {
        self.root.join(index_key)
    }

    async fn fetch_link(&self, link: &Url) -> Result<String, PipelineError> {
        let response = self
            .client
            .get(link.as_str())
            .send()
            .await
            .map_err(crate::provider::map_http_error)?;
        if !response.status().is_success() {
            return Err(PipelineError::IndexBuild(format!(
                "fetching {} returned {}",
                link,
                response.status()
            )));
        }
        let body = response
            .text()
            .await
            .map_err(crate::provider::map_http_error)?;
        Ok(html_to_text(&body))
    }

    async fn write_index(&self, index_key: &str, file_name: &str, file: IndexFile) -> Result<PathBuf, PipelineError> {
        let dir = self.key_dir(index_key);
        let path = dir.join(file_name);
        let target = path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), PipelineError> {
            fs::create_dir_all(&dir).map_err(StorageError::from)?;
            let bytes = serde_json::to_vec(&file).map_err(|e| StorageError::Encode(e.to_string()))?;
            fs::write(&target, bytes).map_err(StorageError::from)?;
            Ok(())
        })
        .await
        .map_err(|e| PipelineError::IndexBuild(format!("index writer panicked: {}", e)))??;
        Ok(path)
    }
}

#[async_trait]
impl IndexingService for LexicalIndexer {
    async fn build_text_index(
        &self,
        index_key: &str,
        documents: &[PathBuf],
        links: &[Url],
    ) -> Result<PathBuf, PipelineError> {
        let paths = documents.to_vec();
        let texts = tokio::task::spawn_blocking(move || read_documents(&paths))
            .await
            .map_err(|e| PipelineError::IndexBuild(format!("document reader panicked: {}", e)))?;

        let mut chunks = Vec::new();
        for (source, text) in &texts {
            chunks.extend(chunk_text(source, text, self.chunk_size, self.chunk_overlap));
        }

        let mut fetched = 0usize;
        for link in links {
            match self.fetch_link(link).await {
                Ok(text) => {
                    fetched += 1;
                    chunks.extend(chunk_text(link.as_str(), &text, self.chunk_size, self.chunk_overlap));
                }
                Err(err) => warn!(link = %link, error = %err, "Skipping unreachable link"),
            }
        }
        if !links.is_empty() && fetched == 0 && texts.is_empty() {
            return Err(PipelineError::IndexBuild(
                "none of the attached links could be fetched".to_string(),
            ));
        }
        if chunks.is_empty() {
            return Err(PipelineError::IndexBuild(format!(
                "no readable text in the source material for '{}'",
                index_key
            )));
        }

        info!(
            index_key,
            documents = texts.len(),
            links = fetched,
            chunks = chunks.len(),
            "Text index built"
        );
        self.write_index(
            index_key,
            TEXT_INDEX_FILE,
            IndexFile {
                kind: IndexKind::Text,
                key: index_key.to_string(),
                chunks,
            },
        )
        .await
    }

    async fn build_image_index(
        &self,
        index_key: &str,
        documents: &[PathBuf],
    ) -> Result<PathBuf, PipelineError> {
        let chunks: Vec<IndexedChunk> = documents
            .iter()
            .filter(|path| has_extension(path, IMAGE_EXTENSIONS))
            .map(|path| IndexedChunk {
                source: path.display().to_string(),
                text: image_caption(path),
            })
            .collect();
        debug!(index_key, images = chunks.len(), "Image index built");
        self.write_index(
            index_key,
            IMAGE_INDEX_FILE,
            IndexFile {
                kind: IndexKind::Images,
                key: index_key.to_string(),
                chunks,
            },
        )
        .await
    }

    async fn load_index(&self, location: &Path) -> Result<IndexHandle, PipelineError> {
        let path = location.to_path_buf();
        let file = tokio::task::spawn_blocking(move || -> Result<IndexFile, PipelineError> {
            let raw = fs::read(&path).map_err(StorageError::from)?;
            let file = serde_json::from_slice(&raw).map_err(|e| StorageError::Decode(e.to_string()))?;
            Ok(file)
        })
        .await
        .map_err(|e| PipelineError::IndexBuild(format!("index reader panicked: {}", e)))??;
        Ok(Arc::new(LexicalIndex::new(file)))
    }
}

/// In-memory index answering term-overlap queries
pub struct LexicalIndex {
    chunks: Vec<(IndexedChunk, HashSet<String>)>,
}

impl LexicalIndex {
    pub fn new(file: IndexFile) -> Self {
        let chunks = file
            .chunks
            .into_iter()
            .map(|chunk| {
                let mut chunk_terms = terms(&chunk.text);
                chunk_terms.extend(terms(&chunk.source));
                (chunk, chunk_terms)
            })
            .collect();
        Self { chunks }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn rank(&self, query: &str, k: usize) -> Vec<RetrievedChunk> {
        let wanted = terms(query);
        if wanted.is_empty() || k == 0 {
            return Vec::new();
        }
        let mut scored: Vec<(usize, f32)> = self
            .chunks
            .iter()
            .enumerate()
            .filter_map(|(i, (_, chunk_terms))| {
                let hits = wanted.iter().filter(|t| chunk_terms.contains(*t)).count();
                (hits > 0).then(|| (i, hits as f32 / wanted.len() as f32))
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| RetrievedChunk {
                source: self.chunks[i].0.source.clone(),
                text: self.chunks[i].0.text.clone(),
                score,
            })
            .collect()
    }
}

#[async_trait]
impl SearchableIndex for LexicalIndex {
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, PipelineError> {
        Ok(self.rank(query, k))
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() > 1)
        .map(str::to_lowercase)
        .collect()
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn image_caption(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().replace(['_', '-', '.'], " "))
        .unwrap_or_default()
}

/// Read supported documents; unreadable or unsupported files are skipped.
fn read_documents(paths: &[PathBuf]) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for path in paths {
        if has_extension(path, PDF_EXTENSIONS) {
            match read_pdf(path) {
                Ok(text) if !text.trim().is_empty() => out.push((path.display().to_string(), text)),
                Ok(_) => warn!(file = %path.display(), "PDF has no extractable text"),
                Err(err) => warn!(file = %path.display(), error = %err, "Skipping unreadable PDF"),
            }
            continue;
        }
        if !has_extension(path, TEXT_EXTENSIONS) {
            debug!(file = %path.display(), "Skipping unsupported document type");
            continue;
        }
        match fs::read_to_string(path) {
            Ok(text) => {
                let text = if has_extension(path, &["html", "htm"]) {
                    html_to_text(&text)
                } else {
                    text
                };
                out.push((path.display().to_string(), text));
            }
            Err(err) => warn!(file = %path.display(), error = %err, "Skipping unreadable document"),
        }
    }
    out
}

/// Text of every page. `lopdf` is tried first; `pdf-extract` takes over when it fails to
/// load the file or finds no text.
pub fn read_pdf(path: &Path) -> Result<String, PipelineError> {
    let primary = lopdf::Document::load(path)
        .map_err(|e| e.to_string())
        .and_then(|doc| {
            let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
            doc.extract_text(&pages).map_err(|e| e.to_string())
        });
    match primary {
        Ok(text) if !text.trim().is_empty() => Ok(text),
        Ok(_) => extract_pdf_fallback(path),
        Err(err) => {
            debug!(file = %path.display(), error = %err, "lopdf extraction failed, trying pdf-extract");
            extract_pdf_fallback(path)
        }
    }
}

fn extract_pdf_fallback(path: &Path) -> Result<String, PipelineError> {
    let bytes = fs::read(path).map_err(StorageError::from)?;
    pdf_extract::extract_text_from_mem(&bytes).map_err(|e| {
        PipelineError::IndexBuild(format!("cannot extract text from {}: {}", path.display(), e))
    })
}

/// Visible text of the main content container, scripts and styles excluded.
pub fn html_to_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let container = CONTENT_SELECTORS
        .iter()
        .filter_map(|sel| Selector::parse(sel).ok())
        .find_map(|sel| doc.select(&sel).next());
    let Some(container) = container else {
        return String::new();
    };
    let mut words = Vec::new();
    for node in container.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element())
            .map(|el| matches!(el.name(), "script" | "style" | "noscript"))
            .unwrap_or(false);
        if !hidden {
            words.extend(text.split_whitespace().map(str::to_string));
        }
    }
    words.join(" ")
}

/// Split into windows of `size` characters advancing by `size - overlap`.
pub fn chunk_text(source: &str, text: &str, size: usize, overlap: usize) -> Vec<IndexedChunk> {
    let chars: Vec<char> = text.chars().collect();
    let step = size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        let piece: String = chars[start..end].iter().collect();
        if !piece.trim().is_empty() {
            chunks.push(IndexedChunk {
                source: source.to_string(),
                text: piece.trim().to_string(),
            });
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}
