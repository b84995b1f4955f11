//! Submodule outlines: the ordered title -> description plan of a lesson.
//!
//! Insertion order is significant everywhere downstream: it decides how content generation is
//! partitioned and the order sections appear in the final document. Titles are unique; when a
//! generator repeats a title the first occurrence is kept.

use crate::error::PipelineError;
use crate::index::IndexHandle;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Raw generator output; may contain duplicate or blank titles.
pub type OutlineEntries = Vec<(String, String)>;

/// Ordered mapping of submodule title to description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Outline(IndexMap<String, String>);

impl Outline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw entries, trimming titles, dropping blank ones, keeping the first of
    /// any repeated title.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut outline = Self::new();
        for (title, description) in entries {
            outline.insert_if_absent(title, description);
        }
        outline
    }

    /// Returns false when the title is blank or already present.
    pub fn insert_if_absent(&mut self, title: impl Into<String>, description: impl Into<String>) -> bool {
        let title = title.into().trim().to_string();
        if title.is_empty() || self.0.contains_key(&title) {
            return false;
        }
        self.0.insert(title, description.into());
        true
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, title: &str) -> Option<&str> {
        self.0.get(title).map(String::as_str)
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Contiguous sub-outline over `[start, end)`, clamped to the outline length.
    pub fn slice(&self, start: usize, end: usize) -> Outline {
        let end = end.min(self.len());
        let start = start.min(end);
        Outline(
            self.0
                .iter()
                .skip(start)
                .take(end - start)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

impl<'de> Deserialize<'de> for Outline {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = deserializer.deserialize_map(EntriesVisitor)?;
        Ok(Outline::from_entries(entries))
    }
}

/// Reads a map without collapsing duplicate keys, so first-occurrence wins.
struct EntriesVisitor;

impl<'de> Visitor<'de> for EntriesVisitor {
    type Value = OutlineEntries;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of submodule titles to descriptions")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((title, description)) = map.next_entry::<String, String>()? {
            entries.push((title, description));
        }
        Ok(entries)
    }
}

/// Parse a JSON object into raw entries, preserving order and duplicates.
pub fn parse_outline_entries(json: &str) -> Result<OutlineEntries, serde_json::Error> {
    let mut deserializer = serde_json::Deserializer::from_str(json);
    let entries = serde::Deserializer::deserialize_map(&mut deserializer, EntriesVisitor)?;
    deserializer.end()?;
    Ok(entries)
}

/// Outline generation capability
#[async_trait]
pub trait OutlineGenerator: Send + Sync {
    async fn generate_from_topic(&self, topic: &str) -> Result<OutlineEntries, PipelineError>;

    async fn generate_from_web(
        &self,
        topic: &str,
        course: &str,
    ) -> Result<OutlineEntries, PipelineError>;

    async fn generate_from_index(
        &self,
        topic: &str,
        index: IndexHandle,
    ) -> Result<OutlineEntries, PipelineError>;

    async fn generate_from_index_and_web(
        &self,
        topic: &str,
        course: &str,
        index: IndexHandle,
    ) -> Result<OutlineEntries, PipelineError>;
}

/// Produces deduplicated outlines from the injected generator
#[derive(Clone)]
pub struct SubmoduleOutliner {
    generator: Arc<dyn OutlineGenerator>,
}

impl SubmoduleOutliner {
    pub fn new(generator: Arc<dyn OutlineGenerator>) -> Self {
        Self { generator }
    }

    pub async fn from_topic(&self, topic: &str) -> Result<Outline, PipelineError> {
        let entries = self.generator.generate_from_topic(topic).await;
        finish("topic", topic, entries)
    }

    pub async fn from_web(&self, topic: &str, course: &str) -> Result<Outline, PipelineError> {
        let entries = self.generator.generate_from_web(topic, course).await;
        finish("web", topic, entries)
    }

    pub async fn from_index(&self, topic: &str, index: IndexHandle) -> Result<Outline, PipelineError> {
        let entries = self.generator.generate_from_index(topic, index).await;
        finish("index", topic, entries)
    }

    pub async fn from_index_and_web(
        &self,
        topic: &str,
        course: &str,
        index: IndexHandle,
    ) -> Result<Outline, PipelineError> {
        let entries = self
            .generator
            .generate_from_index_and_web(topic, course, index)
            .await;
        finish("index_and_web", topic, entries)
    }
}

fn finish(
    source: &str,
    topic: &str,
    entries: Result<OutlineEntries, PipelineError>,
) -> Result<Outline, PipelineError> {
    let entries = entries.map_err(|err| match err {
        PipelineError::OutlineGeneration(_) => err,
        other => PipelineError::OutlineGeneration(other.to_string()),
    })?;
    let raw_count = entries.len();
    let outline = Outline::from_entries(entries);
    if outline.len() < raw_count {
        warn!(
            source,
            topic,
            dropped = raw_count - outline.len(),
            "Dropped blank or repeated submodule titles"
        );
    }
    if outline.is_empty() {
        return Err(PipelineError::OutlineGeneration(format!(
            "generator returned no submodules for '{}'",
            topic
        )));
    }
    info!(source, topic, submodules = outline.len(), "Outline generated");
    debug!(titles = ?outline.titles().collect::<Vec<_>>(), "Outline titles");
    Ok(outline)
}
