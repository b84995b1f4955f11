use crate::error::PipelineError;
use crate::fanout::{RagExecutor, RagRequest};
use crate::generators::{format_chunks, lesson_style};
use crate::index::IndexHandle;
use crate::provider::{ChatClient, ChatMessage, CompletionOptions};
use crate::search::{format_results, WebSearch};
use crate::types::{ContentBlock, ImageReference};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_IMAGE_THRESHOLD: f32 = 0.1;

/// Retrieval-grounded section writer; one completion per submodule
pub struct LlmRagExecutor {
    chat: Arc<dyn ChatClient>,
    search: Option<Arc<dyn WebSearch>>,
    web_results: usize,
    concurrency: usize,
    image_similarity_threshold: f32,
}

impl LlmRagExecutor {
    pub fn new(chat: Arc<dyn ChatClient>) -> Self {
        Self {
            chat,
            search: None,
            web_results: 5,
            concurrency: DEFAULT_CONCURRENCY,
            image_similarity_threshold: DEFAULT_IMAGE_THRESHOLD,
        }
    }

    pub fn with_search(mut self, search: Arc<dyn WebSearch>, web_results: usize) -> Self {
        self.search = Some(search);
        self.web_results = web_results.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_image_threshold(mut self, threshold: f32) -> Self {
        self.image_similarity_threshold = threshold;
        self
    }

    async fn write_section(
        &self,
        request: &RagRequest,
        title: &str,
        description: &str,
    ) -> Result<ContentBlock, PipelineError> {
        let query = format!("{}: {}", title, description);
        let chunks = request
            .index
            .text
            .similarity_search(&query, request.top_k_docs)
            .await?;

        let web = match (&self.search, request.web_search_enabled) {
            (Some(search), true) => {
                let results = search
                    .search(&format!("{} {}", title, request.lesson_name), self.web_results)
                    .await?;
                Some(format_results(&results))
            }
            (None, true) => {
                warn!(submodule = title, "Web search requested but not configured");
                None
            }
            _ => None,
        };

        let system = format!(
            "You write lesson content in markdown for the course \"{}\". {} Audience: {}. \
             Stay faithful to the provided source material.",
            request.course_name,
            lesson_style(request.lesson_type),
            if request.profile.trim().is_empty() {
                "general learners"
            } else {
                request.profile.as_str()
            }
        );
        let mut prompt = format!(
            "Write the section \"{}\" of the lesson \"{}\".\nSection scope: {}\n\
             Start with the heading `## {}`.\n\nSource material:\n{}",
            title,
            request.lesson_name,
            description,
            title,
            format_chunks(&chunks)
        );
        if let Some(web) = web {
            prompt.push_str("\n\nSupplementary search results:\n");
            prompt.push_str(&web);
        }

        let reply = self
            .chat
            .complete(
                vec![ChatMessage::system(system), ChatMessage::user(prompt)],
                CompletionOptions::default(),
            )
            .await?;
        debug!(submodule = title, chunks = chunks.len(), "Section written from retrieval");
        Ok(ContentBlock::new(title, reply.content))
    }

    async fn relevant_images(
        &self,
        request: &RagRequest,
        images: &IndexHandle,
    ) -> Result<Vec<ImageReference>, PipelineError> {
        let mut found = Vec::new();
        for title in request.outline.titles() {
            let hits = images.similarity_search(title, 1).await?;
            found.extend(
                hits.into_iter()
                    .filter(|hit| hit.score >= self.image_similarity_threshold)
                    .map(|hit| ImageReference {
                        submodule_title: Some(title.to_string()),
                        url: hit.source,
                        caption: Some(hit.text).filter(|t| !t.is_empty()),
                    }),
            );
        }
        Ok(found)
    }
}

#[async_trait]
impl RagExecutor for LlmRagExecutor {
    async fn execute(
        &self,
        request: RagRequest,
    ) -> Result<(Vec<ContentBlock>, Vec<ImageReference>), PipelineError> {
        let entries: Vec<(String, String)> = request
            .outline
            .iter()
            .map(|(t, d)| (t.to_string(), d.to_string()))
            .collect();

        let request_ref = &request;
        let blocks: Vec<ContentBlock> = stream::iter(entries)
            .map(|(title, description)| async move {
                self.write_section(request_ref, &title, &description).await
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let images = match (&request.index.images, request.include_images) {
            (Some(images), true) => self.relevant_images(&request, images).await?,
            _ => Vec::new(),
        };

        info!(
            lesson = %request.lesson_name,
            mode = %request.mode,
            blocks = blocks.len(),
            images = images.len(),
            "Retrieval generation completed"
        );
        Ok((blocks, images))
    }
}
