use crate::error::PipelineError;
use crate::generators::{format_chunks, parse_outline_reply, OUTLINE_SIZE_HINT};
use crate::index::IndexHandle;
use crate::outline::{OutlineEntries, OutlineGenerator};
use crate::provider::{ChatClient, ChatMessage, CompletionOptions};
use crate::search::{format_results, WebSearch};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You design lesson outlines. Reply with a single JSON object whose \
keys are submodule titles and whose values are one-sentence descriptions, in teaching order.";

/// Outline generator prompting a chat model
pub struct LlmOutliner {
    chat: Arc<dyn ChatClient>,
    search: Option<Arc<dyn WebSearch>>,
    context_chunks: usize,
    web_results: usize,
}

impl LlmOutliner {
    pub fn new(chat: Arc<dyn ChatClient>) -> Self {
        Self {
            chat,
            search: None,
            context_chunks: 7,
            web_results: 5,
        }
    }

    pub fn with_search(mut self, search: Arc<dyn WebSearch>, web_results: usize) -> Self {
        self.search = Some(search);
        self.web_results = web_results.max(1);
        self
    }

    pub fn with_context_chunks(mut self, context_chunks: usize) -> Self {
        self.context_chunks = context_chunks.max(1);
        self
    }

    fn search(&self) -> Result<&Arc<dyn WebSearch>, PipelineError> {
        self.search.as_ref().ok_or_else(|| {
            PipelineError::OutlineGeneration("web search is not configured".to_string())
        })
    }

    async fn web_context(&self, topic: &str, course: &str) -> Result<String, PipelineError> {
        let query = format!("{} {}", topic, course);
        let results = self.search()?.search(&query, self.web_results).await?;
        Ok(format_results(&results))
    }

    async fn index_context(&self, topic: &str, index: &IndexHandle) -> Result<String, PipelineError> {
        let chunks = index.similarity_search(topic, self.context_chunks).await?;
        Ok(format_chunks(&chunks))
    }

    async fn ask(&self, request: String) -> Result<OutlineEntries, PipelineError> {
        let reply = self
            .chat
            .complete(
                vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(request)],
                CompletionOptions {
                    json_object: true,
                    ..CompletionOptions::default()
                },
            )
            .await?;
        debug!(model = %reply.model, chars = reply.content.len(), "Outline reply received");
        parse_outline_reply(&reply.content)
    }
}

#[async_trait]
impl OutlineGenerator for LlmOutliner {
    async fn generate_from_topic(&self, topic: &str) -> Result<OutlineEntries, PipelineError> {
        self.ask(format!(
            "Create {} submodules for a lesson on \"{}\".",
            OUTLINE_SIZE_HINT, topic
        ))
        .await
    }

    async fn generate_from_web(
        &self,
        topic: &str,
        course: &str,
    ) -> Result<OutlineEntries, PipelineError> {
        let context = self.web_context(topic, course).await?;
        self.ask(format!(
            "Create {} submodules for the lesson \"{}\" in the course \"{}\". \
             Ground them in these search results:\n\n{}",
            OUTLINE_SIZE_HINT, topic, course, context
        ))
        .await
    }

    async fn generate_from_index(
        &self,
        topic: &str,
        index: IndexHandle,
    ) -> Result<OutlineEntries, PipelineError> {
        let context = self.index_context(topic, &index).await?;
        self.ask(format!(
            "Create {} submodules for the lesson \"{}\" covering the following source \
             material:\n\n{}",
            OUTLINE_SIZE_HINT, topic, context
        ))
        .await
    }

    async fn generate_from_index_and_web(
        &self,
        topic: &str,
        course: &str,
        index: IndexHandle,
    ) -> Result<OutlineEntries, PipelineError> {
        let documents = self.index_context(topic, &index).await?;
        let web = self.web_context(topic, course).await?;
        self.ask(format!(
            "Create {} submodules for the lesson \"{}\" in the course \"{}\". Use the source \
             material first and the search results to fill gaps.\n\nSource material:\n{}\n\n\
             Search results:\n{}",
            OUTLINE_SIZE_HINT, topic, course, documents, web
        ))
        .await
    }
}
