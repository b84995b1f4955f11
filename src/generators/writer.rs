use crate::error::PipelineError;
use crate::fanout::{ContentGenerator, GenerationContext};
use crate::generators::lesson_style;
use crate::outline::Outline;
use crate::provider::{ChatClient, ChatMessage, CompletionOptions};
use crate::search::{format_results, WebSearch};
use crate::types::ContentBlock;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Writes one markdown section per submodule of a group
pub struct LlmContentWriter {
    chat: Arc<dyn ChatClient>,
    search: Option<Arc<dyn WebSearch>>,
    web_results: usize,
}

impl LlmContentWriter {
    pub fn new(chat: Arc<dyn ChatClient>) -> Self {
        Self {
            chat,
            search: None,
            web_results: 5,
        }
    }

    pub fn with_search(mut self, search: Arc<dyn WebSearch>, web_results: usize) -> Self {
        self.search = Some(search);
        self.web_results = web_results.max(1);
        self
    }

    async fn write_group(
        &self,
        group: &Outline,
        context: &GenerationContext,
        web: bool,
    ) -> Result<Vec<ContentBlock>, PipelineError> {
        let mut blocks = Vec::with_capacity(group.len());
        for (title, description) in group.iter() {
            let grounding = if web {
                let search = self.search.as_ref().ok_or_else(|| {
                    PipelineError::ContentGeneration("web search is not configured".to_string())
                })?;
                let query = format!("{} {}", title, context.lesson_name);
                let results = search.search(&query, self.web_results).await?;
                Some(format_results(&results))
            } else {
                None
            };
            let text = self
                .write_section(title, description, context, grounding.as_deref())
                .await?;
            blocks.push(ContentBlock::new(title, text));
        }
        debug!(group = context.part.as_str(), blocks = blocks.len(), web, "Group written");
        Ok(blocks)
    }

    async fn write_section(
        &self,
        title: &str,
        description: &str,
        context: &GenerationContext,
        grounding: Option<&str>,
    ) -> Result<String, PipelineError> {
        let system = format!(
            "You write lesson content in markdown for the course \"{}\". {} Audience: {}.",
            context.course_name,
            lesson_style(context.lesson_type),
            if context.profile.trim().is_empty() {
                "general learners"
            } else {
                context.profile.as_str()
            }
        );
        let mut request = format!(
            "Write the section \"{}\" of the lesson \"{}\".\nSection scope: {}\n\
             Start with the heading `## {}`.",
            title, context.lesson_name, description, title
        );
        if let Some(grounding) = grounding {
            request.push_str("\n\nBase the section on these search results and cite links:\n");
            request.push_str(grounding);
        }
        let reply = self
            .chat
            .complete(
                vec![ChatMessage::system(system), ChatMessage::user(request)],
                CompletionOptions::default(),
            )
            .await?;
        Ok(reply.content)
    }
}

#[async_trait]
impl ContentGenerator for LlmContentWriter {
    async fn generate_content(
        &self,
        group: &Outline,
        context: &GenerationContext,
    ) -> Result<Vec<ContentBlock>, PipelineError> {
        self.write_group(group, context, false).await
    }

    async fn generate_content_from_web(
        &self,
        group: &Outline,
        context: &GenerationContext,
    ) -> Result<Vec<ContentBlock>, PipelineError> {
        self.write_group(group, context, true).await
    }
}
