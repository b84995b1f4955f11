//! Two-phase generation pipeline.
//!
//! `start_generation` runs classification, staging, indexing, and outlining, then persists a
//! [`WorkflowState`] and returns the outline for review. `complete_generation` picks the state
//! back up by token and runs the content phase. Neither phase retries; a failure is terminal for
//! that invocation and the caller may re-run the phase.

use crate::assemble::DocumentAssembler;
use crate::classify::InputMode;
use crate::error::PipelineError;
use crate::fanout::{ContentFanOutEngine, FanOutInput};
use crate::index::{IndexSources, RetrievalIndex, RetrievalIndexBuilder};
use crate::outline::{Outline, SubmoduleOutliner};
use crate::progress::now_millis;
use crate::progress::recorder::{emit, ProgressRecorder};
use crate::progress::ProgressEvent;
use crate::request::{CallerContext, GenerationRequest};
use crate::types::GeneratedDocument;
use crate::uploads::UploadStager;
use crate::workflow::{ContextKey, WorkflowState, WorkflowStates, WorkflowToken};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

/// Result of the outline phase
#[derive(Debug, Clone, Serialize)]
pub struct OutlineResponse {
    pub mode: InputMode,
    pub outline: Outline,
    pub token: WorkflowToken,
}

/// Orchestrates both phases over injected collaborators
#[derive(Clone)]
pub struct GenerationPipeline {
    stager: UploadStager,
    index_builder: RetrievalIndexBuilder,
    outliner: SubmoduleOutliner,
    states: WorkflowStates,
    engine: ContentFanOutEngine,
    assembler: DocumentAssembler,
    progress: Option<ProgressRecorder>,
}

impl GenerationPipeline {
    pub fn new(
        stager: UploadStager,
        index_builder: RetrievalIndexBuilder,
        outliner: SubmoduleOutliner,
        states: WorkflowStates,
        engine: ContentFanOutEngine,
    ) -> Self {
        Self {
            stager,
            index_builder,
            outliner,
            states,
            engine,
            assembler: DocumentAssembler::new(),
            progress: None,
        }
    }

    /// Record progress events for both phases.
    pub fn with_progress(mut self, progress: ProgressRecorder) -> Self {
        self.engine = self.engine.with_progress(Some(progress.clone()));
        self.progress = Some(progress);
        self
    }

    pub fn states(&self) -> &WorkflowStates {
        &self.states
    }

    /// Outline phase. Nothing is persisted unless every step succeeds.
    pub async fn start_generation(
        &self,
        caller: &CallerContext,
        request: GenerationRequest,
    ) -> Result<OutlineResponse, PipelineError> {
        let company_id = caller.require_company()?;
        request.validate()?;

        let mode = InputMode::classify(
            request.has_documents(),
            request.has_links(),
            request.web_search_enabled,
        );
        let context = ContextKey::new(company_id, &request.course_name, &request.lesson_name);
        let token = WorkflowToken::issue(&context);
        let scope = context.storage_id();
        let progress = self.progress.as_ref();

        info!(
            token = %token,
            lesson = %request.lesson_name,
            course = %request.course_name,
            mode = %mode,
            "Starting generation"
        );
        emit(
            progress,
            Some(token.as_str()),
            "outline_started",
            json!({ "lesson": request.lesson_name, "course": request.course_name }),
        );
        emit(
            progress,
            Some(token.as_str()),
            "mode_classified",
            json!({ "mode": mode.as_str() }),
        );

        let document_source_path = if mode.includes_documents() {
            self.stager
                .stage(&scope, &request.attached_documents)?
        } else {
            None
        };

        let (outline, retrieval_index) = if mode.uses_retrieval() {
            let index = self
                .index_builder
                .build(
                    mode,
                    IndexSources {
                        index_key: &scope,
                        lesson_name: &request.lesson_name,
                        document_source_path: document_source_path.as_deref(),
                        links: &request.attached_links,
                        include_images: request.include_images,
                    },
                )
                .await?;
            emit(
                progress,
                Some(token.as_str()),
                "index_built",
                json!({
                    "text": index.text_index_location,
                    "images": index.image_index_location,
                }),
            );
            let loaded = self.index_builder.load(&index).await?;
            let outline = if request.web_search_enabled {
                self.outliner
                    .from_index_and_web(&request.lesson_name, &request.course_name, loaded.text)
                    .await?
            } else {
                self.outliner
                    .from_index(&request.lesson_name, loaded.text)
                    .await?
            };
            (outline, Some(index))
        } else if mode == InputMode::WebOnly {
            let outline = self
                .outliner
                .from_web(&request.lesson_name, &request.course_name)
                .await?;
            (outline, None)
        } else {
            (self.outliner.from_topic(&request.lesson_name).await?, None)
        };

        emit(
            progress,
            Some(token.as_str()),
            "outline_generated",
            json!({ "submodules": outline.titles().collect::<Vec<_>>() }),
        );

        let state = WorkflowState {
            company_id: company_id.to_string(),
            mode,
            outline: outline.clone(),
            retrieval_index,
            document_source_path,
            profile: request.profile,
            lesson_name: request.lesson_name,
            course_name: request.course_name,
            lesson_type: request.lesson_type,
            web_search_enabled: request.web_search_enabled,
            include_images: request.include_images,
            created_at_ms: now_millis(),
            revised_at_ms: None,
        };
        self.states.save_as(&token, &state)?;

        Ok(OutlineResponse {
            mode,
            outline,
            token,
        })
    }

    /// Replace the stored outline between phases.
    pub fn revise_outline(
        &self,
        caller: &CallerContext,
        token: &WorkflowToken,
        outline: Outline,
    ) -> Result<WorkflowState, PipelineError> {
        let company_id = caller.require_company()?;
        let state = self.states.update_outline(company_id, token, outline)?;
        if state.outline.is_empty() {
            warn!(token = %token, "Outline revised to empty; content phase will be refused");
        }
        emit(
            self.progress.as_ref(),
            Some(token.as_str()),
            "outline_revised",
            json!({ "submodules": state.outline.titles().collect::<Vec<_>>() }),
        );
        Ok(state)
    }

    /// Content phase. The stored state is kept so the phase can be re-run.
    pub async fn complete_generation(
        &self,
        caller: &CallerContext,
        token: &WorkflowToken,
    ) -> Result<GeneratedDocument, PipelineError> {
        let company_id = caller.require_company()?;
        let state = self.states.load_for_content(company_id, token)?;

        let retrieval_index = match &state.retrieval_index {
            Some(index) => Some(self.index_builder.load(index).await?),
            None => None,
        };

        info!(
            token = %token,
            lesson = %state.lesson_name,
            mode = %state.mode,
            submodules = state.outline.len(),
            "Completing generation"
        );

        let output = self
            .engine
            .generate(FanOutInput {
                outline: state.outline,
                retrieval_index,
                mode: state.mode,
                web_search_enabled: state.web_search_enabled,
                lesson_name: state.lesson_name,
                course_name: state.course_name,
                lesson_type: state.lesson_type,
                profile: state.profile,
                include_images: state.include_images,
                token: Some(token.to_string()),
            })
            .await?;

        let markdown = self.assembler.assemble(&output.blocks)?;
        Ok(GeneratedDocument {
            blocks: output.blocks,
            markdown,
            images: output.images,
        })
    }

    /// Latest retrieval index built for the caller's (course, lesson), if any.
    pub fn recorded_index(
        &self,
        caller: &CallerContext,
        course_name: &str,
        lesson_name: &str,
    ) -> Result<Option<RetrievalIndex>, PipelineError> {
        let company_id = caller.require_company()?;
        let context = ContextKey::new(company_id, course_name, lesson_name);
        self.index_builder.recorded(&context.storage_id())
    }

    /// Recorded progress events for a workflow, oldest first.
    pub fn events(&self, token: &WorkflowToken) -> Result<Vec<ProgressEvent>, PipelineError> {
        match &self.progress {
            Some(progress) => Ok(progress.store().read_events(token.as_str())?),
            None => Ok(Vec::new()),
        }
    }
}
