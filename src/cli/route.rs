//! CLI route: run context wiring the built-in collaborators, and the command table.

use crate::cli::output::{format_document, format_written_document, to_pretty_json};
use crate::cli::parse::Commands;
use crate::config::{ConfigLoader, ForgeConfig};
use crate::error::{PipelineError, StorageError};
use crate::fanout::ContentFanOutEngine;
use crate::generators::{LlmContentWriter, LlmOutliner, LlmRagExecutor};
use crate::index::{IndexCatalog, RetrievalIndexBuilder};
use crate::lexical::LexicalIndexer;
use crate::outline::{Outline, SubmoduleOutliner};
use crate::pipeline::GenerationPipeline;
use crate::progress::{ProgressRecorder, ProgressStore};
use crate::provider::OpenAiCompatibleClient;
use crate::request::{sanitize_lesson_name, CallerContext, GenerationRequest, UploadedDocument};
use crate::search::SerperClient;
use crate::types::LessonType;
use crate::uploads::UploadStager;
use crate::workflow::{SledSessionStore, WorkflowStates, WorkflowToken};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use url::Url;

const COMPANY_ENV: &str = "LESSONFORGE_COMPANY";

/// Runtime context for CLI execution: config, caller identity, and the pipeline.
pub struct RunContext {
    config: ForgeConfig,
    caller: CallerContext,
    pipeline: GenerationPipeline,
}

impl RunContext {
    /// Load config and build the pipeline over one sled database.
    pub fn new(
        workspace_root: PathBuf,
        config_path: Option<PathBuf>,
        company: Option<String>,
    ) -> Result<Self, PipelineError> {
        let config = match config_path {
            Some(ref cfg_path) => ConfigLoader::load_from_file(cfg_path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };

        let state_path = config.storage.state_path();
        std::fs::create_dir_all(&state_path).map_err(StorageError::from)?;
        let db = sled::open(&state_path).map_err(|e| StorageError::OpenFailed {
            path: state_path.display().to_string(),
            message: e.to_string(),
        })?;

        let chat = Arc::new(OpenAiCompatibleClient::from_config(&config.provider)?);
        let search = Arc::new(SerperClient::from_config(&config.search)?);
        let results = config.search.results;

        let indexer = LexicalIndexer::new(
            config.storage.index_path(),
            config.rag.chunk_size,
            config.rag.chunk_overlap,
        )?;
        let index_builder =
            RetrievalIndexBuilder::new(Arc::new(indexer)).with_catalog(IndexCatalog::new(&db)?);

        let outliner = LlmOutliner::new(chat.clone())
            .with_search(search.clone(), results)
            .with_context_chunks(config.fanout.top_k_docs);
        let writer = LlmContentWriter::new(chat.clone()).with_search(search.clone(), results);
        let rag = LlmRagExecutor::new(chat)
            .with_search(search.clone(), results)
            .with_image_threshold(config.rag.image_similarity_threshold);

        let engine = ContentFanOutEngine::new(Arc::new(writer), search, Arc::new(rag))
            .with_task_timeout(config.fanout.task_timeout())
            .with_top_k_docs(config.fanout.top_k_docs);

        let states = WorkflowStates::new(Arc::new(SledSessionStore::new(&db)?));
        let progress = ProgressRecorder::new(ProgressStore::shared(db)?);

        let pipeline = GenerationPipeline::new(
            UploadStager::new(config.storage.uploads_path()),
            index_builder,
            SubmoduleOutliner::new(Arc::new(outliner)),
            states,
            engine,
        )
        .with_progress(progress);

        let company = company.or_else(|| std::env::var(COMPANY_ENV).ok());
        info!(
            state = %state_path.display(),
            company = company.as_deref().unwrap_or("<none>"),
            "Run context ready"
        );

        Ok(Self {
            config,
            caller: CallerContext { company_id: company },
            pipeline,
        })
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &GenerationPipeline {
        &self.pipeline
    }

    /// Execute a CLI command via the route table.
    pub async fn execute(&self, command: &Commands) -> Result<String, PipelineError> {
        match command {
            Commands::Start {
                lesson,
                course,
                description,
                lesson_type,
                docs,
                links,
                web,
                images,
            } => {
                let lesson_type = match lesson_type {
                    Some(raw) => raw.parse()?,
                    None => LessonType::default(),
                };
                let request = GenerationRequest::new(lesson, course, lesson_type, description.clone())?
                    .with_documents(read_documents(docs)?)
                    .with_links(parse_links(links)?)
                    .with_web_search(*web)
                    .with_images(*images);
                let response = self.pipeline.start_generation(&self.caller, request).await?;
                to_pretty_json(&response)
            }
            Commands::Revise { token, outline } => {
                let token = WorkflowToken::parse(token)?;
                let outline = read_outline(outline)?;
                let state = self.pipeline.revise_outline(&self.caller, &token, outline)?;
                to_pretty_json(&json!({ "token": token, "outline": state.outline }))
            }
            Commands::Complete { token, out } => {
                let token = WorkflowToken::parse(token)?;
                let document = self.pipeline.complete_generation(&self.caller, &token).await?;
                match out {
                    Some(path) => {
                        std::fs::write(path, &document.markdown).map_err(StorageError::from)?;
                        format_written_document(path, &document)
                    }
                    None => Ok(format_document(&document)),
                }
            }
            Commands::Events { token } => {
                let token = WorkflowToken::parse(token)?;
                to_pretty_json(&self.pipeline.events(&token)?)
            }
            Commands::Index { lesson, course } => {
                let lesson = sanitize_lesson_name(lesson)?;
                let course = course.trim();
                let index = self.pipeline.recorded_index(&self.caller, course, &lesson)?;
                to_pretty_json(&json!({ "lesson": lesson, "course": course, "index": index }))
            }
        }
    }
}

fn read_documents(paths: &[PathBuf]) -> Result<Vec<UploadedDocument>, PipelineError> {
    paths
        .iter()
        .map(|path| {
            let bytes = std::fs::read(path).map_err(|e| {
                PipelineError::Validation(format!("cannot read {}: {}", path.display(), e))
            })?;
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();
            Ok(UploadedDocument { file_name, bytes })
        })
        .collect()
}

fn parse_links(raw: &[String]) -> Result<Vec<Url>, PipelineError> {
    raw.iter()
        .map(|link| {
            Url::parse(link.trim())
                .map_err(|e| PipelineError::Validation(format!("invalid link '{}': {}", link, e)))
        })
        .collect()
}

fn read_outline(path: &Path) -> Result<Outline, PipelineError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::Validation(format!("cannot read outline {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&raw)
        .map_err(|e| PipelineError::Validation(format!("outline must be a JSON object: {}", e)))
}
