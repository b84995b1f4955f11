//! Mock collaborators and a pipeline harness shared by the integration tests.

use async_trait::async_trait;
use lessonforge::classify::InputMode;
use lessonforge::fanout::{
    ContentFanOutEngine, ContentGenerator, GenerationContext, GroupPart, ImageFinder, RagExecutor,
    RagRequest,
};
use lessonforge::index::{
    IndexCatalog, IndexHandle, IndexingService, RetrievalIndexBuilder, RetrievedChunk,
    SearchableIndex,
};
use lessonforge::outline::{OutlineEntries, OutlineGenerator, SubmoduleOutliner};
use lessonforge::progress::{ProgressRecorder, ProgressStore};
use lessonforge::uploads::UploadStager;
use lessonforge::workflow::{ContextKey, MemorySessionStore, SessionStore, WorkflowStates};
use lessonforge::{
    CallerContext, ContentBlock, GenerationPipeline, GenerationRequest, ImageReference,
    LessonType, Outline, PipelineError, UploadedDocument,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use url::Url;

pub const COMPANY: &str = "acme";

pub const COURSE: &str = "Rust Fundamentals";

pub fn company() -> CallerContext {
    CallerContext::company(COMPANY)
}

/// Storage id the pipeline derives for a company's lesson in [`COURSE`]
pub fn scope(company_id: &str, lesson: &str) -> String {
    ContextKey::new(company_id, COURSE, lesson).storage_id()
}

pub fn request(lesson: &str) -> GenerationRequest {
    GenerationRequest::new(lesson, COURSE, LessonType::Practical, "backend engineers")
        .unwrap()
}

pub fn document(name: &str, body: &str) -> UploadedDocument {
    UploadedDocument {
        file_name: name.to_string(),
        bytes: body.as_bytes().to_vec(),
    }
}

pub fn link(raw: &str) -> Url {
    Url::parse(raw).unwrap()
}

pub struct MockOutliner {
    pub entries: OutlineEntries,
    pub calls: Mutex<Vec<&'static str>>,
}

impl MockOutliner {
    pub fn five() -> Self {
        Self {
            entries: ["A", "B", "C", "D", "E"]
                .iter()
                .map(|t| (t.to_string(), format!("{t} description")))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl OutlineGenerator for MockOutliner {
    async fn generate_from_topic(&self, _topic: &str) -> Result<OutlineEntries, PipelineError> {
        self.calls.lock().push("topic");
        Ok(self.entries.clone())
    }

    async fn generate_from_web(
        &self,
        _topic: &str,
        _course: &str,
    ) -> Result<OutlineEntries, PipelineError> {
        self.calls.lock().push("web");
        Ok(self.entries.clone())
    }

    async fn generate_from_index(
        &self,
        _topic: &str,
        _index: IndexHandle,
    ) -> Result<OutlineEntries, PipelineError> {
        self.calls.lock().push("index");
        Ok(self.entries.clone())
    }

    async fn generate_from_index_and_web(
        &self,
        _topic: &str,
        _course: &str,
        _index: IndexHandle,
    ) -> Result<OutlineEntries, PipelineError> {
        self.calls.lock().push("index_and_web");
        Ok(self.entries.clone())
    }
}

#[derive(Default)]
pub struct MockWriter {
    pub calls: Mutex<Vec<(GroupPart, Vec<String>, bool)>>,
    pub fail_part: Option<GroupPart>,
}

#[async_trait]
impl ContentGenerator for MockWriter {
    async fn generate_content(
        &self,
        group: &Outline,
        context: &GenerationContext,
    ) -> Result<Vec<ContentBlock>, PipelineError> {
        self.write(group, context, false)
    }

    async fn generate_content_from_web(
        &self,
        group: &Outline,
        context: &GenerationContext,
    ) -> Result<Vec<ContentBlock>, PipelineError> {
        self.write(group, context, true)
    }
}

impl MockWriter {
    fn write(
        &self,
        group: &Outline,
        context: &GenerationContext,
        web: bool,
    ) -> Result<Vec<ContentBlock>, PipelineError> {
        self.calls.lock().push((
            context.part,
            group.titles().map(str::to_string).collect(),
            web,
        ));
        if self.fail_part == Some(context.part) {
            return Err(PipelineError::Provider("model overloaded".to_string()));
        }
        Ok(group
            .iter()
            .map(|(title, description)| ContentBlock::new(title, description))
            .collect())
    }
}

#[derive(Default)]
pub struct MockImages {
    pub calls: Mutex<usize>,
}

#[async_trait]
impl ImageFinder for MockImages {
    async fn find_images_for_outline(
        &self,
        outline: &Outline,
    ) -> Result<Vec<ImageReference>, PipelineError> {
        *self.calls.lock() += 1;
        Ok(outline
            .titles()
            .take(1)
            .map(|t| ImageReference {
                submodule_title: Some(t.to_string()),
                url: format!("https://images.example/{t}.png"),
                caption: None,
            })
            .collect())
    }
}

#[derive(Default)]
pub struct MockRag {
    pub calls: Mutex<Vec<(InputMode, Vec<String>, bool, usize)>>,
}

#[async_trait]
impl RagExecutor for MockRag {
    async fn execute(
        &self,
        request: RagRequest,
    ) -> Result<(Vec<ContentBlock>, Vec<ImageReference>), PipelineError> {
        self.calls.lock().push((
            request.mode,
            request.outline.titles().map(str::to_string).collect(),
            request.web_search_enabled,
            request.top_k_docs,
        ));
        Ok((
            request
                .outline
                .iter()
                .map(|(title, _)| ContentBlock::new(title, format!("grounded {title}")))
                .collect(),
            Vec::new(),
        ))
    }
}

struct NoHits;

#[async_trait]
impl SearchableIndex for NoHits {
    async fn similarity_search(
        &self,
        _query: &str,
        _k: usize,
    ) -> Result<Vec<RetrievedChunk>, PipelineError> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct MockIndexer {
    pub text_calls: Mutex<Vec<(String, Vec<PathBuf>, Vec<Url>)>>,
    pub image_calls: Mutex<usize>,
    pub loads: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl IndexingService for MockIndexer {
    async fn build_text_index(
        &self,
        index_key: &str,
        documents: &[PathBuf],
        links: &[Url],
    ) -> Result<PathBuf, PipelineError> {
        self.text_calls
            .lock()
            .push((index_key.to_string(), documents.to_vec(), links.to_vec()));
        Ok(PathBuf::from(format!("/indexes/{index_key}/text.json")))
    }

    async fn build_image_index(
        &self,
        index_key: &str,
        _documents: &[PathBuf],
    ) -> Result<PathBuf, PipelineError> {
        *self.image_calls.lock() += 1;
        Ok(PathBuf::from(format!("/indexes/{index_key}/images.json")))
    }

    async fn load_index(&self, location: &Path) -> Result<IndexHandle, PipelineError> {
        self.loads.lock().push(location.to_path_buf());
        Ok(Arc::new(NoHits))
    }
}

/// Pipeline wired to mocks, an in-memory session store, and a sled progress store
pub struct Harness {
    pub dir: TempDir,
    pub outliner: Arc<MockOutliner>,
    pub writer: Arc<MockWriter>,
    pub images: Arc<MockImages>,
    pub rag: Arc<MockRag>,
    pub indexer: Arc<MockIndexer>,
    pub sessions: Arc<MemorySessionStore>,
    pub pipeline: GenerationPipeline,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_writer(MockWriter::default())
    }

    pub fn with_writer(writer: MockWriter) -> Self {
        let dir = TempDir::new().unwrap();
        let outliner = Arc::new(MockOutliner::five());
        let writer = Arc::new(writer);
        let images = Arc::new(MockImages::default());
        let rag = Arc::new(MockRag::default());
        let indexer = Arc::new(MockIndexer::default());
        let sessions = Arc::new(MemorySessionStore::new());

        let db = sled::open(dir.path().join("state")).unwrap();
        let catalog = IndexCatalog::new(&db).unwrap();
        let progress = ProgressRecorder::new(ProgressStore::shared(db).unwrap());
        let session_store: Arc<dyn SessionStore> = sessions.clone();

        let pipeline = GenerationPipeline::new(
            UploadStager::new(dir.path().join("uploads")),
            RetrievalIndexBuilder::new(indexer.clone()).with_catalog(catalog),
            SubmoduleOutliner::new(outliner.clone()),
            WorkflowStates::new(session_store),
            ContentFanOutEngine::new(writer.clone(), images.clone(), rag.clone()),
        )
        .with_progress(progress);

        Self {
            dir,
            outliner,
            writer,
            images,
            rag,
            indexer,
            sessions,
            pipeline,
        }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }

    pub fn outline_calls(&self) -> Vec<&'static str> {
        self.outliner.calls.lock().clone()
    }
}
