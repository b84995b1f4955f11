//! Content fan-out: generate lesson sections concurrently and rejoin them in outline order.
//!
//! Retrieval-backed workflows hand the whole outline to the [`RagExecutor`] in one call.
//! Otherwise the outline is cut into three contiguous groups of sizes {2, 2, rest}; one task
//! per non-empty group plus one image-lookup task over the full outline run on the runtime's
//! worker pool. Results are joined in group order, never completion order. The first failure
//! aborts the remaining tasks and fails the whole call.

use crate::classify::InputMode;
use crate::error::PipelineError;
use crate::index::LoadedIndex;
use crate::outline::Outline;
use crate::progress::recorder::{emit, ProgressRecorder};
use crate::types::{ContentBlock, ImageReference, LessonType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Sizes of the first two groups; the third takes the remainder.
const LEADING_GROUP_SIZE: usize = 2;

/// Which of the three groups a generation call covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupPart {
    First,
    Second,
    Third,
}

impl GroupPart {
    pub const ALL: [GroupPart; 3] = [GroupPart::First, GroupPart::Second, GroupPart::Third];

    pub fn index(self) -> usize {
        match self {
            GroupPart::First => 0,
            GroupPart::Second => 1,
            GroupPart::Third => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GroupPart::First => "first",
            GroupPart::Second => "second",
            GroupPart::Third => "third",
        }
    }
}

/// Lesson-level context handed to content generators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationContext {
    pub lesson_name: String,
    pub course_name: String,
    pub lesson_type: LessonType,
    pub profile: String,
    pub part: GroupPart,
}

/// Content generation capability
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate_content(
        &self,
        group: &Outline,
        context: &GenerationContext,
    ) -> Result<Vec<ContentBlock>, PipelineError>;

    async fn generate_content_from_web(
        &self,
        group: &Outline,
        context: &GenerationContext,
    ) -> Result<Vec<ContentBlock>, PipelineError>;
}

/// Image lookup capability
#[async_trait]
pub trait ImageFinder: Send + Sync {
    async fn find_images_for_outline(
        &self,
        outline: &Outline,
    ) -> Result<Vec<ImageReference>, PipelineError>;
}

/// Everything a retrieval-backed generation call needs
#[derive(Clone)]
pub struct RagRequest {
    pub outline: Outline,
    pub index: LoadedIndex,
    pub mode: InputMode,
    pub web_search_enabled: bool,
    pub lesson_name: String,
    pub course_name: String,
    pub lesson_type: LessonType,
    pub profile: String,
    pub include_images: bool,
    pub top_k_docs: usize,
}

/// Retrieval-augmented generation capability; owns its own concurrency
#[async_trait]
pub trait RagExecutor: Send + Sync {
    async fn execute(
        &self,
        request: RagRequest,
    ) -> Result<(Vec<ContentBlock>, Vec<ImageReference>), PipelineError>;
}

/// Input to one content-phase run
#[derive(Clone)]
pub struct FanOutInput {
    pub outline: Outline,
    pub retrieval_index: Option<LoadedIndex>,
    pub mode: InputMode,
    pub web_search_enabled: bool,
    pub lesson_name: String,
    pub course_name: String,
    pub lesson_type: LessonType,
    pub profile: String,
    pub include_images: bool,
    /// Workflow token for progress events
    pub token: Option<String>,
}

/// Blocks in outline order with ordinals assigned, plus image references
#[derive(Debug, Clone)]
pub struct FanOutOutput {
    pub blocks: Vec<ContentBlock>,
    pub images: Vec<ImageReference>,
}

/// Split into contiguous groups of sizes {min(2,N), min(2,max(N-2,0)), max(N-4,0)}.
pub fn partition(outline: &Outline) -> [Outline; 3] {
    let n = outline.len();
    let first_end = LEADING_GROUP_SIZE.min(n);
    let second_end = (2 * LEADING_GROUP_SIZE).min(n);
    [
        outline.slice(0, first_end),
        outline.slice(first_end, second_end),
        outline.slice(second_end, n),
    ]
}

enum TaskSlot {
    Group(GroupPart),
    Images,
}

enum TaskOutput {
    Blocks(Vec<ContentBlock>),
    Images(Vec<ImageReference>),
}

/// Drives content generation for one workflow
#[derive(Clone)]
pub struct ContentFanOutEngine {
    content: Arc<dyn ContentGenerator>,
    images: Arc<dyn ImageFinder>,
    rag: Arc<dyn RagExecutor>,
    task_timeout: Option<Duration>,
    top_k_docs: usize,
    progress: Option<ProgressRecorder>,
}

impl ContentFanOutEngine {
    pub const DEFAULT_TOP_K_DOCS: usize = 7;

    pub fn new(
        content: Arc<dyn ContentGenerator>,
        images: Arc<dyn ImageFinder>,
        rag: Arc<dyn RagExecutor>,
    ) -> Self {
        Self {
            content,
            images,
            rag,
            task_timeout: None,
            top_k_docs: Self::DEFAULT_TOP_K_DOCS,
            progress: None,
        }
    }

    pub fn with_task_timeout(mut self, task_timeout: Option<Duration>) -> Self {
        self.task_timeout = task_timeout;
        self
    }

    pub fn with_top_k_docs(mut self, top_k_docs: usize) -> Self {
        self.top_k_docs = top_k_docs.max(1);
        self
    }

    pub fn with_progress(mut self, progress: Option<ProgressRecorder>) -> Self {
        self.progress = progress;
        self
    }

    pub async fn generate(&self, input: FanOutInput) -> Result<FanOutOutput, PipelineError> {
        let token = input.token.clone();
        emit(
            self.progress.as_ref(),
            token.as_deref(),
            "content_started",
            json!({
                "mode": input.mode.as_str(),
                "submodules": input.outline.len(),
                "retrieval": input.retrieval_index.is_some(),
            }),
        );

        let result = match input.retrieval_index.clone() {
            Some(index) => self.generate_with_retrieval(input, index).await,
            None => self.generate_fanned_out(input).await,
        };

        match &result {
            Ok(output) => {
                info!(blocks = output.blocks.len(), images = output.images.len(), "Content generated");
                emit(
                    self.progress.as_ref(),
                    token.as_deref(),
                    "content_completed",
                    json!({ "blocks": output.blocks.len(), "images": output.images.len() }),
                );
            }
            Err(err) => {
                error!(error = %err, "Content generation failed");
                emit(
                    self.progress.as_ref(),
                    token.as_deref(),
                    "content_failed",
                    json!({ "error": err.to_string() }),
                );
            }
        }
        result
    }

    async fn generate_with_retrieval(
        &self,
        input: FanOutInput,
        index: LoadedIndex,
    ) -> Result<FanOutOutput, PipelineError> {
        info!(
            mode = %input.mode,
            submodules = input.outline.len(),
            top_k = self.top_k_docs,
            "Generating content from retrieval index"
        );
        let request = RagRequest {
            outline: input.outline,
            index,
            mode: input.mode,
            web_search_enabled: input.web_search_enabled,
            lesson_name: input.lesson_name,
            course_name: input.course_name,
            lesson_type: input.lesson_type,
            profile: input.profile,
            include_images: input.include_images,
            top_k_docs: self.top_k_docs,
        };
        let rag = self.rag.clone();
        let (blocks, images) =
            with_timeout(self.task_timeout, "retrieval generation", rag.execute(request))
                .await
                .map_err(as_content_failure)?;
        Ok(FanOutOutput {
            blocks: number(blocks),
            images,
        })
    }

    async fn generate_fanned_out(&self, input: FanOutInput) -> Result<FanOutOutput, PipelineError> {
        let groups = partition(&input.outline);
        let outline = Arc::new(input.outline.clone());
        let mut tasks: JoinSet<(TaskSlot, Result<TaskOutput, PipelineError>)> = JoinSet::new();

        for (part, group) in GroupPart::ALL.into_iter().zip(groups) {
            if group.is_empty() {
                debug!(group = part.as_str(), "Skipping empty group");
                continue;
            }
            let context = GenerationContext {
                lesson_name: input.lesson_name.clone(),
                course_name: input.course_name.clone(),
                lesson_type: input.lesson_type,
                profile: input.profile.clone(),
                part,
            };
            let generator = self.content.clone();
            let web = input.web_search_enabled;
            let timeout = self.task_timeout;
            emit(
                self.progress.as_ref(),
                input.token.as_deref(),
                "group_started",
                json!({ "group": part.as_str(), "submodules": group.titles().collect::<Vec<_>>() }),
            );
            tasks.spawn(async move {
                let label = format!("{} content group", part.as_str());
                let work = async {
                    if web {
                        generator.generate_content_from_web(&group, &context).await
                    } else {
                        generator.generate_content(&group, &context).await
                    }
                };
                let outcome = with_timeout(timeout, &label, work).await;
                (TaskSlot::Group(part), outcome.map(TaskOutput::Blocks))
            });
        }

        let finder = self.images.clone();
        let timeout = self.task_timeout;
        let image_outline = outline.clone();
        tasks.spawn(async move {
            let outcome = with_timeout(
                timeout,
                "image lookup",
                finder.find_images_for_outline(&image_outline),
            )
            .await;
            (TaskSlot::Images, outcome.map(TaskOutput::Images))
        });

        let mut group_results: [Option<Vec<ContentBlock>>; 3] = [None, None, None];
        let mut images = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            let (slot, outcome) = match joined {
                Ok(pair) => pair,
                Err(join_err) => {
                    tasks.abort_all();
                    return Err(PipelineError::ContentGeneration(format!(
                        "generation task aborted: {}",
                        join_err
                    )));
                }
            };
            match (slot, outcome) {
                (TaskSlot::Group(part), Ok(TaskOutput::Blocks(blocks))) => {
                    debug!(group = part.as_str(), blocks = blocks.len(), "Group completed");
                    emit(
                        self.progress.as_ref(),
                        input.token.as_deref(),
                        "group_completed",
                        json!({ "group": part.as_str(), "blocks": blocks.len() }),
                    );
                    group_results[part.index()] = Some(blocks);
                }
                (TaskSlot::Images, Ok(TaskOutput::Images(found))) => {
                    emit(
                        self.progress.as_ref(),
                        input.token.as_deref(),
                        "images_completed",
                        json!({ "images": found.len() }),
                    );
                    images = found;
                }
                (slot, Ok(_)) => {
                    tasks.abort_all();
                    return Err(PipelineError::ContentGeneration(format!(
                        "{} returned an unexpected result",
                        slot_label(&slot)
                    )));
                }
                (slot, Err(err)) => {
                    tasks.abort_all();
                    let label = slot_label(&slot);
                    emit(
                        self.progress.as_ref(),
                        input.token.as_deref(),
                        "group_failed",
                        json!({ "task": label, "error": err.to_string() }),
                    );
                    return Err(match as_content_failure(err) {
                        PipelineError::ContentGeneration(msg) => {
                            PipelineError::ContentGeneration(format!("{}: {}", label, msg))
                        }
                        other => other,
                    });
                }
            }
        }

        let blocks: Vec<ContentBlock> = group_results
            .into_iter()
            .flat_map(|group| group.unwrap_or_default())
            .collect();

        Ok(FanOutOutput {
            blocks: number(blocks),
            images,
        })
    }
}

fn slot_label(slot: &TaskSlot) -> String {
    match slot {
        TaskSlot::Group(part) => format!("{} content group", part.as_str()),
        TaskSlot::Images => "image lookup".to_string(),
    }
}

/// Assign ordinals by final position.
fn number(blocks: Vec<ContentBlock>) -> Vec<ContentBlock> {
    blocks
        .into_iter()
        .enumerate()
        .map(|(ordinal, block)| ContentBlock { ordinal, ..block })
        .collect()
}

fn as_content_failure(err: PipelineError) -> PipelineError {
    match err {
        PipelineError::ContentGeneration(_) => err,
        other => PipelineError::ContentGeneration(other.to_string()),
    }
}

async fn with_timeout<T, F>(
    timeout: Option<Duration>,
    label: &str,
    work: F,
) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, PipelineError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, work).await.map_err(|_| {
            PipelineError::ContentGeneration(format!(
                "{} timed out after {}s",
                label,
                limit.as_secs_f32()
            ))
        })?,
        None => work.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexHandle, RetrievalIndex, RetrievedChunk, SearchableIndex};
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn outline_of(titles: &[&str]) -> Outline {
        Outline::from_entries(titles.iter().map(|t| (t.to_string(), format!("about {t}"))))
    }

    /// Echoes one block per submodule; the first group sleeps so it finishes last.
    #[derive(Default)]
    struct EchoGenerator {
        calls: Mutex<Vec<(GroupPart, Vec<String>, bool)>>,
        fail_part: Option<GroupPart>,
        slow_first: bool,
    }

    #[async_trait]
    impl ContentGenerator for EchoGenerator {
        async fn generate_content(
            &self,
            group: &Outline,
            context: &GenerationContext,
        ) -> Result<Vec<ContentBlock>, PipelineError> {
            self.run(group, context, false).await
        }

        async fn generate_content_from_web(
            &self,
            group: &Outline,
            context: &GenerationContext,
        ) -> Result<Vec<ContentBlock>, PipelineError> {
            self.run(group, context, true).await
        }
    }

    impl EchoGenerator {
        async fn run(
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
            if self.slow_first && context.part == GroupPart::First {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            if self.fail_part == Some(context.part) {
                return Err(PipelineError::Provider(format!(
                    "{} group exploded",
                    context.part.as_str()
                )));
            }
            Ok(group
                .iter()
                .map(|(title, description)| ContentBlock::new(title, format!("{description} text")))
                .collect())
        }
    }

    struct StaticImages {
        fail: bool,
    }

    #[async_trait]
    impl ImageFinder for StaticImages {
        async fn find_images_for_outline(
            &self,
            outline: &Outline,
        ) -> Result<Vec<ImageReference>, PipelineError> {
            if self.fail {
                return Err(PipelineError::Provider("image search down".into()));
            }
            Ok(outline
                .titles()
                .map(|t| ImageReference {
                    submodule_title: Some(t.to_string()),
                    url: format!("https://img.example/{t}.png"),
                    caption: None,
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct RecordingRag {
        requests: Mutex<Vec<(usize, usize, bool)>>,
    }

    #[async_trait]
    impl RagExecutor for RecordingRag {
        async fn execute(
            &self,
            request: RagRequest,
        ) -> Result<(Vec<ContentBlock>, Vec<ImageReference>), PipelineError> {
            self.requests.lock().push((
                request.outline.len(),
                request.top_k_docs,
                request.web_search_enabled,
            ));
            Ok((
                request
                    .outline
                    .titles()
                    .map(|t| ContentBlock::new(t, "rag"))
                    .collect(),
                Vec::new(),
            ))
        }
    }

    struct Empty;

    #[async_trait]
    impl SearchableIndex for Empty {
        async fn similarity_search(
            &self,
            _query: &str,
            _k: usize,
        ) -> Result<Vec<RetrievedChunk>, PipelineError> {
            Ok(Vec::new())
        }
    }

    fn input(outline: Outline, web: bool) -> FanOutInput {
        FanOutInput {
            outline,
            retrieval_index: None,
            mode: if web { InputMode::WebOnly } else { InputMode::TopicOnly },
            web_search_enabled: web,
            lesson_name: "Ownership".to_string(),
            course_name: "Rust".to_string(),
            lesson_type: LessonType::Theoretical,
            profile: "students".to_string(),
            include_images: false,
            token: None,
        }
    }

    fn engine(generator: Arc<EchoGenerator>, images_fail: bool) -> ContentFanOutEngine {
        ContentFanOutEngine::new(
            generator,
            Arc::new(StaticImages { fail: images_fail }),
            Arc::new(RecordingRag::default()),
        )
    }

    fn titles(blocks: &[ContentBlock]) -> Vec<&str> {
        blocks.iter().map(|b| b.submodule_title.as_str()).collect()
    }

    #[test]
    fn five_entries_partition_two_two_one() {
        let [a, b, c] = partition(&outline_of(&["A", "B", "C", "D", "E"]));
        assert_eq!(a.titles().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(b.titles().collect::<Vec<_>>(), vec!["C", "D"]);
        assert_eq!(c.titles().collect::<Vec<_>>(), vec!["E"]);
    }

    #[test]
    fn single_entry_partition_leaves_empty_groups() {
        let [a, b, c] = partition(&outline_of(&["A"]));
        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
        assert!(c.is_empty());
    }

    #[test]
    fn large_outline_keeps_remainder_in_third_group() {
        let names: Vec<String> = (0..9).map(|i| format!("S{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let [a, b, c] = partition(&outline_of(&refs));
        assert_eq!((a.len(), b.len(), c.len()), (2, 2, 5));
    }

    proptest! {
        #[test]
        fn partition_sizes_and_order(n in 0usize..40) {
            let names: Vec<String> = (0..n).map(|i| format!("S{i}")).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let outline = outline_of(&refs);
            let groups = partition(&outline);
            prop_assert_eq!(groups[0].len(), n.min(2));
            prop_assert_eq!(groups[1].len(), n.saturating_sub(2).min(2));
            prop_assert_eq!(groups[2].len(), n.saturating_sub(4));
            let rejoined: Vec<&str> = groups.iter().flat_map(|g| g.titles()).collect();
            prop_assert_eq!(rejoined, refs);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn rejoins_in_outline_order_regardless_of_completion() {
        let generator = Arc::new(EchoGenerator {
            slow_first: true,
            ..EchoGenerator::default()
        });
        let output = engine(generator.clone(), false)
            .generate(input(outline_of(&["A", "B", "C", "D", "E"]), false))
            .await
            .unwrap();

        assert_eq!(titles(&output.blocks), vec!["A", "B", "C", "D", "E"]);
        assert_eq!(
            output.blocks.iter().map(|b| b.ordinal).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );
        assert_eq!(output.images.len(), 5);
        let calls = generator.calls.lock();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(_, _, web)| !web));
    }

    #[tokio::test]
    async fn single_entry_skips_empty_groups() {
        let generator = Arc::new(EchoGenerator::default());
        let output = engine(generator.clone(), false)
            .generate(input(outline_of(&["A"]), true))
            .await
            .unwrap();
        assert_eq!(titles(&output.blocks), vec!["A"]);
        let calls = generator.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, GroupPart::First);
        assert!(calls[0].2, "web search path should be used");
    }

    #[tokio::test]
    async fn any_group_failure_fails_the_whole_call() {
        for part in GroupPart::ALL {
            let generator = Arc::new(EchoGenerator {
                fail_part: Some(part),
                ..EchoGenerator::default()
            });
            let err = engine(generator, false)
                .generate(input(outline_of(&["A", "B", "C", "D", "E"]), false))
                .await
                .unwrap_err();
            match err {
                PipelineError::ContentGeneration(msg) => assert!(msg.contains(part.as_str())),
                other => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn image_failure_discards_successful_content() {
        let generator = Arc::new(EchoGenerator::default());
        let err = engine(generator, true)
            .generate(input(outline_of(&["A", "B", "C"]), false))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ContentGeneration(_)));
    }

    #[tokio::test]
    async fn slow_group_times_out_when_configured() {
        let generator = Arc::new(EchoGenerator {
            slow_first: true,
            ..EchoGenerator::default()
        });
        let err = engine(generator, false)
            .with_task_timeout(Some(Duration::from_millis(5)))
            .generate(input(outline_of(&["A", "B", "C"]), false))
            .await
            .unwrap_err();
        match err {
            PipelineError::ContentGeneration(msg) => assert!(msg.contains("timed out")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn retrieval_index_uses_single_rag_call() {
        let generator = Arc::new(EchoGenerator::default());
        let rag = Arc::new(RecordingRag::default());
        let engine = ContentFanOutEngine::new(
            generator.clone(),
            Arc::new(StaticImages { fail: false }),
            rag.clone(),
        );
        let handle: IndexHandle = Arc::new(Empty);
        let mut fan_input = input(outline_of(&["A", "B", "C", "D", "E", "F"]), true);
        fan_input.mode = InputMode::DocumentsAndWeb;
        fan_input.retrieval_index = Some(LoadedIndex {
            locations: RetrievalIndex {
                text_index_location: PathBuf::from("/idx/text.json"),
                image_index_location: None,
            },
            text: handle,
            images: None,
        });

        let output = engine.generate(fan_input).await.unwrap();
        assert_eq!(titles(&output.blocks), vec!["A", "B", "C", "D", "E", "F"]);
        assert_eq!(*rag.requests.lock(), vec![(6, 7, true)]);
        assert!(generator.calls.lock().is_empty());
    }
}
