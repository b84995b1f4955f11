//! Lessonforge: Retrieval-Augmented Lesson Generation
//!
//! A two-phase pipeline that classifies a lesson request by its source material, builds a
//! retrieval index over uploaded documents and links, drafts a submodule outline for review,
//! and then fans content generation out over that outline before assembling the final
//! markdown document.

pub mod assemble;
pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod fanout;
pub mod generators;
pub mod index;
pub mod lexical;
pub mod logging;
pub mod outline;
pub mod pipeline;
pub mod progress;
pub mod provider;
pub mod request;
pub mod search;
pub mod types;
pub mod uploads;
pub mod workflow;

pub use classify::InputMode;
pub use error::{FailureKind, FailureOutcome, PipelineError, StorageError};
pub use outline::Outline;
pub use pipeline::{GenerationPipeline, OutlineResponse};
pub use request::{CallerContext, GenerationForm, GenerationRequest, UploadedDocument};
pub use types::{ContentBlock, GeneratedDocument, ImageReference, LessonType};
pub use workflow::{WorkflowState, WorkflowToken};
