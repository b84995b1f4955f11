//! Value types shared across the pipeline stages.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of lesson being authored; forwarded to the generators
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonType {
    #[default]
    Theoretical,
    Practical,
    Training,
}

impl LessonType {
    pub fn as_str(self) -> &'static str {
        match self {
            LessonType::Theoretical => "theoretical",
            LessonType::Practical => "practical",
            LessonType::Training => "training",
        }
    }
}

impl fmt::Display for LessonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LessonType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "theoretical" => Ok(LessonType::Theoretical),
            "practical" => Ok(LessonType::Practical),
            "training" => Ok(LessonType::Training),
            other => Err(PipelineError::Validation(format!(
                "unknown lesson_type '{}'",
                other
            ))),
        }
    }
}

/// One generated section of a lesson
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub submodule_title: String,
    pub rendered_text: String,
    /// Position in the outline; assigned by the fan-out engine after rejoining
    pub ordinal: usize,
}

impl ContentBlock {
    pub fn new(submodule_title: impl Into<String>, rendered_text: impl Into<String>) -> Self {
        Self {
            submodule_title: submodule_title.into(),
            rendered_text: rendered_text.into(),
            ordinal: 0,
        }
    }
}

/// An image suggested for the lesson
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageReference {
    /// Submodule the image was found for, when known
    pub submodule_title: Option<String>,
    pub url: String,
    #[serde(default)]
    pub caption: Option<String>,
}

/// Final output of the content phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedDocument {
    pub blocks: Vec<ContentBlock>,
    pub markdown: String,
    pub images: Vec<ImageReference>,
}
