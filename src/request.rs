//! Request boundary: the loosely-typed form is validated once into a [`GenerationRequest`].

use crate::error::PipelineError;
use crate::types::LessonType;
use serde::Deserialize;
use unicode_normalization::UnicodeNormalization;
use url::Url;

/// Characters that cannot appear in a lesson name used as a directory name
const PATH_UNSAFE: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Authenticated identity of the caller; authentication itself happens upstream
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    pub company_id: Option<String>,
}

impl CallerContext {
    pub fn company(company_id: impl Into<String>) -> Self {
        Self {
            company_id: Some(company_id.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn require_company(&self) -> Result<&str, PipelineError> {
        match self.company_id.as_deref() {
            Some(id) if !id.trim().is_empty() => Ok(id),
            _ => Err(PipelineError::NotLoggedIn),
        }
    }
}

/// A file uploaded alongside the request
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Typed generation request
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub lesson_name: String,
    pub course_name: String,
    pub lesson_type: LessonType,
    /// Learner profile / lesson description handed to the generators
    pub profile: String,
    pub attached_documents: Vec<UploadedDocument>,
    pub attached_links: Vec<Url>,
    pub web_search_enabled: bool,
    pub include_images: bool,
}

impl GenerationRequest {
    /// Sanitizes the lesson name and checks required fields.
    pub fn new(
        lesson_name: &str,
        course_name: &str,
        lesson_type: LessonType,
        profile: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        let request = Self {
            lesson_name: sanitize_lesson_name(lesson_name)?,
            course_name: course_name.trim().to_string(),
            lesson_type,
            profile: profile.into(),
            attached_documents: Vec::new(),
            attached_links: Vec::new(),
            web_search_enabled: false,
            include_images: false,
        };
        request.validate()?;
        Ok(request)
    }

    pub fn with_documents(mut self, documents: Vec<UploadedDocument>) -> Self {
        self.attached_documents = documents;
        self
    }

    pub fn with_links(mut self, links: Vec<Url>) -> Self {
        self.attached_links = links;
        self
    }

    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.web_search_enabled = enabled;
        self
    }

    pub fn with_images(mut self, include: bool) -> Self {
        self.include_images = include;
        self
    }

    /// Re-checks invariants; fields are public so callers may have edited them.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.lesson_name.trim().is_empty() {
            return Err(PipelineError::Validation(
                "lesson_name must be provided".to_string(),
            ));
        }
        if sanitize_lesson_name(&self.lesson_name)? != self.lesson_name {
            return Err(PipelineError::Validation(format!(
                "lesson_name '{}' contains path-unsafe characters",
                self.lesson_name
            )));
        }
        if self.course_name.trim().is_empty() {
            return Err(PipelineError::Validation(
                "course_name must be provided".to_string(),
            ));
        }
        for doc in &self.attached_documents {
            if doc.file_name.trim().is_empty() {
                return Err(PipelineError::Validation(
                    "uploaded document without a file name".to_string(),
                ));
            }
        }
        for link in &self.attached_links {
            check_link(link)?;
        }
        Ok(())
    }

    pub fn has_documents(&self) -> bool {
        !self.attached_documents.is_empty()
    }

    pub fn has_links(&self) -> bool {
        !self.attached_links.is_empty()
    }
}

/// Form fields as submitted by the authoring UI
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationForm {
    pub lesson_name: Option<String>,
    pub course_name: Option<String>,
    pub lesson_type: Option<String>,
    pub description: Option<String>,
    /// JSON-encoded array of URLs
    pub links: Option<String>,
    pub search_web: Option<String>,
    #[serde(rename = "includeImages")]
    pub include_images: Option<String>,
    #[serde(skip)]
    pub files: Vec<UploadedDocument>,
}

impl GenerationForm {
    pub fn into_request(self) -> Result<GenerationRequest, PipelineError> {
        let lesson_name = self.lesson_name.unwrap_or_default();
        let course_name = self.course_name.unwrap_or_default();
        let lesson_type = match self.lesson_type.as_deref() {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => LessonType::default(),
        };
        let links = match self.links.as_deref() {
            Some(raw) if !raw.trim().is_empty() => parse_links(raw)?,
            _ => Vec::new(),
        };

        Ok(GenerationRequest::new(
            &lesson_name,
            &course_name,
            lesson_type,
            self.description.unwrap_or_default(),
        )?
        .with_documents(self.files.into_iter().filter(|f| !f.bytes.is_empty()).collect())
        .with_links(links)
        .with_web_search(parse_flag(self.search_web.as_deref()))
        .with_images(parse_flag(self.include_images.as_deref())))
    }
}

/// Form booleans: only "true" (any case) is true.
pub fn parse_flag(value: Option<&str>) -> bool {
    value
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Parse the JSON-encoded link list.
pub fn parse_links(raw: &str) -> Result<Vec<Url>, PipelineError> {
    let values: Vec<String> = serde_json::from_str(raw)
        .map_err(|e| PipelineError::Validation(format!("links must be a JSON array: {}", e)))?;
    values
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(|value| -> Result<Url, PipelineError> {
            let url = Url::parse(value)
                .map_err(|e| PipelineError::Validation(format!("invalid link '{}': {}", value, e)))?;
            check_link(&url)?;
            Ok(url)
        })
        .collect()
}

fn check_link(url: &Url) -> Result<(), PipelineError> {
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(()),
        _ => Err(PipelineError::Validation(format!(
            "link '{}' must be an absolute http(s) URL",
            url
        ))),
    }
}

/// Make a lesson name safe to use as a single path component.
pub fn sanitize_lesson_name(raw: &str) -> Result<String, PipelineError> {
    let normalized: String = raw.nfc().collect();
    let replaced: String = normalized
        .chars()
        .map(|c| {
            if PATH_UNSAFE.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let sanitized = replaced.trim().to_string();
    if sanitized.is_empty() {
        return Err(PipelineError::Validation(
            "lesson_name must be provided".to_string(),
        ));
    }
    if sanitized == "." || sanitized == ".." {
        return Err(PipelineError::Validation(format!(
            "lesson_name '{}' is not a valid name",
            sanitized
        )));
    }
    Ok(sanitized)
}
