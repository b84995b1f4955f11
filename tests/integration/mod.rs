//! Integration tests for the lessonforge generation pipeline

mod generation_flow;
mod outline_revision;
mod request_validation;
mod support;
