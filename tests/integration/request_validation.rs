use lessonforge::workflow::WorkflowToken;
use lessonforge::{CallerContext, FailureKind, GenerationForm, Outline, PipelineError};

use crate::integration::support::{company, document, request, Harness};

#[tokio::test]
async fn empty_lesson_name_has_no_side_effects() {
    let harness = Harness::new();
    let mut bad = request("Placeholder").with_documents(vec![document("notes.md", "text")]);
    bad.lesson_name = String::new();

    let err = harness
        .pipeline
        .start_generation(&company(), bad)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Validation(_)));
    assert_eq!(err.kind(), FailureKind::BadInput);
    assert!(harness.outline_calls().is_empty());
    assert!(harness.indexer.text_calls.lock().is_empty());
    assert!(harness.sessions.is_empty());
    assert!(!harness.uploads_dir().exists());
}

#[test]
fn form_with_blank_lesson_name_is_rejected() {
    let form = GenerationForm {
        lesson_name: Some("   ".to_string()),
        course_name: Some("Rust".to_string()),
        ..GenerationForm::default()
    };
    assert!(matches!(form.into_request(), Err(PipelineError::Validation(_))));
}

#[tokio::test]
async fn anonymous_caller_is_rejected_everywhere() {
    let harness = Harness::new();
    let anonymous = CallerContext::anonymous();

    let err = harness
        .pipeline
        .start_generation(&anonymous, request("Generics"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NotLoggedIn));
    assert_eq!(err.outcome().status, 401);
    assert!(harness.outline_calls().is_empty());

    let token = harness
        .pipeline
        .start_generation(&company(), request("Generics"))
        .await
        .unwrap()
        .token;

    assert!(matches!(
        harness
            .pipeline
            .revise_outline(&anonymous, &token, Outline::new()),
        Err(PipelineError::NotLoggedIn)
    ));
    assert!(matches!(
        harness.pipeline.complete_generation(&anonymous, &token).await,
        Err(PipelineError::NotLoggedIn)
    ));
    assert!(harness.writer.calls.lock().is_empty());
}

#[test]
fn malformed_tokens_are_bad_input() {
    let err = WorkflowToken::parse("not-a-token!").unwrap_err();
    assert_eq!(err.kind(), FailureKind::BadInput);
}
