use lessonforge::workflow::{SledSessionStore, WorkflowStates, WorkflowToken};
use lessonforge::{CallerContext, FailureKind, Outline, PipelineError};
use std::sync::Arc;
use tempfile::TempDir;

use crate::integration::support::{company, request, Harness, COMPANY};

#[tokio::test]
async fn revision_overwrites_only_the_outline() {
    let harness = Harness::new();
    let response = harness
        .pipeline
        .start_generation(&company(), request("Smart Pointers").with_web_search(true))
        .await
        .unwrap();
    let before = harness
        .pipeline
        .states()
        .load(COMPANY, &response.token)
        .unwrap();

    let revised = Outline::from_entries(vec![("Box", "heap"), ("Rc", "shared"), ("RefCell", "interior")]);
    harness
        .pipeline
        .revise_outline(&company(), &response.token, revised.clone())
        .unwrap();

    let after = harness
        .pipeline
        .states()
        .load(COMPANY, &response.token)
        .unwrap();
    assert_eq!(after.outline, revised);
    assert!(after.revised_at_ms.is_some());
    assert_eq!(
        lessonforge::WorkflowState {
            outline: before.outline.clone(),
            revised_at_ms: None,
            ..after.clone()
        },
        before
    );

    let document = harness
        .pipeline
        .complete_generation(&company(), &response.token)
        .await
        .unwrap();
    let titles: Vec<_> = document
        .blocks
        .iter()
        .map(|b| b.submodule_title.as_str())
        .collect();
    assert_eq!(titles, vec!["Box", "Rc", "RefCell"]);
}

#[tokio::test]
async fn empty_revision_is_distinct_from_expired_session() {
    let harness = Harness::new();
    let token = harness
        .pipeline
        .start_generation(&company(), request("Modules"))
        .await
        .unwrap()
        .token;
    harness
        .pipeline
        .revise_outline(&company(), &token, Outline::new())
        .unwrap();

    let err = harness
        .pipeline
        .complete_generation(&company(), &token)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::OutlineNotGenerated(_)));
    assert_eq!(err.kind(), FailureKind::BadInput);

    let unknown = WorkflowToken::parse("00112233445566778899aabbccddeeff").unwrap();
    let err = harness
        .pipeline
        .complete_generation(&company(), &unknown)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::StateNotFound(_)));
    assert_eq!(err.kind(), FailureKind::SessionExpired);
    assert_eq!(err.outcome().status, 410);
}

#[tokio::test]
async fn other_company_cannot_see_the_workflow() {
    let harness = Harness::new();
    let token = harness
        .pipeline
        .start_generation(&company(), request("Async"))
        .await
        .unwrap()
        .token;

    let rival = CallerContext::company("globex");
    assert!(matches!(
        harness.pipeline.complete_generation(&rival, &token).await,
        Err(PipelineError::StateNotFound(_))
    ));
    assert!(matches!(
        harness
            .pipeline
            .revise_outline(&rival, &token, Outline::from_entries(vec![("X", "")])),
        Err(PipelineError::StateNotFound(_))
    ));
}

#[tokio::test]
async fn restarting_a_lesson_supersedes_the_old_token() {
    let harness = Harness::new();
    let first = harness
        .pipeline
        .start_generation(&company(), request("Testing"))
        .await
        .unwrap()
        .token;
    let second = harness
        .pipeline
        .start_generation(&company(), request("Testing"))
        .await
        .unwrap()
        .token;

    assert_ne!(first, second);
    assert_eq!(harness.sessions.len(), 1);
    assert!(matches!(
        harness.pipeline.complete_generation(&company(), &first).await,
        Err(PipelineError::StateNotFound(_))
    ));
    assert!(harness
        .pipeline
        .complete_generation(&company(), &second)
        .await
        .is_ok());
}

#[test]
fn sled_states_are_visible_to_a_second_handle() {
    let dir = TempDir::new().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let writer = WorkflowStates::new(Arc::new(SledSessionStore::new(&db).unwrap()));
    let reader = WorkflowStates::new(Arc::new(SledSessionStore::new(&db).unwrap()));

    let state = lessonforge::WorkflowState {
        company_id: COMPANY.to_string(),
        mode: lessonforge::InputMode::TopicOnly,
        outline: Outline::from_entries(vec![("Intro", "start"), ("Next", "then")]),
        retrieval_index: None,
        document_source_path: None,
        profile: String::new(),
        lesson_name: "Persistence".to_string(),
        course_name: "Rust".to_string(),
        lesson_type: lessonforge::LessonType::Training,
        web_search_enabled: false,
        include_images: true,
        created_at_ms: 1,
        revised_at_ms: None,
    };
    let token = writer.save(&state).unwrap();
    let loaded = reader.load_for_content(COMPANY, &token).unwrap();
    assert_eq!(loaded, state);
    assert_eq!(
        loaded.outline.titles().collect::<Vec<_>>(),
        vec!["Intro", "Next"]
    );
}
