use lessonforge::classify::InputMode;
use lessonforge::fanout::GroupPart;
use lessonforge::{CallerContext, PipelineError};
use std::path::PathBuf;

use crate::integration::support::{
    company, document, link, request, scope, Harness, MockWriter, COMPANY, COURSE,
};

#[tokio::test]
async fn topic_only_request_round_trips() {
    let harness = Harness::new();
    let response = harness
        .pipeline
        .start_generation(&company(), request("Error Handling"))
        .await
        .unwrap();

    assert_eq!(response.mode, InputMode::TopicOnly);
    assert_eq!(
        response.outline.titles().collect::<Vec<_>>(),
        vec!["A", "B", "C", "D", "E"]
    );
    assert_eq!(harness.outline_calls(), vec!["topic"]);
    assert!(harness.indexer.text_calls.lock().is_empty());

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
    assert_eq!(titles, vec!["A", "B", "C", "D", "E"]);
    assert_eq!(
        document.blocks.iter().map(|b| b.ordinal).collect::<Vec<_>>(),
        vec![0, 1, 2, 3, 4]
    );
    assert!(document.markdown.starts_with("## A\n\nA description"));
    assert!(document.markdown.ends_with("## E\n\nE description"));
    assert_eq!(document.images.len(), 1);
    assert!(harness.rag.calls.lock().is_empty());

    let calls = harness.writer.calls.lock();
    let mut groups: Vec<_> = calls.iter().map(|(part, titles, web)| (*part, titles.clone(), *web)).collect();
    groups.sort_by_key(|(part, _, _)| part.index());
    assert_eq!(
        groups,
        vec![
            (GroupPart::First, vec!["A".to_string(), "B".to_string()], false),
            (GroupPart::Second, vec!["C".to_string(), "D".to_string()], false),
            (GroupPart::Third, vec!["E".to_string()], false),
        ]
    );
}

#[tokio::test]
async fn web_only_request_uses_web_generation() {
    let harness = Harness::new();
    let response = harness
        .pipeline
        .start_generation(&company(), request("Lifetimes").with_web_search(true))
        .await
        .unwrap();
    assert_eq!(response.mode, InputMode::WebOnly);
    assert_eq!(harness.outline_calls(), vec!["web"]);

    harness
        .pipeline
        .complete_generation(&company(), &response.token)
        .await
        .unwrap();
    assert!(harness.writer.calls.lock().iter().all(|(_, _, web)| *web));
    assert_eq!(*harness.images.calls.lock(), 1);
}

#[tokio::test]
async fn documents_request_stages_indexes_and_uses_retrieval() {
    let harness = Harness::new();
    let response = harness
        .pipeline
        .start_generation(
            &company(),
            request("Ownership")
                .with_documents(vec![
                    document("chapter4.md", "# Ownership"),
                    document("../escape.txt", "moves"),
                ])
                .with_images(true),
        )
        .await
        .unwrap();

    assert_eq!(response.mode, InputMode::DocumentsOnly);
    assert_eq!(harness.outline_calls(), vec!["index"]);

    let staged = harness.uploads_dir().join(scope(COMPANY, "Ownership"));
    assert!(staged.join("chapter4.md").exists());
    assert!(staged.join("escape.txt").exists());

    {
        let text_calls = harness.indexer.text_calls.lock();
        assert_eq!(text_calls.len(), 1);
        assert_eq!(text_calls[0].1.len(), 2);
        assert!(text_calls[0].2.is_empty());
    }
    assert_eq!(*harness.indexer.image_calls.lock(), 1);

    let document = harness
        .pipeline
        .complete_generation(&company(), &response.token)
        .await
        .unwrap();
    assert!(harness.writer.calls.lock().is_empty());
    assert_eq!(*harness.images.calls.lock(), 0);
    assert_eq!(document.blocks.len(), 5);
    assert_eq!(document.blocks[0].rendered_text, "grounded A");

    let rag_calls = harness.rag.calls.lock();
    assert_eq!(rag_calls.len(), 1);
    assert_eq!(rag_calls[0].0, InputMode::DocumentsOnly);
    assert_eq!(rag_calls[0].3, 7);
    assert!(harness
        .indexer
        .loads
        .lock()
        .iter()
        .any(|p| p.ends_with("images.json")));
}

#[tokio::test]
async fn documents_and_links_beat_web_search() {
    let harness = Harness::new();
    let response = harness
        .pipeline
        .start_generation(
            &company(),
            request("Traits")
                .with_documents(vec![document("traits.md", "trait objects")])
                .with_links(vec![link("https://doc.rust-lang.org/book/ch10-02-traits.html")])
                .with_web_search(true),
        )
        .await
        .unwrap();

    assert_eq!(response.mode, InputMode::DocumentsAndLinks);
    assert_eq!(harness.outline_calls(), vec!["index_and_web"]);
    let text_calls = harness.indexer.text_calls.lock();
    assert_eq!(text_calls[0].2.len(), 1);
    assert_eq!(*harness.indexer.image_calls.lock(), 0);
}

#[tokio::test]
async fn documents_with_web_skip_links_in_index() {
    let harness = Harness::new();
    let response = harness
        .pipeline
        .start_generation(
            &company(),
            request("Macros")
                .with_documents(vec![document("macros.md", "macro_rules!")])
                .with_web_search(true),
        )
        .await
        .unwrap();
    assert_eq!(response.mode, InputMode::DocumentsAndWeb);
    assert_eq!(harness.outline_calls(), vec!["index_and_web"]);

    harness
        .pipeline
        .complete_generation(&company(), &response.token)
        .await
        .unwrap();
    let rag_calls = harness.rag.calls.lock();
    assert!(rag_calls[0].2, "web search flag is forwarded to retrieval");
}

#[tokio::test]
async fn failing_group_returns_no_document() {
    let harness = Harness::with_writer(MockWriter {
        fail_part: Some(GroupPart::Third),
        ..MockWriter::default()
    });
    let response = harness
        .pipeline
        .start_generation(&company(), request("Iterators"))
        .await
        .unwrap();

    let err = harness
        .pipeline
        .complete_generation(&company(), &response.token)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ContentGeneration(_)));

    let events = harness.pipeline.events(&response.token).unwrap();
    assert!(events.iter().any(|e| e.event_type == "content_failed"));
    assert!(!events.iter().any(|e| e.event_type == "content_completed"));

    // The stored state survives so the phase can be re-run.
    assert!(harness
        .pipeline
        .states()
        .load_for_content("acme", &response.token)
        .is_ok());
}

#[tokio::test]
async fn progress_events_follow_both_phases() {
    let harness = Harness::new();
    let response = harness
        .pipeline
        .start_generation(&company(), request("Closures"))
        .await
        .unwrap();
    harness
        .pipeline
        .complete_generation(&company(), &response.token)
        .await
        .unwrap();

    let events = harness.pipeline.events(&response.token).unwrap();
    assert!(events.windows(2).all(|w| w[1].seq == w[0].seq + 1));
    let types: Vec<_> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(&types[..3], &["outline_started", "mode_classified", "outline_generated"]);
    assert_eq!(types.iter().filter(|t| **t == "group_started").count(), 3);
    assert_eq!(types.last(), Some(&"content_completed"));
}

fn file_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect()
}

#[tokio::test]
async fn companies_sharing_a_lesson_name_keep_separate_sources() {
    let harness = Harness::new();
    let first = CallerContext::company("initech");
    let second = CallerContext::company("globex");

    let first_token = harness
        .pipeline
        .start_generation(
            &first,
            request("Traits").with_documents(vec![document("a_confidential.md", "secret")]),
        )
        .await
        .unwrap()
        .token;
    harness
        .pipeline
        .start_generation(
            &second,
            request("Traits").with_documents(vec![document("b_notes.md", "public")]),
        )
        .await
        .unwrap();

    {
        let text_calls = harness.indexer.text_calls.lock();
        assert_eq!(text_calls.len(), 2);
        assert_eq!(text_calls[0].0, scope("initech", "Traits"));
        assert_eq!(file_names(&text_calls[0].1), vec!["a_confidential.md"]);
        assert_eq!(text_calls[1].0, scope("globex", "Traits"));
        assert_eq!(file_names(&text_calls[1].1), vec!["b_notes.md"]);
    }
    assert!(!harness
        .uploads_dir()
        .join(scope("globex", "Traits"))
        .join("a_confidential.md")
        .exists());

    // The first company's stored index still points at its own build.
    let state = harness
        .pipeline
        .states()
        .load("initech", &first_token)
        .unwrap();
    let first_index = state.retrieval_index.unwrap();
    assert_eq!(
        first_index.text_index_location,
        PathBuf::from(format!("/indexes/{}/text.json", scope("initech", "Traits")))
    );
    assert_eq!(
        harness
            .pipeline
            .recorded_index(&first, COURSE, "Traits")
            .unwrap(),
        Some(first_index.clone())
    );
    let second_index = harness
        .pipeline
        .recorded_index(&second, COURSE, "Traits")
        .unwrap()
        .unwrap();
    assert_ne!(second_index, first_index);
}

#[tokio::test]
async fn courses_sharing_a_lesson_name_keep_separate_sources() {
    let harness = Harness::new();
    let rust = request("Testing").with_documents(vec![document("cargo_test.md", "cargo")]);
    let go = lessonforge::GenerationRequest::new(
        "Testing",
        "Go Basics",
        lessonforge::LessonType::Practical,
        "",
    )
    .unwrap()
    .with_documents(vec![document("go_test.md", "go test")]);

    harness.pipeline.start_generation(&company(), rust).await.unwrap();
    harness.pipeline.start_generation(&company(), go).await.unwrap();

    let text_calls = harness.indexer.text_calls.lock();
    assert_ne!(text_calls[0].0, text_calls[1].0);
    assert_eq!(file_names(&text_calls[1].1), vec!["go_test.md"]);
}
