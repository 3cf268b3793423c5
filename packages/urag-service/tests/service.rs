mod common;

use std::{fs, sync::atomic::Ordering, time::Duration};

use uuid::Uuid;

use urag_domain::{Reference, Role};
use urag_service::{
	AskRequest, Error, SearchConversationsRequest, SearchSettings, SemanticSearchRequest,
};
use urag_storage::ChatStore;

use common::{Harness, answer, chunk, test_config};

fn search(query: &str, limit: u32, threshold: f32, filter: Option<&str>) -> SemanticSearchRequest {
	SemanticSearchRequest {
		query: query.to_string(),
		settings: SearchSettings {
			limit: Some(limit),
			distance_threshold: Some(threshold),
			metadata_filter: filter.map(str::to_string),
		},
	}
}

fn ask(query: &str, references: Vec<Reference>) -> AskRequest {
	AskRequest {
		query: query.to_string(),
		references,
		is_initial: true,
		conversation_id: None,
		web_search_enabled: false,
	}
}

#[tokio::test]
async fn capital_query_prefers_the_paris_chunk() {
	let harness = Harness::new(vec![]);

	harness.ingest_paris_and_sky().await;

	let response = harness
		.service
		.semantic_search(search("What is the capital of France?", 1, 1.0, None))
		.await
		.expect("Failed to search.");

	assert_eq!(response.results.len(), 1);
	assert_eq!(response.results[0].filename, "a.txt");
	assert_eq!(response.results[0].content, "Paris is the capital of France.");
}

#[tokio::test]
async fn identical_text_ranks_first_with_zero_distance() {
	let harness = Harness::new(vec![]);

	harness.ingest_paris_and_sky().await;

	let response = harness
		.service
		.semantic_search(search("The sky is blue.", 5, 1.0, None))
		.await
		.expect("Failed to search.");

	assert_eq!(response.results[0].filename, "b.txt");
	assert!(response.results[0].score.abs() < 1e-6);
	assert!(response.results.windows(2).all(|pair| pair[0].score <= pair[1].score));
}

#[tokio::test]
async fn deleted_files_no_longer_match() {
	let harness = Harness::new(vec![]);

	harness.ingest_paris_and_sky().await;
	harness.service.delete_by_filename("a.txt").await.expect("Failed to delete by filename.");

	let response = harness
		.service
		.semantic_search(search("Paris capital France", 5, 1.0, Some("filename == \"a.txt\"")))
		.await
		.expect("Failed to search.");

	assert!(response.results.is_empty());
}

#[tokio::test]
async fn delete_by_id_removes_one_chunk() {
	let harness = Harness::new(vec![]);
	let ids = harness.ingest_paris_and_sky().await;

	harness.service.delete_by_id(ids[0]).await.expect("Failed to delete by id.");

	assert_eq!(harness.backend.inner.row_count(common::COLLECTION).await, 1);
	assert_eq!(
		harness.service.delete_by_id(0).await.expect_err("id 0 must be rejected").kind(),
		"invalid_request"
	);
}

#[tokio::test]
async fn search_settings_are_validated() {
	let harness = Harness::new(vec![]);

	for request in [
		search("sky", 0, 0.3, None),
		search("sky", 51, 0.3, None),
		search("sky", 5, 1.5, None),
		search("sky", 5, 0.3, Some("filename ==")),
		search("   ", 5, 0.3, None),
	] {
		let err = harness.service.semantic_search(request).await.expect_err("request must fail");

		assert_eq!(err.kind(), "invalid_request");
	}
}

#[tokio::test]
async fn shorthand_filter_narrows_results() {
	let harness = Harness::new(vec![]);

	harness.ingest_paris_and_sky().await;

	let response = harness
		.service
		.semantic_search(search("sky", 5, 2.0, Some("source:b.txt")))
		.await
		.expect("Failed to search.");

	assert!(response.results.iter().all(|hit| hit.filename == "b.txt"));
	assert!(!response.results.is_empty());
}

#[tokio::test]
async fn repeated_ingestion_creates_the_collection_once() {
	let harness = Harness::new(vec![]);

	harness.ingest_paris_and_sky().await;
	harness.ingest_paris_and_sky().await;

	assert_eq!(harness.backend.inner.create_calls(), 1);
	assert_eq!(harness.backend.inner.load_calls(), 1);
}

#[tokio::test]
async fn follow_up_without_id_fails_before_any_io() {
	let harness = Harness::new(vec![answer("unused", false, false)]);
	let mut request = ask("And Lyon?", vec![]);

	request.is_initial = false;

	let err = harness.service.ask(request).await.expect_err("follow-up without id must fail");

	assert!(matches!(err, Error::MissingConversationReference));
	assert_eq!(harness.embedder.calls.load(Ordering::SeqCst), 0);
	assert!(harness.generation.schema_names().is_empty());
	assert!(harness.chats.list().await.expect("Failed to list conversations.").is_empty());
}

#[tokio::test]
async fn unknown_follow_up_conversation_is_not_found() {
	let harness = Harness::new(vec![answer("unused", false, false)]);
	let mut request = ask("And Lyon?", vec![]);

	request.is_initial = false;
	request.conversation_id = Some(Uuid::new_v4());

	let err = harness.service.ask(request).await.expect_err("unknown conversation must fail");

	assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn sparse_file_reference_triggers_exactly_one_broad_search() {
	let harness = Harness::new(vec![answer("Paris.", true, false)]);

	harness.ingest_paris_and_sky().await;

	let response = harness
		.service
		.ask(ask("What is the capital of France?", vec![Reference::file("a.txt")]))
		.await
		.expect("Failed to answer.");

	assert_eq!(harness.backend.filtered_searches(), 1);
	assert_eq!(harness.backend.broad_searches(), 1);
	// The broad search finds a.txt again; it is kept once.
	assert_eq!(response.sources.iter().filter(|source| source.filename == "a.txt").count(), 1);
	assert!(response.sources.iter().any(|source| source.filename == "b.txt"));
}

#[tokio::test]
async fn well_covered_file_reference_skips_the_broad_search() {
	let harness = Harness::new(vec![answer("Ownership moves values.", true, false)]);

	harness
		.service
		.ingest_chunks(vec![
			chunk("rust.md", 0, "Rust ownership moves values."),
			chunk("rust.md", 1, "A borrow is a reference."),
			chunk("rust.md", 2, "Ownership and borrow checking."),
		])
		.await
		.expect("Failed to ingest chunks.");
	harness
		.service
		.ask(ask("Explain rust ownership", vec![Reference::file("rust.md")]))
		.await
		.expect("Failed to answer.");

	assert_eq!(harness.backend.filtered_searches(), 1);
	assert_eq!(harness.backend.broad_searches(), 0);
}

#[tokio::test]
async fn unused_evidence_is_returned_but_not_persisted() {
	let harness = Harness::new(vec![answer("I do not know.", false, false)]);

	harness.ingest_paris_and_sky().await;

	let response = harness
		.service
		.ask(ask("What is the capital of France?", vec![]))
		.await
		.expect("Failed to answer.");
	let stored = harness
		.service
		.get_conversation(response.conversation_id)
		.await
		.expect("Failed to load conversation.");

	assert!(!response.sources.is_empty());
	assert!(!response.used_document_context);
	assert_eq!(stored.messages.len(), 2);
	assert!(stored.messages.iter().all(|turn| turn.sources.is_empty()));
	assert_eq!(stored.title, "What is the capital of France?");
}

#[tokio::test]
async fn used_evidence_is_persisted_on_the_assistant_turn() {
	let harness = Harness::new(vec![answer("Paris.", true, false)]);

	harness.ingest_paris_and_sky().await;

	let response = harness
		.service
		.ask(ask("What is the capital of France?", vec![]))
		.await
		.expect("Failed to answer.");
	let stored = harness
		.service
		.get_conversation(response.conversation_id)
		.await
		.expect("Failed to load conversation.");

	assert!(response.used_document_context);
	assert!(stored.messages[0].sources.is_empty());
	assert_eq!(stored.messages[1].sources, response.sources);
}

#[tokio::test]
async fn follow_up_appends_one_turn_pair() {
	let harness =
		Harness::new(vec![answer("Paris.", true, false), answer("Still Paris.", true, false)]);

	harness.ingest_paris_and_sky().await;

	let first = harness
		.service
		.ask(ask("What is the capital of France?", vec![]))
		.await
		.expect("Failed to answer.");
	let before = harness
		.service
		.get_conversation(first.conversation_id)
		.await
		.expect("Failed to load conversation.");
	let mut follow_up = ask("Are you sure about the capital?", vec![]);

	follow_up.is_initial = false;
	follow_up.conversation_id = Some(first.conversation_id);

	let second = harness.service.ask(follow_up).await.expect("Failed to answer follow-up.");
	let after = harness
		.service
		.get_conversation(first.conversation_id)
		.await
		.expect("Failed to load conversation.");

	assert_eq!(second.conversation_id, first.conversation_id);
	assert_eq!(after.messages.len(), before.messages.len() + 2);
	assert_eq!(after.messages[2].content, "Are you sure about the capital?");
	assert_eq!(after.messages[3].content, "Still Paris.");
	assert!(after.last_updated >= before.last_updated);
	assert_eq!(harness.service.list_conversations().await.expect("list").len(), 1);
}

#[tokio::test]
async fn empty_store_still_answers_without_document_context() {
	let harness = Harness::new(vec![answer("I have no documents on that.", true, false)]);
	let response = harness
		.service
		.ask(ask("What is the capital of France?", vec![Reference::file("a.txt")]))
		.await
		.expect("Failed to answer.");
	let stored = harness
		.service
		.get_conversation(response.conversation_id)
		.await
		.expect("Failed to load conversation.");

	assert!(response.sources.is_empty());
	assert!(!response.used_document_context);
	assert_eq!(harness.backend.filtered_searches(), 1);
	assert_eq!(harness.backend.broad_searches(), 1);
	assert!(stored.messages[1].sources.is_empty());
}

#[tokio::test]
async fn concurrent_follow_ups_append_whole_turn_pairs() {
	let harness = Harness::new(vec![
		answer("Paris.", true, false),
		answer("One.", true, false),
		answer("Two.", true, false),
		answer("Three.", true, false),
	]);

	harness.ingest_paris_and_sky().await;

	let first = harness
		.service
		.ask(ask("What is the capital of France?", vec![]))
		.await
		.expect("Failed to answer.");
	let follow_up = |query: &str| {
		let mut request = ask(query, vec![]);

		request.is_initial = false;
		request.conversation_id = Some(first.conversation_id);

		harness.service.ask(request)
	};
	let (one, two, three) = tokio::join!(
		follow_up("Is Paris large?"),
		follow_up("Is Paris old?"),
		follow_up("Is Paris in France?")
	);

	one.expect("first follow-up failed");
	two.expect("second follow-up failed");
	three.expect("third follow-up failed");

	let stored = harness
		.service
		.get_conversation(first.conversation_id)
		.await
		.expect("Failed to load conversation.");
	let roles = stored.messages.iter().map(|turn| turn.role).collect::<Vec<_>>();

	assert_eq!(stored.messages.len(), 8);
	assert!(roles.chunks(2).all(|pair| pair == [Role::User, Role::Assistant]));

	for pair in stored.messages.chunks(2).skip(1) {
		let questions = ["Is Paris large?", "Is Paris old?", "Is Paris in France?"];

		assert!(questions.contains(&pair[0].content.as_str()), "unexpected {:?}", pair[0].content);
		assert!(["One.", "Two.", "Three."].contains(&pair[1].content.as_str()));
	}
}

#[tokio::test]
async fn web_references_are_fetched_while_the_query_is_embedded() {
	let mut cfg = test_config();

	cfg.providers.embedding.timeout_ms = 20;

	let harness = Harness::build(cfg, vec![], None);

	*harness.embedder.delay.lock().expect("delay lock") = Some(Duration::from_millis(500));

	let err = harness
		.service
		.ask(ask("Summarize the page", vec![Reference::web("https://a.test/page")]))
		.await
		.expect_err("embedding must time out");

	assert!(matches!(err, Error::Timeout { operation: "embedding", timeout_ms: 20 }));
	assert_eq!(*harness.web.fetched.lock().expect("lock"), vec![vec![
		"https://a.test/page".to_string()
	]]);
	assert!(harness.chats.list().await.expect("Failed to list conversations.").is_empty());
}

#[tokio::test]
async fn assembler_merges_file_and_web_references() {
	let harness = Harness::new(vec![]);

	harness.ingest_paris_and_sky().await;

	let embedding = harness.service.embed("capital of France").await.expect("Failed to embed.");
	let bundle = harness
		.service
		.assembler()
		.assemble(
			"capital of France",
			&embedding,
			&[Reference::file("a.txt"), Reference::web("https://a.test/page")],
			true,
		)
		.await
		.expect("Failed to assemble.");

	assert_eq!(bundle.document_hits[0].filename, "a.txt");
	assert_eq!(bundle.web_results.len(), 1);
	assert!(!bundle.used_document_context && !bundle.used_web_context);
	assert!(harness.generation.schema_names().is_empty());
}

#[tokio::test]
async fn indexed_documents_are_listed_once_per_file() {
	let harness = Harness::new(vec![]);

	assert!(harness.service.list_documents().await.expect("Failed to list documents.").is_empty());

	harness.ingest_paris_and_sky().await;
	harness
		.service
		.ingest_chunks(vec![chunk("a.txt", 1, "France borders Spain.")])
		.await
		.expect("Failed to ingest chunks.");

	assert_eq!(harness.service.list_documents().await.expect("Failed to list documents."), vec![
		"a.txt".to_string(),
		"b.txt".to_string()
	]);

	harness.service.delete_by_filename("a.txt").await.expect("Failed to delete.");

	assert_eq!(harness.service.list_documents().await.expect("Failed to list documents."), vec![
		"b.txt".to_string()
	]);
}

#[tokio::test]
async fn web_search_runs_only_when_the_model_asks_for_it() {
	let harness = Harness::new(vec![
		serde_json::json!({ "need_web": "true", "reason": "needs current data" }),
		answer("Blue, due to scattering.", false, true),
	]);
	let mut request = ask("Why is the sky blue today?", vec![]);

	request.web_search_enabled = true;

	let response = harness.service.ask(request).await.expect("Failed to answer.");
	let stored = harness
		.service
		.get_conversation(response.conversation_id)
		.await
		.expect("Failed to load conversation.");

	assert_eq!(harness.generation.schema_names(), vec!["web_search_decision", "grounded_answer"]);
	assert_eq!(harness.web.queries.lock().expect("lock").len(), 1);
	assert!(response.used_web_context);
	assert_eq!(stored.messages[1].web_sources, response.web_sources);
}

#[tokio::test]
async fn explicit_web_references_bypass_the_decision() {
	let harness = Harness::new(vec![answer("From the page.", false, true)]);
	let mut request = ask("Summarize the page", vec![
		Reference::web("https://a.test/page"),
		Reference::web("https://a.test/page"),
	]);

	request.web_search_enabled = true;

	let response = harness.service.ask(request).await.expect("Failed to answer.");

	assert_eq!(harness.generation.schema_names(), vec!["grounded_answer"]);
	assert!(harness.web.queries.lock().expect("lock").is_empty());
	assert_eq!(*harness.web.fetched.lock().expect("lock"), vec![vec![
		"https://a.test/page".to_string()
	]]);
	assert_eq!(response.web_sources.len(), 1);
	assert_eq!(response.web_sources[0].score, None);
}

#[tokio::test]
async fn malformed_generation_reply_persists_nothing() {
	let harness = Harness::new(vec![serde_json::json!({ "answer": 42 })]);
	let err = harness
		.service
		.ask(ask("What is the capital of France?", vec![]))
		.await
		.expect_err("malformed reply must fail");

	assert_eq!(err.kind(), "invalid_response_format");
	assert!(harness.chats.list().await.expect("Failed to list conversations.").is_empty());
}

#[tokio::test]
async fn slow_generation_times_out() {
	let mut cfg = test_config();

	cfg.providers.generation.timeout_ms = 20;

	let harness =
		Harness::build(cfg, vec![answer("late", false, false)], Some(Duration::from_millis(500)));
	let err = harness
		.service
		.ask(ask("What is the capital of France?", vec![]))
		.await
		.expect_err("generation must time out");

	assert!(matches!(err, Error::Timeout { operation: "generation", timeout_ms: 20 }));
	assert!(harness.chats.list().await.expect("Failed to list conversations.").is_empty());
}

#[tokio::test]
async fn documents_are_loaded_chunked_and_indexed() {
	let harness = Harness::new(vec![]);
	let dir = std::env::temp_dir().join(format!("urag-ingest-{}", Uuid::new_v4().simple()));

	fs::create_dir_all(&dir).expect("Failed to create temp dir.");

	let path = dir.join("notes.md");

	fs::write(&path, "Rust ownership rules.\n\nThe borrow checker enforces them.")
		.expect("Failed to write document.");

	let response = harness.service.ingest_document(&path).await.expect("Failed to ingest.");

	assert_eq!(response.chunks, 1);
	assert_eq!(response.ids.len(), 1);

	let unsupported = dir.join("scan.pdf");

	fs::write(&unsupported, b"%PDF-1.7").expect("Failed to write document.");

	assert_eq!(
		harness.service.ingest_document(&unsupported).await.expect_err("pdf must fail").kind(),
		"unsupported_format"
	);
	assert_eq!(
		harness.service.ingest_document(&dir.join("missing.txt")).await.expect_err("missing").kind(),
		"file_not_found"
	);

	let _ = fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn conversations_are_searchable_by_content() {
	let harness =
		Harness::new(vec![answer("Paris.", true, false), answer("It is blue.", false, false)]);

	harness.ingest_paris_and_sky().await;
	harness.service.ask(ask("What is the capital of France?", vec![])).await.expect("ask");

	let sky = harness.service.ask(ask("What colour is the sky?", vec![])).await.expect("ask");
	let found = harness
		.service
		.search_conversations(SearchConversationsRequest {
			query: "BLUE".to_string(),
			limit: None,
		})
		.await
		.expect("Failed to search conversations.");

	assert_eq!(found.len(), 1);
	assert_eq!(found[0].id, sky.conversation_id);
	assert!(!found[0].previews.is_empty());

	harness.service.delete_conversation(sky.conversation_id).await.expect("Failed to delete.");

	assert_eq!(
		harness.service.get_conversation(sky.conversation_id).await.expect_err("deleted").kind(),
		"not_found"
	);
}
