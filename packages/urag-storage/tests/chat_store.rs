use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use urag_config::Postgres;
use urag_domain::{Conversation, ConversationTurn, Source};
use urag_storage::{
	ChatStore, Error,
	db::{Db, PgChatStore},
};
use urag_testkit::TestDatabase;

async fn store(test_db: &TestDatabase) -> PgChatStore {
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	PgChatStore::new(db)
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set URAG_PG_DSN to run."]
async fn schema_bootstrap_is_repeatable() {
	let Some(base_dsn) = urag_testkit::env_dsn() else {
		eprintln!("Skipping schema_bootstrap_is_repeatable; set URAG_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 1 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");
	db.ensure_schema().await.expect("Failed to ensure schema twice.");

	let count: i64 = sqlx::query_scalar(
		"SELECT count(*) FROM information_schema.tables WHERE table_name = 'conversation_turns'",
	)
	.fetch_one(&db.pool)
	.await
	.expect("Failed to query schema tables.");

	assert_eq!(count, 1);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set URAG_PG_DSN to run."]
async fn conversations_round_trip_with_sources() {
	let Some(base_dsn) = urag_testkit::env_dsn() else {
		eprintln!(
			"Skipping conversations_round_trip_with_sources; set URAG_PG_DSN to run this test."
		);

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let store = store(&test_db).await;
	let now = OffsetDateTime::now_utc().replace_nanosecond(0).expect("valid nanosecond");
	let source = Source { content: "Paris is in France.".to_string(), score: 0.1, filename: "a.txt".to_string() };
	let conversation = Conversation::start(
		"Where is Paris?",
		vec![
			ConversationTurn::user("Where is Paris?", now),
			ConversationTurn::assistant("In France.", vec![source.clone()], vec![], now),
		],
		now,
	);
	let id = store.create(conversation).await.expect("Failed to create conversation.");
	let stored = store.get(id).await.expect("Failed to load conversation.");

	assert_eq!(stored.title, "Where is Paris?");
	assert_eq!(stored.messages.len(), 2);
	assert_eq!(stored.messages[1].sources, vec![source]);

	let updated = store
		.append_turns(id, vec![
			ConversationTurn::user("And Lyon?", now - Duration::minutes(5)),
			ConversationTurn::assistant("Also France.", vec![], vec![], now - Duration::minutes(5)),
		])
		.await
		.expect("Failed to append turns.");
	let stored = store.get(id).await.expect("Failed to load conversation.");

	assert_eq!(stored.messages.len(), 4);
	assert_eq!(stored.messages[2].content, "And Lyon?");
	assert!(updated >= now);

	let found = store.search_by_text("lyon", 10).await.expect("Failed to search conversations.");

	assert_eq!(found.len(), 1);
	assert_eq!(found[0].id, id);
	assert_eq!(store.list().await.expect("Failed to list conversations.")[0].message_count, 4);

	store.delete(id).await.expect("Failed to delete conversation.");

	assert!(matches!(store.get(id).await, Err(Error::NotFound(_))));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set URAG_PG_DSN to run."]
async fn appending_to_a_missing_conversation_writes_nothing() {
	let Some(base_dsn) = urag_testkit::env_dsn() else {
		eprintln!(
			"Skipping appending_to_a_missing_conversation_writes_nothing; set URAG_PG_DSN to run this test."
		);

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let store = store(&test_db).await;
	let result = store
		.append_turns(Uuid::new_v4(), vec![ConversationTurn::user("hi", OffsetDateTime::now_utc())])
		.await;

	assert!(matches!(result, Err(Error::NotFound(_))));

	let turns: i64 = sqlx::query_scalar("SELECT count(*) FROM conversation_turns")
		.fetch_one(store.pool())
		.await
		.expect("Failed to count turns.");

	assert_eq!(turns, 0);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
