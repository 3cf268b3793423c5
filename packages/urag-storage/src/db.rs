//! Postgres-backed conversation store.

use sqlx::{PgConnection, PgPool, postgres::PgPoolOptions, types::Json};
use time::OffsetDateTime;
use uuid::Uuid;

use urag_domain::{
	Conversation, ConversationSummary, ConversationTurn, Role, Source, WebSource,
};

use crate::{
	BoxFuture, ChatStore, Error, Result,
	chat::{not_found, sort_newest_first},
	schema,
};

type TurnRow = (String, String, Json<Vec<Source>>, Json<Vec<WebSource>>, OffsetDateTime);

pub struct Db {
	pub pool: PgPool,
}
impl Db {
	pub async fn connect(cfg: &urag_config::Postgres) -> Result<Self> {
		let pool =
			PgPoolOptions::new().max_connections(cfg.pool_max_conns).connect(&cfg.dsn).await?;

		Ok(Self { pool })
	}

	pub async fn ensure_schema(&self) -> Result<()> {
		let lock_id: i64 = 8_251_007;
		// Advisory locks are per connection, so take it inside the transaction that applies the
		// schema.
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT pg_advisory_xact_lock($1)").bind(lock_id).execute(&mut *tx).await?;

		for statement in schema::statements() {
			sqlx::query(statement).execute(&mut *tx).await?;
		}

		tx.commit().await?;

		Ok(())
	}
}

pub struct PgChatStore {
	db: Db,
}
impl PgChatStore {
	pub fn new(db: Db) -> Self {
		Self { db }
	}

	pub fn pool(&self) -> &PgPool {
		&self.db.pool
	}

	async fn create_inner(&self, conversation: Conversation) -> Result<Uuid> {
		let mut tx = self.db.pool.begin().await?;

		sqlx::query(
			"\
INSERT INTO conversations (conversation_id, title, last_updated)
VALUES ($1, $2, $3)",
		)
		.bind(conversation.id)
		.bind(conversation.title.as_str())
		.bind(conversation.last_updated)
		.execute(&mut *tx)
		.await?;

		insert_turns(&mut tx, conversation.id, 0, &conversation.messages).await?;

		tx.commit().await?;

		tracing::debug!(conversation_id = %conversation.id, "Conversation created.");

		Ok(conversation.id)
	}

	async fn get_inner(&self, id: Uuid) -> Result<Conversation> {
		let row: Option<(Uuid, String, OffsetDateTime)> = sqlx::query_as(
			"\
SELECT conversation_id, title, last_updated
FROM conversations
WHERE conversation_id = $1",
		)
		.bind(id)
		.fetch_optional(&self.db.pool)
		.await?;
		let (id, title, last_updated) = row.ok_or_else(|| not_found(id))?;
		let turns: Vec<TurnRow> = sqlx::query_as(
			"\
SELECT role, content, sources, web_sources, created_at
FROM conversation_turns
WHERE conversation_id = $1
ORDER BY turn_index",
		)
		.bind(id)
		.fetch_all(&self.db.pool)
		.await?;
		let messages = turns
			.into_iter()
			.map(|(role, content, sources, web_sources, created_at)| -> Result<ConversationTurn> {
				Ok(ConversationTurn {
					role: parse_role(&role)?,
					content,
					sources: sources.0,
					web_sources: web_sources.0,
					created_at,
				})
			})
			.collect::<Result<Vec<_>>>()?;

		Ok(Conversation { id, title, messages, last_updated })
	}

	async fn append_inner(&self, id: Uuid, turns: Vec<ConversationTurn>) -> Result<OffsetDateTime> {
		let mut tx = self.db.pool.begin().await?;
		let previous: Option<OffsetDateTime> = sqlx::query_scalar(
			"\
SELECT last_updated
FROM conversations
WHERE conversation_id = $1
FOR UPDATE",
		)
		.bind(id)
		.fetch_optional(&mut *tx)
		.await?;
		let previous = previous.ok_or_else(|| not_found(id))?;
		let next_index: i32 = sqlx::query_scalar(
			"\
SELECT COALESCE(MAX(turn_index) + 1, 0)
FROM conversation_turns
WHERE conversation_id = $1",
		)
		.bind(id)
		.fetch_one(&mut *tx)
		.await?;

		insert_turns(&mut tx, id, next_index, &turns).await?;

		let last_updated = turns
			.iter()
			.map(|turn| turn.created_at)
			.fold(OffsetDateTime::now_utc(), OffsetDateTime::max)
			.max(previous);

		sqlx::query("UPDATE conversations SET last_updated = $2 WHERE conversation_id = $1")
			.bind(id)
			.bind(last_updated)
			.execute(&mut *tx)
			.await?;

		tx.commit().await?;

		tracing::debug!(conversation_id = %id, turns = turns.len(), "Conversation turns appended.");

		Ok(last_updated)
	}

	async fn delete_inner(&self, id: Uuid) -> Result<()> {
		let result = sqlx::query("DELETE FROM conversations WHERE conversation_id = $1")
			.bind(id)
			.execute(&self.db.pool)
			.await?;

		if result.rows_affected() == 0 {
			return Err(not_found(id));
		}

		Ok(())
	}

	async fn list_inner(&self) -> Result<Vec<ConversationSummary>> {
		let rows: Vec<(Uuid, String, OffsetDateTime, i64)> = sqlx::query_as(
			"\
SELECT
	c.conversation_id,
	c.title,
	c.last_updated,
	(SELECT count(*) FROM conversation_turns t WHERE t.conversation_id = c.conversation_id)
FROM conversations c
ORDER BY c.last_updated DESC, c.conversation_id",
		)
		.fetch_all(&self.db.pool)
		.await?;

		Ok(rows
			.into_iter()
			.map(|(id, title, last_updated, message_count)| ConversationSummary {
				id,
				title,
				last_updated,
				message_count: message_count.max(0) as usize,
				previews: Vec::new(),
			})
			.collect())
	}

	async fn search_inner(&self, query: &str, limit: u32) -> Result<Vec<ConversationSummary>> {
		let needle = query.trim();

		if needle.is_empty() {
			return Ok(Vec::new());
		}

		let pattern = format!("%{}%", escape_like(needle));
		let ids: Vec<Uuid> = sqlx::query_scalar(
			"\
SELECT c.conversation_id
FROM conversations c
WHERE c.title ILIKE $1
	OR EXISTS (
		SELECT 1
		FROM conversation_turns t
		WHERE t.conversation_id = c.conversation_id
			AND t.content ILIKE $1
	)
ORDER BY c.last_updated DESC, c.conversation_id
LIMIT $2",
		)
		.bind(pattern)
		.bind(i64::from(limit))
		.fetch_all(&self.db.pool)
		.await?;
		let mut summaries = Vec::with_capacity(ids.len());

		for id in ids {
			match self.get_inner(id).await {
				Ok(conversation) => summaries.extend(conversation.summarize_match(needle)),
				// Deleted between the two queries.
				Err(Error::NotFound(_)) => {},
				Err(err) => return Err(err),
			}
		}

		sort_newest_first(&mut summaries);

		Ok(summaries)
	}
}
impl ChatStore for PgChatStore {
	fn create<'a>(&'a self, conversation: Conversation) -> BoxFuture<'a, Result<Uuid>> {
		Box::pin(self.create_inner(conversation))
	}

	fn get<'a>(&'a self, id: Uuid) -> BoxFuture<'a, Result<Conversation>> {
		Box::pin(self.get_inner(id))
	}

	fn append_turns<'a>(
		&'a self,
		id: Uuid,
		turns: Vec<ConversationTurn>,
	) -> BoxFuture<'a, Result<OffsetDateTime>> {
		Box::pin(self.append_inner(id, turns))
	}

	fn delete<'a>(&'a self, id: Uuid) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.delete_inner(id))
	}

	fn list<'a>(&'a self) -> BoxFuture<'a, Result<Vec<ConversationSummary>>> {
		Box::pin(self.list_inner())
	}

	fn search_by_text<'a>(
		&'a self,
		query: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<ConversationSummary>>> {
		Box::pin(self.search_inner(query, limit))
	}
}

async fn insert_turns(
	conn: &mut PgConnection,
	conversation_id: Uuid,
	first_index: i32,
	turns: &[ConversationTurn],
) -> Result<()> {
	for (offset, turn) in turns.iter().enumerate() {
		sqlx::query(
			"\
INSERT INTO conversation_turns (
	conversation_id,
	turn_index,
	role,
	content,
	sources,
	web_sources,
	created_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7)",
		)
		.bind(conversation_id)
		.bind(first_index + offset as i32)
		.bind(turn.role.as_str())
		.bind(turn.content.as_str())
		.bind(Json(&turn.sources))
		.bind(Json(&turn.web_sources))
		.bind(turn.created_at)
		.execute(&mut *conn)
		.await?;
	}

	Ok(())
}

fn parse_role(raw: &str) -> Result<Role> {
	match raw {
		"user" => Ok(Role::User),
		"assistant" => Ok(Role::Assistant),
		other => Err(Error::InvalidArgument(format!("unknown conversation role {other:?}."))),
	}
}

fn escape_like(raw: &str) -> String {
	let mut escaped = String::with_capacity(raw.len());

	for ch in raw.chars() {
		if matches!(ch, '%' | '_' | '\\') {
			escaped.push('\\');
		}

		escaped.push(ch);
	}

	escaped
}
