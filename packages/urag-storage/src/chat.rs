use std::collections::HashMap;

use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use urag_domain::{Conversation, ConversationSummary, ConversationTurn};

use crate::{BoxFuture, Error, Result};

/// Conversation persistence.
///
/// `append_turns` is atomic per call: either every turn lands or none does. Appends to the same
/// conversation are serialized and `last_updated` never decreases.
pub trait ChatStore
where
	Self: Send + Sync,
{
	fn create<'a>(&'a self, conversation: Conversation) -> BoxFuture<'a, Result<Uuid>>;

	fn get<'a>(&'a self, id: Uuid) -> BoxFuture<'a, Result<Conversation>>;

	/// Returns the conversation's new `last_updated`.
	fn append_turns<'a>(
		&'a self,
		id: Uuid,
		turns: Vec<ConversationTurn>,
	) -> BoxFuture<'a, Result<OffsetDateTime>>;

	fn delete<'a>(&'a self, id: Uuid) -> BoxFuture<'a, Result<()>>;

	/// Newest first.
	fn list<'a>(&'a self) -> BoxFuture<'a, Result<Vec<ConversationSummary>>>;

	/// Case-insensitive match over titles and message content, newest first.
	fn search_by_text<'a>(
		&'a self,
		query: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<ConversationSummary>>>;
}

#[derive(Default)]
pub struct MemoryChatStore {
	conversations: RwLock<HashMap<Uuid, Conversation>>,
}
impl MemoryChatStore {
	pub fn new() -> Self {
		Self::default()
	}

	async fn create_inner(&self, conversation: Conversation) -> Result<Uuid> {
		let mut conversations = self.conversations.write().await;

		if conversations.contains_key(&conversation.id) {
			return Err(Error::InvalidArgument(format!(
				"conversation {} already exists.",
				conversation.id
			)));
		}

		let id = conversation.id;

		conversations.insert(id, conversation);

		Ok(id)
	}

	async fn get_inner(&self, id: Uuid) -> Result<Conversation> {
		self.conversations.read().await.get(&id).cloned().ok_or_else(|| not_found(id))
	}

	async fn append_inner(&self, id: Uuid, turns: Vec<ConversationTurn>) -> Result<OffsetDateTime> {
		let mut conversations = self.conversations.write().await;
		let conversation = conversations.get_mut(&id).ok_or_else(|| not_found(id))?;

		conversation.append(turns, OffsetDateTime::now_utc());

		Ok(conversation.last_updated)
	}

	async fn delete_inner(&self, id: Uuid) -> Result<()> {
		self.conversations.write().await.remove(&id).map(|_| ()).ok_or_else(|| not_found(id))
	}

	async fn list_inner(&self) -> Result<Vec<ConversationSummary>> {
		let conversations = self.conversations.read().await;
		let mut summaries = conversations.values().map(ConversationSummary::from).collect::<Vec<_>>();

		sort_newest_first(&mut summaries);

		Ok(summaries)
	}

	async fn search_inner(&self, query: &str, limit: u32) -> Result<Vec<ConversationSummary>> {
		let conversations = self.conversations.read().await;
		let mut summaries = conversations
			.values()
			.filter_map(|conversation| conversation.summarize_match(query))
			.collect::<Vec<_>>();

		sort_newest_first(&mut summaries);
		summaries.truncate(limit as usize);

		Ok(summaries)
	}
}
impl ChatStore for MemoryChatStore {
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

pub(crate) fn not_found(id: Uuid) -> Error {
	Error::NotFound(format!("conversation {id}."))
}

pub(crate) fn sort_newest_first(summaries: &mut [ConversationSummary]) {
	summaries.sort_by(|left, right| {
		right.last_updated.cmp(&left.last_updated).then_with(|| left.id.cmp(&right.id))
	});
}
