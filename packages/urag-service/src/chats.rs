use serde::{Deserialize, Serialize};
use uuid::Uuid;

use urag_config::MAX_RESULT_LIMIT;
use urag_domain::{Conversation, ConversationSummary};

use crate::{Error, Result, UragService};

pub const DEFAULT_CONVERSATION_SEARCH_LIMIT: u32 = 10;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConversationsRequest {
	pub query: String,
	#[serde(default)]
	pub limit: Option<u32>,
}

impl UragService {
	/// Newest first.
	pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
		self.chat_call("chat store list", self.chats.list()).await
	}

	pub async fn get_conversation(&self, id: Uuid) -> Result<Conversation> {
		self.chat_call("chat store get", self.chats.get(id)).await
	}

	pub async fn delete_conversation(&self, id: Uuid) -> Result<()> {
		self.chat_call("chat store delete", self.chats.delete(id)).await?;

		tracing::info!(conversation_id = %id, "Conversation deleted.");

		Ok(())
	}

	pub async fn search_conversations(
		&self,
		req: SearchConversationsRequest,
	) -> Result<Vec<ConversationSummary>> {
		let query = req.query.trim();

		if query.is_empty() {
			return Err(Error::invalid_request("query must be non-empty."));
		}

		let limit = req.limit.unwrap_or(DEFAULT_CONVERSATION_SEARCH_LIMIT);

		if limit == 0 || limit > MAX_RESULT_LIMIT {
			return Err(Error::invalid_request(format!(
				"limit must be in the range 1-{MAX_RESULT_LIMIT}."
			)));
		}

		self.chat_call("chat store search", self.chats.search_by_text(query, limit)).await
	}
}
