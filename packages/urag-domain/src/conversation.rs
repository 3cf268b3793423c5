use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

use crate::{SearchHit, WebResult};

pub const MAX_TITLE_GRAPHEMES: usize = 60;
pub const MAX_PREVIEWS: usize = 3;
pub const PREVIEW_GRAPHEMES: usize = 160;

pub type WebSource = WebResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	User,
	Assistant,
}
impl Role {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::User => "user",
			Self::Assistant => "assistant",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
	pub content: String,
	#[serde(default = "default_source_score")]
	pub score: f32,
	pub filename: String,
}
impl From<&SearchHit> for Source {
	fn from(hit: &SearchHit) -> Self {
		Self { content: hit.content.clone(), score: hit.score, filename: hit.filename.clone() }
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
	pub role: Role,
	pub content: String,
	#[serde(default)]
	pub sources: Vec<Source>,
	#[serde(default)]
	pub web_sources: Vec<WebSource>,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
}
impl ConversationTurn {
	pub fn user(content: impl Into<String>, created_at: OffsetDateTime) -> Self {
		Self {
			role: Role::User,
			content: content.into(),
			sources: Vec::new(),
			web_sources: Vec::new(),
			created_at,
		}
	}

	pub fn assistant(
		content: impl Into<String>,
		sources: Vec<Source>,
		web_sources: Vec<WebSource>,
		created_at: OffsetDateTime,
	) -> Self {
		Self { role: Role::Assistant, content: content.into(), sources, web_sources, created_at }
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
	pub id: Uuid,
	pub title: String,
	pub messages: Vec<ConversationTurn>,
	#[serde(with = "time::serde::rfc3339")]
	pub last_updated: OffsetDateTime,
}
impl Conversation {
	pub fn start(title: impl Into<String>, messages: Vec<ConversationTurn>, now: OffsetDateTime) -> Self {
		let last_updated = messages.iter().map(|turn| turn.created_at).fold(now, OffsetDateTime::max);

		Self { id: Uuid::new_v4(), title: title.into(), messages, last_updated }
	}

	/// Appends turns in order. `last_updated` never moves backwards.
	pub fn append(&mut self, turns: Vec<ConversationTurn>, now: OffsetDateTime) {
		let newest = turns.iter().map(|turn| turn.created_at).fold(now, OffsetDateTime::max);

		self.messages.extend(turns);
		self.last_updated = self.last_updated.max(newest);
	}

	/// Oldest-first transcript, one `role: content` entry per turn.
	pub fn transcript(&self) -> String {
		self.messages
			.iter()
			.map(|turn| format!("{}: {}", turn.role.as_str(), turn.content))
			.collect::<Vec<_>>()
			.join("\n")
	}

	/// Case-insensitive match over the title and message bodies.
	pub fn summarize_match(&self, query: &str) -> Option<ConversationSummary> {
		let needle = query.trim().to_lowercase();

		if needle.is_empty() {
			return None;
		}

		let title_hit = self.title.to_lowercase().contains(&needle);
		let previews = self
			.messages
			.iter()
			.filter(|turn| turn.content.to_lowercase().contains(&needle))
			.take(MAX_PREVIEWS)
			.map(|turn| MessagePreview {
				role: turn.role,
				preview: truncate_graphemes(&turn.content, PREVIEW_GRAPHEMES),
			})
			.collect::<Vec<_>>();

		if !title_hit && previews.is_empty() {
			return None;
		}

		Some(ConversationSummary { previews, ..ConversationSummary::from(self) })
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePreview {
	pub role: Role,
	pub preview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
	pub id: Uuid,
	pub title: String,
	#[serde(with = "time::serde::rfc3339")]
	pub last_updated: OffsetDateTime,
	pub message_count: usize,
	#[serde(default)]
	pub previews: Vec<MessagePreview>,
}
impl From<&Conversation> for ConversationSummary {
	fn from(conversation: &Conversation) -> Self {
		Self {
			id: conversation.id,
			title: conversation.title.clone(),
			last_updated: conversation.last_updated,
			message_count: conversation.messages.len(),
			previews: Vec::new(),
		}
	}
}

/// Derives a conversation title from the opening question.
pub fn derive_title(query: &str) -> String {
	let collapsed = query.split_whitespace().collect::<Vec<_>>().join(" ");

	if collapsed.is_empty() {
		return "New conversation".to_string();
	}

	truncate_graphemes(&collapsed, MAX_TITLE_GRAPHEMES)
}

fn truncate_graphemes(text: &str, max: usize) -> String {
	let mut graphemes = text.graphemes(true);
	let head = graphemes.by_ref().take(max).collect::<String>();

	if graphemes.next().is_some() { format!("{head}...") } else { head }
}

fn default_source_score() -> f32 {
	1.0
}

#[cfg(test)]
mod tests {
	use time::Duration;

	use super::*;

	#[test]
	fn append_keeps_last_updated_monotonic() {
		let start = OffsetDateTime::now_utc();
		let mut conversation =
			Conversation::start("t", vec![ConversationTurn::user("hi", start)], start);
		let earlier = start - Duration::minutes(5);

		conversation.append(vec![ConversationTurn::user("again", earlier)], earlier);

		assert_eq!(conversation.last_updated, start);
		assert_eq!(conversation.messages.len(), 2);
	}

	#[test]
	fn transcript_is_oldest_first_and_role_tagged() {
		let now = OffsetDateTime::now_utc();
		let conversation = Conversation::start(
			"t",
			vec![
				ConversationTurn::user("What is Rust?", now),
				ConversationTurn::assistant("A language.", vec![], vec![], now),
			],
			now,
		);

		assert_eq!(conversation.transcript(), "user: What is Rust?\nassistant: A language.");
	}

	#[test]
	fn titles_are_truncated_on_grapheme_boundaries() {
		let title = derive_title(&"e\u{301}".repeat(80));

		assert!(title.ends_with("..."));
		assert_eq!(title.trim_end_matches("...").graphemes(true).count(), MAX_TITLE_GRAPHEMES);
		assert_eq!(derive_title("   "), "New conversation");
	}

	#[test]
	fn summarize_match_collects_previews() {
		let now = OffsetDateTime::now_utc();
		let conversation = Conversation::start(
			"Travel",
			vec![
				ConversationTurn::user("What is the capital of France?", now),
				ConversationTurn::assistant("Paris is the capital.", vec![], vec![], now),
			],
			now,
		);
		let summary = conversation.summarize_match("CAPITAL").expect("expected a match");

		assert_eq!(summary.previews.len(), 2);
		assert!(conversation.summarize_match("tokyo").is_none());
		assert!(conversation.summarize_match("travel").is_some());
	}
}
