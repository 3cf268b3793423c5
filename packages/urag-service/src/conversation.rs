//! Turn orchestration: retrieve, generate, record provenance, persist.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use urag_domain::{
	Conversation, ConversationTurn, Reference, Source, WebSource, conversation::derive_title,
};

use crate::{
	Error, Result, UragService, call_provider,
	prompt::{self, ANSWER_SCHEMA_NAME, AnswerPrompt},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnState {
	Initial,
	FollowUp { conversation_id: Uuid },
}
impl TurnState {
	/// A follow-up must name its conversation. An id sent with an initial turn is ignored.
	pub fn from_request(is_initial: bool, conversation_id: Option<Uuid>) -> Result<Self> {
		match (is_initial, conversation_id) {
			(true, _) => Ok(Self::Initial),
			(false, Some(conversation_id)) => Ok(Self::FollowUp { conversation_id }),
			(false, None) => Err(Error::MissingConversationReference),
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AskRequest {
	pub query: String,
	#[serde(default)]
	pub references: Vec<Reference>,
	pub is_initial: bool,
	#[serde(default)]
	pub conversation_id: Option<Uuid>,
	#[serde(default)]
	pub web_search_enabled: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AskResponse {
	pub conversation_id: Uuid,
	pub answer: String,
	pub sources: Vec<Source>,
	pub web_sources: Vec<WebSource>,
	pub used_document_context: bool,
	pub used_web_context: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedAnswer {
	pub answer: String,
	pub used_document_context: bool,
	pub used_web_context: bool,
}

impl UragService {
	pub async fn ask(&self, req: AskRequest) -> Result<AskResponse> {
		let state = TurnState::from_request(req.is_initial, req.conversation_id)?;
		let query = req.query.trim();

		if query.is_empty() {
			return Err(Error::invalid_request("query must be non-empty."));
		}

		let history = async {
			match state {
				TurnState::Initial => Ok(None),
				TurnState::FollowUp { conversation_id } =>
					self.chat_call("chat store get", self.chats.get(conversation_id)).await.map(Some),
			}
		};
		let assembler = self.assembler();
		let (embedding, history, referenced_pages) = tokio::try_join!(
			self.embed(query),
			history,
			assembler.fetch_referenced_pages(&req.references)
		)?;
		let mut bundle = assembler
			.assemble_with_pages(
				query,
				&embedding,
				&req.references,
				referenced_pages,
				req.web_search_enabled,
			)
			.await?;
		let transcript = history.as_ref().map(Conversation::transcript);
		let prompt = AnswerPrompt {
			query,
			history: transcript.as_deref(),
			documents: &bundle.document_hits,
			web: &bundle.web_results,
		};
		let variant = prompt.variant();
		let messages = prompt.messages();
		let generated = self.generate(&messages).await?;

		// Evidence that was never gathered cannot have been used.
		bundle.mark_usage(
			generated.used_document_context && bundle.has_documents(),
			generated.used_web_context && bundle.has_web(),
		);

		let now = OffsetDateTime::now_utc();
		let turns = vec![
			ConversationTurn::user(query, now),
			ConversationTurn::assistant(
				generated.answer.as_str(),
				bundle.persisted_sources(),
				bundle.persisted_web_sources(),
				now,
			),
		];
		let conversation_id = match state {
			TurnState::Initial => {
				let conversation = Conversation::start(derive_title(query), turns, now);

				self.chat_call("chat store create", self.chats.create(conversation)).await?
			},
			TurnState::FollowUp { conversation_id } => {
				self.chat_call("chat store append", self.chats.append_turns(conversation_id, turns))
					.await?;

				conversation_id
			},
		};

		tracing::info!(
			%conversation_id,
			?variant,
			hits = bundle.document_hits.len(),
			web_results = bundle.web_results.len(),
			used_document_context = bundle.used_document_context,
			used_web_context = bundle.used_web_context,
			"Turn answered."
		);

		Ok(AskResponse {
			conversation_id,
			answer: generated.answer,
			sources: bundle.sources(),
			web_sources: bundle.web_sources(),
			used_document_context: bundle.used_document_context,
			used_web_context: bundle.used_web_context,
		})
	}

	async fn generate(&self, messages: &[Value]) -> Result<GeneratedAnswer> {
		let cfg = &self.cfg.providers.generation;
		let schema = prompt::answer_schema();
		let reply = call_provider(
			"generation",
			cfg.timeout_ms,
			self.providers.generation.complete(cfg, messages, ANSWER_SCHEMA_NAME, &schema),
			Error::generation_failed,
		)
		.await?;

		parse_answer(&reply)
	}
}

pub fn parse_answer(reply: &Value) -> Result<GeneratedAnswer> {
	let answer = reply.get("answer").and_then(Value::as_str).ok_or_else(|| {
		Error::InvalidResponseFormat { message: "answer must be a string.".to_string() }
	})?;

	Ok(GeneratedAnswer {
		answer: answer.to_string(),
		used_document_context: prompt::parse_flag(reply, "used_document_context")?,
		used_web_context: prompt::parse_flag(reply, "used_web_context")?,
	})
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn follow_up_without_id_is_rejected() {
		assert!(matches!(
			TurnState::from_request(false, None),
			Err(Error::MissingConversationReference)
		));
		assert_eq!(
			TurnState::from_request(true, Some(Uuid::nil())).expect("state"),
			TurnState::Initial
		);
	}

	#[test]
	fn answers_require_every_field() {
		let parsed = parse_answer(&json!({
			"answer": "Paris.",
			"used_document_context": true,
			"used_web_context": "false",
		}))
		.expect("parse");

		assert_eq!(parsed.answer, "Paris.");
		assert!(parsed.used_document_context);
		assert!(!parsed.used_web_context);
		assert!(parse_answer(&json!({ "answer": "Paris.", "used_web_context": false })).is_err());
		assert!(
			parse_answer(&json!({ "used_document_context": true, "used_web_context": false }))
				.is_err()
		);
	}
}
