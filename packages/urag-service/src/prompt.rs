//! Prompt construction for answer generation and the web-search decision.
//!
//! An answer prompt is a list of segments. The four variants differ only in which segments they
//! include, so each variant is described by its segment list and rendered by one function.

use serde_json::{Value, json};
use unicode_segmentation::UnicodeSegmentation;

use urag_domain::{SearchHit, WebResult};

use crate::{Error, Result};

pub const ANSWER_SCHEMA_NAME: &str = "grounded_answer";
pub const DECISION_SCHEMA_NAME: &str = "web_search_decision";
pub const MAX_WEB_TEXT_GRAPHEMES: usize = 2_000;

const NO_DOCUMENTS: &str = "No document context was retrieved.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptVariant {
	Initial,
	InitialWithWeb,
	FollowUp,
	FollowUpWithWeb,
}
impl PromptVariant {
	pub fn select(has_web: bool, is_follow_up: bool) -> Self {
		match (has_web, is_follow_up) {
			(false, false) => Self::Initial,
			(true, false) => Self::InitialWithWeb,
			(false, true) => Self::FollowUp,
			(true, true) => Self::FollowUpWithWeb,
		}
	}

	pub fn has_web(self) -> bool {
		matches!(self, Self::InitialWithWeb | Self::FollowUpWithWeb)
	}

	pub fn is_follow_up(self) -> bool {
		matches!(self, Self::FollowUp | Self::FollowUpWithWeb)
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Segment<'a> {
	SystemRole { has_web: bool },
	History(&'a str),
	WebContext(&'a [WebResult]),
	DocumentContext(&'a [SearchHit]),
	Question(&'a str),
	ResponseShape,
}

pub struct AnswerPrompt<'a> {
	pub query: &'a str,
	/// Linearized prior turns. `Some` only for follow-ups.
	pub history: Option<&'a str>,
	pub documents: &'a [SearchHit],
	pub web: &'a [WebResult],
}
impl<'a> AnswerPrompt<'a> {
	pub fn variant(&self) -> PromptVariant {
		PromptVariant::select(!self.web.is_empty(), self.history.is_some())
	}

	pub fn segments(&self) -> Vec<Segment<'a>> {
		let variant = self.variant();
		let mut segments = vec![Segment::SystemRole { has_web: variant.has_web() }, Segment::ResponseShape];

		if let Some(history) = self.history {
			segments.push(Segment::History(history));
		}
		if variant.has_web() {
			segments.push(Segment::WebContext(self.web));
		}

		segments.push(Segment::DocumentContext(self.documents));
		segments.push(Segment::Question(self.query));

		segments
	}

	/// Chat messages for the generation call: role and response shape go into the system message,
	/// every other segment into the user message in order.
	pub fn messages(&self) -> Vec<Value> {
		let (system, user): (Vec<_>, Vec<_>) = self
			.segments()
			.into_iter()
			.partition(|segment| matches!(segment, Segment::SystemRole { .. } | Segment::ResponseShape));

		vec![
			json!({ "role": "system", "content": render_all(&system) }),
			json!({ "role": "user", "content": render_all(&user) }),
		]
	}
}

pub fn render_segment(segment: &Segment<'_>) -> String {
	match segment {
		Segment::SystemRole { has_web: false } =>
			"You answer questions using the user's own documents. Prefer the document context; \
			 when it does not cover the question, say so and answer from general knowledge."
				.to_string(),
		Segment::SystemRole { has_web: true } =>
			"You answer questions using the user's own documents and live web results. Prefer the \
			 document context, use the web results to fill gaps, and say which you relied on."
				.to_string(),
		Segment::History(history) => format!("Conversation so far:\n{history}"),
		Segment::WebContext(results) => format!("Web results:\n{}", render_web(results)),
		Segment::DocumentContext(hits) => format!("Document context:\n{}", render_documents(hits)),
		Segment::Question(query) => format!("Question:\n{query}"),
		Segment::ResponseShape =>
			"Reply with a JSON object: \"answer\" (string), \"used_document_context\" (boolean, true \
			 only if the document context informed the answer) and \"used_web_context\" (boolean, \
			 true only if the web results informed the answer)."
				.to_string(),
	}
}

pub fn render_documents(hits: &[SearchHit]) -> String {
	if hits.is_empty() {
		return NO_DOCUMENTS.to_string();
	}

	hits.iter()
		.enumerate()
		.map(|(index, hit)| format!("[{}] {}\n{}", index + 1, hit.filename, hit.content))
		.collect::<Vec<_>>()
		.join("\n\n")
}

pub fn render_web(results: &[WebResult]) -> String {
	results
		.iter()
		.enumerate()
		.map(|(index, result)| {
			let mut block = format!("[W{}] {} <{}>", index + 1, result.title, result.url);

			if !result.highlights.is_empty() {
				block.push_str("\nHighlights: ");
				block.push_str(&result.highlights.join(" | "));
			}

			let text = truncate_graphemes(&result.text, MAX_WEB_TEXT_GRAPHEMES);

			if !text.is_empty() {
				block.push('\n');
				block.push_str(text);
			}

			block
		})
		.collect::<Vec<_>>()
		.join("\n\n")
}

pub fn answer_schema() -> Value {
	json!({
		"type": "object",
		"properties": {
			"answer": { "type": "string" },
			"used_document_context": { "type": "boolean" },
			"used_web_context": { "type": "boolean" },
		},
		"required": ["answer", "used_document_context", "used_web_context"],
		"additionalProperties": false,
	})
}

pub fn decision_schema() -> Value {
	json!({
		"type": "object",
		"properties": {
			"need_web": { "type": "boolean" },
			"reason": { "type": "string" },
		},
		"required": ["need_web", "reason"],
		"additionalProperties": false,
	})
}

pub fn web_decision_messages(query: &str, document_context: &str, user_web_context: &str) -> Vec<Value> {
	let system = "You can call a web search engine that covers research papers, news, company and \
	              personal pages, encyclopedias, code repositories, blogs, filings, policy and \
	              government sources, events and jobs. Decide whether the provided context is \
	              enough to answer the question or whether a web search is required. Do not answer \
	              the question.\n\nReply with a JSON object: \"need_web\" (boolean, true when a web \
	              search is needed) and \"reason\" (a short justification).";
	let mut user = format!("Question:\n{query}\n\nContext:\n{document_context}");

	if !user_web_context.trim().is_empty() {
		user.push_str("\n\nUser-supplied web context:\n");
		user.push_str(user_web_context);
	}

	user.push_str("\n\nReply in the JSON format described above.");

	vec![json!({ "role": "system", "content": system }), json!({ "role": "user", "content": user })]
}

/// Reads a boolean field that models sometimes emit as `"true"`/`"false"`.
pub(crate) fn parse_flag(object: &Value, field: &str) -> Result<bool> {
	match object.get(field) {
		Some(Value::Bool(flag)) => Ok(*flag),
		Some(Value::String(text)) => match text.trim().to_ascii_lowercase().as_str() {
			"true" => Ok(true),
			"false" => Ok(false),
			_ => Err(Error::InvalidResponseFormat {
				message: format!("{field} must be a boolean, got {text:?}."),
			}),
		},
		Some(other) => Err(Error::InvalidResponseFormat {
			message: format!("{field} must be a boolean, got {other}."),
		}),
		None => Err(Error::InvalidResponseFormat { message: format!("{field} is missing.") }),
	}
}

fn render_all(segments: &[Segment<'_>]) -> String {
	segments.iter().map(render_segment).collect::<Vec<_>>().join("\n\n")
}

fn truncate_graphemes(text: &str, max: usize) -> &str {
	match text.grapheme_indices(true).nth(max) {
		Some((offset, _)) => &text[..offset],
		None => text,
	}
}

#[cfg(test)]
mod tests {
	use urag_domain::Metadata;

	use super::*;

	fn hit(filename: &str, content: &str) -> SearchHit {
		SearchHit {
			id: 1,
			content: content.to_string(),
			filename: filename.to_string(),
			metadata: Metadata::new(filename, 1, 0),
			score: 0.1,
		}
	}

	fn web_result() -> WebResult {
		WebResult {
			title: "Sky".to_string(),
			url: "https://sky.test/why".to_string(),
			text: "Rayleigh scattering.".to_string(),
			highlights: vec!["blue light scatters".to_string()],
			score: Some(0.8),
		}
	}

	#[test]
	fn variants_follow_web_evidence_and_history() {
		let hits = [hit("a.txt", "Paris is the capital of France.")];
		let web = [web_result()];
		let cases = [
			(None, &[][..], PromptVariant::Initial),
			(None, &web[..], PromptVariant::InitialWithWeb),
			(Some("user: hi"), &[][..], PromptVariant::FollowUp),
			(Some("user: hi"), &web[..], PromptVariant::FollowUpWithWeb),
		];

		for (history, web, expected) in cases {
			let prompt = AnswerPrompt { query: "q", history, documents: &hits, web };

			assert_eq!(prompt.variant(), expected);
			assert_eq!(
				prompt.segments().iter().any(|segment| matches!(segment, Segment::History(_))),
				expected.is_follow_up()
			);
			assert_eq!(
				prompt.segments().iter().any(|segment| matches!(segment, Segment::WebContext(_))),
				expected.has_web()
			);
		}
	}

	#[test]
	fn messages_split_instructions_from_evidence() {
		let hits = [hit("a.txt", "Paris is the capital of France.")];
		let prompt = AnswerPrompt {
			query: "What is the capital of France?",
			history: Some("user: earlier question\nassistant: earlier answer"),
			documents: &hits,
			web: &[],
		};
		let messages = prompt.messages();
		let system = messages[0]["content"].as_str().expect("system content");
		let user = messages[1]["content"].as_str().expect("user content");

		assert!(system.contains("used_document_context"));
		assert!(user.starts_with("Conversation so far:"));
		assert!(user.contains("[1] a.txt\nParis is the capital of France."));
		assert!(user.ends_with("Question:\nWhat is the capital of France?"));
	}

	#[test]
	fn empty_document_context_is_stated() {
		let prompt = AnswerPrompt { query: "q", history: None, documents: &[], web: &[] };

		assert!(prompt.messages()[1]["content"].as_str().expect("content").contains(NO_DOCUMENTS));
	}

	#[test]
	fn web_blocks_carry_highlights_and_bounded_text() {
		let mut result = web_result();

		result.text = "x".repeat(MAX_WEB_TEXT_GRAPHEMES + 10);

		let rendered = render_web(&[result]);

		assert!(rendered.starts_with("[W1] Sky <https://sky.test/why>\nHighlights: blue light"));
		assert_eq!(rendered.matches('x').count(), MAX_WEB_TEXT_GRAPHEMES);
	}

	#[test]
	fn flags_accept_booleans_and_boolean_strings() {
		let reply = json!({ "a": true, "b": "False", "c": 1 });

		assert!(parse_flag(&reply, "a").expect("bool"));
		assert!(!parse_flag(&reply, "b").expect("string"));
		assert!(matches!(parse_flag(&reply, "c"), Err(Error::InvalidResponseFormat { .. })));
		assert!(matches!(parse_flag(&reply, "d"), Err(Error::InvalidResponseFormat { .. })));
	}
}
