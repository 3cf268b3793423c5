use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use urag_config::{LlmProviderConfig, WebSearchProviderConfig};
use urag_domain::WebResult;

use crate::{
	Error, GenerationProvider, Result, WebSearchProvider, call_provider,
	prompt::{self, DECISION_SCHEMA_NAME},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebDecision {
	pub need_web: bool,
	pub reason: String,
}

/// Decides whether live web results are needed and fetches them.
///
/// The decision always comes from the generation model; this type only shapes the request and
/// validates the reply.
pub struct WebSearchDecisionEngine {
	generation: Arc<dyn GenerationProvider>,
	web_search: Arc<dyn WebSearchProvider>,
	generation_cfg: LlmProviderConfig,
	web_cfg: WebSearchProviderConfig,
}
impl WebSearchDecisionEngine {
	pub fn new(
		generation: Arc<dyn GenerationProvider>,
		web_search: Arc<dyn WebSearchProvider>,
		generation_cfg: LlmProviderConfig,
		web_cfg: WebSearchProviderConfig,
	) -> Self {
		Self { generation, web_search, generation_cfg, web_cfg }
	}

	pub async fn decide(
		&self,
		query: &str,
		document_context: &str,
		user_web_context: &str,
	) -> Result<WebDecision> {
		let messages = prompt::web_decision_messages(query, document_context, user_web_context);
		let schema = prompt::decision_schema();
		let reply = call_provider(
			"web search decision",
			self.generation_cfg.timeout_ms,
			self.generation.complete(&self.generation_cfg, &messages, DECISION_SCHEMA_NAME, &schema),
			Error::generation_failed,
		)
		.await?;
		let decision = parse_decision(&reply)?;

		tracing::debug!(need_web = decision.need_web, reason = %decision.reason, "Web search decision.");

		Ok(decision)
	}

	pub async fn is_web_search_needed(
		&self,
		query: &str,
		document_context: &str,
		user_web_context: &str,
	) -> Result<bool> {
		Ok(self.decide(query, document_context, user_web_context).await?.need_web)
	}

	pub async fn search_web(&self, query: &str) -> Result<Vec<WebResult>> {
		let results = call_provider(
			"web search",
			self.web_cfg.timeout_ms,
			self.web_search.search(&self.web_cfg, query),
			Error::web_search_failed,
		)
		.await?;

		tracing::info!(results = results.len(), "Web search finished.");

		Ok(results)
	}

	/// Fetches known pages. Results never carry a score.
	pub async fn search_urls(&self, urls: &[String]) -> Result<Vec<WebResult>> {
		if urls.is_empty() {
			return Ok(Vec::new());
		}

		let mut results = call_provider(
			"web contents",
			self.web_cfg.timeout_ms,
			self.web_search.contents(&self.web_cfg, urls),
			Error::web_search_failed,
		)
		.await?;

		for result in &mut results {
			result.score = None;
		}

		Ok(results)
	}
}

pub fn parse_decision(reply: &Value) -> Result<WebDecision> {
	if !reply.is_object() {
		return Err(Error::InvalidResponseFormat {
			message: "web search decision must be a JSON object.".to_string(),
		});
	}

	let need_web = prompt::parse_flag(reply, "need_web")?;
	let reason = match reply.get("reason") {
		None | Some(Value::Null) => String::new(),
		Some(Value::String(reason)) => reason.clone(),
		Some(other) => {
			return Err(Error::InvalidResponseFormat {
				message: format!("reason must be a string, got {other}."),
			});
		},
	};

	Ok(WebDecision { need_web, reason })
}
