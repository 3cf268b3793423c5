use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

/// One chat-completions call constrained to `schema`. The reply must be a JSON object.
pub async fn complete(
	cfg: &urag_config::LlmProviderConfig,
	messages: &[Value],
	schema_name: &str,
	schema: &Value,
) -> Result<Value> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": messages,
		"response_format": {
			"type": "json_schema",
			"json_schema": { "name": schema_name, "schema": schema, "strict": true },
		},
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_completion_json(&json)
}

fn parse_completion_json(json: &Value) -> Result<Value> {
	let content = json
		.get("choices")
		.and_then(Value::as_array)
		.and_then(|choices| choices.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|message| message.get("content"))
		.and_then(Value::as_str)
		.ok_or_else(|| Error::invalid_response("Completion response is missing message content."))?;
	let parsed: Value = serde_json::from_str(content)
		.map_err(|_| Error::invalid_response("Completion content is not valid JSON."))?;

	if !parsed.is_object() {
		return Err(Error::invalid_response("Completion content must be a JSON object."));
	}

	Ok(parsed)
}
