//! Exa-style web search: `POST {search_path}` for queries and `POST {contents_path}` for known
//! URLs. Both answer with `results[]` carrying `title`, `url`, `text`, `highlights` and `score`.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use urag_domain::WebResult;

use crate::{Error, Result};

const API_KEY_HEADER: &str = "x-api-key";

pub async fn search(cfg: &urag_config::WebSearchProviderConfig, query: &str) -> Result<Vec<WebResult>> {
	let body = serde_json::json!({
		"query": query,
		"numResults": cfg.num_results,
		"contents": { "text": true, "highlights": true },
	});
	let json = post(cfg, &cfg.search_path, &body).await?;

	parse_results(&json, true)
}

/// Fetches page contents for `urls`. Results carry no score.
pub async fn contents(
	cfg: &urag_config::WebSearchProviderConfig,
	urls: &[String],
) -> Result<Vec<WebResult>> {
	if urls.is_empty() {
		return Ok(Vec::new());
	}

	let body = serde_json::json!({
		"urls": urls,
		"text": true,
		"highlights": true,
	});
	let json = post(cfg, &cfg.contents_path, &body).await?;

	parse_results(&json, false)
}

async fn post(
	cfg: &urag_config::WebSearchProviderConfig,
	path: &str,
	body: &Value,
) -> Result<Value> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, path);
	let res = client
		.post(url)
		.headers(crate::api_key_headers(API_KEY_HEADER, &cfg.api_key, &cfg.default_headers)?)
		.json(body)
		.send()
		.await?;

	Ok(res.error_for_status()?.json().await?)
}

fn parse_results(json: &Value, keep_score: bool) -> Result<Vec<WebResult>> {
	let results = json
		.get("results")
		.and_then(Value::as_array)
		.ok_or_else(|| Error::invalid_response("Web search response is missing results array."))?;
	let mut parsed = Vec::with_capacity(results.len());

	for item in results {
		let url = item
			.get("url")
			.and_then(Value::as_str)
			.ok_or_else(|| Error::invalid_response("Web search result is missing url."))?;
		let highlights = item
			.get("highlights")
			.and_then(Value::as_array)
			.map(|values| values.iter().filter_map(Value::as_str).map(str::to_string).collect())
			.unwrap_or_default();

		parsed.push(WebResult {
			title: string_field(item, "title"),
			url: url.to_string(),
			text: string_field(item, "text"),
			highlights,
			score: if keep_score {
				item.get("score").and_then(Value::as_f64).map(|score| score as f32)
			} else {
				None
			},
		});
	}

	Ok(parsed)
}

fn string_field(item: &Value, key: &str) -> String {
	item.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}
