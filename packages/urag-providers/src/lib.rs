pub mod embedding;
pub mod generation;
pub mod web;

mod error;

pub use error::{Error, Result};

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};

/// Bearer authorization plus the configured extra headers.
pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	extend_headers(&mut headers, default_headers)?;

	Ok(headers)
}

/// Key-in-header authorization used by search APIs such as Exa.
pub fn api_key_headers(
	header: &'static str,
	api_key: &str,
	default_headers: &Map<String, Value>,
) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(HeaderName::from_static(header), HeaderValue::from_str(api_key)?);

	extend_headers(&mut headers, default_headers)?;

	Ok(headers)
}

fn extend_headers(headers: &mut HeaderMap, default_headers: &Map<String, Value>) -> Result<()> {
	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: format!("Default header {key:?} must have a string value."),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(())
}
