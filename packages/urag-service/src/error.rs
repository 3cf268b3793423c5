use std::path::PathBuf;

use urag_domain::FilterParseError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Vector collection unavailable: {message}")]
	CollectionUnavailable { message: String },
	#[error("Similarity search failed: {message}")]
	SearchFailed { message: String },
	#[error("Follow-up turns require a conversation id.")]
	MissingConversationReference,
	#[error("Generation returned an unusable payload: {message}")]
	InvalidResponseFormat { message: String },
	#[error("Embedding failed: {message}")]
	EmbeddingFailed { message: String },
	#[error("Web search failed: {message}")]
	WebSearchFailed { message: String },
	#[error("Generation failed: {message}")]
	GenerationFailed { message: String },
	#[error("{operation} timed out after {timeout_ms} ms.")]
	Timeout { operation: &'static str, timeout_ms: u64 },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Unsupported file type: {extension}.")]
	UnsupportedFormat { extension: String },
	#[error("File not found: {path:?}.")]
	FileNotFound { path: PathBuf },
}
impl Error {
	/// Stable identifier for callers that branch on the failure class.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::CollectionUnavailable { .. } => "collection_unavailable",
			Self::SearchFailed { .. } => "search_failed",
			Self::MissingConversationReference => "missing_conversation_reference",
			Self::InvalidResponseFormat { .. } => "invalid_response_format",
			Self::EmbeddingFailed { .. } => "embedding_failed",
			Self::WebSearchFailed { .. } => "web_search_failed",
			Self::GenerationFailed { .. } => "generation_failed",
			Self::Timeout { .. } => "timeout",
			Self::NotFound { .. } => "not_found",
			Self::InvalidRequest { .. } => "invalid_request",
			Self::Storage { .. } => "storage",
			Self::UnsupportedFormat { .. } => "unsupported_format",
			Self::FileNotFound { .. } => "file_not_found",
		}
	}

	pub(crate) fn invalid_request(message: impl Into<String>) -> Self {
		Self::InvalidRequest { message: message.into() }
	}

	pub(crate) fn collection_unavailable(err: urag_storage::Error) -> Self {
		Self::CollectionUnavailable { message: err.to_string() }
	}

	pub(crate) fn search_failed(err: urag_storage::Error) -> Self {
		Self::SearchFailed { message: err.to_string() }
	}

	pub(crate) fn embedding_failed(err: urag_providers::Error) -> Self {
		Self::EmbeddingFailed { message: err.to_string() }
	}

	pub(crate) fn web_search_failed(err: urag_providers::Error) -> Self {
		Self::WebSearchFailed { message: err.to_string() }
	}

	pub(crate) fn generation_failed(err: urag_providers::Error) -> Self {
		match err {
			urag_providers::Error::InvalidResponse { message } => Self::InvalidResponseFormat { message },
			urag_providers::Error::SerdeJson(err) => Self::InvalidResponseFormat { message: err.to_string() },
			other => Self::GenerationFailed { message: other.to_string() },
		}
	}
}

/// Store failures outside the search and collection-lifecycle paths.
impl From<urag_storage::Error> for Error {
	fn from(err: urag_storage::Error) -> Self {
		match err {
			urag_storage::Error::NotFound(message) => Self::NotFound { message },
			urag_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			other => Self::Storage { message: other.to_string() },
		}
	}
}

impl From<urag_chunking::Error> for Error {
	fn from(err: urag_chunking::Error) -> Self {
		match err {
			urag_chunking::Error::FileNotFound { path } => Self::FileNotFound { path },
			urag_chunking::Error::UnsupportedFormat { extension } =>
				Self::UnsupportedFormat { extension },
			other @ urag_chunking::Error::Read { .. } => Self::Storage { message: other.to_string() },
		}
	}
}

impl From<FilterParseError> for Error {
	fn from(err: FilterParseError) -> Self {
		Self::InvalidRequest { message: format!("metadata filter {err}") }
	}
}

impl From<urag_domain::Error> for Error {
	fn from(err: urag_domain::Error) -> Self {
		Self::InvalidRequest { message: err.to_string() }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn generation_parse_failures_are_response_format_errors() {
		let err = Error::generation_failed(urag_providers::Error::InvalidResponse {
			message: "not an object".to_string(),
		});

		assert_eq!(err.kind(), "invalid_response_format");
	}

	#[test]
	fn chat_store_misses_are_not_found() {
		let err = Error::from(urag_storage::Error::NotFound("conversation x.".to_string()));

		assert_eq!(err.kind(), "not_found");
	}
}
