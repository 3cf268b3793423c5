use crate::filter::FilterParseError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid metadata: {message}")]
	InvalidMetadata { message: String },
	#[error("Invalid metadata filter {0}")]
	InvalidFilter(#[from] FilterParseError),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
}
