use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("File not found: {path:?}.")]
	FileNotFound { path: PathBuf },
	#[error("Unsupported file type: {extension:?}.")]
	UnsupportedFormat { extension: String },
	#[error("Failed to read document at {path:?}: {source}")]
	Read { path: PathBuf, source: std::io::Error },
}
