pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid URAG_PG_DSN: {0}")]
	InvalidDsn(String),
	#[error("No admin database accepted a connection: {0}")]
	AdminUnavailable(String),
	#[error("Test resource cleanup failed: {0}")]
	Cleanup(String),

	#[error(transparent)]
	Postgres(#[from] sqlx::Error),
	#[error(transparent)]
	Qdrant(#[from] Box<qdrant_client::QdrantError>),
}
impl From<qdrant_client::QdrantError> for Error {
	fn from(err: qdrant_client::QdrantError) -> Self {
		Self::Qdrant(Box::new(err))
	}
}
