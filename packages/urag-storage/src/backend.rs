use urag_domain::{MetadataFilter, SearchHit, VectorRecord};

use crate::{BoxFuture, Result};

/// Fixed collection layout: auto-assigned integer id, `filename`, `content`, an embedding of
/// `vector_dim` floats and a serialized `metadata` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSchema {
	pub name: String,
	pub vector_dim: u32,
	/// Inverted-file cell count for backends that build IVF indexes.
	pub nlist: u32,
}
impl CollectionSchema {
	pub fn from_config(cfg: &urag_config::Qdrant) -> Self {
		Self { name: cfg.collection.clone(), vector_dim: cfg.vector_dim, nlist: cfg.nlist }
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
	NotExist,
	NotLoaded,
	Loading,
	Loaded,
}

#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
	pub collection: &'a str,
	pub vector: &'a [f32],
	pub limit: u32,
	pub filter: &'a MetadataFilter,
	/// Largest squared Euclidean distance a hit may have.
	pub distance_threshold: f32,
}

/// Primitive operations of a vector collection store.
///
/// Search results are sorted ascending by squared Euclidean distance, ties in insertion order.
pub trait VectorBackend
where
	Self: Send + Sync,
{
	fn has_collection<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<bool>>;

	/// Fails with [`Error::AlreadyExists`](crate::Error::AlreadyExists) when the collection is
	/// already there. Any other error means the collection may be incomplete.
	fn create_collection<'a>(&'a self, schema: &'a CollectionSchema) -> BoxFuture<'a, Result<()>>;

	fn load_state<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<LoadState>>;

	/// Idempotent. Loading an already loaded collection is a no-op.
	fn load_collection<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>>;

	/// Returns the ids assigned to `records`, in order.
	fn insert<'a>(
		&'a self,
		collection: &'a str,
		records: Vec<VectorRecord>,
	) -> BoxFuture<'a, Result<Vec<i64>>>;

	fn search<'a>(&'a self, request: SearchRequest<'a>) -> BoxFuture<'a, Result<Vec<SearchHit>>>;

	fn delete<'a>(
		&'a self,
		collection: &'a str,
		filter: &'a MetadataFilter,
	) -> BoxFuture<'a, Result<()>>;

	/// Distinct stored file names, sorted.
	fn list_filenames<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<Vec<String>>>;
}

pub(crate) fn squared_l2(left: &[f32], right: &[f32]) -> f32 {
	left.iter().zip(right).map(|(a, b)| (a - b) * (a - b)).sum()
}
