//! In-process vector collection with exact search.

use std::{
	collections::{BTreeSet, HashMap},
	sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
};

use tokio::sync::RwLock;

use urag_domain::{IndexedVector, Metadata, MetadataFilter, SearchHit, VectorRecord};

use crate::{
	BoxFuture, CollectionSchema, Error, LoadState, Result, SearchRequest, VectorBackend,
	backend::squared_l2,
};

struct MemoryCollection {
	schema: CollectionSchema,
	loaded: bool,
	rows: Vec<IndexedVector>,
}

#[derive(Default)]
pub struct MemoryBackend {
	collections: RwLock<HashMap<String, MemoryCollection>>,
	next_id: AtomicI64,
	create_calls: AtomicUsize,
	load_calls: AtomicUsize,
	unavailable: AtomicBool,
}
impl MemoryBackend {
	pub fn new() -> Self {
		Self::default()
	}

	/// Simulates an unreachable store: every call fails until switched back.
	pub fn set_unavailable(&self, unavailable: bool) {
		self.unavailable.store(unavailable, Ordering::SeqCst);
	}

	pub fn create_calls(&self) -> usize {
		self.create_calls.load(Ordering::SeqCst)
	}

	pub fn load_calls(&self) -> usize {
		self.load_calls.load(Ordering::SeqCst)
	}

	pub async fn row_count(&self, collection: &str) -> usize {
		self.collections.read().await.get(collection).map(|c| c.rows.len()).unwrap_or_default()
	}

	fn check_available(&self) -> Result<()> {
		if self.unavailable.load(Ordering::SeqCst) {
			return Err(Error::Unavailable("memory backend is switched off.".to_string()));
		}

		Ok(())
	}

	async fn has_collection_inner(&self, name: &str) -> Result<bool> {
		self.check_available()?;

		Ok(self.collections.read().await.contains_key(name))
	}

	async fn create_collection_inner(&self, schema: &CollectionSchema) -> Result<()> {
		self.check_available()?;

		let mut collections = self.collections.write().await;

		if collections.contains_key(&schema.name) {
			return Err(Error::AlreadyExists(format!("collection {:?}.", schema.name)));
		}

		self.create_calls.fetch_add(1, Ordering::SeqCst);
		collections.insert(
			schema.name.clone(),
			MemoryCollection { schema: schema.clone(), loaded: false, rows: Vec::new() },
		);

		Ok(())
	}

	async fn load_state_inner(&self, name: &str) -> Result<LoadState> {
		self.check_available()?;

		Ok(match self.collections.read().await.get(name) {
			None => LoadState::NotExist,
			Some(collection) if collection.loaded => LoadState::Loaded,
			Some(_) => LoadState::NotLoaded,
		})
	}

	async fn load_collection_inner(&self, name: &str) -> Result<()> {
		self.check_available()?;

		let mut collections = self.collections.write().await;
		let collection = collections
			.get_mut(name)
			.ok_or_else(|| Error::NotFound(format!("collection {name:?} does not exist.")))?;

		if !collection.loaded {
			self.load_calls.fetch_add(1, Ordering::SeqCst);

			collection.loaded = true;
		}

		Ok(())
	}

	async fn insert_inner(&self, name: &str, records: Vec<VectorRecord>) -> Result<Vec<i64>> {
		self.check_available()?;

		let mut collections = self.collections.write().await;
		let collection = collections
			.get_mut(name)
			.ok_or_else(|| Error::NotFound(format!("collection {name:?} does not exist.")))?;
		let dim = collection.schema.vector_dim as usize;

		if let Some(record) = records.iter().find(|record| record.embedding.len() != dim) {
			return Err(Error::InvalidArgument(format!(
				"embedding has {} dimensions, collection expects {dim}.",
				record.embedding.len()
			)));
		}

		let mut ids = Vec::with_capacity(records.len());

		for record in records {
			let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;

			collection.rows.push(IndexedVector {
				id,
				filename: record.filename,
				content: record.content,
				embedding: record.embedding,
				metadata: record.metadata,
			});
			ids.push(id);
		}

		Ok(ids)
	}

	async fn search_inner(&self, request: SearchRequest<'_>) -> Result<Vec<SearchHit>> {
		self.check_available()?;

		let collections = self.collections.read().await;
		let collection = collections.get(request.collection).ok_or_else(|| {
			Error::NotFound(format!("collection {:?} does not exist.", request.collection))
		})?;

		if !collection.loaded {
			return Err(Error::InvalidArgument(format!(
				"collection {:?} is not loaded.",
				request.collection
			)));
		}
		if request.vector.len() != collection.schema.vector_dim as usize {
			return Err(Error::InvalidArgument(format!(
				"query has {} dimensions, collection expects {}.",
				request.vector.len(),
				collection.schema.vector_dim
			)));
		}

		let mut scored = collection
			.rows
			.iter()
			.filter(|row| request.filter.matches(row.id, &row.filename))
			.map(|row| (squared_l2(&row.embedding, request.vector), row))
			.filter(|(distance, _)| *distance <= request.distance_threshold)
			.collect::<Vec<_>>();

		// Rows are kept in insertion order and the sort is stable.
		scored.sort_by(|(left, _), (right, _)| left.total_cmp(right));
		scored.truncate(request.limit as usize);

		scored
			.into_iter()
			.map(|(score, row)| -> Result<SearchHit> {
				Ok(SearchHit {
					id: row.id,
					content: row.content.clone(),
					filename: row.filename.clone(),
					metadata: Metadata::from_storage_str(&row.metadata)?,
					score,
				})
			})
			.collect()
	}

	async fn delete_inner(&self, name: &str, filter: &MetadataFilter) -> Result<()> {
		self.check_available()?;

		let mut collections = self.collections.write().await;
		let collection = collections
			.get_mut(name)
			.ok_or_else(|| Error::NotFound(format!("collection {name:?} does not exist.")))?;

		collection.rows.retain(|row| !filter.matches(row.id, &row.filename));

		Ok(())
	}

	async fn list_filenames_inner(&self, name: &str) -> Result<Vec<String>> {
		self.check_available()?;

		let collections = self.collections.read().await;
		let collection = collections
			.get(name)
			.ok_or_else(|| Error::NotFound(format!("collection {name:?} does not exist.")))?;
		let names = collection.rows.iter().map(|row| row.filename.as_str()).collect::<BTreeSet<_>>();

		Ok(names.into_iter().map(str::to_string).collect())
	}
}
impl VectorBackend for MemoryBackend {
	fn has_collection<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(self.has_collection_inner(name))
	}

	fn create_collection<'a>(&'a self, schema: &'a CollectionSchema) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.create_collection_inner(schema))
	}

	fn load_state<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<LoadState>> {
		Box::pin(self.load_state_inner(name))
	}

	fn load_collection<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.load_collection_inner(name))
	}

	fn insert<'a>(
		&'a self,
		collection: &'a str,
		records: Vec<VectorRecord>,
	) -> BoxFuture<'a, Result<Vec<i64>>> {
		Box::pin(self.insert_inner(collection, records))
	}

	fn search<'a>(&'a self, request: SearchRequest<'a>) -> BoxFuture<'a, Result<Vec<SearchHit>>> {
		Box::pin(self.search_inner(request))
	}

	fn delete<'a>(
		&'a self,
		collection: &'a str,
		filter: &'a MetadataFilter,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.delete_inner(collection, filter))
	}

	fn list_filenames<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(self.list_filenames_inner(collection))
	}
}
