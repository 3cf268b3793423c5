//! Vector collection lifecycle: create on first use, load before querying.

use std::sync::Arc;

use urag_storage::{CollectionSchema, LoadState, VectorBackend};

use crate::{Error, Result, bounded};

pub struct CollectionManager {
	backend: Arc<dyn VectorBackend>,
	schema: CollectionSchema,
	timeout_ms: u64,
}
impl CollectionManager {
	pub fn new(backend: Arc<dyn VectorBackend>, schema: CollectionSchema, timeout_ms: u64) -> Self {
		Self { backend, schema, timeout_ms }
	}

	pub fn schema(&self) -> &CollectionSchema {
		&self.schema
	}

	pub fn backend(&self) -> &Arc<dyn VectorBackend> {
		&self.backend
	}

	pub(crate) fn timeout_ms(&self) -> u64 {
		self.timeout_ms
	}

	/// Creates the collection when it is missing, then makes sure it is loaded.
	///
	/// A second call against an existing collection only checks its load state.
	pub async fn ensure_collection(&self) -> Result<&CollectionSchema> {
		let name = self.schema.name.as_str();
		let exists = bounded("collection exists", self.timeout_ms, self.backend.has_collection(name))
			.await?
			.map_err(Error::collection_unavailable)?;

		if !exists {
			let created = bounded(
				"collection create",
				self.timeout_ms,
				self.backend.create_collection(&self.schema),
			)
			.await?;

			match created {
				Ok(()) => tracing::info!(
					collection = name,
					vector_dim = self.schema.vector_dim,
					nlist = self.schema.nlist,
					"Vector collection created."
				),
				// Another caller created it first.
				Err(urag_storage::Error::AlreadyExists(_)) =>
					tracing::debug!(collection = name, "Vector collection already created."),
				Err(err) => {
					tracing::error!(collection = name, error = %err, "Vector collection create failed.");

					return Err(Error::collection_unavailable(err));
				},
			}
		}

		self.ensure_loaded().await?;

		Ok(&self.schema)
	}

	/// Loads the collection unless the store already reports it as loaded.
	pub async fn ensure_loaded(&self) -> Result<()> {
		let name = self.schema.name.as_str();
		let state = bounded("collection load state", self.timeout_ms, self.backend.load_state(name))
			.await?
			.map_err(Error::collection_unavailable)?;

		match state {
			LoadState::Loaded => Ok(()),
			LoadState::NotExist => Err(Error::CollectionUnavailable {
				message: format!("collection {name:?} does not exist."),
			}),
			LoadState::NotLoaded | LoadState::Loading => {
				bounded("collection load", self.timeout_ms, self.backend.load_collection(name))
					.await?
					.map_err(Error::collection_unavailable)?;

				tracing::debug!(collection = name, ?state, "Vector collection loaded.");

				Ok(())
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicBool, Ordering};

	use urag_domain::{MetadataFilter, SearchHit, VectorRecord};
	use urag_storage::{BoxFuture, SearchRequest, memory::MemoryBackend};

	use super::*;

	fn schema() -> CollectionSchema {
		CollectionSchema { name: "docs".to_string(), vector_dim: 3, nlist: 8 }
	}

	fn manager(backend: Arc<MemoryBackend>) -> CollectionManager {
		CollectionManager::new(backend, schema(), 1_000)
	}

	/// Wraps [`MemoryBackend`] to widen the check-then-create window and to fail creates that
	/// leave a half-built collection behind.
	#[derive(Default)]
	struct WrappedBackend {
		inner: MemoryBackend,
		yield_after_check: bool,
		fail_after_create: AtomicBool,
	}
	impl VectorBackend for WrappedBackend {
		fn has_collection<'a>(&'a self, name: &'a str) -> BoxFuture<'a, urag_storage::Result<bool>> {
			Box::pin(async move {
				let exists = self.inner.has_collection(name).await?;

				if self.yield_after_check {
					tokio::task::yield_now().await;
				}

				Ok(exists)
			})
		}

		fn create_collection<'a>(
			&'a self,
			schema: &'a CollectionSchema,
		) -> BoxFuture<'a, urag_storage::Result<()>> {
			Box::pin(async move {
				self.inner.create_collection(schema).await?;

				if self.fail_after_create.load(Ordering::SeqCst) {
					return Err(urag_storage::Error::Unavailable("index build failed.".to_string()));
				}

				Ok(())
			})
		}

		fn load_state<'a>(&'a self, name: &'a str) -> BoxFuture<'a, urag_storage::Result<LoadState>> {
			self.inner.load_state(name)
		}

		fn load_collection<'a>(&'a self, name: &'a str) -> BoxFuture<'a, urag_storage::Result<()>> {
			self.inner.load_collection(name)
		}

		fn insert<'a>(
			&'a self,
			collection: &'a str,
			records: Vec<VectorRecord>,
		) -> BoxFuture<'a, urag_storage::Result<Vec<i64>>> {
			self.inner.insert(collection, records)
		}

		fn search<'a>(
			&'a self,
			request: SearchRequest<'a>,
		) -> BoxFuture<'a, urag_storage::Result<Vec<SearchHit>>> {
			self.inner.search(request)
		}

		fn delete<'a>(
			&'a self,
			collection: &'a str,
			filter: &'a MetadataFilter,
		) -> BoxFuture<'a, urag_storage::Result<()>> {
			self.inner.delete(collection, filter)
		}

		fn list_filenames<'a>(
			&'a self,
			collection: &'a str,
		) -> BoxFuture<'a, urag_storage::Result<Vec<String>>> {
			self.inner.list_filenames(collection)
		}
	}

	#[tokio::test]
	async fn second_ensure_performs_no_schema_mutation() {
		let backend = Arc::new(MemoryBackend::new());
		let manager = manager(backend.clone());

		manager.ensure_collection().await.expect("first ensure failed");
		manager.ensure_collection().await.expect("second ensure failed");

		assert_eq!(backend.create_calls(), 1);
		assert_eq!(backend.load_calls(), 1);
	}

	#[tokio::test]
	async fn concurrent_callers_create_and_load_once() {
		let backend = Arc::new(WrappedBackend { yield_after_check: true, ..Default::default() });
		let manager = CollectionManager::new(backend.clone(), schema(), 1_000);
		let (first, second, third) = tokio::join!(
			manager.ensure_collection(),
			manager.ensure_collection(),
			manager.ensure_collection()
		);

		first.expect("first ensure failed");
		second.expect("second ensure failed");
		third.expect("third ensure failed");

		assert_eq!(backend.inner.create_calls(), 1);
		assert_eq!(backend.inner.load_calls(), 1);
	}

	#[tokio::test]
	async fn half_built_collection_is_reported() {
		let backend = Arc::new(WrappedBackend::default());
		let manager = CollectionManager::new(backend.clone(), schema(), 1_000);

		backend.fail_after_create.store(true, Ordering::SeqCst);

		let err = manager.ensure_collection().await.expect_err("create failure must surface");

		assert_eq!(err.kind(), "collection_unavailable");
		assert!(err.to_string().contains("index build failed"));
		assert!(backend.inner.has_collection("docs").await.expect("exists check failed"));
	}

	#[tokio::test]
	async fn unreachable_store_is_collection_unavailable() {
		let backend = Arc::new(MemoryBackend::new());
		let manager = manager(backend.clone());

		backend.set_unavailable(true);

		let err = manager.ensure_collection().await.expect_err("ensure should fail");

		assert_eq!(err.kind(), "collection_unavailable");
	}

	#[tokio::test]
	async fn loading_a_missing_collection_fails() {
		let manager = manager(Arc::new(MemoryBackend::new()));
		let err = manager.ensure_loaded().await.expect_err("load should fail");

		assert!(matches!(err, Error::CollectionUnavailable { .. }));
	}
}
