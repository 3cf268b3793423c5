use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use urag_domain::{Chunk, MetadataFilter, VectorRecord};

use crate::{Error, Result, UragService, bounded};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestResponse {
	pub path: PathBuf,
	pub chunks: usize,
	pub ids: Vec<i64>,
}

impl UragService {
	/// Embeds `chunks` in one batch and stores them. Returns the assigned ids in chunk order.
	pub async fn ingest_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<i64>> {
		if chunks.is_empty() {
			return Ok(Vec::new());
		}

		let mut metadata = Vec::with_capacity(chunks.len());

		for chunk in &chunks {
			if chunk.filename().trim().is_empty() {
				return Err(Error::invalid_request("chunk metadata must name its source."));
			}

			metadata.push(chunk.metadata.to_storage_string()?);
		}

		let schema = self.collection.ensure_collection().await?;
		let texts = chunks.iter().map(|chunk| chunk.content.clone()).collect::<Vec<_>>();
		let embeddings = self.embed_batch(&texts).await?;
		let records = chunks
			.into_iter()
			.zip(embeddings)
			.zip(metadata)
			.map(|((chunk, embedding), metadata)| VectorRecord {
				filename: chunk.filename().to_string(),
				content: chunk.content,
				embedding,
				metadata,
			})
			.collect::<Vec<_>>();
		let ids = bounded(
			"vector insert",
			self.collection.timeout_ms(),
			self.collection.backend().insert(&schema.name, records),
		)
		.await??;

		tracing::info!(collection = %schema.name, inserted = ids.len(), "Chunks ingested.");

		Ok(ids)
	}

	/// Loads and chunks the file at `path`, then ingests the chunks.
	pub async fn ingest_document(&self, path: &Path) -> Result<IngestResponse> {
		let loader = self.providers.loader.clone();
		let cfg = self.chunking_config();
		let owned_path = path.to_path_buf();
		let chunks = tokio::task::spawn_blocking(move || loader.load(&owned_path, &cfg))
			.await
			.map_err(|err| Error::Storage { message: format!("document loader task failed: {err}") })??;
		let count = chunks.len();
		let ids = self.ingest_chunks(chunks).await?;

		Ok(IngestResponse { path: path.to_path_buf(), chunks: count, ids })
	}

	pub async fn delete_by_filename(&self, filename: &str) -> Result<()> {
		let filename = filename.trim();

		if filename.is_empty() {
			return Err(Error::invalid_request("filename must be non-empty."));
		}

		self.delete_matching(&MetadataFilter::filename_eq(filename)).await?;

		tracing::info!(filename, "Document deleted.");

		Ok(())
	}

	pub async fn delete_by_id(&self, id: i64) -> Result<()> {
		if id <= 0 {
			return Err(Error::invalid_request("id must be a positive integer."));
		}

		self.delete_matching(&MetadataFilter::id_eq(id)).await?;

		tracing::info!(id, "Chunk deleted.");

		Ok(())
	}

	/// Distinct file names currently indexed, sorted.
	pub async fn list_documents(&self) -> Result<Vec<String>> {
		let schema = self.collection.ensure_collection().await?;

		Ok(bounded(
			"vector list",
			self.collection.timeout_ms(),
			self.collection.backend().list_filenames(&schema.name),
		)
		.await??)
	}

	async fn delete_matching(&self, filter: &MetadataFilter) -> Result<()> {
		let schema = self.collection.ensure_collection().await?;

		bounded(
			"vector delete",
			self.collection.timeout_ms(),
			self.collection.backend().delete(&schema.name, filter),
		)
		.await??;

		Ok(())
	}
}
