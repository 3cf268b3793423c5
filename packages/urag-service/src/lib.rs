pub mod chats;
pub mod collection;
pub mod context;
pub mod conversation;
pub mod ingest;
pub mod prompt;
pub mod search;
pub mod web;

mod error;

pub use chats::{DEFAULT_CONVERSATION_SEARCH_LIMIT, SearchConversationsRequest};
pub use collection::CollectionManager;
pub use context::ContextAssembler;
pub use conversation::{AskRequest, AskResponse, GeneratedAnswer, TurnState};
pub use error::{Error, Result};
pub use ingest::IngestResponse;
pub use search::{
	SearchSettings, SemanticSearchRequest, SemanticSearchResponse, SimilaritySearchEngine,
};
pub use web::{WebDecision, WebSearchDecisionEngine};

use std::{future::Future, path::Path, pin::Pin, sync::Arc, time::Duration};

use serde_json::Value;

use urag_chunking::ChunkingConfig;
use urag_config::{Config, EmbeddingProviderConfig, LlmProviderConfig, WebSearchProviderConfig};
use urag_domain::{Chunk, WebResult};
use urag_providers::{embedding, generation, web as web_provider};
use urag_storage::{ChatStore, CollectionSchema, VectorBackend};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, urag_providers::Result<Vec<Vec<f32>>>>;
}

pub trait GenerationProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
		schema_name: &'a str,
		schema: &'a Value,
	) -> BoxFuture<'a, urag_providers::Result<Value>>;
}

pub trait WebSearchProvider
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		cfg: &'a WebSearchProviderConfig,
		query: &'a str,
	) -> BoxFuture<'a, urag_providers::Result<Vec<WebResult>>>;

	fn contents<'a>(
		&'a self,
		cfg: &'a WebSearchProviderConfig,
		urls: &'a [String],
	) -> BoxFuture<'a, urag_providers::Result<Vec<WebResult>>>;
}

pub trait DocumentLoader
where
	Self: Send + Sync,
{
	fn load(&self, path: &Path, cfg: &ChunkingConfig) -> urag_chunking::Result<Vec<Chunk>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub generation: Arc<dyn GenerationProvider>,
	pub web_search: Arc<dyn WebSearchProvider>,
	pub loader: Arc<dyn DocumentLoader>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		generation: Arc<dyn GenerationProvider>,
		web_search: Arc<dyn WebSearchProvider>,
		loader: Arc<dyn DocumentLoader>,
	) -> Self {
		Self { embedding, generation, web_search, loader }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self {
			embedding: provider.clone(),
			generation: provider.clone(),
			web_search: provider.clone(),
			loader: provider,
		}
	}
}

pub struct UragService {
	pub cfg: Config,
	pub collection: Arc<CollectionManager>,
	pub search: SimilaritySearchEngine,
	pub web: WebSearchDecisionEngine,
	pub chats: Arc<dyn ChatStore>,
	pub providers: Providers,
}
impl UragService {
	pub fn new(cfg: Config, vectors: Arc<dyn VectorBackend>, chats: Arc<dyn ChatStore>) -> Self {
		Self::with_providers(cfg, vectors, chats, Providers::default())
	}

	pub fn with_providers(
		cfg: Config,
		vectors: Arc<dyn VectorBackend>,
		chats: Arc<dyn ChatStore>,
		providers: Providers,
	) -> Self {
		let collection = Arc::new(CollectionManager::new(
			vectors,
			CollectionSchema::from_config(&cfg.storage.qdrant),
			cfg.storage.qdrant.timeout_ms,
		));
		let search = SimilaritySearchEngine::new(collection.clone(), cfg.storage.qdrant.timeout_ms);
		let web = WebSearchDecisionEngine::new(
			providers.generation.clone(),
			providers.web_search.clone(),
			cfg.providers.generation.clone(),
			cfg.providers.web_search.clone(),
		);

		Self { cfg, collection, search, web, chats, providers }
	}

	pub fn assembler(&self) -> ContextAssembler<'_> {
		ContextAssembler::new(&self.search, &self.web, &self.cfg.retrieval)
	}

	/// Embeds `texts` in one batch and checks every vector against the collection dimension.
	pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		let cfg = &self.cfg.providers.embedding;
		let vectors = call_provider(
			"embedding",
			cfg.timeout_ms,
			self.providers.embedding.embed(cfg, texts),
			Error::embedding_failed,
		)
		.await?;

		if vectors.len() != texts.len() {
			return Err(Error::EmbeddingFailed {
				message: format!("expected {} vectors, received {}.", texts.len(), vectors.len()),
			});
		}

		let dim = self.cfg.storage.qdrant.vector_dim as usize;

		if let Some(vector) = vectors.iter().find(|vector| vector.len() != dim) {
			return Err(Error::EmbeddingFailed {
				message: format!("vector has {} dimensions, expected {dim}.", vector.len()),
			});
		}

		Ok(vectors)
	}

	pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
		self.embed_batch(&[text.to_string()]).await?.pop().ok_or_else(|| Error::EmbeddingFailed {
			message: "embedding provider returned no vectors.".to_string(),
		})
	}

	pub(crate) fn chunking_config(&self) -> ChunkingConfig {
		ChunkingConfig {
			max_chars: self.cfg.chunking.max_chars,
			overlap_chars: self.cfg.chunking.overlap_chars,
		}
	}

	pub(crate) async fn chat_call<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
	where
		F: Future<Output = urag_storage::Result<T>>,
	{
		Ok(bounded(operation, self.cfg.retrieval.chat_store_timeout_ms, fut).await??)
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, urag_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}
impl GenerationProvider for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
		schema_name: &'a str,
		schema: &'a Value,
	) -> BoxFuture<'a, urag_providers::Result<Value>> {
		Box::pin(generation::complete(cfg, messages, schema_name, schema))
	}
}
impl WebSearchProvider for DefaultProviders {
	fn search<'a>(
		&'a self,
		cfg: &'a WebSearchProviderConfig,
		query: &'a str,
	) -> BoxFuture<'a, urag_providers::Result<Vec<WebResult>>> {
		Box::pin(web_provider::search(cfg, query))
	}

	fn contents<'a>(
		&'a self,
		cfg: &'a WebSearchProviderConfig,
		urls: &'a [String],
	) -> BoxFuture<'a, urag_providers::Result<Vec<WebResult>>> {
		Box::pin(web_provider::contents(cfg, urls))
	}
}
impl DocumentLoader for DefaultProviders {
	fn load(&self, path: &Path, cfg: &ChunkingConfig) -> urag_chunking::Result<Vec<Chunk>> {
		urag_chunking::load_document(path, cfg)
	}
}

/// Runs `fut` under a deadline. The outer result carries the timeout, the inner one the call's
/// own outcome.
pub(crate) async fn bounded<T, F>(operation: &'static str, timeout_ms: u64, fut: F) -> Result<T>
where
	F: Future<Output = T>,
{
	tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await.map_err(|_| {
		tracing::warn!(operation, timeout_ms, "External call timed out.");

		Error::Timeout { operation, timeout_ms }
	})
}

pub(crate) async fn call_provider<T, F>(
	operation: &'static str,
	timeout_ms: u64,
	fut: F,
	wrap: fn(urag_providers::Error) -> Error,
) -> Result<T>
where
	F: Future<Output = urag_providers::Result<T>>,
{
	match bounded(operation, timeout_ms, fut).await? {
		Ok(value) => Ok(value),
		Err(err) if err.is_timeout() => Err(Error::Timeout { operation, timeout_ms }),
		Err(err) => Err(wrap(err)),
	}
}
