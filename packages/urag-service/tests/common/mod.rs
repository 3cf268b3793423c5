#![allow(dead_code)]

use std::{
	path::Path,
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use serde_json::{Map, Value, json};

use urag_chunking::ChunkingConfig;
use urag_config::{
	Chunking, Config, EmbeddingProviderConfig, LlmProviderConfig, Providers as ProviderConfigs,
	Qdrant, Retrieval, Service, Storage, WebSearchProviderConfig,
};
use urag_domain::{Chunk, Metadata, MetadataFilter, SearchHit, VectorRecord, WebResult};
use urag_service::{
	BoxFuture, DocumentLoader, EmbeddingProvider, GenerationProvider, Providers, UragService,
	WebSearchProvider,
};
use urag_storage::{
	CollectionSchema, LoadState, MemoryChatStore, SearchRequest, VectorBackend,
	memory::MemoryBackend,
};
use urag_testkit::ScriptedReplies;

pub const COLLECTION: &str = "documents";
pub const VOCABULARY: [&str; 8] =
	["paris", "capital", "france", "sky", "blue", "rust", "ownership", "borrow"];

pub fn test_config() -> Config {
	Config {
		service: Service { log_level: "debug".to_string() },
		storage: Storage {
			qdrant: Qdrant {
				url: "http://127.0.0.1:6334".to_string(),
				collection: COLLECTION.to_string(),
				vector_dim: VOCABULARY.len() as u32,
				nlist: 16,
				timeout_ms: 1_000,
			},
			postgres: None,
		},
		providers: ProviderConfigs {
			embedding: EmbeddingProviderConfig {
				provider_id: "fake".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "key".to_string(),
				path: "/embeddings".to_string(),
				model: "keywords".to_string(),
				dimensions: VOCABULARY.len() as u32,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
			generation: LlmProviderConfig {
				provider_id: "fake".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "key".to_string(),
				path: "/chat/completions".to_string(),
				model: "scripted".to_string(),
				temperature: 0.0,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
			web_search: WebSearchProviderConfig {
				provider_id: "fake".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "key".to_string(),
				search_path: "/search".to_string(),
				contents_path: "/contents".to_string(),
				num_results: 5,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
		},
		retrieval: Retrieval {
			limit: 5,
			reference_limit: 5,
			min_document_hits: 3,
			distance_threshold: 4.0,
			chat_store_timeout_ms: 1_000,
		},
		chunking: Chunking { max_chars: 1_000, overlap_chars: 200 },
	}
}

pub fn chunk(filename: &str, index: u32, content: &str) -> Chunk {
	Chunk { content: content.to_string(), metadata: Metadata::new(filename, 1, index) }
}

pub fn answer(text: &str, used_documents: bool, used_web: bool) -> Value {
	json!({
		"answer": text,
		"used_document_context": used_documents,
		"used_web_context": used_web,
	})
}

pub fn web_result(url: &str) -> WebResult {
	WebResult {
		title: format!("Page at {url}"),
		url: url.to_string(),
		text: "The sky is blue because of Rayleigh scattering.".to_string(),
		highlights: vec!["Rayleigh scattering".to_string()],
		score: Some(0.7),
	}
}

#[derive(Default)]
pub struct KeywordEmbedder {
	pub calls: AtomicUsize,
	pub delay: Mutex<Option<Duration>>,
}
impl EmbeddingProvider for KeywordEmbedder {
	fn embed<'a>(
		&'a self,
		_: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, urag_providers::Result<Vec<Vec<f32>>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let delay = *self.delay.lock().expect("delay lock");

		Box::pin(async move {
			if let Some(delay) = delay {
				tokio::time::sleep(delay).await;
			}

			Ok(texts.iter().map(|text| urag_testkit::keyword_embedding(text, &VOCABULARY)).collect())
		})
	}
}

pub struct ScriptedGeneration {
	pub replies: ScriptedReplies<Value>,
	pub schemas: Mutex<Vec<String>>,
	pub delay: Option<Duration>,
}
impl ScriptedGeneration {
	pub fn schema_names(&self) -> Vec<String> {
		self.schemas.lock().expect("schema lock").clone()
	}
}
impl GenerationProvider for ScriptedGeneration {
	fn complete<'a>(
		&'a self,
		_: &'a LlmProviderConfig,
		_: &'a [Value],
		schema_name: &'a str,
		_: &'a Value,
	) -> BoxFuture<'a, urag_providers::Result<Value>> {
		self.schemas.lock().expect("schema lock").push(schema_name.to_string());

		Box::pin(async move {
			if let Some(delay) = self.delay {
				tokio::time::sleep(delay).await;
			}

			self.replies.next().ok_or_else(|| urag_providers::Error::InvalidResponse {
				message: "script exhausted".to_string(),
			})
		})
	}
}

pub struct SpyWebSearch {
	pub queries: Mutex<Vec<String>>,
	pub fetched: Mutex<Vec<Vec<String>>>,
}
impl WebSearchProvider for SpyWebSearch {
	fn search<'a>(
		&'a self,
		_: &'a WebSearchProviderConfig,
		query: &'a str,
	) -> BoxFuture<'a, urag_providers::Result<Vec<WebResult>>> {
		self.queries.lock().expect("query lock").push(query.to_string());

		Box::pin(async move { Ok(vec![web_result("https://weather.test/sky")]) })
	}

	fn contents<'a>(
		&'a self,
		_: &'a WebSearchProviderConfig,
		urls: &'a [String],
	) -> BoxFuture<'a, urag_providers::Result<Vec<WebResult>>> {
		self.fetched.lock().expect("fetch lock").push(urls.to_vec());

		Box::pin(async move { Ok(urls.iter().map(|url| web_result(url)).collect()) })
	}
}

pub struct TextLoader;
impl DocumentLoader for TextLoader {
	fn load(&self, path: &Path, cfg: &ChunkingConfig) -> urag_chunking::Result<Vec<Chunk>> {
		urag_chunking::load_document(path, cfg)
	}
}

/// Memory backend that records whether each search carried a filter.
#[derive(Default)]
pub struct CountingBackend {
	pub inner: MemoryBackend,
	pub searches: Mutex<Vec<bool>>,
}
impl CountingBackend {
	pub fn filtered_searches(&self) -> usize {
		self.searches.lock().expect("search lock").iter().filter(|filtered| **filtered).count()
	}

	pub fn broad_searches(&self) -> usize {
		self.searches.lock().expect("search lock").iter().filter(|filtered| !**filtered).count()
	}
}
impl VectorBackend for CountingBackend {
	fn has_collection<'a>(&'a self, name: &'a str) -> BoxFuture<'a, urag_storage::Result<bool>> {
		self.inner.has_collection(name)
	}

	fn create_collection<'a>(
		&'a self,
		schema: &'a CollectionSchema,
	) -> BoxFuture<'a, urag_storage::Result<()>> {
		self.inner.create_collection(schema)
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
		self.searches.lock().expect("search lock").push(!request.filter.is_empty());

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

pub struct Harness {
	pub service: UragService,
	pub backend: Arc<CountingBackend>,
	pub chats: Arc<MemoryChatStore>,
	pub embedder: Arc<KeywordEmbedder>,
	pub generation: Arc<ScriptedGeneration>,
	pub web: Arc<SpyWebSearch>,
}
impl Harness {
	pub fn new(replies: Vec<Value>) -> Self {
		Self::build(test_config(), replies, None)
	}

	pub fn build(cfg: Config, replies: Vec<Value>, delay: Option<Duration>) -> Self {
		let backend = Arc::new(CountingBackend::default());
		let chats = Arc::new(MemoryChatStore::new());
		let embedder = Arc::new(KeywordEmbedder::default());
		let generation = Arc::new(ScriptedGeneration {
			replies: ScriptedReplies::new(replies),
			schemas: Mutex::new(Vec::new()),
			delay,
		});
		let web = Arc::new(SpyWebSearch {
			queries: Mutex::new(Vec::new()),
			fetched: Mutex::new(Vec::new()),
		});
		let providers =
			Providers::new(embedder.clone(), generation.clone(), web.clone(), Arc::new(TextLoader));
		let service = UragService::with_providers(cfg, backend.clone(), chats.clone(), providers);

		Self { service, backend, chats, embedder, generation, web }
	}

	pub async fn ingest_paris_and_sky(&self) -> Vec<i64> {
		self.service
			.ingest_chunks(vec![
				chunk("a.txt", 0, "Paris is the capital of France."),
				chunk("b.txt", 0, "The sky is blue."),
			])
			.await
			.expect("Failed to ingest chunks.")
	}

	pub fn search_count(&self) -> usize {
		self.backend.searches.lock().expect("search lock").len()
	}
}
