use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub retrieval: Retrieval,
	#[serde(default)]
	pub chunking: Chunking,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub qdrant: Qdrant,
	/// Optional. When absent, conversations live in process memory.
	pub postgres: Option<Postgres>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
	/// Coarse-quantization cell count for inverted-file indexes.
	#[serde(default = "default_nlist")]
	pub nlist: u32,
	pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub generation: LlmProviderConfig,
	pub web_search: WebSearchProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSearchProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	#[serde(default = "default_search_path")]
	pub search_path: String,
	#[serde(default = "default_contents_path")]
	pub contents_path: String,
	#[serde(default = "default_num_results")]
	pub num_results: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Retrieval {
	/// Result cap for the unfiltered broad search.
	pub limit: u32,
	/// Result cap for each filtered search issued for an explicit file reference.
	pub reference_limit: u32,
	/// Explicit file hits below this count trigger the broad search fallback.
	#[serde(default = "default_min_document_hits")]
	pub min_document_hits: u32,
	pub distance_threshold: f32,
	#[serde(default = "default_chat_store_timeout_ms")]
	pub chat_store_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Chunking {
	pub max_chars: u32,
	pub overlap_chars: u32,
}
impl Default for Chunking {
	fn default() -> Self {
		Self { max_chars: 1_000, overlap_chars: 200 }
	}
}

fn default_nlist() -> u32 {
	1_024
}

fn default_search_path() -> String {
	"/search".to_string()
}

fn default_contents_path() -> String {
	"/contents".to_string()
}

fn default_num_results() -> u32 {
	5
}

fn default_min_document_hits() -> u32 {
	3
}

fn default_chat_store_timeout_ms() -> u64 {
	5_000
}
