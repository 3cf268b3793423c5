mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Chunking, Config, EmbeddingProviderConfig, LlmProviderConfig, Postgres, Providers, Qdrant,
	Retrieval, Service, Storage, WebSearchProviderConfig,
};

use std::{fs, path::Path};

/// Upper bound shared by every caller-tunable result limit.
pub const MAX_RESULT_LIMIT: u32 = 50;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);
	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.collection must be non-empty.".to_string(),
		});
	}
	if cfg.storage.qdrant.vector_dim == 0 {
		return Err(Error::Validation {
			message: "storage.qdrant.vector_dim must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.qdrant.nlist == 0 {
		return Err(Error::Validation {
			message: "storage.qdrant.nlist must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}
	if cfg.providers.web_search.num_results == 0 {
		return Err(Error::Validation {
			message: "providers.web_search.num_results must be greater than zero.".to_string(),
		});
	}
	if !cfg.providers.generation.temperature.is_finite() {
		return Err(Error::Validation {
			message: "providers.generation.temperature must be a finite number.".to_string(),
		});
	}

	for (label, value) in [
		("retrieval.limit", cfg.retrieval.limit),
		("retrieval.reference_limit", cfg.retrieval.reference_limit),
	] {
		if value == 0 || value > MAX_RESULT_LIMIT {
			return Err(Error::Validation {
				message: format!("{label} must be in the range 1-{MAX_RESULT_LIMIT}."),
			});
		}
	}

	if !cfg.retrieval.distance_threshold.is_finite() {
		return Err(Error::Validation {
			message: "retrieval.distance_threshold must be a finite number.".to_string(),
		});
	}
	if cfg.retrieval.distance_threshold < 0.0 {
		return Err(Error::Validation {
			message: "retrieval.distance_threshold must be zero or greater.".to_string(),
		});
	}
	if cfg.chunking.max_chars == 0 {
		return Err(Error::Validation {
			message: "chunking.max_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.chunking.overlap_chars >= cfg.chunking.max_chars {
		return Err(Error::Validation {
			message: "chunking.overlap_chars must be less than chunking.max_chars.".to_string(),
		});
	}

	for (label, timeout_ms) in [
		("storage.qdrant.timeout_ms", cfg.storage.qdrant.timeout_ms),
		("providers.embedding.timeout_ms", cfg.providers.embedding.timeout_ms),
		("providers.generation.timeout_ms", cfg.providers.generation.timeout_ms),
		("providers.web_search.timeout_ms", cfg.providers.web_search.timeout_ms),
		("retrieval.chat_store_timeout_ms", cfg.retrieval.chat_store_timeout_ms),
	] {
		if timeout_ms == 0 {
			return Err(Error::Validation {
				message: format!("{label} must be greater than zero."),
			});
		}
	}
	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("generation", &cfg.providers.generation.api_key),
		("web_search", &cfg.providers.web_search.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	if let Some(postgres) = cfg.storage.postgres.as_ref() {
		if postgres.dsn.trim().is_empty() {
			return Err(Error::Validation {
				message: "storage.postgres.dsn must be non-empty.".to_string(),
			});
		}
		if postgres.pool_max_conns == 0 {
			return Err(Error::Validation {
				message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	for api_base in [
		&mut cfg.providers.embedding.api_base,
		&mut cfg.providers.generation.api_base,
		&mut cfg.providers.web_search.api_base,
	] {
		while api_base.ends_with('/') {
			api_base.pop();
		}
	}

	cfg.storage.qdrant.collection = cfg.storage.qdrant.collection.trim().to_string();
}
