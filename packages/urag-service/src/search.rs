use std::sync::Arc;

use serde::{Deserialize, Serialize};

use urag_domain::{MetadataFilter, SearchHit};
use urag_storage::SearchRequest;

use crate::{CollectionManager, Error, Result, UragService, bounded};

pub const DEFAULT_SEARCH_LIMIT: u32 = 5;
pub const DEFAULT_SEARCH_THRESHOLD: f32 = 0.3;

/// Filtered, radius-bounded similarity search over the managed collection.
pub struct SimilaritySearchEngine {
	collection: Arc<CollectionManager>,
	timeout_ms: u64,
}
impl SimilaritySearchEngine {
	pub fn new(collection: Arc<CollectionManager>, timeout_ms: u64) -> Self {
		Self { collection, timeout_ms }
	}

	/// Hits within `distance_threshold` of `embedding`, closest first.
	///
	/// An empty embedding yields no hits and touches nothing. A missing collection is created on
	/// first use.
	pub async fn search(
		&self,
		embedding: &[f32],
		limit: u32,
		filter: &MetadataFilter,
		distance_threshold: f32,
	) -> Result<Vec<SearchHit>> {
		if embedding.is_empty() {
			return Ok(Vec::new());
		}
		if limit == 0 {
			return Err(Error::invalid_request("search limit must be at least 1."));
		}

		let schema = self.collection.schema();

		if embedding.len() != schema.vector_dim as usize {
			return Err(Error::SearchFailed {
				message: format!(
					"query embedding has {} dimensions, collection {:?} expects {}.",
					embedding.len(),
					schema.name,
					schema.vector_dim
				),
			});
		}

		self.collection.ensure_collection().await?;

		let request = SearchRequest {
			collection: &schema.name,
			vector: embedding,
			limit,
			filter,
			distance_threshold,
		};
		let mut hits = bounded("vector search", self.timeout_ms, self.collection.backend().search(request))
			.await?
			.map_err(Error::search_failed)?;

		hits.sort_by(|left, right| left.score.total_cmp(&right.score));
		hits.truncate(limit as usize);

		tracing::debug!(
			collection = %schema.name,
			filter = %filter,
			hits = hits.len(),
			"Similarity search finished."
		);

		Ok(hits)
	}
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SearchSettings {
	pub limit: Option<u32>,
	pub distance_threshold: Option<f32>,
	/// Filter expression, e.g. `filename == "a.txt"` or the shorthand `source:a.txt`.
	pub metadata_filter: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SemanticSearchRequest {
	pub query: String,
	#[serde(default)]
	pub settings: SearchSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SemanticSearchResponse {
	pub query: String,
	pub limit: u32,
	pub distance_threshold: f32,
	pub metadata_filter: Option<String>,
	pub results: Vec<SearchHit>,
}

impl UragService {
	pub async fn semantic_search(&self, req: SemanticSearchRequest) -> Result<SemanticSearchResponse> {
		if req.query.trim().is_empty() {
			return Err(Error::invalid_request("query must be non-empty."));
		}

		let limit = req.settings.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);

		if limit == 0 || limit > urag_config::MAX_RESULT_LIMIT {
			return Err(Error::invalid_request(format!(
				"limit must be in the range 1-{}.",
				urag_config::MAX_RESULT_LIMIT
			)));
		}

		let distance_threshold = req.settings.distance_threshold.unwrap_or(DEFAULT_SEARCH_THRESHOLD);

		if !(0.0..=1.0).contains(&distance_threshold) {
			return Err(Error::invalid_request("distance_threshold must be in the range 0.0-1.0."));
		}

		let filter = MetadataFilter::parse(req.settings.metadata_filter.as_deref().unwrap_or_default())?;
		let embedding = self.embed(&req.query).await?;
		let results = self.search.search(&embedding, limit, &filter, distance_threshold).await?;

		Ok(SemanticSearchResponse {
			query: req.query,
			limit,
			distance_threshold,
			metadata_filter: req.settings.metadata_filter,
			results,
		})
	}
}
