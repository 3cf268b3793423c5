//! Qdrant-backed vector collection.
//!
//! Qdrant reports plain Euclidean distance for `Distance::Euclid`; scores leaving this module are
//! squared so every backend speaks the same metric. Qdrant builds HNSW indexes, so `nlist` is not
//! used here.

use std::{
	collections::{BTreeSet, HashMap},
	sync::atomic::{AtomicI64, Ordering},
	time::Duration,
};

use qdrant_client::{
	Qdrant,
	qdrant::{
		CollectionStatus, Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
		DeletePointsBuilder, Distance, FieldType, Filter, PointId, PointStruct, Query,
		QueryPointsBuilder, ScoredPoint, ScrollPointsBuilder, UpsertPointsBuilder, Value,
		VectorParamsBuilder, point_id::PointIdOptions, value::Kind,
	},
	client::Payload,
};
use time::OffsetDateTime;
use uuid::Uuid;

use urag_domain::{
	FilterExpr, FilterField, FilterValue, Metadata, MetadataFilter, SearchHit, VectorRecord,
};

use crate::{
	BoxFuture, CollectionSchema, Error, LoadState, Result, SearchRequest, VectorBackend,
};

pub const FILENAME_FIELD: &str = "filename";
pub const CONTENT_FIELD: &str = "content";
pub const METADATA_FIELD: &str = "metadata";
pub const SEQ_FIELD: &str = "seq";

const SCROLL_PAGE_SIZE: u32 = 256;

pub struct QdrantBackend {
	pub client: Qdrant,
	seq: AtomicI64,
}
impl QdrantBackend {
	pub fn new(cfg: &urag_config::Qdrant) -> Result<Self> {
		let client =
			Qdrant::from_url(&cfg.url).timeout(Duration::from_millis(cfg.timeout_ms)).build()?;

		Ok(Self { client, seq: AtomicI64::new(0) })
	}

	async fn create_collection_inner(&self, schema: &CollectionSchema) -> Result<()> {
		let builder = CreateCollectionBuilder::new(schema.name.clone()).vectors_config(
			VectorParamsBuilder::new(schema.vector_dim.into(), Distance::Euclid),
		);

		if let Err(err) = self.client.create_collection(builder).await {
			// Lost a race with another creator.
			if self.client.collection_exists(&schema.name).await? {
				return Err(Error::AlreadyExists(format!("collection {:?}.", schema.name)));
			}

			return Err(err.into());
		}

		// A failure here leaves the collection without its filename index and is reported.
		self.client
			.create_field_index(
				CreateFieldIndexCollectionBuilder::new(
					schema.name.clone(),
					FILENAME_FIELD,
					FieldType::Keyword,
				)
				.wait(true),
			)
			.await?;

		tracing::info!(
			collection = %schema.name,
			vector_dim = schema.vector_dim,
			"Qdrant collection created."
		);

		Ok(())
	}

	async fn list_filenames_inner(&self, name: &str) -> Result<Vec<String>> {
		let mut names = BTreeSet::new();
		let mut offset: Option<PointId> = None;

		loop {
			let mut scroll = ScrollPointsBuilder::new(name)
				.limit(SCROLL_PAGE_SIZE)
				.with_payload(true)
				.with_vectors(false);

			if let Some(offset) = offset.take() {
				scroll = scroll.offset(offset);
			}

			let page = self.client.scroll(scroll).await?;

			names.extend(
				page.result
					.iter()
					.filter_map(|point| payload_text(&point.payload, FILENAME_FIELD))
					.map(str::to_string),
			);

			match page.next_page_offset {
				Some(next) => offset = Some(next),
				None => break,
			}
		}

		Ok(names.into_iter().collect())
	}

	async fn load_state_inner(&self, name: &str) -> Result<LoadState> {
		if !self.client.collection_exists(name).await? {
			return Ok(LoadState::NotExist);
		}

		let info = self
			.client
			.collection_info(name)
			.await?
			.result
			.ok_or_else(|| Error::NotFound(format!("collection {name:?} info is missing.")))?;

		Ok(match info.status() {
			CollectionStatus::Green | CollectionStatus::Yellow => LoadState::Loaded,
			CollectionStatus::Grey => LoadState::Loading,
			_ => LoadState::NotLoaded,
		})
	}

	async fn load_collection_inner(&self, name: &str) -> Result<()> {
		// Qdrant serves collections without an explicit load step.
		if !self.client.collection_exists(name).await? {
			return Err(Error::NotFound(format!("collection {name:?} does not exist.")));
		}

		Ok(())
	}

	async fn insert_inner(&self, name: &str, records: Vec<VectorRecord>) -> Result<Vec<i64>> {
		if records.is_empty() {
			return Ok(Vec::new());
		}

		let base_seq = self.next_seq_base(records.len());
		let mut ids = Vec::with_capacity(records.len());
		let mut points = Vec::with_capacity(records.len());

		for (offset, record) in records.into_iter().enumerate() {
			let id = new_point_id();
			let mut payload = Payload::new();

			payload.insert(FILENAME_FIELD, record.filename);
			payload.insert(CONTENT_FIELD, record.content);
			payload.insert(METADATA_FIELD, record.metadata);
			payload.insert(SEQ_FIELD, base_seq + offset as i64);

			points.push(PointStruct::new(id as u64, record.embedding, payload));
			ids.push(id);
		}

		self.client.upsert_points(UpsertPointsBuilder::new(name, points).wait(true)).await?;

		Ok(ids)
	}

	async fn search_inner(&self, request: SearchRequest<'_>) -> Result<Vec<SearchHit>> {
		let mut query = QueryPointsBuilder::new(request.collection)
			.query(Query::new_nearest(request.vector.to_vec()))
			.limit(request.limit.into())
			.score_threshold(request.distance_threshold.max(0.0).sqrt())
			.with_payload(true);

		if let Some(filter) = to_qdrant_filter(request.filter) {
			query = query.filter(filter);
		}

		let response = self.client.query(query).await?;
		let mut hits = response
			.result
			.iter()
			.map(scored_point_to_hit)
			.collect::<Result<Vec<_>>>()?;

		hits.sort_by(|(left, left_seq), (right, right_seq)| {
			left.score.total_cmp(&right.score).then(left_seq.cmp(right_seq))
		});

		Ok(hits.into_iter().map(|(hit, _)| hit).collect())
	}

	async fn delete_inner(&self, name: &str, filter: &MetadataFilter) -> Result<()> {
		let filter = to_qdrant_filter(filter).ok_or_else(|| {
			Error::InvalidArgument("refusing to delete with an empty filter.".to_string())
		})?;

		self.client.delete_points(DeletePointsBuilder::new(name).points(filter).wait(true)).await?;

		Ok(())
	}

	/// Insertion sequence used to order equal-distance hits. Monotonic within the process and
	/// seeded from the wall clock across restarts.
	fn next_seq_base(&self, count: usize) -> i64 {
		let now = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000) as i64;
		let mut current = self.seq.load(Ordering::SeqCst);

		loop {
			let base = current.max(now);

			match self.seq.compare_exchange(
				current,
				base + count as i64,
				Ordering::SeqCst,
				Ordering::SeqCst,
			) {
				Ok(_) => return base,
				Err(actual) => current = actual,
			}
		}
	}
}
impl VectorBackend for QdrantBackend {
	fn has_collection<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move { Ok(self.client.collection_exists(name).await?) })
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

/// Translates a parsed filter into Qdrant conditions. `None` means match everything.
pub fn to_qdrant_filter(filter: &MetadataFilter) -> Option<Filter> {
	filter.expr().map(|expr| match expr {
		FilterExpr::And { args } => Filter::all(args.iter().map(to_condition)),
		FilterExpr::Or { args } => Filter::any(args.iter().map(to_condition)),
		FilterExpr::Not { expr } => Filter::must_not([to_condition(expr)]),
		leaf => Filter::all([to_condition(leaf)]),
	})
}

fn to_condition(expr: &FilterExpr) -> Condition {
	match expr {
		FilterExpr::And { args } => Condition::from(Filter::all(args.iter().map(to_condition))),
		FilterExpr::Or { args } => Condition::from(Filter::any(args.iter().map(to_condition))),
		FilterExpr::Not { expr } => Condition::from(Filter::must_not([to_condition(expr)])),
		FilterExpr::Eq { field, value } => leaf_condition(*field, std::slice::from_ref(value)),
		FilterExpr::Neq { field, value } => Condition::from(Filter::must_not([leaf_condition(
			*field,
			std::slice::from_ref(value),
		)])),
		FilterExpr::In { field, values } => leaf_condition(*field, values),
	}
}

fn leaf_condition(field: FilterField, values: &[FilterValue]) -> Condition {
	match field {
		FilterField::Filename => {
			let names = values.iter().map(filter_value_text).collect::<Vec<_>>();

			match names.as_slice() {
				[single] => Condition::matches(FILENAME_FIELD, single.clone()),
				_ => Condition::matches(FILENAME_FIELD, names),
			}
		},
		// Assigned ids are positive, so anything else maps onto the never-used id 0.
		FilterField::Id => Condition::has_id(values.iter().map(|value| match value {
			FilterValue::Int(id) => PointId::from((*id).max(0) as u64),
			FilterValue::Text(_) => PointId::from(0_u64),
		})),
	}
}

fn filter_value_text(value: &FilterValue) -> String {
	match value {
		FilterValue::Text(text) => text.clone(),
		FilterValue::Int(number) => number.to_string(),
	}
}

fn scored_point_to_hit(point: &ScoredPoint) -> Result<(SearchHit, i64)> {
	let id = match point.id.as_ref().and_then(|id| id.point_id_options.as_ref()) {
		Some(PointIdOptions::Num(id)) => *id as i64,
		_ => return Err(Error::InvalidArgument("Qdrant point has a non-numeric id.".to_string())),
	};
	let metadata = payload_text(&point.payload, METADATA_FIELD).unwrap_or_default();
	let hit = SearchHit {
		id,
		content: payload_text(&point.payload, CONTENT_FIELD).unwrap_or_default().to_string(),
		filename: payload_text(&point.payload, FILENAME_FIELD).unwrap_or_default().to_string(),
		metadata: Metadata::from_storage_str(metadata)?,
		score: point.score * point.score,
	};
	let seq = payload_i64(&point.payload, SEQ_FIELD).unwrap_or(i64::MAX);

	Ok((hit, seq))
}

fn payload_text<'a>(payload: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
	match &payload.get(key)?.kind {
		Some(Kind::StringValue(text)) => Some(text.as_str()),
		_ => None,
	}
}

fn payload_i64(payload: &HashMap<String, Value>, key: &str) -> Option<i64> {
	match &payload.get(key)?.kind {
		Some(Kind::IntegerValue(value)) => Some(*value),
		_ => None,
	}
}

fn new_point_id() -> i64 {
	let (high, _) = Uuid::new_v4().as_u64_pair();

	(high >> 1).max(1) as i64
}
