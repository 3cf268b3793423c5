use serde::{Deserialize, Serialize};

use crate::{Source, WebSource, metadata::Metadata};

/// A loader-produced slice of a document. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
	pub content: String,
	pub metadata: Metadata,
}
impl Chunk {
	/// The stored `filename` column is the chunk's source name.
	pub fn filename(&self) -> &str {
		self.metadata.source.as_deref().unwrap_or_default()
	}
}

/// A row waiting for the backing store to assign its id.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
	pub filename: String,
	pub content: String,
	pub embedding: Vec<f32>,
	pub metadata: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexedVector {
	pub id: i64,
	pub filename: String,
	pub content: String,
	pub embedding: Vec<f32>,
	pub metadata: String,
}

/// Lower `score` means closer; result sets are sorted ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
	pub id: i64,
	pub content: String,
	pub filename: String,
	pub metadata: Metadata,
	pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
	File,
	Web,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
	#[serde(rename = "type")]
	pub kind: ReferenceKind,
	pub source: String,
}
impl Reference {
	pub fn file(source: impl Into<String>) -> Self {
		Self { kind: ReferenceKind::File, source: source.into() }
	}

	pub fn web(source: impl Into<String>) -> Self {
		Self { kind: ReferenceKind::Web, source: source.into() }
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebResult {
	pub title: String,
	pub url: String,
	pub text: String,
	#[serde(default)]
	pub highlights: Vec<String>,
	#[serde(default)]
	pub score: Option<f32>,
}

/// Everything gathered for one request.
///
/// `used_document_context` and `used_web_context` stay false until generation reports what it
/// relied on. Two projections exist: [`EvidenceBundle::sources`] and
/// [`EvidenceBundle::web_sources`] expose everything for the caller, while the `persisted_*`
/// projections keep only what was used and feed chat history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBundle {
	pub document_hits: Vec<SearchHit>,
	pub web_results: Vec<WebResult>,
	pub used_document_context: bool,
	pub used_web_context: bool,
}
impl EvidenceBundle {
	pub fn has_documents(&self) -> bool {
		!self.document_hits.is_empty()
	}

	pub fn has_web(&self) -> bool {
		!self.web_results.is_empty()
	}

	pub fn mark_usage(&mut self, used_document_context: bool, used_web_context: bool) {
		self.used_document_context = used_document_context;
		self.used_web_context = used_web_context;
	}

	pub fn sources(&self) -> Vec<Source> {
		self.document_hits.iter().map(Source::from).collect()
	}

	pub fn web_sources(&self) -> Vec<WebSource> {
		self.web_results.clone()
	}

	pub fn persisted_sources(&self) -> Vec<Source> {
		if self.used_document_context { self.sources() } else { Vec::new() }
	}

	pub fn persisted_web_sources(&self) -> Vec<WebSource> {
		if self.used_web_context { self.web_sources() } else { Vec::new() }
	}
}
