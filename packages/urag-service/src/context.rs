//! Evidence gathering for one request.

use std::collections::HashSet;

use futures::future;

use urag_config::Retrieval;
use urag_domain::{
	EvidenceBundle, MetadataFilter, Reference, ReferenceKind, SearchHit, WebResult,
};

use crate::{Result, SimilaritySearchEngine, WebSearchDecisionEngine, prompt};

pub struct ContextAssembler<'a> {
	search: &'a SimilaritySearchEngine,
	web: &'a WebSearchDecisionEngine,
	retrieval: &'a Retrieval,
}
impl<'a> ContextAssembler<'a> {
	pub fn new(
		search: &'a SimilaritySearchEngine,
		web: &'a WebSearchDecisionEngine,
		retrieval: &'a Retrieval,
	) -> Self {
		Self { search, web, retrieval }
	}

	/// Merges explicit references, the broad search fallback and optional web results.
	///
	/// Usage flags on the returned bundle are unset.
	pub async fn assemble(
		&self,
		query: &str,
		embedding: &[f32],
		references: &[Reference],
		web_search_enabled: bool,
	) -> Result<EvidenceBundle> {
		let (files, urls) = partition_references(references);
		let (explicit, referenced_pages) =
			tokio::try_join!(self.search_files(embedding, &files), self.web.search_urls(&urls))?;

		self.merge(query, embedding, references, explicit, referenced_pages, web_search_enabled).await
	}

	/// Same as [`ContextAssembler::assemble`] for callers that already fetched the pages behind
	/// the web references with [`ContextAssembler::fetch_referenced_pages`].
	pub async fn assemble_with_pages(
		&self,
		query: &str,
		embedding: &[f32],
		references: &[Reference],
		referenced_pages: Vec<WebResult>,
		web_search_enabled: bool,
	) -> Result<EvidenceBundle> {
		let (files, _) = partition_references(references);
		let explicit = self.search_files(embedding, &files).await?;

		self.merge(query, embedding, references, explicit, referenced_pages, web_search_enabled).await
	}

	/// Fetches every distinct web reference. Needs no query embedding.
	pub async fn fetch_referenced_pages(&self, references: &[Reference]) -> Result<Vec<WebResult>> {
		let (_, urls) = partition_references(references);

		self.web.search_urls(&urls).await
	}

	async fn search_files(&self, embedding: &[f32], files: &[String]) -> Result<Vec<SearchHit>> {
		let searches = files.iter().map(|filename| {
			let filter = MetadataFilter::filename_eq(filename.as_str());

			async move {
				self.search
					.search(
						embedding,
						self.retrieval.reference_limit,
						&filter,
						self.retrieval.distance_threshold,
					)
					.await
			}
		});

		Ok(future::try_join_all(searches).await?.into_iter().flatten().collect())
	}

	async fn merge(
		&self,
		query: &str,
		embedding: &[f32],
		references: &[Reference],
		mut document_hits: Vec<SearchHit>,
		referenced_pages: Vec<WebResult>,
		web_search_enabled: bool,
	) -> Result<EvidenceBundle> {
		let (files, urls) = partition_references(references);
		let explicit_hits = document_hits.len();

		if references.is_empty() || explicit_hits < self.retrieval.min_document_hits as usize {
			let broad = self
				.search
				.search(
					embedding,
					self.retrieval.limit,
					&MetadataFilter::none(),
					self.retrieval.distance_threshold,
				)
				.await?;

			append_unseen(&mut document_hits, broad);
		}

		let mut bundle = EvidenceBundle {
			document_hits,
			web_results: referenced_pages,
			..EvidenceBundle::default()
		};

		if web_search_enabled && urls.is_empty() {
			let document_context = prompt::render_documents(&bundle.document_hits);

			if self.web.is_web_search_needed(query, &document_context, "").await? {
				bundle.web_results.extend(self.web.search_web(query).await?);
			}
		}

		tracing::info!(
			file_references = files.len(),
			web_references = urls.len(),
			explicit_hits,
			hits = bundle.document_hits.len(),
			web_results = bundle.web_results.len(),
			"Context assembled."
		);

		Ok(bundle)
	}
}

/// Splits references into distinct file names and distinct URLs, first occurrence first.
pub fn partition_references(references: &[Reference]) -> (Vec<String>, Vec<String>) {
	let mut files = Vec::new();
	let mut urls = Vec::new();
	let mut seen = HashSet::new();

	for reference in references {
		let source = reference.source.trim();

		if source.is_empty() || !seen.insert((reference.kind, source)) {
			continue;
		}

		match reference.kind {
			ReferenceKind::File => files.push(source.to_string()),
			ReferenceKind::Web => urls.push(source.to_string()),
		}
	}

	(files, urls)
}

fn append_unseen(hits: &mut Vec<SearchHit>, extra: Vec<SearchHit>) {
	let mut seen = hits.iter().map(|hit| hit.id).collect::<HashSet<_>>();

	hits.extend(extra.into_iter().filter(|hit| seen.insert(hit.id)));
}
