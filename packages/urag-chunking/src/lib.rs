mod error;

pub use error::{Error, Result};

use std::{collections::VecDeque, fs, path::Path};

use unicode_segmentation::UnicodeSegmentation;

use urag_domain::{Chunk, Metadata};

pub const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];
pub const SUPPORTED_EXTENSIONS: [&str; 2] = ["txt", "md"];

#[derive(Clone, Debug)]
pub struct ChunkingConfig {
	pub max_chars: u32,
	pub overlap_chars: u32,
}
impl Default for ChunkingConfig {
	fn default() -> Self {
		Self { max_chars: 1_000, overlap_chars: 200 }
	}
}

/// Reads a plain-text document and splits it into chunks tagged with
/// `{source: file name, page, chunk_index}`.
pub fn load_document(path: &Path, cfg: &ChunkingConfig) -> Result<Vec<Chunk>> {
	if !path.exists() {
		return Err(Error::FileNotFound { path: path.to_path_buf() });
	}

	let extension =
		path.extension().and_then(|ext| ext.to_str()).unwrap_or_default().to_ascii_lowercase();

	if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
		return Err(Error::UnsupportedFormat { extension: format!(".{extension}") });
	}

	let text = fs::read_to_string(path)
		.map_err(|err| Error::Read { path: path.to_path_buf(), source: err })?;
	let source = path.file_name().and_then(|name| name.to_str()).unwrap_or_default();
	let chunks = chunk_page(&text, source, 1, cfg);

	tracing::debug!(source, chunks = chunks.len(), "Document split into chunks.");

	Ok(chunks)
}

pub fn chunk_page(text: &str, source: &str, page: u32, cfg: &ChunkingConfig) -> Vec<Chunk> {
	split_text(text, cfg)
		.into_iter()
		.enumerate()
		.map(|(index, content)| Chunk {
			content,
			metadata: Metadata::new(source, page, index as u32),
		})
		.collect()
}

/// Recursive character splitting: try each separator in order and only fall back to the next one
/// for pieces that are still too long. Lengths are counted in chars.
pub fn split_text(text: &str, cfg: &ChunkingConfig) -> Vec<String> {
	split_recursive(text, &SEPARATORS, cfg)
}

fn split_recursive(text: &str, separators: &[&str], cfg: &ChunkingConfig) -> Vec<String> {
	let max_chars = cfg.max_chars as usize;
	let position = separators
		.iter()
		.position(|separator| separator.is_empty() || text.contains(separator))
		.unwrap_or(separators.len().saturating_sub(1));
	let separator = separators.get(position).copied().unwrap_or_default();
	let remaining = separators.get(position + 1..).unwrap_or_default();
	let pieces: Vec<&str> = if separator.is_empty() {
		text.graphemes(true).collect()
	} else {
		text.split(separator).filter(|piece| !piece.is_empty()).collect()
	};
	let mut chunks = Vec::new();
	let mut pending = Vec::new();

	for piece in pieces {
		if char_len(piece) < max_chars {
			pending.push(piece);

			continue;
		}
		if !pending.is_empty() {
			chunks.extend(merge_pieces(&pending, separator, cfg));
			pending.clear();
		}

		if remaining.is_empty() {
			chunks.push(piece.to_string());
		} else {
			chunks.extend(split_recursive(piece, remaining, cfg));
		}
	}

	if !pending.is_empty() {
		chunks.extend(merge_pieces(&pending, separator, cfg));
	}

	chunks
}

fn merge_pieces(pieces: &[&str], separator: &str, cfg: &ChunkingConfig) -> Vec<String> {
	let max_chars = cfg.max_chars as usize;
	let overlap_chars = cfg.overlap_chars as usize;
	let separator_len = char_len(separator);
	let mut chunks = Vec::new();
	let mut window: VecDeque<&str> = VecDeque::new();
	let mut total = 0_usize;

	for piece in pieces {
		let len = char_len(piece);
		let joiner = |window: &VecDeque<&str>| if window.is_empty() { 0 } else { separator_len };

		if total + len + joiner(&window) > max_chars && !window.is_empty() {
			push_joined(&mut chunks, &window, separator);

			while total > overlap_chars
				|| (total + len + joiner(&window) > max_chars && total > 0)
			{
				let Some(front) = window.pop_front() else {
					break;
				};

				total -= char_len(front) + if window.is_empty() { 0 } else { separator_len };
			}
		}

		total += len + joiner(&window);

		window.push_back(piece);
	}

	push_joined(&mut chunks, &window, separator);

	chunks
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
	let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
	let trimmed = joined.trim();

	if !trimmed.is_empty() {
		chunks.push(trimmed.to_string());
	}
}

fn char_len(text: &str) -> usize {
	text.chars().count()
}
