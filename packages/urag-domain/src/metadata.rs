//! Chunk metadata as stored next to each vector.
//!
//! The well-known fields are typed. Anything else a loader wants to attach goes into a small,
//! bounded map of scalar values so the serialized payload stays predictable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const MAX_EXTRA_FIELDS: usize = 16;
pub const MAX_EXTRA_KEY_BYTES: usize = 64;
pub const MAX_EXTRA_VALUE_BYTES: usize = 1_024;

const RESERVED_KEYS: [&str; 3] = ["source", "page", "chunk_index"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtraValue {
	Bool(bool),
	Int(i64),
	Float(f64),
	Text(String),
}
impl From<&str> for ExtraValue {
	fn from(value: &str) -> Self {
		Self::Text(value.to_string())
	}
}
impl From<String> for ExtraValue {
	fn from(value: String) -> Self {
		Self::Text(value)
	}
}
impl From<i64> for ExtraValue {
	fn from(value: i64) -> Self {
		Self::Int(value)
	}
}
impl From<bool> for ExtraValue {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub page: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub chunk_index: Option<u32>,
	#[serde(flatten)]
	extra: BTreeMap<String, ExtraValue>,
}
impl Metadata {
	pub fn new(source: impl Into<String>, page: u32, chunk_index: u32) -> Self {
		Self {
			source: Some(source.into()),
			page: Some(page),
			chunk_index: Some(chunk_index),
			extra: BTreeMap::new(),
		}
	}

	pub fn extra(&self) -> &BTreeMap<String, ExtraValue> {
		&self.extra
	}

	pub fn insert_extra(&mut self, key: impl Into<String>, value: impl Into<ExtraValue>) -> Result<()> {
		let key = key.into();
		let value = value.into();

		validate_extra_entry(&key, &value)?;

		if !self.extra.contains_key(&key) && self.extra.len() >= MAX_EXTRA_FIELDS {
			return Err(Error::InvalidMetadata {
				message: format!("at most {MAX_EXTRA_FIELDS} extension fields are allowed."),
			});
		}

		self.extra.insert(key, value);

		Ok(())
	}

	pub fn validate(&self) -> Result<()> {
		if self.extra.len() > MAX_EXTRA_FIELDS {
			return Err(Error::InvalidMetadata {
				message: format!("at most {MAX_EXTRA_FIELDS} extension fields are allowed."),
			});
		}

		for (key, value) in &self.extra {
			validate_extra_entry(key, value)?;
		}

		Ok(())
	}

	/// Encodes the record for the string-typed `metadata` column of the collection.
	pub fn to_storage_string(&self) -> Result<String> {
		self.validate()?;

		Ok(serde_json::to_string(self)?)
	}

	pub fn from_storage_str(raw: &str) -> Result<Self> {
		if raw.trim().is_empty() {
			return Ok(Self::default());
		}

		let metadata: Self = serde_json::from_str(raw)?;

		metadata.validate()?;

		Ok(metadata)
	}
}

fn validate_extra_entry(key: &str, value: &ExtraValue) -> Result<()> {
	if key.trim().is_empty() {
		return Err(Error::InvalidMetadata {
			message: "extension field names must be non-empty.".to_string(),
		});
	}
	if key.len() > MAX_EXTRA_KEY_BYTES {
		return Err(Error::InvalidMetadata {
			message: format!("extension field {key:?} exceeds {MAX_EXTRA_KEY_BYTES} bytes."),
		});
	}
	if RESERVED_KEYS.contains(&key) {
		return Err(Error::InvalidMetadata {
			message: format!("extension field {key:?} shadows a named field."),
		});
	}

	match value {
		ExtraValue::Text(text) if text.len() > MAX_EXTRA_VALUE_BYTES => Err(Error::InvalidMetadata {
			message: format!("extension field {key:?} exceeds {MAX_EXTRA_VALUE_BYTES} bytes."),
		}),
		ExtraValue::Float(number) if !number.is_finite() => Err(Error::InvalidMetadata {
			message: format!("extension field {key:?} must be a finite number."),
		}),
		_ => Ok(()),
	}
}
