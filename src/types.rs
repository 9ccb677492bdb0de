use std::fmt::Display;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Store-assigned identifier of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(Uuid);

impl DocId {
	/// Generates a fresh random identifier.
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for DocId {
	fn default() -> Self {
		Self::new()
	}
}

impl Display for DocId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Opaque identifier of an external entity (a user, a post, any labeled item...).
///
/// The concepts never interpret it, they only compare it for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Display for ItemId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for ItemId {
	fn from(id: &str) -> Self {
		Self::new(id)
	}
}

impl From<String> for ItemId {
	fn from(id: String) -> Self {
		Self(id)
	}
}

impl From<DocId> for ItemId {
	fn from(id: DocId) -> Self {
		Self(id.to_string())
	}
}

/// Errors surfaced by every concept.
#[derive(Debug, thiserror::Error)]
pub enum ConceptError {
	/// A create or increment would push a count above its ceiling.
	///
	/// Always raised before any write.
	#[error("limited item {item_id} would reach a count of {requested} > {max_limit} (max limit)")]
	LimitExceeded { item_id: ItemId, requested: u64, max_limit: u64 },
	/// A decrement would push a count below zero.
	#[error("limited item {item_id} would reach a negative count of {requested}")]
	CountUnderflow { item_id: ItemId, requested: i128 },
	/// No record matches the request.
	#[error("not found: {0}")]
	NotFound(String),
	/// A record that must be unique already exists.
	#[error("already exists: {0}")]
	AlreadyExists(String),
	#[error(transparent)]
	Storage(#[from] StorageError),
}

impl ConceptError {
	/// Whether the caller can correct the request (exceeding a limit, duplicates...).
	pub fn is_client_error(&self) -> bool {
		matches!(
			self,
			Self::LimitExceeded { .. } | Self::CountUnderflow { .. } | Self::AlreadyExists(_)
		)
	}

	pub fn is_not_found(&self) -> bool {
		matches!(self, Self::NotFound(_))
	}
}

/// Failures of the persistence collaborator.
///
/// Transient and permanent failures are not told apart.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
	#[cfg(feature = "rocksdb")]
	#[error("RocksDB error: {0}")]
	RocksDb(#[from] rocksdb::Error),
	#[error("Parsing error: {0}")]
	Parsing(String),
	/// Optimistic transaction kept conflicting.
	#[error("write conflict persisted after {attempts} attempts")]
	Conflict { attempts: u32 },
	#[error("storage unavailable: {0}")]
	Unavailable(String),
}

impl From<serde_json::Error> for StorageError {
	fn from(e: serde_json::Error) -> Self {
		Self::Parsing(e.to_string())
	}
}
