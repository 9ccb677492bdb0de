use async_trait::async_trait;
use serde_json::Value;

use crate::types::{DocId, StorageError};

pub use collection::{DocCollection, Document};
pub use common::Filter;
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb")]
pub use self::rocksdb::RocksDbStore;

mod collection;
pub(crate) mod common;
pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocksdb;

/// Outcome of [`DocStore::increment_one`].
#[derive(Debug, Clone, PartialEq)]
pub enum Increment<D = Value> {
	/// The count was updated; holds the document as stored after the write.
	Updated(D),
	/// No document matched the filter.
	Missing,
	/// The new count would exceed the ceiling. Nothing was written.
	Exceeded { current: u64 },
	/// The new count would be negative. Nothing was written.
	Underflow { current: u64 },
}

impl<D> Increment<D> {
	/// Converts the updated document, leaving the rejection outcomes untouched.
	pub fn try_map<E, Err>(self, f: impl FnOnce(D) -> Result<E, Err>) -> Result<Increment<E>, Err> {
		Ok(match self {
			Self::Updated(doc) => Increment::Updated(f(doc)?),
			Self::Missing => Increment::Missing,
			Self::Exceeded { current } => Increment::Exceeded { current },
			Self::Underflow { current } => Increment::Underflow { current },
		})
	}
}

/// The persistence collaborator shared by every concept.
///
/// Documents are JSON objects grouped into named partitions. The store owns identity: it assigns
/// the [`DocId`] and the creation/update timestamps of every document it inserts.
///
/// # Usage
///
/// [`MemoryStore`] is always available. Enabling the `rocksdb` feature adds
/// [`RocksDbStore`](crate::storage::rocksdb::RocksDbStore) which persists to disk. Other engines
/// can be plugged in by implementing this trait; concepts never care how the data is stored.
#[async_trait]
pub trait DocStore: Send + Sync + 'static {
	/// Inserts `body` into `partition` and returns the identifier assigned to it.
	///
	/// `body` must be a JSON object.
	async fn insert(&self, partition: &str, body: Value) -> Result<DocId, StorageError>;

	/// Returns the first document matching `filter`, in insertion order for engines that keep one.
	async fn find_one(&self, partition: &str, filter: &Filter)
		-> Result<Option<Value>, StorageError>;

	async fn find_many(&self, partition: &str, filter: &Filter) -> Result<Vec<Value>, StorageError>;

	/// Overwrites the fields present in `partial` on the first matching document.
	///
	/// Returns `false` when nothing matched.
	async fn update_one(
		&self,
		partition: &str,
		filter: &Filter,
		partial: Value,
	) -> Result<bool, StorageError>;

	/// Overwrites the fields present in `partial` on every matching document.
	async fn update_many(
		&self,
		partition: &str,
		filter: &Filter,
		partial: Value,
	) -> Result<u64, StorageError>;

	/// Deletes the first matching document. Deleting nothing is not an error.
	async fn delete_one(&self, partition: &str, filter: &Filter) -> Result<bool, StorageError>;

	/// Deletes every matching document and returns how many were removed.
	async fn delete_many(&self, partition: &str, filter: &Filter) -> Result<u64, StorageError>;

	/// Atomically adds `delta` to the unsigned integer `field` of the first matching document,
	/// provided the result stays within `0..=ceiling`.
	///
	/// The read, the check and the write form a single operation: concurrent increments of the
	/// same document are applied one after the other and none of them is lost.
	async fn increment_one(
		&self,
		partition: &str,
		filter: &Filter,
		field: &str,
		delta: i64,
		ceiling: u64,
	) -> Result<Increment, StorageError>;
}
