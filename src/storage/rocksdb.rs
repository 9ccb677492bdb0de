use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use rocksdb::{ErrorKind, OptimisticTransactionDB};
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use crate::types::{DocId, StorageError};

use super::{
	common::{apply_increment, apply_partial, doc_id, stamp_new, Filter},
	DocStore, Increment,
};

/// Number of times a conflicting optimistic transaction is attempted before giving up.
const MAX_ATTEMPTS: u32 = 1_000;

/// RocksDB implementation of the storage backend.
///
/// Documents are stored as JSON under `"{partition}:{id}"`. Conditional writes run inside
/// optimistic transactions which are retried on conflict.
pub struct RocksDbStore {
	db: Arc<OptimisticTransactionDB>,
}

impl RocksDbStore {
	/// Creates a new `RocksDbStore` with the provided database instance.
	pub fn new(db: Arc<OptimisticTransactionDB>) -> Self {
		Self { db }
	}

	/// Opens (or creates) a database at `path` with default options.
	pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
		let db = OptimisticTransactionDB::open_default(path.as_ref()).map_err(|e| {
			error!("Failed to open RocksDB at {}: {}", path.as_ref().display(), e);
			StorageError::RocksDb(e)
		})?;
		Ok(Self { db: Arc::new(db) })
	}

	/// Opens the database at `ROCKSDB_PATH`, defaulting to `rocksdb_data`.
	pub fn open_default() -> Result<Self, StorageError> {
		let path = std::env::var("ROCKSDB_PATH").unwrap_or_else(|_| "rocksdb_data".to_string());
		Self::open(path)
	}

	fn prefix(partition: &str) -> String {
		format!("{}:", partition)
	}

	/// Scans `partition` in key order and returns the matching `(key, document)` pairs.
	fn scan(
		&self,
		partition: &str,
		filter: &Filter,
		limit: Option<usize>,
	) -> Result<Vec<(Vec<u8>, Value)>, StorageError> {
		let prefix = Self::prefix(partition);
		let mut found = Vec::new();
		for entry in self.db.prefix_iterator(prefix.as_bytes()) {
			let (key, value) = entry?;
			if !key.starts_with(prefix.as_bytes()) {
				break
			}
			let doc: Value = serde_json::from_slice(&value).map_err(|e| {
				error!("Failed to deserialize document {}: {}", String::from_utf8_lossy(&key), e);
				StorageError::from(e)
			})?;
			if filter.matches(&doc) {
				found.push((key.to_vec(), doc));
				if limit.is_some_and(|limit| found.len() >= limit) {
					break
				}
			}
		}

		Ok(found)
	}

	/// Applies `modify` to matching documents inside an optimistic transaction.
	///
	/// `modify` returns whether the document must be written back, along with a per-document
	/// outcome. The whole scan is replayed when the commit conflicts with a concurrent writer, and
	/// only the outcomes of the attempt that committed are returned.
	async fn modify_matching<R: Send>(
		&self,
		partition: &str,
		filter: &Filter,
		limit: Option<usize>,
		mut modify: impl FnMut(&mut Value) -> Result<(bool, R), StorageError> + Send,
	) -> Result<Vec<R>, StorageError> {
		let mut attempts = 0;

		loop {
			attempts += 1;
			let mut outcomes = Vec::new();
			let committed = {
				let candidates = self.scan(partition, filter, limit)?;
				let txn = self.db.transaction();
				for (key, _) in candidates {
					// Re-read under the transaction so concurrent writes to the key are detected.
					let Some(raw) = txn.get_for_update(&key, true)? else { continue };
					let mut doc: Value = serde_json::from_slice(&raw)?;
					if !filter.matches(&doc) {
						continue
					}
					let (write, outcome) = modify(&mut doc)?;
					if write {
						txn.put(&key, serde_json::to_vec(&doc)?)?;
					}
					outcomes.push(outcome);
				}
				txn.commit()
			};

			match committed {
				Ok(()) => return Ok(outcomes),
				Err(e) if is_conflict(&e) && attempts < MAX_ATTEMPTS => {
					debug!("Transaction on {} conflicted, retrying ({})", partition, attempts);
					tokio::time::sleep(backoff(attempts)).await;
				},
				Err(e) if is_conflict(&e) => {
					warn!("Transaction on {} kept conflicting ({} attempts)", partition, attempts);
					return Err(StorageError::Conflict { attempts })
				},
				Err(e) => {
					error!("Failed to commit transaction on {}: {}", partition, e);
					return Err(StorageError::RocksDb(e))
				},
			}
		}
	}
}

/// Delay before retrying a conflicting transaction, growing linearly up to 5ms.
fn backoff(attempts: u32) -> Duration {
	Duration::from_micros(100 * u64::from(attempts.min(50)))
}

fn is_conflict(e: &rocksdb::Error) -> bool {
	matches!(e.kind(), ErrorKind::Busy | ErrorKind::TryAgain)
}

#[async_trait]
impl DocStore for RocksDbStore {
	#[instrument(skip(self, body))]
	async fn insert(&self, partition: &str, body: Value) -> Result<DocId, StorageError> {
		let (id, doc) = stamp_new(body)?;
		let key = format!("{}{}", Self::prefix(partition), id);
		self.db.put(key.as_bytes(), serde_json::to_vec(&doc)?).map_err(|e| {
			error!("Failed to insert document {}: {}", key, e);
			StorageError::RocksDb(e)
		})?;
		debug!("Inserted document {}", key);

		Ok(id)
	}

	async fn find_one(
		&self,
		partition: &str,
		filter: &Filter,
	) -> Result<Option<Value>, StorageError> {
		Ok(self.scan(partition, filter, Some(1))?.into_iter().next().map(|(_, doc)| doc))
	}

	async fn find_many(&self, partition: &str, filter: &Filter) -> Result<Vec<Value>, StorageError> {
		Ok(self.scan(partition, filter, None)?.into_iter().map(|(_, doc)| doc).collect())
	}

	#[instrument(skip(self, partial))]
	async fn update_one(
		&self,
		partition: &str,
		filter: &Filter,
		partial: Value,
	) -> Result<bool, StorageError> {
		let updated = self
			.modify_matching(partition, filter, Some(1), |doc| {
				apply_partial(doc, &partial)?;
				Ok((true, ()))
			})
			.await?;

		Ok(!updated.is_empty())
	}

	#[instrument(skip(self, partial))]
	async fn update_many(
		&self,
		partition: &str,
		filter: &Filter,
		partial: Value,
	) -> Result<u64, StorageError> {
		let updated = self
			.modify_matching(partition, filter, None, |doc| {
				apply_partial(doc, &partial)?;
				Ok((true, ()))
			})
			.await?
			.len() as u64;
		debug!("Updated {} documents in {}", updated, partition);

		Ok(updated)
	}

	#[instrument(skip(self))]
	async fn delete_one(&self, partition: &str, filter: &Filter) -> Result<bool, StorageError> {
		let Some((key, _)) = self.scan(partition, filter, Some(1))?.into_iter().next() else {
			return Ok(false)
		};
		self.db.delete(&key)?;
		debug!("Deleted document {}", String::from_utf8_lossy(&key));

		Ok(true)
	}

	#[instrument(skip(self))]
	async fn delete_many(&self, partition: &str, filter: &Filter) -> Result<u64, StorageError> {
		let matching = self.scan(partition, filter, None)?;
		let txn = self.db.transaction();
		for (key, doc) in &matching {
			txn.delete(key)?;
			debug!("Deleting document {}", doc_id(doc).unwrap_or_default());
		}
		txn.commit().map_err(|e| {
			error!("Failed to delete documents from {}: {}", partition, e);
			StorageError::RocksDb(e)
		})?;

		Ok(matching.len() as u64)
	}

	#[instrument(skip(self))]
	async fn increment_one(
		&self,
		partition: &str,
		filter: &Filter,
		field: &str,
		delta: i64,
		ceiling: u64,
	) -> Result<Increment, StorageError> {
		let outcomes = self
			.modify_matching(partition, filter, Some(1), |doc| {
				let outcome = apply_increment(doc, field, delta, ceiling)?;
				Ok((matches!(outcome, Increment::Updated(_)), outcome))
			})
			.await?;

		Ok(outcomes.into_iter().next().unwrap_or(Increment::Missing))
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use serde_json::json;

	use super::*;

	fn open_temp() -> (tempfile::TempDir, RocksDbStore) {
		let dir = tempfile::tempdir().unwrap();
		let store = RocksDbStore::open(dir.path()).unwrap();
		(dir, store)
	}

	#[tokio::test]
	async fn crud_round_trip() {
		let (_dir, store) = open_temp();
		let id = store.insert("profiles", json!({ "user": "u", "handle": "a" })).await.unwrap();
		store.insert("following", json!({ "user": "u", "follows": "v" })).await.unwrap();

		let filter = Filter::all().with("user", "u");
		assert!(store.update_one("profiles", &filter, json!({ "handle": "b" })).await.unwrap());

		let doc = store.find_one("profiles", &Filter::by_id(id)).await.unwrap().unwrap();
		assert_eq!(doc["handle"], "b");
		assert_eq!(store.find_many("following", &filter).await.unwrap().len(), 1);

		assert!(store.delete_one("profiles", &filter).await.unwrap());
		assert!(!store.delete_one("profiles", &filter).await.unwrap());
		assert_eq!(store.find_many("following", &filter).await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn increment_is_bounded() {
		let (_dir, store) = open_temp();
		store.insert("limited_posts", json!({ "item_id": "y", "count": 150 })).await.unwrap();
		let filter = Filter::all().with("item_id", "y");

		assert_eq!(
			store.increment_one("limited_posts", &filter, "count", 51, 200).await.unwrap(),
			Increment::Exceeded { current: 150 }
		);
		let Increment::Updated(doc) =
			store.increment_one("limited_posts", &filter, "count", 50, 200).await.unwrap()
		else {
			panic!("increment within the limit must succeed")
		};
		assert_eq!(doc["count"], 200);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
	async fn concurrent_increments_are_not_lost() {
		let (_dir, store) = open_temp();
		let store = Arc::new(store);
		store.insert("c", json!({ "item_id": "x", "count": 0 })).await.unwrap();

		let handles = (0..8)
			.map(|_| {
				let store = store.clone();
				tokio::spawn(async move {
					let filter = Filter::all().with("item_id", "x");
					for _ in 0..25 {
						let outcome = store.increment_one("c", &filter, "count", 1, 150).await;
						assert!(matches!(
							outcome.unwrap(),
							Increment::Updated(_) | Increment::Exceeded { current: 150 }
						));
					}
				})
			})
			.collect::<Vec<_>>();

		for handle in handles {
			handle.await.unwrap();
		}

		let doc = store.find_one("c", &Filter::all()).await.unwrap().unwrap();
		assert_eq!(doc["count"], 150);
	}

	#[tokio::test]
	async fn retried_increment_reports_only_the_committed_attempt() {
		let (_dir, store) = open_temp();
		let id = store.insert("c", json!({ "item_id": "x", "count": 0 })).await.unwrap();
		let filter = Filter::all().with("item_id", "x");

		// A writer outside the transaction removes the document between the read and the commit.
		let db = store.db.clone();
		let mut calls = 0;
		let outcomes = store
			.modify_matching("c", &filter, Some(1), |doc| {
				calls += 1;
				db.delete(format!("c:{}", id)).unwrap();
				let outcome = apply_increment(doc, "count", 1, 10)?;
				Ok((true, outcome))
			})
			.await
			.unwrap();

		assert_eq!(calls, 1);
		assert!(outcomes.is_empty());
		assert_eq!(
			store.increment_one("c", &filter, "count", 1, 10).await.unwrap(),
			Increment::Missing
		);
	}

	#[tokio::test]
	async fn retried_increment_sees_the_concurrent_write() {
		let (_dir, store) = open_temp();
		let id = store.insert("c", json!({ "item_id": "x", "count": 0 })).await.unwrap();
		let filter = Filter::all().with("item_id", "x");
		let key = format!("c:{}", id);

		// The first attempt is invalidated by a write pushing the count to the ceiling.
		let db = store.db.clone();
		let mut calls = 0;
		let outcomes = store
			.modify_matching("c", &filter, Some(1), |doc| {
				calls += 1;
				if calls == 1 {
					let mut raced = doc.clone();
					raced["count"] = json!(10);
					db.put(key.as_bytes(), serde_json::to_vec(&raced).unwrap()).unwrap();
				}
				let outcome = apply_increment(doc, "count", 1, 10)?;
				Ok((matches!(outcome, Increment::Updated(_)), outcome))
			})
			.await
			.unwrap();

		assert_eq!(calls, 2);
		assert_eq!(outcomes, vec![Increment::Exceeded { current: 10 }]);
		let doc = store.find_one("c", &filter).await.unwrap().unwrap();
		assert_eq!(doc["count"], 10);
	}
}
