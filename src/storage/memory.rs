use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::types::{DocId, StorageError};

use super::{
	common::{apply_increment, apply_partial, doc_id, stamp_new, Filter},
	DocStore, Increment,
};

type Partition = Arc<RwLock<Vec<Value>>>;

/// In-process implementation of the storage backend.
///
/// Every partition lives behind its own lock, so each operation, including the conditional
/// [`DocStore::increment_one`], is applied atomically with respect to every other operation on
/// the same partition while other partitions proceed independently.
#[derive(Debug, Default)]
pub struct MemoryStore {
	partitions: RwLock<HashMap<String, Partition>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	async fn partition(&self, name: &str) -> Option<Partition> {
		self.partitions.read().await.get(name).cloned()
	}

	async fn partition_or_create(&self, name: &str) -> Partition {
		if let Some(partition) = self.partition(name).await {
			return partition
		}
		self.partitions.write().await.entry(name.to_string()).or_default().clone()
	}

	/// Number of documents currently stored in `partition`.
	pub async fn len(&self, partition: &str) -> usize {
		match self.partition(partition).await {
			Some(docs) => docs.read().await.len(),
			None => 0,
		}
	}

	pub async fn is_empty(&self, partition: &str) -> bool {
		self.len(partition).await == 0
	}
}

#[async_trait]
impl DocStore for MemoryStore {
	#[instrument(skip(self, body))]
	async fn insert(&self, partition: &str, body: Value) -> Result<DocId, StorageError> {
		let (id, doc) = stamp_new(body)?;
		self.partition_or_create(partition).await.write().await.push(doc);
		debug!("Inserted document {} into {}", id, partition);

		Ok(id)
	}

	async fn find_one(
		&self,
		partition: &str,
		filter: &Filter,
	) -> Result<Option<Value>, StorageError> {
		let Some(docs) = self.partition(partition).await else { return Ok(None) };
		let docs = docs.read().await;
		Ok(docs.iter().find(|doc| filter.matches(doc)).cloned())
	}

	async fn find_many(&self, partition: &str, filter: &Filter) -> Result<Vec<Value>, StorageError> {
		let Some(docs) = self.partition(partition).await else { return Ok(Vec::new()) };
		let docs = docs.read().await;
		Ok(docs.iter().filter(|doc| filter.matches(doc)).cloned().collect())
	}

	#[instrument(skip(self, partial))]
	async fn update_one(
		&self,
		partition: &str,
		filter: &Filter,
		partial: Value,
	) -> Result<bool, StorageError> {
		let Some(docs) = self.partition(partition).await else { return Ok(false) };
		let mut docs = docs.write().await;
		let Some(doc) = docs.iter_mut().find(|doc| filter.matches(doc)) else {
			debug!("No document to update in {}", partition);
			return Ok(false)
		};
		apply_partial(doc, &partial)?;

		Ok(true)
	}

	#[instrument(skip(self, partial))]
	async fn update_many(
		&self,
		partition: &str,
		filter: &Filter,
		partial: Value,
	) -> Result<u64, StorageError> {
		let Some(docs) = self.partition(partition).await else { return Ok(0) };
		let mut docs = docs.write().await;
		let mut updated = 0;
		for doc in docs.iter_mut().filter(|doc| filter.matches(doc)) {
			apply_partial(doc, &partial)?;
			updated += 1;
		}
		debug!("Updated {} documents in {}", updated, partition);

		Ok(updated)
	}

	#[instrument(skip(self))]
	async fn delete_one(&self, partition: &str, filter: &Filter) -> Result<bool, StorageError> {
		let Some(docs) = self.partition(partition).await else { return Ok(false) };
		let mut docs = docs.write().await;
		match docs.iter().position(|doc| filter.matches(doc)) {
			Some(index) => {
				let removed = docs.remove(index);
				debug!("Deleted document {} from {}", doc_id(&removed)?, partition);
				Ok(true)
			},
			None => Ok(false),
		}
	}

	#[instrument(skip(self))]
	async fn delete_many(&self, partition: &str, filter: &Filter) -> Result<u64, StorageError> {
		let Some(docs) = self.partition(partition).await else { return Ok(0) };
		let mut docs = docs.write().await;
		let before = docs.len();
		docs.retain(|doc| !filter.matches(doc));
		let deleted = (before - docs.len()) as u64;
		debug!("Deleted {} documents from {}", deleted, partition);

		Ok(deleted)
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
		let Some(docs) = self.partition(partition).await else { return Ok(Increment::Missing) };
		let mut docs = docs.write().await;
		let Some(doc) = docs.iter_mut().find(|doc| filter.matches(doc)) else {
			return Ok(Increment::Missing)
		};

		apply_increment(doc, field, delta, ceiling)
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use serde_json::json;

	use super::*;

	#[tokio::test]
	async fn partitions_are_isolated() {
		let store = MemoryStore::new();
		store.insert("a", json!({ "item_id": "x", "count": 0 })).await.unwrap();
		store.insert("b", json!({ "item_id": "x", "count": 5 })).await.unwrap();

		let filter = Filter::all().with("item_id", "x");
		assert_eq!(store.find_one("a", &filter).await.unwrap().unwrap()["count"], 0);
		assert_eq!(store.find_one("b", &filter).await.unwrap().unwrap()["count"], 5);

		assert_eq!(store.delete_many("a", &Filter::all()).await.unwrap(), 1);
		assert!(store.is_empty("a").await);
		assert_eq!(store.len("b").await, 1);
	}

	#[tokio::test]
	async fn insert_assigns_distinct_ids() {
		let store = MemoryStore::new();
		let first = store.insert("p", json!({ "n": 1 })).await.unwrap();
		let second = store.insert("p", json!({ "n": 1 })).await.unwrap();
		assert_ne!(first, second);

		let doc = store.find_one("p", &Filter::by_id(second)).await.unwrap().unwrap();
		assert_eq!(doc["id"], second.to_string());
	}

	#[tokio::test]
	async fn update_and_delete_on_empty_partition() {
		let store = MemoryStore::new();
		let filter = Filter::all().with("user", "nobody");

		assert!(!store.update_one("p", &filter, json!({ "handle": "h" })).await.unwrap());
		assert_eq!(store.update_many("p", &filter, json!({ "handle": "h" })).await.unwrap(), 0);
		assert!(!store.delete_one("p", &filter).await.unwrap());
		assert_eq!(store.delete_many("p", &filter).await.unwrap(), 0);
		assert_eq!(
			store.increment_one("p", &filter, "count", 1, 10).await.unwrap(),
			Increment::Missing
		);
	}

	#[tokio::test]
	async fn update_many_touches_only_matches() {
		let store = MemoryStore::new();
		store.insert("labels", json!({ "owner": "a", "label": "x" })).await.unwrap();
		store.insert("labels", json!({ "owner": "a", "label": "x" })).await.unwrap();
		store.insert("labels", json!({ "owner": "b", "label": "x" })).await.unwrap();

		let updated = store
			.update_many("labels", &Filter::all().with("owner", "a"), json!({ "label": "y" }))
			.await
			.unwrap();
		assert_eq!(updated, 2);

		let remaining =
			store.find_many("labels", &Filter::all().with("label", "x")).await.unwrap();
		assert_eq!(remaining.len(), 1);
		assert_eq!(remaining[0]["owner"], "b");
	}

	#[tokio::test]
	async fn busy_partition_does_not_block_others() {
		let store = MemoryStore::new();
		store.insert("a", json!({ "item_id": "x", "count": 0 })).await.unwrap();
		store.insert("b", json!({ "item_id": "x", "count": 0 })).await.unwrap();

		let busy = store.partition("a").await.unwrap();
		let _guard = busy.write().await;

		let filter = Filter::all().with("item_id", "x");
		let outcome = tokio::time::timeout(
			Duration::from_secs(1),
			store.increment_one("b", &filter, "count", 1, 10),
		)
		.await
		.expect("increment on another partition must not wait")
		.unwrap();
		assert!(matches!(outcome, Increment::Updated(_)));

		let blocked = tokio::time::timeout(
			Duration::from_millis(50),
			store.increment_one("a", &filter, "count", 1, 10),
		)
		.await;
		assert!(blocked.is_err());
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
	async fn concurrent_increments_are_not_lost() {
		let store = Arc::new(MemoryStore::new());
		store.insert("c", json!({ "item_id": "x", "count": 0 })).await.unwrap();

		let handles = (0..64)
			.map(|_| {
				let store = store.clone();
				tokio::spawn(async move {
					let filter = Filter::all().with("item_id", "x");
					store.increment_one("c", &filter, "count", 1, 50).await
				})
			})
			.collect::<Vec<_>>();

		let mut updated = 0;
		for handle in handles {
			if let Increment::Updated(_) = handle.await.unwrap().unwrap() {
				updated += 1;
			}
		}

		assert_eq!(updated, 50);
		let doc = store.find_one("c", &Filter::all()).await.unwrap().unwrap();
		assert_eq!(doc["count"], 50);
	}
}
