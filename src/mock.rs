use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::*;

/// A store whose backend is always down.
pub struct MockUnavailableStore;

impl MockUnavailableStore {
	fn error() -> StorageError {
		StorageError::Unavailable("mock store is down".to_string())
	}
}

#[async_trait]
impl DocStore for MockUnavailableStore {
	async fn insert(&self, _partition: &str, _body: Value) -> Result<DocId, StorageError> {
		Err(Self::error())
	}

	async fn find_one(
		&self,
		_partition: &str,
		_filter: &Filter,
	) -> Result<Option<Value>, StorageError> {
		Err(Self::error())
	}

	async fn find_many(
		&self,
		_partition: &str,
		_filter: &Filter,
	) -> Result<Vec<Value>, StorageError> {
		Err(Self::error())
	}

	async fn update_one(
		&self,
		_partition: &str,
		_filter: &Filter,
		_partial: Value,
	) -> Result<bool, StorageError> {
		Err(Self::error())
	}

	async fn update_many(
		&self,
		_partition: &str,
		_filter: &Filter,
		_partial: Value,
	) -> Result<u64, StorageError> {
		Err(Self::error())
	}

	async fn delete_one(&self, _partition: &str, _filter: &Filter) -> Result<bool, StorageError> {
		Err(Self::error())
	}

	async fn delete_many(&self, _partition: &str, _filter: &Filter) -> Result<u64, StorageError> {
		Err(Self::error())
	}

	async fn increment_one(
		&self,
		_partition: &str,
		_filter: &Filter,
		_field: &str,
		_delta: i64,
		_ceiling: u64,
	) -> Result<Increment, StorageError> {
		Err(Self::error())
	}
}

pub fn memory_concepts() -> (Arc<MemoryStore>, Concepts<MemoryStore>) {
	let store = Arc::new(MemoryStore::new());
	(store.clone(), Concepts::new(store))
}
