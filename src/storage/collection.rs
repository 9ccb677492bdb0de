use std::{marker::PhantomData, ops::Deref, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use crate::types::{DocId, StorageError};

use super::{DocStore, Filter, Increment};

/// A stored document: the store envelope around a typed body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document<T> {
	pub id: DocId,
	pub date_created: DateTime<Utc>,
	pub date_updated: DateTime<Utc>,
	#[serde(flatten)]
	pub body: T,
}

impl<T> Deref for Document<T> {
	type Target = T;

	fn deref(&self) -> &Self::Target {
		&self.body
	}
}

/// Typed view over one partition of a [`DocStore`].
pub struct DocCollection<T, S: DocStore> {
	name: String,
	store: Arc<S>,
	_body: PhantomData<fn() -> T>,
}

impl<T, S: DocStore> Clone for DocCollection<T, S> {
	fn clone(&self) -> Self {
		Self { name: self.name.clone(), store: self.store.clone(), _body: PhantomData }
	}
}

impl<T, S> DocCollection<T, S>
where
	T: Serialize + DeserializeOwned + Send + Sync,
	S: DocStore,
{
	pub fn new(name: impl Into<String>, store: Arc<S>) -> Self {
		Self { name: name.into(), store, _body: PhantomData }
	}

	/// Name of the partition backing this collection.
	pub fn name(&self) -> &str {
		&self.name
	}

	pub async fn create_one(&self, body: &T) -> Result<DocId, StorageError> {
		let body = serde_json::to_value(body)?;
		self.store.insert(&self.name, body).await
	}

	pub async fn read_one(&self, filter: &Filter) -> Result<Option<Document<T>>, StorageError> {
		self.store.find_one(&self.name, filter).await?.map(|doc| self.parse(doc)).transpose()
	}

	pub async fn read_many(&self, filter: &Filter) -> Result<Vec<Document<T>>, StorageError> {
		self.store
			.find_many(&self.name, filter)
			.await?
			.into_iter()
			.map(|doc| self.parse(doc))
			.collect()
	}

	pub async fn update_one(&self, filter: &Filter, partial: Value) -> Result<bool, StorageError> {
		self.store.update_one(&self.name, filter, partial).await
	}

	pub async fn update_many(&self, filter: &Filter, partial: Value) -> Result<u64, StorageError> {
		self.store.update_many(&self.name, filter, partial).await
	}

	pub async fn delete_one(&self, filter: &Filter) -> Result<bool, StorageError> {
		self.store.delete_one(&self.name, filter).await
	}

	pub async fn delete_many(&self, filter: &Filter) -> Result<u64, StorageError> {
		self.store.delete_many(&self.name, filter).await
	}

	pub async fn increment_one(
		&self,
		filter: &Filter,
		field: &str,
		delta: i64,
		ceiling: u64,
	) -> Result<Increment<Document<T>>, StorageError> {
		self.store
			.increment_one(&self.name, filter, field, delta, ceiling)
			.await?
			.try_map(|doc| self.parse(doc))
	}

	fn parse(&self, doc: Value) -> Result<Document<T>, StorageError> {
		serde_json::from_value(doc).map_err(|e| {
			error!("Failed to parse document from {}: {}", self.name, e);
			e.into()
		})
	}
}
