//! Self-contained data concepts for a social app backend.
//!
//! Every concept is a small module that owns its own partitions of a shared document store and
//! depends on nothing else:
//!
//! - [`LimitedStore`]: bounded resource counters. An item is tracked with a count that can never
//!   exceed the ceiling of its [`LimitKind`], even when many callers increment it at once.
//! - [`ProfileConcept`]: one profile per user, the accounts they follow and their active time.
//! - [`LabelConcept`]: labels users attach to arbitrary items.
//!
//! Storage goes through the [`DocStore`] trait. [`MemoryStore`] is always available; the
//! `rocksdb` feature adds [`storage::rocksdb::RocksDbStore`] which persists to disk. Custom
//! engines only need to implement [`DocStore`], in particular its atomic
//! [`DocStore::increment_one`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use social_concepts::{ConceptError, Concepts, ItemId, LimitKind, MemoryStore};
//!
//! # tokio_test();
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn tokio_test() {
//! let concepts = Concepts::new(Arc::new(MemoryStore::new()));
//! let profile = ItemId::from("profile-1");
//!
//! let limited = concepts.limited(LimitKind::LimitedProfile);
//! limited.create(profile.clone(), 0).await.unwrap();
//! assert_eq!(limited.increment(&profile, 1).await.unwrap().count, 1);
//!
//! // The ceiling of a limited profile is 1.
//! let err = limited.increment(&profile, 1).await.unwrap_err();
//! assert!(matches!(err, ConceptError::LimitExceeded { .. }));
//! assert_eq!(limited.get_count(&profile).await.unwrap(), 1);
//! # }
//! ```

use std::sync::Arc;

pub mod architecture;
pub mod concepts;
pub mod storage;
pub mod types;

#[cfg(test)]
mod mock;

pub use concepts::{
	LabelConcept, LimitConfig, LimitKind, LimitRecord, LimitedStore, ProfileConcept,
};
pub use storage::{DocCollection, DocStore, Document, Filter, Increment, MemoryStore};
pub use types::{ConceptError, DocId, ItemId, StorageError};

pub type Result<T, E = ConceptError> = std::result::Result<T, E>;

/// Every concept wired to the same store.
pub struct Concepts<S: DocStore> {
	pub limited_profiles: LimitedStore<S>,
	pub limited_posts: LimitedStore<S>,
	pub profiles: ProfileConcept<S>,
	pub labels: LabelConcept<S>,
}

impl<S: DocStore> Concepts<S> {
	pub fn new(store: Arc<S>) -> Self {
		Self {
			limited_profiles: LimitedStore::new(LimitKind::LimitedProfile, store.clone()),
			limited_posts: LimitedStore::new(LimitKind::LimitedPost, store.clone()),
			profiles: ProfileConcept::new(store.clone()),
			labels: LabelConcept::new(store),
		}
	}

	/// The limited store of `kind`.
	pub fn limited(&self, kind: LimitKind) -> &LimitedStore<S> {
		match kind {
			LimitKind::LimitedProfile => &self.limited_profiles,
			LimitKind::LimitedPost => &self.limited_posts,
		}
	}
}
