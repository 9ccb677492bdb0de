//! Bounded resource counters.
//!
//! A limited item is an external item (a user profile, a post-bearing entity...) together with the
//! number of sub-resources it currently consumes. Every [`LimitKind`] caps that number with its
//! own ceiling and keeps its records in its own partition, so the same raw [`ItemId`] can be
//! tracked by several kinds without collisions.
//!
//! The count of a record only ever moves through [`LimitedStore::increment`], which is applied
//! by the store as one atomic conditional update: concurrent increments on the same item are
//! linearized and the ceiling holds after every one of them.

use std::{fmt::Display, sync::Arc};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
	storage::{DocCollection, DocStore, Document, Filter, Increment},
	types::{ConceptError, ItemId},
	Result,
};

/// Ceiling of [`LimitKind::LimitedProfile`].
pub const PROFILE_MAX_LIMIT: u64 = 1;
/// Ceiling of [`LimitKind::LimitedPost`].
pub const POST_MAX_LIMIT: u64 = 200;

const ITEM_ID_FIELD: &str = "item_id";
const COUNT_FIELD: &str = "count";

/// The kinds of limited resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
	/// At most one profile-level resource per item.
	#[value(name = "profile")]
	LimitedProfile,
	/// At most two hundred post-level resources per item.
	#[value(name = "post")]
	LimitedPost,
}

impl LimitKind {
	pub const ALL: [LimitKind; 2] = [LimitKind::LimitedProfile, LimitKind::LimitedPost];

	pub fn max_limit(&self) -> u64 {
		match self {
			Self::LimitedProfile => PROFILE_MAX_LIMIT,
			Self::LimitedPost => POST_MAX_LIMIT,
		}
	}

	/// Partition holding the records of this kind.
	pub fn partition(&self) -> &'static str {
		match self {
			Self::LimitedProfile => "limited_profiles",
			Self::LimitedPost => "limited_posts",
		}
	}

	pub fn config(&self) -> LimitConfig {
		let shaper: RecordShaper = match self {
			Self::LimitedProfile => shape_limited_profile,
			Self::LimitedPost => shape_limited_post,
		};
		LimitConfig::new(self.max_limit(), self.partition(), shaper)
	}
}

impl Display for LimitKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::LimitedProfile => write!(f, "limited_profile"),
			Self::LimitedPost => write!(f, "limited_post"),
		}
	}
}

/// Body of a limited item record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitDoc {
	pub item_id: ItemId,
	pub count: u64,
	pub kind: LimitKind,
}

/// A limited item record as stored, including its store-assigned identifier.
pub type LimitRecord = Document<LimitDoc>;

/// Turns a raw `(item, count)` pair into the record to store.
pub type RecordShaper = fn(ItemId, u64) -> LimitDoc;

fn shape_limited_profile(item_id: ItemId, count: u64) -> LimitDoc {
	LimitDoc { item_id, count, kind: LimitKind::LimitedProfile }
}

fn shape_limited_post(item_id: ItemId, count: u64) -> LimitDoc {
	LimitDoc { item_id, count, kind: LimitKind::LimitedPost }
}

/// Everything that varies between two kinds of limited items.
#[derive(Debug, Clone)]
pub struct LimitConfig {
	/// Maximum value a count may reach.
	pub max_limit: u64,
	/// Partition of the store the records live in.
	pub partition: String,
	pub shaper: RecordShaper,
}

impl LimitConfig {
	pub fn new(max_limit: u64, partition: impl Into<String>, shaper: RecordShaper) -> Self {
		Self { max_limit, partition: partition.into(), shaper }
	}
}

/// Enforces `0 <= count <= max_limit` for one kind of limited item.
///
/// The store keeps no record state of its own. Cloning it is cheap and every clone works on the
/// same partition.
pub struct LimitedStore<S: DocStore> {
	config: LimitConfig,
	limited: DocCollection<LimitDoc, S>,
}

impl<S: DocStore> Clone for LimitedStore<S> {
	fn clone(&self) -> Self {
		Self { config: self.config.clone(), limited: self.limited.clone() }
	}
}

impl<S: DocStore> LimitedStore<S> {
	pub fn new(kind: LimitKind, store: Arc<S>) -> Self {
		Self::with_config(kind.config(), store)
	}

	pub fn with_config(config: LimitConfig, store: Arc<S>) -> Self {
		let limited = DocCollection::new(config.partition.clone(), store);
		Self { config, limited }
	}

	pub fn config(&self) -> &LimitConfig {
		&self.config
	}

	pub fn max_limit(&self) -> u64 {
		self.config.max_limit
	}

	fn item_filter(item_id: &ItemId) -> Filter {
		Filter::all().with(ITEM_ID_FIELD, item_id)
	}

	/// Starts tracking `item_id` with an initial `count`.
	///
	/// Fails with [`ConceptError::LimitExceeded`] without writing anything when `count` is above
	/// the ceiling. The store does not deduplicate: creating the same item twice yields two
	/// records. [`Self::get`] then returns one of them, the same one [`Self::increment`] updates.
	#[instrument(skip(self))]
	pub async fn create(&self, item_id: ItemId, count: u64) -> Result<LimitRecord> {
		if !self.under_limit(count) {
			return Err(ConceptError::LimitExceeded {
				item_id,
				requested: count,
				max_limit: self.config.max_limit,
			})
		}

		let id = self.limited.create_one(&(self.config.shaper)(item_id.clone(), count)).await?;
		debug!("Created limited item {} with id {} in {}", item_id, id, self.config.partition);

		self.limited
			.read_one(&Filter::by_id(id))
			.await?
			.ok_or_else(|| ConceptError::NotFound(format!("limited item w/ id = {}", id)))
	}

	/// Stops tracking `item_id`. Deleting an unknown item is a no-op.
	#[instrument(skip(self))]
	pub async fn delete(&self, item_id: &ItemId) -> Result<()> {
		let deleted = self.limited.delete_many(&Self::item_filter(item_id)).await?;
		debug!("Deleted {} limited records for item {}", deleted, item_id);

		Ok(())
	}

	pub async fn get(&self, item_id: &ItemId) -> Result<LimitRecord> {
		self.limited
			.read_one(&Self::item_filter(item_id))
			.await?
			.ok_or_else(|| ConceptError::NotFound(format!("no limited item w/ id = {}", item_id)))
	}

	pub async fn get_count(&self, item_id: &ItemId) -> Result<u64> {
		Ok(self.get(item_id).await?.count)
	}

	/// Whether `count` is an acceptable value for this kind.
	pub fn under_limit(&self, count: u64) -> bool {
		count <= self.config.max_limit
	}

	/// Adds `delta` to the count of `item_id`.
	///
	/// The stored count is left untouched when the result would exceed the ceiling
	/// ([`ConceptError::LimitExceeded`]) or drop below zero ([`ConceptError::CountUnderflow`]).
	#[instrument(skip(self))]
	pub async fn increment(&self, item_id: &ItemId, delta: i64) -> Result<LimitRecord> {
		let outcome = self
			.limited
			.increment_one(&Self::item_filter(item_id), COUNT_FIELD, delta, self.config.max_limit)
			.await?;

		match outcome {
			Increment::Updated(record) => {
				debug!("Incremented limited item {} by {} to {}", item_id, delta, record.count);
				Ok(record)
			},
			Increment::Missing =>
				Err(ConceptError::NotFound(format!("no limited item w/ id = {}", item_id))),
			Increment::Exceeded { current } => {
				let requested = u64::try_from(i128::from(current) + i128::from(delta))
					.unwrap_or(u64::MAX);
				debug_assert!(!self.under_limit(requested));
				Err(ConceptError::LimitExceeded {
					item_id: item_id.clone(),
					requested,
					max_limit: self.config.max_limit,
				})
			},
			Increment::Underflow { current } => Err(ConceptError::CountUnderflow {
				item_id: item_id.clone(),
				requested: i128::from(current) + i128::from(delta),
			}),
		}
	}

	/// Removes every record of this kind.
	#[instrument(skip(self))]
	pub async fn reset(&self) -> Result<()> {
		let deleted = self.limited.delete_many(&Filter::all()).await?;
		debug!("Removed all {} limited items from {}", deleted, self.config.partition);

		Ok(())
	}
}
