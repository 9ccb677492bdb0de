use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument};

use crate::{
	storage::{DocCollection, DocStore, Document, Filter, Increment},
	types::{ConceptError, ItemId},
	Result,
};

pub const PROFILES_PARTITION: &str = "profiles";
pub const FOLLOWING_PARTITION: &str = "following";

const USER_FIELD: &str = "user";
const FOLLOWS_FIELD: &str = "follows";
const TIME_ACTIVE_FIELD: &str = "time_active";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDoc {
	pub user: ItemId,
	pub handle: String,
	/// Accumulated active time.
	pub time_active: u64,
}

/// `user` follows `follows`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowDoc {
	pub user: ItemId,
	pub follows: ItemId,
}

pub type Profile = Document<ProfileDoc>;
pub type Follow = Document<FollowDoc>;

/// User profiles and the accounts they follow.
pub struct ProfileConcept<S: DocStore> {
	profiles: DocCollection<ProfileDoc, S>,
	following: DocCollection<FollowDoc, S>,
}

impl<S: DocStore> ProfileConcept<S> {
	pub fn new(store: Arc<S>) -> Self {
		Self {
			profiles: DocCollection::new(PROFILES_PARTITION, store.clone()),
			following: DocCollection::new(FOLLOWING_PARTITION, store),
		}
	}

	fn user_filter(user: &ItemId) -> Filter {
		Filter::all().with(USER_FIELD, user)
	}

	/// Creates the profile of `user`. A user has at most one profile.
	#[instrument(skip(self))]
	pub async fn create(&self, user: ItemId, handle: String) -> Result<Profile> {
		if self.profiles.read_one(&Self::user_filter(&user)).await?.is_some() {
			return Err(ConceptError::AlreadyExists(format!(
				"a profile associated with id = {} already exists",
				user
			)))
		}

		let id = self.profiles.create_one(&ProfileDoc { user, handle, time_active: 0 }).await?;
		debug!("Created profile {}", id);

		self.profiles
			.read_one(&Filter::by_id(id))
			.await?
			.ok_or_else(|| ConceptError::NotFound(format!("profile w/ id = {}", id)))
	}

	#[instrument(skip(self))]
	pub async fn delete(&self, user: &ItemId) -> Result<()> {
		self.profiles.delete_one(&Self::user_filter(user)).await?;
		Ok(())
	}

	pub async fn get_profile(&self, user: &ItemId) -> Result<Option<Profile>> {
		Ok(self.profiles.read_one(&Self::user_filter(user)).await?)
	}

	/// Accounts followed by `user`.
	pub async fn get_followed(&self, user: &ItemId) -> Result<Vec<Follow>> {
		Ok(self.following.read_many(&Self::user_filter(user)).await?)
	}

	/// Makes `user` follow `follows`. Following twice keeps a single edge.
	#[instrument(skip(self))]
	pub async fn follow_account(&self, user: &ItemId, follows: &ItemId) -> Result<()> {
		let filter = Self::user_filter(user).with(FOLLOWS_FIELD, follows);
		if self.following.read_one(&filter).await?.is_some() {
			debug!("{} already follows {}", user, follows);
			return Ok(())
		}

		let follow = FollowDoc { user: user.clone(), follows: follows.clone() };
		self.following.create_one(&follow).await?;
		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn unfollow_account(&self, user: &ItemId, follows: &ItemId) -> Result<()> {
		self.following.delete_many(&Self::user_filter(user).with(FOLLOWS_FIELD, follows)).await?;
		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn change_handle(&self, user: &ItemId, new_handle: String) -> Result<()> {
		let partial = json!({ "handle": new_handle });
		match self.profiles.update_one(&Self::user_filter(user), partial).await? {
			true => Ok(()),
			false => Err(Self::missing(user)),
		}
	}

	pub async fn get_time_active(&self, user: &ItemId) -> Result<u64> {
		self.get_profile(user)
			.await?
			.map(|profile| profile.time_active)
			.ok_or_else(|| Self::missing(user))
	}

	/// Adds `time` to the active time of `user` and returns the new total.
	#[instrument(skip(self))]
	pub async fn add_time_active(&self, user: &ItemId, time: u64) -> Result<u64> {
		let delta = i64::try_from(time).map_err(|_| ConceptError::LimitExceeded {
			item_id: user.clone(),
			requested: time,
			max_limit: i64::MAX as u64,
		})?;

		match self
			.profiles
			.increment_one(&Self::user_filter(user), TIME_ACTIVE_FIELD, delta, u64::MAX)
			.await?
		{
			Increment::Updated(profile) => Ok(profile.time_active),
			Increment::Missing => Err(Self::missing(user)),
			Increment::Exceeded { current } => Err(ConceptError::LimitExceeded {
				item_id: user.clone(),
				requested: current.saturating_add(time),
				max_limit: u64::MAX,
			}),
			Increment::Underflow { current } => Err(ConceptError::CountUnderflow {
				item_id: user.clone(),
				requested: i128::from(current) + i128::from(delta),
			}),
		}
	}

	fn missing(user: &ItemId) -> ConceptError {
		ConceptError::NotFound(format!("no profile is currently associated with id = {}", user))
	}
}
