//! The concepts. Each one owns its partitions and depends on nothing but the store.

pub mod labels;
pub mod limit;
pub mod profile;

pub use labels::{Label, LabelConcept, LabelDoc};
pub use limit::{
	LimitConfig, LimitDoc, LimitKind, LimitRecord, LimitedStore, RecordShaper, POST_MAX_LIMIT,
	PROFILE_MAX_LIMIT,
};
pub use profile::{Follow, FollowDoc, Profile, ProfileConcept, ProfileDoc};
