use std::{collections::BTreeSet, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument};

use crate::{
	storage::{DocCollection, DocStore, Document, Filter},
	types::{ConceptError, ItemId},
	Result,
};

pub const LABELS_PARTITION: &str = "labels";

/// `owner` attached `label` to `item`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelDoc {
	pub owner: ItemId,
	pub label: String,
	pub item: ItemId,
}

pub type Label = Document<LabelDoc>;

/// User-owned labels on arbitrary items.
pub struct LabelConcept<S: DocStore> {
	labels: DocCollection<LabelDoc, S>,
}

impl<S: DocStore> LabelConcept<S> {
	pub fn new(store: Arc<S>) -> Self {
		Self { labels: DocCollection::new(LABELS_PARTITION, store) }
	}

	fn label_filter(owner: &ItemId, label: &str) -> Filter {
		Filter::all().with("owner", owner).with("label", label)
	}

	#[instrument(skip(self))]
	pub async fn create(&self, owner: ItemId, label: String, item: ItemId) -> Result<Label> {
		let id = self.labels.create_one(&LabelDoc { owner, label, item }).await?;
		debug!("Created label {}", id);

		self.labels
			.read_one(&Filter::by_id(id))
			.await?
			.ok_or_else(|| ConceptError::NotFound(format!("label w/ id = {}", id)))
	}

	/// Detaches `label` from `item`. Removing a missing label is a no-op.
	#[instrument(skip(self))]
	pub async fn remove(&self, owner: &ItemId, label: &str, item: &ItemId) -> Result<()> {
		self.labels.delete_one(&Self::label_filter(owner, label).with("item", item)).await?;
		Ok(())
	}

	/// Renames every `old_label` of `owner` to `new_label` and returns how many were renamed.
	#[instrument(skip(self))]
	pub async fn update_label(
		&self,
		owner: &ItemId,
		old_label: &str,
		new_label: &str,
	) -> Result<u64> {
		let renamed = self
			.labels
			.update_many(&Self::label_filter(owner, old_label), json!({ "label": new_label }))
			.await?;
		debug!("Renamed {} labels of {} from {:?} to {:?}", renamed, owner, old_label, new_label);

		Ok(renamed)
	}

	/// Distinct labels used by `owner`.
	pub async fn get_user_labels(&self, owner: &ItemId) -> Result<BTreeSet<String>> {
		let labels = self.labels.read_many(&Filter::all().with("owner", owner)).await?;
		Ok(labels.into_iter().map(|label| label.body.label).collect())
	}
}
