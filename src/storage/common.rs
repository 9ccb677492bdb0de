// common.rs

use chrono::Utc;
use serde_json::{Map, Value};

use crate::types::{DocId, ItemId, StorageError};

use super::Increment;

/// Field holding the store-assigned [`DocId`].
pub const ID_FIELD: &str = "id";
pub const DATE_CREATED_FIELD: &str = "date_created";
pub const DATE_UPDATED_FIELD: &str = "date_updated";

/// Exact-match filter over top level document fields.
///
/// All conditions must hold. An empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
	conditions: Vec<(String, Value)>,
}

impl Filter {
	/// Matches every document.
	pub fn all() -> Self {
		Self::default()
	}

	pub fn by_id(id: DocId) -> Self {
		Self::all().with(ID_FIELD, id.to_string())
	}

	/// Adds the condition `field == value`.
	pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
		self.conditions.push((field.to_string(), value.into()));
		self
	}

	pub fn is_empty(&self) -> bool {
		self.conditions.is_empty()
	}

	pub fn matches(&self, doc: &Value) -> bool {
		self.conditions.iter().all(|(field, expected)| doc.get(field) == Some(expected))
	}
}

impl From<ItemId> for Value {
	fn from(id: ItemId) -> Self {
		Value::String(id.as_str().to_string())
	}
}

impl From<&ItemId> for Value {
	fn from(id: &ItemId) -> Self {
		Value::String(id.as_str().to_string())
	}
}

fn as_object_mut(doc: &mut Value) -> Result<&mut Map<String, Value>, StorageError> {
	match doc {
		Value::Object(map) => Ok(map),
		other => Err(StorageError::Parsing(format!("expected a JSON object, got {other}"))),
	}
}

fn touch(doc: &mut Map<String, Value>) {
	doc.insert(DATE_UPDATED_FIELD.to_string(), Value::String(Utc::now().to_rfc3339()));
}

/// Assigns a fresh identifier and timestamps to a new document body.
pub fn stamp_new(mut body: Value) -> Result<(DocId, Value), StorageError> {
	let id = DocId::new();
	let now = Value::String(Utc::now().to_rfc3339());
	let doc = as_object_mut(&mut body)?;
	doc.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
	doc.insert(DATE_CREATED_FIELD.to_string(), now.clone());
	doc.insert(DATE_UPDATED_FIELD.to_string(), now);

	Ok((id, body))
}

/// Reads the identifier back out of a stored document.
pub fn doc_id(doc: &Value) -> Result<String, StorageError> {
	doc.get(ID_FIELD)
		.and_then(Value::as_str)
		.map(str::to_string)
		.ok_or_else(|| StorageError::Parsing(format!("document without \"{ID_FIELD}\": {doc}")))
}

/// Overwrites the fields of `partial` on `doc`. Identity and creation date are immutable.
pub fn apply_partial(doc: &mut Value, partial: &Value) -> Result<(), StorageError> {
	let fields = partial.as_object().ok_or_else(|| {
		StorageError::Parsing(format!("expected a JSON object as partial update, got {partial}"))
	})?;
	let doc = as_object_mut(doc)?;
	for (field, value) in fields {
		if field == ID_FIELD || field == DATE_CREATED_FIELD {
			continue
		}
		doc.insert(field.clone(), value.clone());
	}
	touch(doc);

	Ok(())
}

/// Adds `delta` to `field` when the result stays within `0..=ceiling`.
///
/// `doc` is only modified on [`Increment::Updated`].
pub fn apply_increment(
	doc: &mut Value,
	field: &str,
	delta: i64,
	ceiling: u64,
) -> Result<Increment, StorageError> {
	let current = doc.get(field).and_then(Value::as_u64).ok_or_else(|| {
		StorageError::Parsing(format!("field \"{field}\" is not an unsigned integer in {doc}"))
	})?;

	let new_count = i128::from(current) + i128::from(delta);
	if new_count < 0 {
		return Ok(Increment::Underflow { current })
	}
	if new_count > i128::from(ceiling) {
		return Ok(Increment::Exceeded { current })
	}

	let object = as_object_mut(doc)?;
	object.insert(field.to_string(), Value::from(new_count as u64));
	touch(object);

	Ok(Increment::Updated(doc.clone()))
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn filter_matches_all_conditions() {
		let doc = json!({ "owner": "a", "label": "fun", "item": "x" });

		assert!(Filter::all().matches(&doc));
		assert!(Filter::all().with("owner", "a").with("label", "fun").matches(&doc));
		assert!(!Filter::all().with("owner", "a").with("label", "work").matches(&doc));
		assert!(!Filter::all().with("missing", "a").matches(&doc));
	}

	#[test]
	fn stamp_new_assigns_identity() {
		let (id, doc) = stamp_new(json!({ "count": 0 })).unwrap();

		assert_eq!(doc_id(&doc).unwrap(), id.to_string());
		assert!(doc.get(DATE_CREATED_FIELD).is_some());
		assert_eq!(doc.get(DATE_CREATED_FIELD), doc.get(DATE_UPDATED_FIELD));
		assert!(stamp_new(json!([1, 2])).is_err());
	}

	#[test]
	fn non_object_documents_are_rejected() {
		let mut doc = json!("scalar");

		let err = apply_partial(&mut doc, &json!({ "handle": "x" })).unwrap_err();
		assert!(matches!(err, StorageError::Parsing(msg) if msg.contains("scalar")));
		assert_eq!(doc, json!("scalar"));

		let mut counted = json!([{ "count": 1 }]);
		assert!(matches!(
			apply_increment(&mut counted, "count", 1, 10),
			Err(StorageError::Parsing(_))
		));
	}

	#[test]
	fn apply_partial_keeps_identity() {
		let (id, mut doc) = stamp_new(json!({ "handle": "old" })).unwrap();

		apply_partial(&mut doc, &json!({ "handle": "new", "id": "forged" })).unwrap();

		assert_eq!(doc["handle"], "new");
		assert_eq!(doc_id(&doc).unwrap(), id.to_string());
	}

	#[test]
	fn apply_increment_respects_bounds() {
		let mut doc = json!({ "count": 150 });

		assert_eq!(
			apply_increment(&mut doc, "count", 51, 200).unwrap(),
			Increment::Exceeded { current: 150 }
		);
		assert_eq!(doc["count"], 150);

		assert_eq!(
			apply_increment(&mut doc, "count", -151, 200).unwrap(),
			Increment::Underflow { current: 150 }
		);
		assert_eq!(doc["count"], 150);

		let updated = apply_increment(&mut doc, "count", 50, 200).unwrap();
		assert!(matches!(updated, Increment::Updated(_)));
		assert_eq!(doc["count"], 200);
	}

	#[test]
	fn apply_increment_rejects_non_numeric_field() {
		let mut doc = json!({ "count": "three" });

		assert!(matches!(
			apply_increment(&mut doc, "count", 1, 10),
			Err(StorageError::Parsing(_))
		));
	}
}
