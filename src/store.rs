use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub type Result<T> = std::result::Result<T, Error>;

/// Collection names, kept identical to the original deployment so exported
/// document dumps stay readable.
pub mod collections {
	pub const ACCOUNTS: &str = "cuentas";
	pub const LOAN_REQUESTS: &str = "solicitudes";
	pub const PROPOSALS: &str = "propuestas";
	pub const NOTIFICATIONS: &str = "notifications";
	pub const SIGNUP_TOKENS: &str = "bank_signup_tokens";
}

/// Error that can occur when operating on the document store
#[derive(Debug, PartialEq)]
pub enum Error {
	RecordNotFound,
	RecordAlreadyExists,
	/// A batch operation's guard did not hold at commit time
	PreconditionFailed(String),
	Serialization(String),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::RecordNotFound => write!(f, "record does not exist"),
			Error::RecordAlreadyExists => write!(f, "record with this id already exists"),
			Error::PreconditionFailed(msg) => write!(f, "precondition failed: {}", msg),
			Error::Serialization(msg) => write!(f, "document serialization: {}", msg),
		}
	}
}

impl From<serde_json::Error> for Error {
	fn from(e: serde_json::Error) -> Self {
		Error::Serialization(e.to_string())
	}
}

/// Serialize a model into a store document
pub fn to_doc<T: Serialize>(value: &T) -> Result<Value> {
	serde_json::to_value(value).map_err(Into::into)
}

/// Deserialize a store document back into a model
pub fn from_doc<T: DeserializeOwned>(doc: Value) -> Result<T> {
	serde_json::from_value(doc).map_err(Into::into)
}

type Collections = HashMap<String, HashMap<String, Value>>;

/// In-memory, schemaless collection-of-documents store.
///
/// Documents are JSON objects keyed by id inside named collections. Single
/// operations lock the whole store briefly; `commit` applies a [`WriteBatch`]
/// under one write guard, which is the only multi-document atomicity
/// primitive the marketplace relies on.
#[derive(Clone, Default)]
pub struct Store {
	inner: Arc<RwLock<Collections>>,
}

impl Store {
	pub fn new() -> Self {
		Store::default()
	}

	fn read(&self) -> RwLockReadGuard<'_, Collections> {
		self.inner.read().unwrap_or_else(|e| e.into_inner())
	}

	fn write(&self) -> RwLockWriteGuard<'_, Collections> {
		self.inner.write().unwrap_or_else(|e| e.into_inner())
	}

	pub fn insert(&self, collection: &str, id: &str, doc: Value) -> Result<()> {
		let mut data = self.write();
		let col = data.entry(collection.to_string()).or_default();
		if col.contains_key(id) {
			return Err(Error::RecordAlreadyExists);
		}
		col.insert(id.to_string(), doc);
		Ok(())
	}

	pub fn get(&self, collection: &str, id: &str) -> Result<Value> {
		self.read()
			.get(collection)
			.and_then(|col| col.get(id))
			.cloned()
			.ok_or(Error::RecordNotFound)
	}

	pub fn exists(&self, collection: &str, id: &str) -> bool {
		self.read()
			.get(collection)
			.map(|col| col.contains_key(id))
			.unwrap_or(false)
	}

	/// Full scan of a collection with a document predicate
	pub fn find<F>(&self, collection: &str, pred: F) -> Vec<Value>
	where
		F: Fn(&Value) -> bool,
	{
		self.read()
			.get(collection)
			.map(|col| col.values().filter(|doc| pred(doc)).cloned().collect())
			.unwrap_or_default()
	}

	pub fn count<F>(&self, collection: &str, pred: F) -> usize
	where
		F: Fn(&Value) -> bool,
	{
		self.read()
			.get(collection)
			.map(|col| col.values().filter(|doc| pred(doc)).count())
			.unwrap_or(0)
	}

	/// Shallow top-level merge of `patch` into an existing document
	pub fn merge(&self, collection: &str, id: &str, patch: Value) -> Result<Value> {
		let mut data = self.write();
		let doc = data
			.get_mut(collection)
			.and_then(|col| col.get_mut(id))
			.ok_or(Error::RecordNotFound)?;
		merge_into(doc, patch);
		Ok(doc.clone())
	}

	pub fn delete(&self, collection: &str, id: &str) -> Result<Value> {
		self.write()
			.get_mut(collection)
			.and_then(|col| col.remove(id))
			.ok_or(Error::RecordNotFound)
	}

	pub fn delete_where<F>(&self, collection: &str, pred: F) -> usize
	where
		F: Fn(&Value) -> bool,
	{
		let mut data = self.write();
		let col = match data.get_mut(collection) {
			Some(col) => col,
			None => return 0,
		};
		let before = col.len();
		col.retain(|_, doc| !pred(doc));
		before - col.len()
	}

	pub fn batch(&self) -> WriteBatch {
		WriteBatch::default()
	}

	/// Commit a batch atomically: every guard and merge target is validated
	/// under the write lock before any operation is applied, so a failed
	/// commit leaves the store untouched.
	pub fn commit(&self, batch: WriteBatch) -> Result<()> {
		let mut data = self.write();

		for op in &batch.ops {
			let (collection, id, require) = match op {
				Op::Set { .. } => continue,
				Op::Merge { collection, id, require, .. } => (collection, id, require),
				Op::Delete { collection, id, require } => (collection, id, require),
			};
			let doc = data
				.get(collection.as_str())
				.and_then(|col| col.get(id.as_str()))
				.ok_or(Error::RecordNotFound)?;
			for (field, expected) in require {
				if doc.get(field) != Some(expected) {
					return Err(Error::PreconditionFailed(format!(
						"{}/{}: field '{}' changed since read",
						collection, id, field
					)));
				}
			}
		}

		for op in batch.ops {
			match op {
				Op::Set { collection, id, doc } => {
					data.entry(collection).or_default().insert(id, doc);
				}
				Op::Merge { collection, id, patch, .. } => {
					// validated above
					if let Some(doc) = data.get_mut(&collection).and_then(|col| col.get_mut(&id)) {
						merge_into(doc, patch);
					}
				}
				Op::Delete { collection, id, .. } => {
					if let Some(col) = data.get_mut(&collection) {
						col.remove(&id);
					}
				}
			}
		}
		Ok(())
	}
}

fn merge_into(doc: &mut Value, patch: Value) {
	if let (Value::Object(doc), Value::Object(patch)) = (doc, patch) {
		for (key, value) in patch {
			doc.insert(key, value);
		}
	}
}

enum Op {
	Set {
		collection: String,
		id: String,
		doc: Value,
	},
	Merge {
		collection: String,
		id: String,
		patch: Value,
		require: Vec<(String, Value)>,
	},
	Delete {
		collection: String,
		id: String,
		require: Vec<(String, Value)>,
	},
}

/// An ordered set of writes applied all-or-nothing by [`Store::commit`].
///
/// `Merge` and `Delete` operations may carry field guards; a guard that no
/// longer holds at commit time fails the whole batch.
#[derive(Default)]
pub struct WriteBatch {
	ops: Vec<Op>,
}

impl WriteBatch {
	pub fn set(&mut self, collection: &str, id: &str, doc: Value) {
		self.ops.push(Op::Set {
			collection: collection.to_string(),
			id: id.to_string(),
			doc,
		});
	}

	pub fn merge(&mut self, collection: &str, id: &str, patch: Value) {
		self.merge_if(collection, id, patch, Vec::new());
	}

	pub fn merge_if(&mut self, collection: &str, id: &str, patch: Value, require: Vec<(String, Value)>) {
		self.ops.push(Op::Merge {
			collection: collection.to_string(),
			id: id.to_string(),
			patch,
			require,
		});
	}

	pub fn delete(&mut self, collection: &str, id: &str) {
		self.delete_if(collection, id, Vec::new());
	}

	pub fn delete_if(&mut self, collection: &str, id: &str, require: Vec<(String, Value)>) {
		self.ops.push(Op::Delete {
			collection: collection.to_string(),
			id: id.to_string(),
			require,
		});
	}

	pub fn len(&self) -> usize {
		self.ops.len()
	}

	pub fn is_empty(&self) -> bool {
		self.ops.is_empty()
	}
}
