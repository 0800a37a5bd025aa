use anyhow::Result;
use dashmap::DashMap;
use serde_json::Value;

use super::query;
use crate::util::now_ms;
use crate::wire::message::Document;

#[derive(Debug, Clone)]
struct StoredDocument {
    data: Value,
    date_created: u64,
    date_updated: Option<u64>,
}

/// In-memory collection/document store.
///
/// Collections appear on first insert. Unknown collections answer reads and
/// mutations with `None`, which handlers surface as 404.
pub struct MemoryStore {
    collections: DashMap<String, DashMap<String, StoredDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
        }
    }

    /// Fetches one document by id. Outer `None` means unknown collection.
    pub fn get_one(&self, collection_id: &str, resource_id: &str) -> Option<Option<Document>> {
        let collection = self.collections.get(collection_id)?;
        let document = collection.get(resource_id).map(|stored| Document {
            id: resource_id.to_string(),
            data_json: stored.data.to_string(),
        });
        Some(document)
    }

    /// Fetches every document matching the filter. `None` means unknown
    /// collection.
    pub fn get_all(
        &self,
        collection_id: &str,
        filter: Option<&Value>,
    ) -> Option<Vec<Document>> {
        let collection = self.collections.get(collection_id)?;

        let mut documents: Vec<Document> = collection
            .iter()
            .filter(|entry| match filter {
                Some(f) => query::matches(f, entry.key(), &entry.value().data),
                None => true,
            })
            .map(|entry| Document {
                id: entry.key().clone(),
                data_json: entry.value().data.to_string(),
            })
            .collect();

        documents.sort_by(|a, b| a.id.cmp(&b.id));
        Some(documents)
    }

    /// Inserts a document under the given id, creating the collection when
    /// missing. Re-posting an existing id overwrites it, which is what makes
    /// conflict replay safe to repeat.
    pub fn post(&self, collection_id: &str, resource_id: &str, document_json: &str) -> Result<Document> {
        let data: Value = serde_json::from_str(document_json)
            .map_err(|e| anyhow::anyhow!("document is not valid json: {}", e))?;

        let collection = self
            .collections
            .entry(collection_id.to_string())
            .or_insert_with(DashMap::new);

        collection.insert(
            resource_id.to_string(),
            StoredDocument {
                data: data.clone(),
                date_created: now_ms(),
                date_updated: None,
            },
        );

        Ok(Document {
            id: resource_id.to_string(),
            data_json: data.to_string(),
        })
    }

    /// Replaces documents by id or filter, returning the change count.
    /// `None` means unknown collection.
    pub fn put(
        &self,
        collection_id: &str,
        resource_id: Option<&str>,
        filter: Option<&Value>,
        document_json: &str,
    ) -> Result<Option<u64>> {
        let data: Value = serde_json::from_str(document_json)
            .map_err(|e| anyhow::anyhow!("document is not valid json: {}", e))?;

        let collection = match self.collections.get(collection_id) {
            Some(collection) => collection,
            None => return Ok(None),
        };

        let targets: Vec<String> = match resource_id {
            Some(id) => {
                if collection.contains_key(id) {
                    vec![id.to_string()]
                } else {
                    vec![]
                }
            }
            None => collection
                .iter()
                .filter(|entry| match filter {
                    Some(f) => query::matches(f, entry.key(), &entry.value().data),
                    None => true,
                })
                .map(|entry| entry.key().clone())
                .collect(),
        };

        let mut changes = 0u64;
        for id in targets {
            if let Some(mut stored) = collection.get_mut(&id) {
                stored.data = data.clone();
                stored.date_updated = Some(now_ms());
                changes += 1;
            }
        }

        Ok(Some(changes))
    }

    /// Merge-updates documents by id or filter, returning the change count.
    /// Top-level fields of the patch overwrite the stored document's fields;
    /// untouched fields survive. `None` means unknown collection.
    pub fn patch(
        &self,
        collection_id: &str,
        resource_id: Option<&str>,
        filter: Option<&Value>,
        document_json: &str,
    ) -> Result<Option<u64>> {
        let patch: Value = serde_json::from_str(document_json)
            .map_err(|e| anyhow::anyhow!("document is not valid json: {}", e))?;

        let collection = match self.collections.get(collection_id) {
            Some(collection) => collection,
            None => return Ok(None),
        };

        let targets: Vec<String> = match resource_id {
            Some(id) => {
                if collection.contains_key(id) {
                    vec![id.to_string()]
                } else {
                    vec![]
                }
            }
            None => collection
                .iter()
                .filter(|entry| match filter {
                    Some(f) => query::matches(f, entry.key(), &entry.value().data),
                    None => true,
                })
                .map(|entry| entry.key().clone())
                .collect(),
        };

        let mut changes = 0u64;
        for id in targets {
            if let Some(mut stored) = collection.get_mut(&id) {
                merge_into(&mut stored.data, &patch);
                stored.date_updated = Some(now_ms());
                changes += 1;
            }
        }

        Ok(Some(changes))
    }

    /// Deletes documents by id or filter, returning the change count.
    /// `None` means unknown collection.
    pub fn delete(
        &self,
        collection_id: &str,
        resource_id: Option<&str>,
        filter: Option<&Value>,
    ) -> Option<u64> {
        let collection = self.collections.get(collection_id)?;

        let targets: Vec<String> = match resource_id {
            Some(id) => vec![id.to_string()],
            None => collection
                .iter()
                .filter(|entry| match filter {
                    Some(f) => query::matches(f, entry.key(), &entry.value().data),
                    None => true,
                })
                .map(|entry| entry.key().clone())
                .collect(),
        };

        let mut changes = 0u64;
        for id in targets {
            if collection.remove(&id).is_some() {
                changes += 1;
            }
        }

        Some(changes)
    }

    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    pub fn document_count(&self, collection_id: &str) -> usize {
        self.collections
            .get(collection_id)
            .map(|collection| collection.len())
            .unwrap_or(0)
    }

    /// Oldest-first creation timestamp, exposed for diagnostics.
    pub fn created_at(&self, collection_id: &str, resource_id: &str) -> Option<u64> {
        self.collections
            .get(collection_id)?
            .get(resource_id)
            .map(|stored| stored.date_created)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Shallow merge: a non-object on either side replaces the value wholesale.
fn merge_into(target: &mut Value, patch: &Value) {
    if let (Value::Object(existing), Value::Object(incoming)) = (&mut *target, patch) {
        for (key, value) in incoming {
            existing.insert(key.clone(), value.clone());
        }
    } else {
        *target = patch.clone();
    }
}
