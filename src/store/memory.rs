use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    errors::AppError,
    query::FindQuery,
    store::{
        Collection, Document, DocumentStore, ID_FIELD, VERSION_FIELD, document_id, eval,
        pipeline::Pipeline, strip_reserved, unique_values,
    },
};

type Collections = Arc<RwLock<HashMap<Collection, Vec<Document>>>>;

// Every write happens under one write lock, so multi-field updates are atomic
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Collections,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn snapshot(&self, collection: Collection) -> Vec<Document> {
        let collections = self.collections.read().await;
        collections.get(&collection).cloned().unwrap_or_default()
    }
}

fn duplicate_pair(
    collection: Collection,
    docs: &[Document],
    candidate: &Document,
    skip_id: Option<Uuid>,
) -> Result<(), AppError> {
    let Some(pair) = unique_values(collection, candidate) else {
        return Ok(());
    };

    let taken = docs
        .iter()
        .filter(|doc| skip_id.is_none() || document_id(doc) != skip_id)
        .any(|doc| unique_values(collection, doc).as_ref() == Some(&pair));

    if taken {
        return Err(AppError::Conflict(format!(
            "Duplicate field value: ({}, {}). Please use another value",
            pair.0, pair.1
        )));
    }
    Ok(())
}

fn bump_version(doc: &mut Document) {
    let next = doc.get(VERSION_FIELD).and_then(Value::as_u64).unwrap_or(0) + 1;
    doc.insert(VERSION_FIELD.to_string(), Value::from(next));
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn execute(&self, query: &FindQuery) -> Result<Vec<Document>, AppError> {
        let docs = self.snapshot(query.collection()).await;
        Ok(eval::run_query(docs, query))
    }

    async fn aggregate(
        &self,
        collection: Collection,
        pipeline: &Pipeline,
    ) -> Result<Vec<Document>, AppError> {
        let docs = self.snapshot(collection).await;
        Ok(eval::run_pipeline(docs, pipeline))
    }

    async fn find_by_id(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Option<Document>, AppError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .and_then(|docs| docs.iter().find(|doc| document_id(doc) == Some(id)))
            .cloned())
    }

    async fn insert(&self, collection: Collection, mut doc: Document) -> Result<Document, AppError> {
        let id = document_id(&doc).ok_or_else(|| {
            AppError::WriteFailure(format!("Document for {} has no id", collection.name()))
        })?;
        doc.entry(VERSION_FIELD.to_string())
            .or_insert_with(|| Value::from(0u64));

        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection).or_default();

        if docs.iter().any(|existing| document_id(existing) == Some(id)) {
            return Err(AppError::Conflict(format!(
                "Duplicate {} for {}: {}",
                ID_FIELD,
                collection.name(),
                id
            )));
        }
        duplicate_pair(collection, docs, &doc, None)?;

        docs.push(doc.clone());
        Ok(doc)
    }

    async fn update_by_id(
        &self,
        collection: Collection,
        id: Uuid,
        fields: Document,
    ) -> Result<Option<Document>, AppError> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(&collection) else {
            return Ok(None);
        };
        let Some(pos) = docs.iter().position(|doc| document_id(doc) == Some(id)) else {
            return Ok(None);
        };

        let mut updated = docs[pos].clone();
        updated.extend(strip_reserved(fields));
        bump_version(&mut updated);
        duplicate_pair(collection, docs, &updated, Some(id))?;

        docs[pos] = updated.clone();
        Ok(Some(updated))
    }

    async fn delete_by_id(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Option<Document>, AppError> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(&collection) else {
            return Ok(None);
        };
        Ok(docs
            .iter()
            .position(|doc| document_id(doc) == Some(id))
            .map(|pos| docs.remove(pos)))
    }
}
