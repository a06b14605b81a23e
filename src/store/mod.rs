pub mod eval;
pub mod memory;
pub mod pipeline;
pub mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

pub use memory::MemoryStore;
pub use pipeline::{Accumulator, GROUP_KEY_FIELD, GroupKey, Pipeline, Stage};
pub use redis::RedisStore;

use crate::{
    errors::AppError,
    models::review::{TOUR_FIELD, USER_FIELD},
    query::FindQuery,
};

pub type Document = Map<String, Value>;

pub type SharedStore = Arc<dyn DocumentStore>;

pub const ID_FIELD: &str = "id";
// Internal revision counter, bumped on every write
pub const VERSION_FIELD: &str = "__v";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Tours,
    Reviews,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Tours => "tours",
            Collection::Reviews => "reviews",
        }
    }

    // Secondary index kept by stores that cannot scan cheaply
    pub fn index_field(&self) -> Option<&'static str> {
        match self {
            Collection::Tours => None,
            Collection::Reviews => Some(TOUR_FIELD),
        }
    }

    // Fields that are unique together
    pub fn unique_pair(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Collection::Tours => None,
            Collection::Reviews => Some((TOUR_FIELD, USER_FIELD)),
        }
    }
}

/// The document store boundary.
///
/// `update_by_id` must apply all given fields atomically: a concurrent reader
/// sees either none or all of them.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn execute(&self, query: &FindQuery) -> Result<Vec<Document>, AppError>;

    async fn aggregate(
        &self,
        collection: Collection,
        pipeline: &Pipeline,
    ) -> Result<Vec<Document>, AppError>;

    async fn find_by_id(&self, collection: Collection, id: Uuid)
    -> Result<Option<Document>, AppError>;

    // Rejects documents that break the collection's unique pair with `Conflict`
    async fn insert(&self, collection: Collection, doc: Document) -> Result<Document, AppError>;

    async fn update_by_id(
        &self,
        collection: Collection,
        id: Uuid,
        fields: Document,
    ) -> Result<Option<Document>, AppError>;

    async fn delete_by_id(&self, collection: Collection, id: Uuid)
    -> Result<Option<Document>, AppError>;
}

pub fn document_id(doc: &Document) -> Option<Uuid> {
    uuid_field(doc, ID_FIELD)
}

pub fn uuid_field(doc: &Document, field: &str) -> Option<Uuid> {
    doc.get(field)
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

// Value pair of the collection's unique index, rendered for keys and messages
pub(crate) fn unique_values(collection: Collection, doc: &Document) -> Option<(String, String)> {
    let (first, second) = collection.unique_pair()?;
    let render = |field: &str| {
        doc.get(field).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    };
    Some((render(first)?, render(second)?))
}

// Patches may not rename a document or rewrite its revision
pub(crate) fn strip_reserved(mut fields: Document) -> Document {
    fields.remove(ID_FIELD);
    fields.remove(VERSION_FIELD);
    fields
}
