use std::fmt;

use uuid::Uuid;

use crate::store::Collection;

#[derive(Debug, Clone)]
pub enum KeyPart {
    Id(Uuid),
    Str(String),
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Id(id) => write!(f, "{id}"),
            KeyPart::Str(s) => write!(f, "{s}"),
        }
    }
}

pub struct RedisKey;

impl RedisKey {
    // JSON body of one document
    pub fn document(collection: Collection, id: KeyPart) -> String {
        format!("{}:{}", collection.name(), id)
    }

    pub fn collection_ids(collection: Collection) -> String {
        format!("{}:ids", collection.name())
    }

    // Set of document ids sharing one value of the collection's indexed field
    pub fn index(collection: Collection, value: KeyPart) -> String {
        format!("{}{}", Self::index_prefix(collection), value)
    }

    pub fn index_prefix(collection: Collection) -> String {
        match collection.index_field() {
            Some(field) => format!("{}:by_{}:", collection.name(), field),
            None => format!("{}:by_none:", collection.name()),
        }
    }

    // Holds the owning document id for one value pair of a unique compound index
    pub fn unique_pair(collection: Collection, first: KeyPart, second: KeyPart) -> String {
        format!("{}{}:{}", Self::unique_prefix(collection), first, second)
    }

    pub fn unique_prefix(collection: Collection) -> String {
        format!("{}:unique:", collection.name())
    }
}
