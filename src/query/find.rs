use crate::{
    query::Filter,
    store::{Collection, ID_FIELD, VERSION_FIELD},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    // "a,-b" -> [a asc, b desc]; blank entries are skipped
    pub fn parse_list(raw: &str) -> Vec<SortKey> {
        raw.split(',')
            .map(str::trim)
            .filter_map(|entry| match entry.strip_prefix('-') {
                Some(field) if !field.trim().is_empty() => Some(SortKey::desc(field.trim())),
                Some(_) => None,
                None if !entry.is_empty() => Some(SortKey::asc(entry)),
                None => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    All,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl Projection {
    pub fn include_list(raw: &str) -> Projection {
        let mut fields: Vec<String> = Vec::new();
        for field in raw.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            if !fields.iter().any(|f| f == field) {
                fields.push(field.to_string());
            }
        }
        if fields.is_empty() {
            return Projection::without_version();
        }
        if !fields.iter().any(|f| f == ID_FIELD) {
            fields.insert(0, ID_FIELD.to_string());
        }
        Projection::Include(fields)
    }

    pub fn without_version() -> Projection {
        Projection::Exclude(vec![VERSION_FIELD.to_string()])
    }
}

// A retrieval request against one collection. Building it never touches the store.
#[derive(Debug, Clone, PartialEq)]
pub struct FindQuery {
    collection: Collection,
    filter: Filter,
    sort: Vec<SortKey>,
    projection: Projection,
    skip: u64,
    limit: Option<u64>,
}

impl FindQuery {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            filter: Filter::new(),
            sort: Vec::new(),
            projection: Projection::All,
            skip: 0,
            limit: None,
        }
    }

    pub fn find(mut self, filter: Filter) -> Self {
        self.filter = self.filter.and(filter);
        self
    }

    pub fn sort(mut self, keys: Vec<SortKey>) -> Self {
        self.sort = keys;
        self
    }

    pub fn select(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn skip(mut self, n: u64) -> Self {
        self.skip = n;
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn sort_keys(&self) -> &[SortKey] {
        &self.sort
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn skip_count(&self) -> u64 {
        self.skip
    }

    pub fn limit_count(&self) -> Option<u64> {
        self.limit
    }
}
