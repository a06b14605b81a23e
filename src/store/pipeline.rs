use crate::query::{Filter, SortKey};

// Field holding the group key in every group output document
pub const GROUP_KEY_FIELD: &str = "_id";

#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Count,
    Sum(String),
    Avg(String),
    Min(String),
    Max(String),
    // Every value of the field, in input order
    Push(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupKey {
    Field(String),
    // Calendar month (1-12) of a timestamp field
    Month(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    // One output document per element of an array field; documents without the field are dropped
    Unwind(String),
    Group {
        key: GroupKey,
        accumulators: Vec<(String, Accumulator)>,
    },
    Sort(Vec<SortKey>),
    Limit(u64),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matching(mut self, filter: Filter) -> Self {
        self.stages.push(Stage::Match(filter));
        self
    }

    pub fn unwind(mut self, field: &str) -> Self {
        self.stages.push(Stage::Unwind(field.to_string()));
        self
    }

    pub fn group(mut self, key: GroupKey, accumulators: Vec<(&str, Accumulator)>) -> Self {
        self.stages.push(Stage::Group {
            key,
            accumulators: accumulators
                .into_iter()
                .map(|(name, acc)| (name.to_string(), acc))
                .collect(),
        });
        self
    }

    pub fn sort(mut self, keys: Vec<SortKey>) -> Self {
        self.stages.push(Stage::Sort(keys));
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.stages.push(Stage::Limit(n));
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    // Stores may use this to narrow the documents they load
    pub fn leading_match(&self) -> Option<&Filter> {
        match self.stages.first() {
            Some(Stage::Match(filter)) => Some(filter),
            _ => None,
        }
    }
}
