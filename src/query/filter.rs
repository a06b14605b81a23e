use std::cmp::Ordering;

use serde_json::Value;

// The only tokens a client may turn into operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOp {
    Gte,
    Gt,
    Lte,
    Lt,
}

impl RangeOp {
    // Whole-token match only: "gtx" or "$gt" are not operators
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "gte" => Some(RangeOp::Gte),
            "gt" => Some(RangeOp::Gt),
            "lte" => Some(RangeOp::Lte),
            "lt" => Some(RangeOp::Lt),
            _ => None,
        }
    }

    pub fn admits(&self, ordering: Ordering) -> bool {
        match self {
            RangeOp::Gte => ordering != Ordering::Less,
            RangeOp::Gt => ordering == Ordering::Greater,
            RangeOp::Lte => ordering != Ordering::Greater,
            RangeOp::Lt => ordering == Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Eq { field: String, value: Value },
    AnyOf { field: String, values: Vec<Value> },
    Range { field: String, op: RangeOp, value: Value },
}

impl Constraint {
    pub fn field(&self) -> &str {
        match self {
            Constraint::Eq { field, .. }
            | Constraint::AnyOf { field, .. }
            | Constraint::Range { field, .. } => field,
        }
    }
}

// Conjunction of constraints
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    constraints: Vec<Constraint>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constraints.push(Constraint::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn any_of(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.constraints.push(Constraint::AnyOf {
            field: field.into(),
            values,
        });
        self
    }

    pub fn range(mut self, field: impl Into<String>, op: RangeOp, value: impl Into<Value>) -> Self {
        self.constraints.push(Constraint::Range {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn push(&mut self, constraint: Constraint) {
        if !self.constraints.contains(&constraint) {
            self.constraints.push(constraint);
        }
    }

    pub fn and(mut self, other: Filter) -> Self {
        for constraint in other.constraints {
            self.push(constraint);
        }
        self
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    // First equality value pinned on `field`, used by stores for index lookups
    pub fn eq_value(&self, field: &str) -> Option<&Value> {
        self.constraints.iter().find_map(|c| match c {
            Constraint::Eq { field: f, value } if f == field => Some(value),
            _ => None,
        })
    }
}
