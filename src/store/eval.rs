//! In-process evaluation of queries and pipelines, shared by every store backend.

use std::{cmp::Ordering, collections::HashMap};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde_json::Value;

use crate::{
    query::{Constraint, Filter, FindQuery, Projection, SortDirection, SortKey},
    store::{
        Document,
        pipeline::{Accumulator, GROUP_KEY_FIELD, GroupKey, Pipeline, Stage},
    },
};

// Dotted paths walk nested objects
pub fn field_value<'d>(doc: &'d Document, path: &str) -> Option<&'d Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn compare_strings(a: &str, b: &str) -> Ordering {
    match (parse_timestamp(a), parse_timestamp(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

// Total order used for sorting; missing fields sort as null, lowest
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => compare_strings(x, y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Compares a stored value against a filter literal.
///
/// Literals from the query string are strings; they are coerced to the stored
/// value's type (number, bool, timestamp) before comparing. `None` means the
/// two are not comparable, which never satisfies a constraint.
pub fn compare_literal(stored: &Value, literal: &Value) -> Option<Ordering> {
    match (stored, literal) {
        (Value::Number(n), Value::String(s)) => {
            let l = s.trim().parse::<f64>().ok()?;
            n.as_f64()?.partial_cmp(&l)
        }
        (Value::Bool(b), Value::String(s)) => s.trim().parse::<bool>().ok().map(|l| b.cmp(&l)),
        (Value::String(a), Value::String(b)) => Some(compare_strings(a, b)),
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Object(_), Value::Object(_)) | (Value::Array(_), Value::Array(_)) => {
            (stored == literal).then_some(Ordering::Equal)
        }
        _ => None,
    }
}

// Arrays match when any element does
fn stored_satisfies(stored: &Value, literal: &Value, accept: &dyn Fn(Ordering) -> bool) -> bool {
    if let Some(ord) = compare_literal(stored, literal) {
        if accept(ord) {
            return true;
        }
    }
    match stored {
        Value::Array(items) if !literal.is_array() => items
            .iter()
            .any(|item| compare_literal(item, literal).is_some_and(accept)),
        _ => false,
    }
}

fn constraint_matches(doc: &Document, constraint: &Constraint) -> bool {
    let Some(stored) = field_value(doc, constraint.field()) else {
        return false;
    };

    let is_equal = |ord: Ordering| ord == Ordering::Equal;
    match constraint {
        Constraint::Eq { value, .. } => stored_satisfies(stored, value, &is_equal),
        Constraint::AnyOf { values, .. } => values
            .iter()
            .any(|value| stored_satisfies(stored, value, &is_equal)),
        Constraint::Range { op, value, .. } => {
            stored_satisfies(stored, value, &|ord: Ordering| op.admits(ord))
        }
    }
}

pub fn matches(doc: &Document, filter: &Filter) -> bool {
    filter
        .constraints()
        .iter()
        .all(|constraint| constraint_matches(doc, constraint))
}

pub fn sort_documents(docs: &mut [Document], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for key in keys {
            let left = field_value(a, &key.field).unwrap_or(&Value::Null);
            let right = field_value(b, &key.field).unwrap_or(&Value::Null);
            let ord = match key.direction {
                SortDirection::Asc => compare_values(left, right),
                SortDirection::Desc => compare_values(right, left),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

pub fn project(mut doc: Document, projection: &Projection) -> Document {
    match projection {
        Projection::All => doc,
        Projection::Include(fields) => {
            let mut projected = Document::new();
            for field in fields {
                let top = field.split('.').next().unwrap_or(field);
                if let Some((key, value)) = doc.remove_entry(top) {
                    projected.insert(key, value);
                }
            }
            projected
        }
        Projection::Exclude(fields) => {
            for field in fields {
                doc.remove(field);
            }
            doc
        }
    }
}

pub fn run_query(docs: Vec<Document>, query: &FindQuery) -> Vec<Document> {
    let mut docs: Vec<Document> = docs
        .into_iter()
        .filter(|doc| matches(doc, query.filter()))
        .collect();

    sort_documents(&mut docs, query.sort_keys());

    let skip = usize::try_from(query.skip_count()).unwrap_or(usize::MAX);
    let take = query
        .limit_count()
        .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
        .unwrap_or(usize::MAX);

    docs.into_iter()
        .skip(skip)
        .take(take)
        .map(|doc| project(doc, query.projection()))
        .collect()
}

fn numbers<'d>(group: &'d [Document], field: &'d str) -> impl Iterator<Item = &'d Value> + 'd {
    group
        .iter()
        .filter_map(move |doc| field_value(doc, field))
        .filter(|v| v.is_number())
}

fn accumulate(group: &[Document], accumulator: &Accumulator) -> Value {
    match accumulator {
        Accumulator::Count => Value::from(group.len() as u64),
        Accumulator::Sum(field) => {
            let values: Vec<&Value> = numbers(group, field).collect();
            if values.iter().all(|v| v.is_i64() || v.is_u64()) {
                Value::from(values.iter().filter_map(|v| v.as_i64()).sum::<i64>())
            } else {
                Value::from(values.iter().filter_map(|v| v.as_f64()).sum::<f64>())
            }
        }
        Accumulator::Avg(field) => {
            let values: Vec<f64> = numbers(group, field).filter_map(Value::as_f64).collect();
            if values.is_empty() {
                Value::Null
            } else {
                Value::from(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        Accumulator::Min(field) => group
            .iter()
            .filter_map(|doc| field_value(doc, field))
            .filter(|v| !v.is_null())
            .min_by(|a, b| compare_values(a, b))
            .cloned()
            .unwrap_or(Value::Null),
        Accumulator::Max(field) => group
            .iter()
            .filter_map(|doc| field_value(doc, field))
            .filter(|v| !v.is_null())
            .max_by(|a, b| compare_values(a, b))
            .cloned()
            .unwrap_or(Value::Null),
        Accumulator::Push(field) => Value::Array(
            group
                .iter()
                .filter_map(|doc| field_value(doc, field))
                .cloned()
                .collect(),
        ),
    }
}

fn key_of(doc: &Document, key: &GroupKey) -> Value {
    match key {
        GroupKey::Field(field) => field_value(doc, field).cloned().unwrap_or(Value::Null),
        GroupKey::Month(field) => field_value(doc, field)
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
            .map(|ts| Value::from(ts.month()))
            .unwrap_or(Value::Null),
    }
}

fn unwind(docs: Vec<Document>, field: &str) -> Vec<Document> {
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        match doc.get(field).cloned() {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                for item in items {
                    let mut copy = doc.clone();
                    copy.insert(field.to_string(), item);
                    out.push(copy);
                }
            }
            Some(_) => out.push(doc),
        }
    }
    out
}

fn group_documents(
    docs: Vec<Document>,
    key: &GroupKey,
    accumulators: &[(String, Accumulator)],
) -> Vec<Document> {
    // Groups keep first-seen order
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(Value, Vec<Document>)> = Vec::new();

    for doc in docs {
        let group_key = key_of(&doc, key);
        let slot = *index.entry(group_key.to_string()).or_insert_with(|| {
            groups.push((group_key.clone(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(doc);
    }

    groups
        .into_iter()
        .map(|(group_key, members)| {
            let mut out = Document::new();
            out.insert(GROUP_KEY_FIELD.to_string(), group_key);
            for (name, accumulator) in accumulators {
                out.insert(name.clone(), accumulate(&members, accumulator));
            }
            out
        })
        .collect()
}

pub fn run_pipeline(docs: Vec<Document>, pipeline: &Pipeline) -> Vec<Document> {
    let mut docs = docs;
    for stage in pipeline.stages() {
        docs = match stage {
            Stage::Match(filter) => docs.into_iter().filter(|d| matches(d, filter)).collect(),
            Stage::Unwind(field) => unwind(docs, field),
            Stage::Group { key, accumulators } => group_documents(docs, key, accumulators),
            Stage::Sort(keys) => {
                sort_documents(&mut docs, keys);
                docs
            }
            Stage::Limit(n) => {
                docs.truncate(usize::try_from(*n).unwrap_or(usize::MAX));
                docs
            }
        };
    }
    docs
}
