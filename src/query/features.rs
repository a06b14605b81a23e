use serde_json::{Map, Value};

use crate::query::{
    Filter, FindQuery, ParamValue, Projection, QueryRequest, RangeOp, SortKey,
};

pub const RESERVED_KEYS: [&str; 4] = ["page", "sort", "limit", "fields"];

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 100;
pub const DEFAULT_SORT_FIELD: &str = "createdAt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub skip: u64,
}

impl Pagination {
    // Absent, non-numeric and zero values fall back to the defaults
    pub fn from_request(request: &QueryRequest, max_limit: Option<u64>) -> Self {
        let page = positive_int(request.last("page")).unwrap_or(DEFAULT_PAGE);
        let mut limit = positive_int(request.last("limit")).unwrap_or(DEFAULT_LIMIT);
        if let Some(max) = max_limit {
            limit = limit.min(max.max(1));
        }

        Self {
            page,
            limit,
            skip: (page - 1).saturating_mul(limit),
        }
    }
}

fn positive_int(raw: Option<&str>) -> Option<u64> {
    raw?.trim().parse::<u64>().ok().filter(|n| *n > 0)
}

/// Refines a base [`FindQuery`] from request parameters.
///
/// Steps chain as `filter().sort().limit_fields().paginate()`. None of them
/// fail: bad input degrades to the defaults.
pub struct ApiFeatures<'a> {
    query: FindQuery,
    request: &'a QueryRequest,
    max_limit: Option<u64>,
    repeatable: Option<&'a [&'a str]>,
}

impl<'a> ApiFeatures<'a> {
    pub fn new(query: FindQuery, request: &'a QueryRequest) -> Self {
        Self {
            query,
            request,
            max_limit: None,
            repeatable: None,
        }
    }

    pub fn with_max_limit(mut self, max_limit: u64) -> Self {
        self.max_limit = Some(max_limit);
        self
    }

    // Only these fields turn repeated values into `AnyOf`; the rest keep the last value
    pub fn with_repeatable(mut self, fields: &'a [&'a str]) -> Self {
        self.repeatable = Some(fields);
        self
    }

    pub fn filter(mut self) -> Self {
        self.query = self
            .query
            .find(build_filter(self.request, self.repeatable));
        self
    }

    pub fn sort(mut self) -> Self {
        let keys = self
            .request
            .last("sort")
            .map(SortKey::parse_list)
            .filter(|keys| !keys.is_empty())
            .unwrap_or_else(|| vec![SortKey::desc(DEFAULT_SORT_FIELD)]);

        self.query = self.query.sort(keys);
        self
    }

    pub fn limit_fields(mut self) -> Self {
        let projection = match self.request.last("fields") {
            Some(raw) => Projection::include_list(raw),
            None => Projection::without_version(),
        };

        self.query = self.query.select(projection);
        self
    }

    pub fn paginate(mut self) -> Self {
        let pagination = Pagination::from_request(self.request, self.max_limit);
        self.query = self.query.skip(pagination.skip).limit(pagination.limit);
        self
    }

    pub fn into_query(self) -> FindQuery {
        self.query
    }

    pub fn translate(self) -> FindQuery {
        self.filter().sort().limit_fields().paginate().into_query()
    }
}

struct FieldParams<'r> {
    field: &'r str,
    plain: Vec<Value>,
    literal: Map<String, Value>,
    ranges: Vec<(RangeOp, Value)>,
}

// Typed walk over the parameters. Only a whole `gte|gt|lte|lt` suffix becomes an operator;
// every other suffix is folded into a literal object compared for equality.
// `repeatable: None` lets every field take several values.
pub fn build_filter(request: &QueryRequest, repeatable: Option<&[&str]>) -> Filter {
    let mut fields: Vec<FieldParams<'_>> = Vec::new();

    for (key, value) in request.params() {
        if RESERVED_KEYS.contains(&key.as_str()) || key.is_empty() {
            continue;
        }

        let idx = match fields.iter().position(|f| f.field == key.as_str()) {
            Some(idx) => idx,
            None => {
                fields.push(FieldParams {
                    field: key.as_str(),
                    plain: Vec::new(),
                    literal: Map::new(),
                    ranges: Vec::new(),
                });
                fields.len() - 1
            }
        };
        let entry = &mut fields[idx];

        match value {
            ParamValue::Plain(v) => entry.plain.push(Value::String(v.clone())),
            ParamValue::Suffixed { token, value } => match RangeOp::from_token(token) {
                Some(op) => entry.ranges.push((op, Value::String(value.clone()))),
                None => {
                    tracing::warn!(
                        "Treating unsupported operator '{}' on '{}' as a literal",
                        token,
                        key
                    );
                    entry
                        .literal
                        .insert(token.clone(), Value::String(value.clone()));
                }
            },
        }
    }

    let mut filter = Filter::new();
    for params in fields {
        let FieldParams {
            field,
            mut plain,
            literal,
            ranges,
        } = params;

        let many = repeatable.is_none_or(|fields| fields.contains(&field));
        match plain.len() {
            0 => {}
            1 => filter = filter.eq(field, plain.remove(0)),
            _ if many => filter = filter.any_of(field, plain),
            _ => {
                if let Some(last) = plain.pop() {
                    filter = filter.eq(field, last);
                }
            }
        }
        if !literal.is_empty() {
            filter = filter.eq(field, Value::Object(literal));
        }
        for (op, value) in ranges {
            filter = filter.range(field, op, value);
        }
    }

    filter
}
