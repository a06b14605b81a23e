#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Plain(String),
    // `key[token]=value`
    Suffixed { token: String, value: String },
}

// One request's raw query parameters, in arrival order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryRequest {
    params: Vec<(String, ParamValue)>,
}

impl QueryRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut request = Self::new();
        for (key, value) in pairs {
            request.push(key.as_ref(), value);
        }
        request
    }

    pub fn push(&mut self, raw_key: &str, value: impl Into<String>) {
        let value = value.into();
        let entry = match split_suffix(raw_key) {
            Some((key, token)) => (
                key.to_string(),
                ParamValue::Suffixed {
                    token: token.to_string(),
                    value,
                },
            ),
            None => (raw_key.to_string(), ParamValue::Plain(value)),
        };
        self.params.push(entry);
    }

    // Replaces every value of `key`
    pub fn set(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.retain(|(k, _)| k != key);
        self.params
            .push((key.to_string(), ParamValue::Plain(value.into())));
        self
    }

    // Last plain value wins when a key is repeated
    pub fn last(&self, key: &str) -> Option<&str> {
        self.params.iter().rev().find_map(|(k, v)| match v {
            ParamValue::Plain(value) if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn params(&self) -> &[(String, ParamValue)] {
        &self.params
    }
}

fn split_suffix(raw_key: &str) -> Option<(&str, &str)> {
    let inner = raw_key.strip_suffix(']')?;
    let open = inner.find('[')?;
    if open == 0 {
        return None;
    }
    Some((&inner[..open], &inner[open + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_bracket_suffix() {
        assert_eq!(split_suffix("duration[gte]"), Some(("duration", "gte")));
        assert_eq!(split_suffix("price[$ne]"), Some(("price", "$ne")));
        assert_eq!(split_suffix("[gte]"), None);
        assert_eq!(split_suffix("duration"), None);
        assert_eq!(split_suffix("duration[gte"), None);
    }

    #[test]
    fn last_plain_value_wins() {
        let request = QueryRequest::from_pairs([("sort", "price"), ("sort", "-duration")]);
        assert_eq!(request.last("sort"), Some("-duration"));
        assert_eq!(request.last("page"), None);
    }
}
