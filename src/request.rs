//! Host independent view of an edge request, shaped like the CDN event
//! record: headers are keyed by lowercase name and keep every
//! `{key, value}` occurrence.

use crate::cookies::SessionCookies;
use crate::responses::EdgeResponse;
use indexmap::map::Entry;
use indexmap::IndexMap;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    pub value: String,
}

pub type Headers = BTreeMap<String, Vec<Header>>;

pub(crate) fn header_values<'a>(headers: &'a Headers, name: &str) -> impl Iterator<Item = &'a str> + 'a {
    headers
        .get(&name.to_ascii_lowercase())
        .into_iter()
        .flatten()
        .map(|header| header.value.as_str())
}

pub(crate) fn push_header(headers: &mut Headers, name: &str, value: impl Into<String>) {
    headers
        .entry(name.to_ascii_lowercase())
        .or_default()
        .push(Header {
            key: name.to_string(),
            value: value.into(),
        });
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRequest {
    #[serde(default)]
    pub client_ip: String,
    #[serde(default)]
    pub method: String,
    pub uri: String,
    #[serde(default)]
    pub querystring: String,
    #[serde(default)]
    pub headers: Headers,
}

impl EdgeRequest {
    pub fn new(method: &str, uri: &str, querystring: &str) -> Self {
        Self {
            client_ip: String::new(),
            method: method.to_string(),
            uri: uri.to_string(),
            querystring: querystring.to_string(),
            headers: Headers::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        push_header(&mut self.headers, name, value);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_all(name).next()
    }

    pub fn header_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        header_values(&self.headers, name)
    }
}

/// What a handler decided: let the (possibly rewritten) request reach the
/// origin, or answer the client directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Forward(EdgeRequest),
    Respond(EdgeResponse),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
    Single(String),
    Multiple(Vec<String>),
}

impl QueryValue {
    /// The value when the key occurred exactly once.
    pub fn as_single(&self) -> Option<&str> {
        match self {
            QueryValue::Single(value) => Some(value),
            QueryValue::Multiple(_) => None,
        }
    }
}

/// Keys stay in arrival order.
pub type Query = IndexMap<String, QueryValue>;

// Everything `encodeURIComponent` escapes, so browser-side libraries read the same values back.
pub(crate) const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Decodes a raw querystring; repeated keys collect into a list.
pub fn parse_query(raw: &str) -> Query {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(raw).unwrap_or_default();
    let mut query = Query::new();
    for (key, value) in pairs {
        match query.entry(key) {
            Entry::Vacant(entry) => {
                entry.insert(QueryValue::Single(value));
            }
            Entry::Occupied(mut entry) => {
                let values = match entry.get().clone() {
                    QueryValue::Single(first) => vec![first, value],
                    QueryValue::Multiple(mut values) => {
                        values.push(value);
                        values
                    }
                };
                entry.insert(QueryValue::Multiple(values));
            }
        }
    }
    query
}

/// Re-encodes a parsed query in arrival order, spaces as `%20`.
pub fn stringify_query(query: &Query) -> String {
    let encode = |key: &str, value: &str| {
        format!(
            "{}={}",
            utf8_percent_encode(key, URI_COMPONENT),
            utf8_percent_encode(value, URI_COMPONENT)
        )
    };
    query
        .iter()
        .flat_map(|(key, value)| match value {
            QueryValue::Single(value) => vec![encode(key, value)],
            QueryValue::Multiple(values) => values.iter().map(|value| encode(key, value)).collect(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// The parsed snapshot the auth handlers reason about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestData {
    pub host: String,
    pub cookies: SessionCookies,
    pub querystring: Query,
    pub path: String,
}
