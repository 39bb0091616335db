//! Query-string parameters and cache keys.
//!
//! `QueryParams` keeps insertion order for the wire (the URL looks the way
//! the caller built it). `CacheKey` sorts, so logically equal parameter sets
//! always map to the same cache entry.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use url::form_urlencoded;

use crate::error::ApiError;

/// A primitive query-string value.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryValue::Str(value) => f.write_str(value),
            QueryValue::Int(value) => write!(f, "{value}"),
            QueryValue::Float(value) => write!(f, "{value}"),
            QueryValue::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Str(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Str(value)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Int(value)
    }
}

impl From<u32> for QueryValue {
    fn from(value: u32) -> Self {
        QueryValue::Int(i64::from(value))
    }
}

impl From<f64> for QueryValue {
    fn from(value: f64) -> Self {
        QueryValue::Float(value)
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        QueryValue::Bool(value)
    }
}

/// Flat, ordered key → primitive mapping. Absent values are never stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    pairs: Vec<(String, QueryValue)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, key: &str, value: impl Into<QueryValue>) -> Self {
        self.pairs.push((key.to_string(), value.into()));
        self
    }

    /// Like `insert`, but `None` leaves the parameter out entirely.
    pub fn insert_opt<V: Into<QueryValue>>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.insert(key, value),
            None => self,
        }
    }

    /// Flatten a params struct. `null` fields are omitted; nested arrays and
    /// objects are rejected because the wire format is flat.
    pub fn from_serialize<P: Serialize>(params: &P) -> Result<Self, ApiError> {
        let value =
            serde_json::to_value(params).map_err(|e| ApiError::Serialization(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(ApiError::Serialization(
                "query parameters must serialize to an object".to_string(),
            ));
        };

        let mut out = Self::new();
        for (key, value) in map {
            let value = match value {
                Value::Null => continue,
                Value::String(s) => QueryValue::Str(s),
                Value::Bool(b) => QueryValue::Bool(b),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => QueryValue::Int(i),
                    None => QueryValue::Float(n.as_f64().unwrap_or_default()),
                },
                Value::Array(_) | Value::Object(_) => {
                    return Err(ApiError::Serialization(format!(
                        "query parameter `{key}` is not a primitive"
                    )))
                }
            };
            out.pairs.push((key, value));
        }
        Ok(out)
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        self.pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryValue)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Form-urlencoded query string in insertion order.
    pub fn to_query_string(&self) -> String {
        encode(self.pairs.iter().map(|(k, v)| (k.clone(), v.to_string())))
    }

    /// Form-urlencoded query string sorted by key, then value.
    pub fn canonical(&self) -> String {
        let mut pairs: Vec<(String, String)> =
            self.pairs.iter().map(|(k, v)| (k.clone(), v.to_string())).collect();
        pairs.sort();
        encode(pairs.into_iter())
    }
}

fn encode(pairs: impl Iterator<Item = (String, String)>) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(&key, &value);
    }
    serializer.finish()
}

/// Deterministic identifier of one logical read query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(endpoint: &str, params: Option<&QueryParams>) -> Self {
        match params {
            Some(params) if !params.is_empty() => {
                Self(format!("{endpoint}?{}", params.canonical()))
            }
            _ => Self(endpoint.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CacheKey {
    fn from(endpoint: &str) -> Self {
        Self::new(endpoint, None)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Search {
        specialization: Option<String>,
        search: Option<String>,
        days: Option<u32>,
    }

    #[test]
    fn insert_opt_omits_absent_values() {
        let params = QueryParams::new()
            .insert("startDate", "2025-01-01")
            .insert_opt::<&str>("status", None)
            .insert_opt("days", Some(7u32));
        assert_eq!(params.len(), 2);
        assert_eq!(params.to_query_string(), "startDate=2025-01-01&days=7");
    }

    #[test]
    fn from_serialize_skips_nulls() {
        let params = QueryParams::from_serialize(&Search {
            specialization: Some("Rinoplastia".to_string()),
            search: None,
            days: Some(3),
        })
        .unwrap();
        assert!(params.get("search").is_none());
        assert_eq!(params.get("days"), Some(&QueryValue::Int(3)));
    }

    #[test]
    fn from_serialize_rejects_nested_values() {
        let err = QueryParams::from_serialize(&serde_json::json!({ "ids": [1, 2] })).unwrap_err();
        assert!(matches!(err, ApiError::Serialization(_)));
    }

    #[test]
    fn query_values_render_like_js_primitives() {
        let params = QueryParams::new()
            .insert("upcoming", true)
            .insert("page", 0i64)
            .insert("ratio", 1.5);
        assert_eq!(params.to_query_string(), "upcoming=true&page=0&ratio=1.5");
    }

    #[test]
    fn cache_key_ignores_insertion_order() {
        let a = QueryParams::new()
            .insert("startDate", "2025-01-01")
            .insert("endDate", "2025-01-31")
            .insert("status", "pending");
        let b = QueryParams::new()
            .insert("status", "pending")
            .insert("endDate", "2025-01-31")
            .insert("startDate", "2025-01-01");
        assert_ne!(a.to_query_string(), b.to_query_string());
        assert_eq!(
            CacheKey::new("/api/admin/appointments/range", Some(&a)),
            CacheKey::new("/api/admin/appointments/range", Some(&b))
        );
    }

    #[test]
    fn cache_key_without_params_is_the_endpoint() {
        assert_eq!(
            CacheKey::new("/api/admin/doctors", Some(&QueryParams::new())).as_str(),
            "/api/admin/doctors"
        );
        assert_eq!(CacheKey::from("/api/admin/doctors").as_str(), "/api/admin/doctors");
    }

    #[test]
    fn cache_key_encodes_reserved_characters() {
        let params = QueryParams::new().insert("search", "Dra. Pérez & co");
        assert_eq!(
            CacheKey::new("/api/patient/doctors", Some(&params)).as_str(),
            "/api/patient/doctors?search=Dra.+P%C3%A9rez+%26+co"
        );
    }
}
