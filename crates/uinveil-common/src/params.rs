//! Request parameter maps.
//!
//! Materials, extra parameters and mixed parameters all share one shape: an
//! ordered map from parameter name to a primitive JSON value. Keeping the value
//! type closed means every map has exactly one JSON rendering and one
//! query-string rendering.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single primitive parameter value.
///
/// Nested objects and arrays are not representable; a request body containing
/// them is rejected before it reaches the policy engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// A JSON string.
    String(String),
    /// A JSON number, kept in its original textual precision.
    Number(serde_json::Number),
    /// A JSON boolean.
    Bool(bool),
    /// JSON `null`.
    Null,
}

/// Ordered parameter map used for materials, extras and mixed sets.
pub type Params = BTreeMap<String, ParamValue>;

impl ParamValue {
    /// Whether this value can act as a user identifier.
    ///
    /// Only strings and numbers qualify.
    #[must_use]
    pub const fn is_identifier(&self) -> bool {
        matches!(self, Self::String(_) | Self::Number(_))
    }

    /// Converts into the equivalent `serde_json::Value`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Number(n) => serde_json::Value::Number(n.clone()),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Null => serde_json::Value::Null,
        }
    }
}

/// Renders the value the way it appears in a query string.
impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Null => f.write_str("null"),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<u64> for ParamValue {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Converts a parameter map into a JSON object.
#[must_use]
pub fn params_to_json(params: &Params) -> serde_json::Value {
    serde_json::Value::Object(
        params
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// Parses an `application/x-www-form-urlencoded` string into string parameters.
///
/// A repeated key keeps its last value. A leading `?` is ignored.
#[must_use]
pub fn parse_query(query: &str) -> Params {
    let query = query.strip_prefix('?').unwrap_or(query);
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), ParamValue::String(v.into_owned())))
        .collect()
}

/// Serializes `(name, value)` pairs as a form-urlencoded query string.
pub fn encode_query<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, String)>,
{
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (name, value) in pairs {
        serializer.append_pair(name, &value);
    }
    serializer.finish()
}

/// Serializes a parameter map as a form-urlencoded query string.
#[must_use]
pub fn params_to_query(params: &Params) -> String {
    encode_query(params.iter().map(|(k, v)| (k.as_str(), v.to_string())))
}
