//! Status and identifier extraction from loosely structured responses.
//!
//! The remote API is inconsistent about where it puts things: ids come
//! back as `ser_id`, `service_id` or `id`, and poll endpoints wrap the
//! resource under a single top-level key that is itself a generated id.
//! Extraction makes the field priority explicit: candidates are tried in
//! order against the top level, and if none match and the body has
//! exactly one top-level key, the same list is retried one level down.
//!
//! Extraction never fails. A missing or unusable field is absence, and
//! callers decide whether absence is fatal.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Where to look for a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldPath {
    /// A named field. Strings are taken verbatim, numbers and booleans
    /// as their JSON text. Empty strings, nulls, arrays and objects do
    /// not match.
    Field(String),
    /// The single dynamic top-level key itself. Only considered at the
    /// top level of the body.
    WrapperKey,
}

impl FieldPath {
    /// Creates a named-field candidate.
    #[must_use]
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    /// Creates named-field candidates, in priority order.
    #[must_use]
    pub fn fields(names: &[&str]) -> Vec<Self> {
        names.iter().map(|name| Self::field(*name)).collect()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, "{name}"),
            Self::WrapperKey => write!(f, "<wrapper key>"),
        }
    }
}

/// The id and status found in a body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// The identifier, if any candidate matched.
    pub id: Option<String>,
    /// The status, if any candidate matched.
    pub status: Option<String>,
}

/// Extracts an id and a status from a response body.
#[must_use]
pub fn extract(body: &Value, id_candidates: &[FieldPath], status_candidates: &[FieldPath]) -> Extraction {
    Extraction {
        id: find(body, id_candidates),
        status: find(body, status_candidates),
    }
}

/// Finds the first matching candidate, descending one level if needed.
#[must_use]
pub fn find(body: &Value, candidates: &[FieldPath]) -> Option<String> {
    let object = body.as_object()?;
    if let Some(found) = first_match(object, candidates, true) {
        return Some(found);
    }
    let (_, inner) = single_entry(object)?;
    first_match(inner.as_object()?, candidates, false)
}

/// Extracts named fields, each with the same one-level-descent rule.
///
/// Fields that match nowhere are left out of the result.
#[must_use]
pub fn extract_fields<'a>(body: &Value, names: impl IntoIterator<Item = &'a str>) -> BTreeMap<String, String> {
    names
        .into_iter()
        .filter_map(|name| {
            find(body, &[FieldPath::field(name)]).map(|value| (name.to_string(), value))
        })
        .collect()
}

fn first_match(object: &Map<String, Value>, candidates: &[FieldPath], top_level: bool) -> Option<String> {
    candidates.iter().find_map(|candidate| match candidate {
        FieldPath::Field(name) => object.get(name).and_then(scalar_text),
        FieldPath::WrapperKey if top_level => single_entry(object).map(|(key, _)| key.clone()),
        FieldPath::WrapperKey => None,
    })
}

fn single_entry(object: &Map<String, Value>) -> Option<(&String, &Value)> {
    if object.len() == 1 {
        object.iter().next()
    } else {
        None
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
