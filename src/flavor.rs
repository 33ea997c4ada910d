//! Output flavor: `regular` returns documents as stored; `nounderscore` exposes `_id` as `id`
//! in responses and accepts `id` in request bodies.

use crate::store::ID_FIELD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Client-facing identifier key under the `nounderscore` flavor.
pub const PLAIN_ID_FIELD: &str = "id";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    #[default]
    Regular,
    NoUnderscore,
}

impl Flavor {
    /// Rename the identifier key of one outgoing document.
    pub fn to_client(self, doc: Map<String, Value>) -> Map<String, Value> {
        match self {
            Flavor::Regular => doc,
            Flavor::NoUnderscore => rename_key(doc, ID_FIELD, PLAIN_ID_FIELD),
        }
    }

    /// Rename the identifier key of one incoming body back to the stored name.
    pub fn from_client(self, body: Map<String, Value>) -> Map<String, Value> {
        match self {
            Flavor::Regular => body,
            Flavor::NoUnderscore => rename_key(body, PLAIN_ID_FIELD, ID_FIELD),
        }
    }

    /// Filter and sort fields name the identifier the way the client sees it.
    pub fn field_from_client(self, field: &str) -> String {
        match self {
            Flavor::NoUnderscore if field == PLAIN_ID_FIELD => ID_FIELD.to_string(),
            _ => field.to_string(),
        }
    }

    /// Convert a list of documents for output.
    pub fn docs_to_client(self, docs: Vec<Map<String, Value>>) -> Value {
        Value::Array(docs.into_iter().map(|d| Value::Object(self.to_client(d))).collect())
    }
}

/// Move `from` to `to` keeping the key first, as document stores print the identifier first.
fn rename_key(mut map: Map<String, Value>, from: &str, to: &str) -> Map<String, Value> {
    let Some(v) = map.remove(from) else {
        return map;
    };
    let mut out = Map::with_capacity(map.len() + 1);
    out.insert(to.to_string(), v);
    for (k, v) in map {
        if k != to {
            out.insert(k, v);
        }
    }
    out
}
