use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ALL_DOCS: &str = "_all_docs";
pub const CHANGES: &str = "_changes";
pub const END_SUFFIX: &str = "\u{ffff}";
pub const DESIGN_PREFIX: &str = "_design/";

/// One store path maps to one CouchDB document whose `_id` is the path itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchValueDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub value: Value,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    pub id: String,
    #[serde(default)]
    pub doc: Option<CouchValueDocument>,
}

#[derive(Debug, Deserialize)]
pub struct ChangesResponse {
    pub results: Vec<ChangeRow>,
    pub last_seq: Value,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRow {
    pub id: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub doc: Option<Value>,
}

impl ChangeRow {
    /// Stored value carried by the change, `None` for deletions.
    pub fn value(self) -> Option<Value> {
        if self.deleted {
            return None;
        }
        self.doc
            .and_then(|doc| serde_json::from_value::<CouchValueDocument>(doc).ok())
            .map(|doc| doc.value)
    }
}

/// Percent-encode the separators of a store path so it fits in one URL segment.
pub fn doc_url_segment(path: &str) -> String {
    path.replace('%', "%25").replace('/', "%2F")
}

/// `since` query value accepted by CouchDB, whether the sequence is numeric or opaque.
pub fn seq_param(seq: &Value) -> String {
    match seq {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
