//! Deterministic cache keys for outbound requests.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::http_client::HttpMethod;

/// SHA-256 hex digest identifying one outbound request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestFingerprint(String);

impl RequestFingerprint {
    /// Fingerprint `(method, url, parameters)`.
    ///
    /// `parameters` is the query map for GET and the JSON body for POST; object
    /// keys are sorted before hashing so insertion order never matters.
    pub fn compute(method: HttpMethod, url: &str, parameters: &Value) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(method.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(url.as_bytes());
        hasher.update(b"\n");
        hasher.update(to_canonical_json(parameters).as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RequestFingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialize JSON with object keys sorted and no insignificant whitespace.
pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Null => String::from("null"),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => quote(text),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::Object(map) => {
            let tree: BTreeMap<&String, String> = map
                .iter()
                .map(|(key, value)| (key, to_canonical_json(value)))
                .collect();
            let items: Vec<String> = tree
                .into_iter()
                .map(|(key, value)| format!("{}:{value}", quote(key)))
                .collect();
            format!("{{{}}}", items.join(","))
        }
    }
}

fn quote(text: &str) -> String {
    // Serializing a `str` cannot fail.
    serde_json::to_string(text).unwrap_or_default()
}
