// save_document.rs — the save document and its version stamp

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};

use crate::save_error::SaveError;

/// Bumped whenever the document layout changes incompatibly.
pub const SAVE_FORMAT_VERSION: u64 = 1;

/// Build string stamped into every save.
pub const ENGINE_VERSION: &str = concat!("q2save ", env!("CARGO_PKG_VERSION"));

/// Root object of a save. Top-level keys keep insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveDocument {
    root: Map<String, Value>,
}

impl SaveDocument {
    pub fn new() -> Self {
        SaveDocument::default()
    }

    pub fn parse(text: &str) -> Result<Self, SaveError> {
        let value: Value = serde_json::from_str(text).map_err(|e| SaveError::Parse(e.to_string()))?;
        SaveDocument::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, SaveError> {
        match value {
            Value::Object(root) => Ok(SaveDocument { root }),
            _ => Err(SaveError::structural("", "save document root is not an object")),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.root.insert(key.to_string(), value);
    }

    pub fn root(&self) -> &Map<String, Value> {
        &self.root
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.root)
    }

    /// Tab-indented text.
    pub fn to_json_string(&self) -> Result<String, SaveError> {
        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"\t"));
        self.root.serialize(&mut ser).map_err(|e| SaveError::Parse(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| SaveError::Parse(e.to_string()))
    }

    // ============================================================
    // Metadata
    // ============================================================

    pub fn write_metadata(&mut self) {
        self.insert("save_version", Value::from(SAVE_FORMAT_VERSION));
        self.insert("engine_version", Value::from(ENGINE_VERSION));
    }

    /// Checks the version stamp. Returns the list of mismatches (empty when
    /// the document is compatible). In strict mode any mismatch is an error.
    pub fn validate_metadata(&self, context: &str, strict: bool) -> Result<Vec<String>, SaveError> {
        let mut failures = Vec::new();

        match self.get("save_version") {
            Some(v) => match v.as_u64() {
                Some(SAVE_FORMAT_VERSION) => {}
                Some(found) => failures.push(format!(
                    "expected save version {SAVE_FORMAT_VERSION} but found {found}"
                )),
                None => failures.push(format!("save_version is not an unsigned integer: {v}")),
            },
            None => failures.push("save_version is missing".to_string()),
        }

        match self.get("engine_version") {
            Some(v) => match v.as_str() {
                Some(ENGINE_VERSION) => {}
                Some(found) => failures.push(format!(
                    "expected engine version {ENGINE_VERSION} but found {found}"
                )),
                None => failures.push(format!("engine_version is not a string: {v}")),
            },
            None => failures.push("engine_version is missing".to_string()),
        }

        if failures.is_empty() {
            return Ok(failures);
        }
        if strict {
            return Err(SaveError::Version { context: context.to_string(), message: failures.join("; ") });
        }
        for f in &failures {
            log::warn!("{context} save: {f}");
        }
        Ok(failures)
    }
}
