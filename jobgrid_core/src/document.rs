//! Mutable per-job documents.
//!
//! A document is a string-keyed JSON map stored next to a job's state point
//! but with the opposite lifecycle: the state point is write-once, the
//! document may be rewritten any number of times. Keys may use dotted paths
//! (`"analysis.rdf.bins"`) to address nested objects.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Mutable key-value store attached to a job.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Document(Map::new())
    }

    /// Create a document from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Document(map)),
            other => Err(Error::encoding(format!(
                "Document must be a JSON object, got {}",
                crate::statepoint::value_kind_name(&other)
            ))),
        }
    }

    /// Parse a document from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Compact JSON text with sorted keys.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// Look up a value by dotted path.
    ///
    /// `get("a.b")` descends into the object stored at `"a"`. Returns `None`
    /// if any segment is missing or a non-object is hit mid-path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Set a value by dotted path, creating intermediate objects as needed.
    ///
    /// Fails if an intermediate segment holds a non-object value.
    pub fn set(&mut self, path: &str, value: Value) -> Result<()> {
        let mut segments: Vec<&str> = path.split('.').collect();
        let last = segments.pop().ok_or_else(|| Error::encoding("Empty document key"))?;
        if last.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(Error::encoding(format!("Invalid document key: {:?}", path)));
        }

        let mut current = &mut self.0;
        for segment in segments {
            let slot = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            current = slot.as_object_mut().ok_or_else(|| {
                Error::encoding(format!(
                    "Cannot descend into non-object at {:?} in key {:?}",
                    segment, path
                ))
            })?;
        }
        current.insert(last.to_string(), value);
        Ok(())
    }

    /// Remove a value by dotted path. Returns the removed value, if any.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let mut segments: Vec<&str> = path.split('.').collect();
        let last = segments.pop()?;

        let mut current = &mut self.0;
        for segment in segments {
            current = current.get_mut(segment)?.as_object_mut()?;
        }
        current.remove(last)
    }

    /// Number of top-level keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the document has no keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Access the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Document({})", Value::Object(self.0.clone()))
    }
}
