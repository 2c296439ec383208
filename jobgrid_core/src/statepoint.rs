//! State points and their canonical byte encoding.
//!
//! A state point is the immutable key-value metadata that identifies a job.
//! Hashing its canonical encoding yields the job's id, so the encoding must be
//! fully deterministic:
//!
//! - mapping keys are sorted by byte order (two state points with the same
//!   content but different insertion order encode identically),
//! - list order is preserved,
//! - every value carries an unambiguous type tag with a length-prefixed or
//!   terminated payload.
//!
//! Integers and floats use distinct tags: `i4;` vs the raw bit pattern of
//! `4.0`. `{"a": 1}` and `{"a": 1.0}` are therefore different jobs. This is a
//! compatibility contract, not an accident; collapsing the two would silently
//! re-identify every float-bearing job on disk.
//!
//! The encoding starts with [`FORMAT_VERSION`] as a single byte, and is
//! versioned together with the digest algorithm (see the `id` module).

use crate::error::{Error, Result};
use crate::id::{FORMAT_VERSION, JobId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Immutable key-value metadata identifying a job.
///
/// Backed by a `serde_json::Map`, which (without the `preserve_order`
/// feature) keeps keys sorted, so JSON serialization is canonical too.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatePoint(Map<String, Value>);

impl StatePoint {
    /// Create an empty state point.
    pub fn new() -> Self {
        StatePoint(Map::new())
    }

    /// Create a state point from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(StatePoint(map)),
            other => Err(Error::encoding(format!(
                "State point must be a JSON object, got {}",
                value_kind_name(&other)
            ))),
        }
    }

    /// Parse a state point from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Look up a top-level key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Number of top-level keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the state point has no keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Access the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Canonical byte encoding: version byte followed by the tagged encoding
    /// of the top-level mapping.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.push(FORMAT_VERSION as u8);
        encode_map(&self.0, &mut out)?;
        Ok(out)
    }

    /// Compute the job id: BLAKE3 over the canonical bytes.
    pub fn id(&self) -> Result<JobId> {
        Ok(JobId::hash_bytes(&self.canonical_bytes()?))
    }

    /// Compact JSON text with sorted keys, as stored in the statepoint file.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }
}

impl FromIterator<(String, Value)> for StatePoint {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        StatePoint(iter.into_iter().collect())
    }
}

impl fmt::Debug for StatePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StatePoint({})", Value::Object(self.0.clone()))
    }
}

/// Encode a single value with its type tag.
fn encode_value(value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match value {
        Value::Null => out.push(b'n'),
        Value::Bool(true) => out.push(b't'),
        Value::Bool(false) => out.push(b'f'),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                out.push(b'i');
                out.extend_from_slice(i.to_string().as_bytes());
                out.push(b';');
            } else if let Some(u) = n.as_u64() {
                out.push(b'i');
                out.extend_from_slice(u.to_string().as_bytes());
                out.push(b';');
            } else if let Some(d) = n.as_f64() {
                // Bit-exact: floats never collide with integers, and distinct
                // representations of the same numeric value stay distinct.
                out.push(b'd');
                out.extend_from_slice(format!("{:016x}", d.to_bits()).as_bytes());
            } else {
                return Err(Error::encoding(format!("Unencodable number: {}", n)));
            }
        }
        Value::String(s) => encode_str(s, out),
        Value::Array(items) => {
            out.push(b'l');
            for item in items {
                encode_value(item, out)?;
            }
            out.push(b'e');
        }
        Value::Object(map) => encode_map(map, out)?,
    }
    Ok(())
}

/// Encode a mapping: `m` + sorted (key, value) pairs + `e`.
fn encode_map(map: &Map<String, Value>, out: &mut Vec<u8>) -> Result<()> {
    out.push(b'm');
    // serde_json::Map iterates in sorted key order (BTreeMap-backed), which
    // is exactly the canonical order. Assert the invariant in debug builds.
    debug_assert!(map.keys().is_sorted());
    for (key, value) in map {
        encode_str(key, out);
        encode_value(value, out)?;
    }
    out.push(b'e');
    Ok(())
}

/// Encode a string: `s<len>:<bytes>`.
fn encode_str(s: &str, out: &mut Vec<u8>) {
    out.push(b's');
    out.extend_from_slice(s.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(s.as_bytes());
}

/// Human-readable name of a JSON value's kind, for error messages.
pub(crate) fn value_kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}
