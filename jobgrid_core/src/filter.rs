//! State-point filters for selecting jobs.
//!
//! A filter is a set of dotted-key requirements; a state point matches when
//! every requirement is satisfied by an exact value comparison. Nested
//! objects in the filter are flattened into dotted keys, so
//! `{"model": {"kind": "lj"}}` and `{"model.kind": "lj"}` are the same
//! filter, and `{}` matches every job. Values compare with the same int/float
//! sharp edge as hashing: a filter on `1` never matches a stored `1.0`.

use crate::error::{Error, Result};
use crate::statepoint::StatePoint;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// An exact-match selection over state points: dotted key path → required
/// value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter(BTreeMap<String, Value>);

impl Filter {
    /// Create an empty filter, which matches every state point.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a filter from a JSON value, which must be an object.
    ///
    /// Nested objects are flattened into dotted keys; list and scalar values
    /// become exact-match requirements as-is.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => {
                let mut flat = BTreeMap::new();
                flatten(String::new(), map, &mut flat)?;
                Ok(Filter(flat))
            }
            other => Err(Error::encoding(format!(
                "Filter must be a JSON object, got {}",
                crate::statepoint::value_kind_name(&other)
            ))),
        }
    }

    /// Parse a filter from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Number of flattened requirements.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the filter has no requirements (and so matches everything).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether a state point satisfies every requirement.
    pub fn matches(&self, point: &StatePoint) -> bool {
        self.0
            .iter()
            .all(|(path, expected)| lookup(point, path) == Some(expected))
    }
}

/// Flatten nested filter objects into dotted key paths.
fn flatten(
    prefix: String,
    map: Map<String, Value>,
    out: &mut BTreeMap<String, Value>,
) -> Result<()> {
    for (key, value) in map {
        if key.is_empty() || key.split('.').any(|s| s.is_empty()) {
            return Err(Error::encoding(format!("Invalid filter key: {:?}", key)));
        }
        let path = if prefix.is_empty() {
            key
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            // An empty nested object adds no requirement.
            Value::Object(nested) => flatten(path, nested, out)?,
            other => {
                out.insert(path, other);
            }
        }
    }
    Ok(())
}

/// Dotted-path lookup into a state point.
fn lookup<'a>(point: &'a StatePoint, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = point.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::Workspace;
    use serde_json::json;
    use tempfile::TempDir;

    fn sp(value: Value) -> StatePoint {
        StatePoint::from_value(value).unwrap()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = Filter::new();
        assert!(filter.is_empty());
        assert!(filter.matches(&sp(json!({}))));
        assert!(filter.matches(&sp(json!({"T": 300}))));
    }

    #[test]
    fn test_exact_match_on_top_level_key() {
        let filter = Filter::from_json(r#"{"T": 300}"#).unwrap();
        assert!(filter.matches(&sp(json!({"T": 300, "seed": 1}))));
        assert!(!filter.matches(&sp(json!({"T": 301}))));
        assert!(!filter.matches(&sp(json!({"seed": 1}))));
    }

    #[test]
    fn test_multiple_requirements_intersect() {
        let filter = Filter::from_json(r#"{"T": 300, "model": "lj"}"#).unwrap();
        assert!(filter.matches(&sp(json!({"T": 300, "model": "lj", "n": 7}))));
        assert!(!filter.matches(&sp(json!({"T": 300, "model": "hs"}))));
    }

    #[test]
    fn test_nested_and_dotted_filters_are_equivalent() {
        let nested = Filter::from_value(json!({"model": {"kind": "lj"}})).unwrap();
        let dotted = Filter::from_json(r#"{"model.kind": "lj"}"#).unwrap();
        assert_eq!(nested, dotted);

        let point = sp(json!({"model": {"kind": "lj", "cutoff": 2.5}}));
        assert!(nested.matches(&point));
        assert!(dotted.matches(&point));
        assert!(!nested.matches(&sp(json!({"model": {"kind": "hs"}}))));
    }

    #[test]
    fn test_int_and_float_do_not_cross_match() {
        let filter = Filter::from_json(r#"{"a": 1}"#).unwrap();
        assert!(filter.matches(&sp(json!({"a": 1}))));
        assert!(!filter.matches(&sp(json!({"a": 1.0}))));
    }

    #[test]
    fn test_list_values_match_exactly() {
        let filter = Filter::from_value(json!({"steps": [1, 2]})).unwrap();
        assert!(filter.matches(&sp(json!({"steps": [1, 2]}))));
        assert!(!filter.matches(&sp(json!({"steps": [2, 1]}))));
    }

    #[test]
    fn test_empty_nested_object_adds_no_requirement() {
        let filter = Filter::from_value(json!({"model": {}})).unwrap();
        assert!(filter.is_empty());
    }

    #[test]
    fn test_invalid_filters_rejected() {
        assert!(Filter::from_json("[1, 2]").is_err());
        assert!(Filter::from_value(json!({"": 1})).is_err());
        assert!(Filter::from_value(json!({"a..b": 1})).is_err());
    }

    #[test]
    fn test_workspace_find() {
        let temp = TempDir::new().unwrap();
        let ws = Workspace::init(temp.path()).unwrap();

        let mut hot = Vec::new();
        for seed in 0..3 {
            let job = ws.init_job(&sp(json!({"T": 300, "seed": seed}))).unwrap();
            hot.push(*job.id());
        }
        ws.init_job(&sp(json!({"T": 150, "seed": 0}))).unwrap();

        let filter = Filter::from_json(r#"{"T": 300}"#).unwrap();
        let mut expected = hot.clone();
        expected.sort();
        assert_eq!(ws.find(&filter).unwrap(), expected);

        // An empty filter selects every job.
        assert_eq!(ws.find(&Filter::new()).unwrap().len(), 4);
        // No match is an empty result, not an error.
        let none = Filter::from_json(r#"{"T": 999}"#).unwrap();
        assert!(ws.find(&none).unwrap().is_empty());
    }

    #[test]
    fn test_find_ignores_corrupted_jobs() {
        let temp = TempDir::new().unwrap();
        let ws = Workspace::init(temp.path()).unwrap();

        let good = ws.init_job(&sp(json!({"T": 300}))).unwrap();
        let bad = ws.init_job(&sp(json!({"T": 300, "seed": 1}))).unwrap();
        std::fs::write(
            bad.dir().join(crate::workspace::STATEPOINT_FILE),
            r#"{"T":300}"#,
        )
        .unwrap();

        let filter = Filter::from_json(r#"{"T": 300}"#).unwrap();
        assert_eq!(ws.find(&filter).unwrap(), vec![*good.id()]);
    }
}
