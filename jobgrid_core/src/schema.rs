//! Schema inference over heterogeneous documents.
//!
//! Aggregates the shape of many documents or state points into a per-key-path
//! summary: which value types were observed, how often the path occurred, and
//! a small bounded set of example values. Heterogeneity (missing keys,
//! mismatched types across jobs) is reported as a union, never an error.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Cap on stored example values per key path, to bound memory on large
/// workspaces.
pub const EXAMPLE_CAP: usize = 3;

/// The kind of a JSON value, with the same int/float sharp edge as hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    Str,
    List,
    Map,
}

impl ValueKind {
    /// Classify a JSON value.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(n) if n.is_f64() => ValueKind::Float,
            Value::Number(_) => ValueKind::Int,
            Value::String(_) => ValueKind::Str,
            Value::Array(_) => ValueKind::List,
            Value::Object(_) => ValueKind::Map,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "str",
            ValueKind::List => "list",
            ValueKind::Map => "map",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregated shape of one key path across all observed documents.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KeySummary {
    /// Set of value kinds observed at this path.
    pub kinds: BTreeSet<ValueKind>,
    /// How many documents contained this path.
    pub count: usize,
    /// Up to [`EXAMPLE_CAP`] distinct example values.
    pub examples: Vec<Value>,
}

impl KeySummary {
    fn observe(&mut self, value: &Value) {
        self.kinds.insert(ValueKind::of(value));
        self.count += 1;
        if self.examples.len() < EXAMPLE_CAP && !self.examples.contains(value) {
            self.examples.push(value.clone());
        }
    }
}

/// Derived, read-only summary: key path → [`KeySummary`].
///
/// Paths are dotted for nested mappings; list elements aggregate under
/// `path[]` while the list itself records [`ValueKind::List`] at `path`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Schema(BTreeMap<String, KeySummary>);

impl Schema {
    /// Build a schema from a sequence of maps (documents or state points).
    pub fn build<'a, I>(maps: I) -> Self
    where
        I: IntoIterator<Item = &'a Map<String, Value>>,
    {
        let mut builder = SchemaBuilder::new();
        for map in maps {
            builder.add(map);
        }
        builder.finish()
    }

    /// Summary for one key path.
    pub fn get(&self, path: &str) -> Option<&KeySummary> {
        self.0.get(path)
    }

    /// Iterate over (path, summary) pairs in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &KeySummary)> {
        self.0.iter()
    }

    /// Number of distinct key paths.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no key path was observed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (path, summary) in &self.0 {
            let kinds: Vec<&str> = summary.kinds.iter().map(ValueKind::as_str).collect();
            writeln!(
                f,
                "{}: {{{}}} ({} occurrence{})",
                path,
                kinds.join(", "),
                summary.count,
                if summary.count == 1 { "" } else { "s" }
            )?;
        }
        Ok(())
    }
}

/// Incremental schema aggregation.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    paths: BTreeMap<String, KeySummary>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one document or state point into the aggregate.
    pub fn add(&mut self, map: &Map<String, Value>) {
        for (key, value) in map {
            self.observe(key.clone(), value);
        }
    }

    /// Finish aggregation.
    pub fn finish(self) -> Schema {
        Schema(self.paths)
    }

    fn observe(&mut self, path: String, value: &Value) {
        match value {
            Value::Object(nested) => {
                // Nested mappings recurse with dotted paths; the mapping
                // itself is also recorded so heterogenous map-vs-scalar
                // keys show up as a union.
                self.summary(&path).observe(value);
                for (key, nested_value) in nested {
                    self.observe(format!("{}.{}", path, key), nested_value);
                }
            }
            Value::Array(items) => {
                self.summary(&path).observe(value);
                let element_path = format!("{}[]", path);
                for item in items {
                    self.summary(&element_path).observe(item);
                }
            }
            _ => self.summary(&path).observe(value),
        }
    }

    fn summary(&mut self, path: &str) -> &mut KeySummary {
        self.paths.entry(path.to_string()).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test input must be an object"),
        }
    }

    #[test]
    fn test_union_of_heterogeneous_types() {
        let docs = vec![
            obj(json!({"x": 1})),
            obj(json!({"x": "s"})),
            obj(json!({"y": 2})),
        ];
        let schema = Schema::build(docs.iter());

        let x = schema.get("x").unwrap();
        assert_eq!(
            x.kinds,
            BTreeSet::from([ValueKind::Int, ValueKind::Str])
        );
        assert_eq!(x.count, 2);

        let y = schema.get("y").unwrap();
        assert_eq!(y.kinds, BTreeSet::from([ValueKind::Int]));
        assert_eq!(y.count, 1);
    }

    #[test]
    fn test_int_and_float_are_distinct_kinds() {
        let docs = vec![obj(json!({"a": 1})), obj(json!({"a": 1.0}))];
        let schema = Schema::build(docs.iter());
        assert_eq!(
            schema.get("a").unwrap().kinds,
            BTreeSet::from([ValueKind::Int, ValueKind::Float])
        );
    }

    #[test]
    fn test_nested_paths_are_dotted() {
        let docs = vec![obj(json!({"model": {"kind": "lj", "cutoff": 2.5}}))];
        let schema = Schema::build(docs.iter());

        assert!(schema.get("model").unwrap().kinds.contains(&ValueKind::Map));
        assert_eq!(
            schema.get("model.kind").unwrap().kinds,
            BTreeSet::from([ValueKind::Str])
        );
        assert_eq!(
            schema.get("model.cutoff").unwrap().kinds,
            BTreeSet::from([ValueKind::Float])
        );
    }

    #[test]
    fn test_list_elements_aggregate_separately() {
        let docs = vec![obj(json!({"temps": [0.5, 1, "warm"]}))];
        let schema = Schema::build(docs.iter());

        assert_eq!(
            schema.get("temps").unwrap().kinds,
            BTreeSet::from([ValueKind::List])
        );
        assert_eq!(
            schema.get("temps[]").unwrap().kinds,
            BTreeSet::from([ValueKind::Float, ValueKind::Int, ValueKind::Str])
        );
        assert_eq!(schema.get("temps[]").unwrap().count, 3);
    }

    #[test]
    fn test_examples_are_bounded_and_distinct() {
        let mut builder = SchemaBuilder::new();
        for n in 0..10 {
            builder.add(&obj(json!({"n": n % 2})));
        }
        let schema = builder.finish();

        let summary = schema.get("n").unwrap();
        assert_eq!(summary.count, 10);
        // Only two distinct values ever occurred.
        assert_eq!(summary.examples, vec![json!(0), json!(1)]);

        let mut builder = SchemaBuilder::new();
        for n in 0..10 {
            builder.add(&obj(json!({"n": n})));
        }
        let summary_capped = builder.finish();
        assert_eq!(summary_capped.get("n").unwrap().examples.len(), EXAMPLE_CAP);
    }

    #[test]
    fn test_empty_input() {
        let schema = Schema::build(std::iter::empty());
        assert!(schema.is_empty());
    }

    #[test]
    fn test_display_is_sorted_by_path() {
        let docs = vec![obj(json!({"b": 1, "a": {"c": 2}}))];
        let schema = Schema::build(docs.iter());
        let text = schema.to_string();
        let a_pos = text.find("a:").unwrap();
        let ac_pos = text.find("a.c:").unwrap();
        let b_pos = text.find("b:").unwrap();
        assert!(a_pos < ac_pos && ac_pos < b_pos);
    }
}
