//! Domain primitive types used across the modgraph workspace.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

/// Named output attributes produced by a module instance.
pub type Outputs = BTreeMap<String, Value>;

/// Root input variables, referenced as `var.<name>`.
pub type Variables = BTreeMap<String, Value>;

/// A value flowing through declarations, arguments, and outputs.
///
/// Mappings are ordered by key so that rendering and iteration are
/// deterministic regardless of how a value was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean literal.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// UTF-8 string.
    Str(String),
    /// Ordered sequence.
    List(Vec<Value>),
    /// Mapping from string key to value.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns a short name for the kind of value, used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "number",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Returns the inner mapping if this value is a map.
    #[must_use]
    pub const fn as_map(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the inner string if this value is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the value is a bool, number, or string.
    #[must_use]
    pub const fn is_scalar(&self) -> bool {
        matches!(self, Self::Bool(_) | Self::Int(_) | Self::Str(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(map) => {
                if map.is_empty() {
                    return f.write_str("{}");
                }
                f.write_str("{ ")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key} = {value}")?;
                }
                f.write_str(" }")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Key distinguishing the instances of a multiplicity-expanded module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InstanceKey {
    /// Index produced by `count`.
    Index(u64),
    /// Map key produced by `for_each`.
    Name(String),
}

impl InstanceKey {
    /// Converts a scalar index value into a key.
    ///
    /// Strings become [`InstanceKey::Name`], non-negative integers become
    /// [`InstanceKey::Index`]. Anything else has no key form.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(s) => Some(Self::Name(s.clone())),
            Value::Int(n) => u64::try_from(*n).ok().map(Self::Index),
            _ => None,
        }
    }

    /// Returns the key as it appears in a mapping of instances.
    #[must_use]
    pub fn as_map_key(&self) -> String {
        match self {
            Self::Index(i) => i.to_string(),
            Self::Name(s) => s.clone(),
        }
    }

    /// Returns the key as a value, as seen by a module through `each.key`
    /// or `count.index`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Index(i) => Value::Int(i64::try_from(*i).unwrap_or(i64::MAX)),
            Self::Name(s) => Value::Str(s.clone()),
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Name(s) => write!(f, "{s:?}"),
        }
    }
}

/// Identity of a module instance: declaration name plus optional key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId {
    /// Name of the declaring module.
    pub module: String,
    /// Key for expanded modules, `None` for singletons.
    pub key: Option<InstanceKey>,
}

impl InstanceId {
    /// Identifies the single instance of a non-expanded module.
    #[must_use]
    pub fn singleton(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            key: None,
        }
    }

    /// Identifies one keyed instance of an expanded module.
    #[must_use]
    pub fn keyed(module: impl Into<String>, key: InstanceKey) -> Self {
        Self {
            module: module.into(),
            key: Some(key),
        }
    }

    /// Shorthand for a `for_each` instance keyed by name.
    #[must_use]
    pub fn named(module: impl Into<String>, key: impl Into<String>) -> Self {
        Self::keyed(module, InstanceKey::Name(key.into()))
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}[{key}]", self.module),
            None => f.write_str(&self.module),
        }
    }
}

impl Serialize for InstanceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Lifecycle state of a module instance during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    /// Waiting on at least one dependency.
    Pending,
    /// Every dependency is done; queued for a worker.
    Ready,
    /// A worker is evaluating the instance.
    Running,
    /// Outputs have been recorded.
    Done,
    /// Evaluation failed, or a dependency failed.
    Failed,
}

impl InstanceState {
    /// Whether the instance will not change state again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Ready => write!(f, "ready"),
            Self::Running => write!(f, "running"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_id_display() {
        assert_eq!(InstanceId::singleton("foo").to_string(), "foo");
        assert_eq!(InstanceId::named("bar", "x").to_string(), "bar[\"x\"]");
        assert_eq!(
            InstanceId::keyed("bar", InstanceKey::Index(3)).to_string(),
            "bar[3]"
        );
    }

    #[test]
    fn instance_ids_order_by_module_then_key() {
        let mut ids = vec![
            InstanceId::named("bar", "z"),
            InstanceId::singleton("foo"),
            InstanceId::named("bar", "x"),
        ];
        ids.sort();
        assert_eq!(ids[0], InstanceId::named("bar", "x"));
        assert_eq!(ids[2], InstanceId::singleton("foo"));
    }

    #[test]
    fn key_from_value() {
        assert_eq!(
            InstanceKey::from_value(&Value::from("x")),
            Some(InstanceKey::Name("x".into()))
        );
        assert_eq!(
            InstanceKey::from_value(&Value::Int(2)),
            Some(InstanceKey::Index(2))
        );
        assert_eq!(InstanceKey::from_value(&Value::Int(-1)), None);
        assert_eq!(InstanceKey::from_value(&Value::Bool(true)), None);
    }

    #[test]
    fn value_display_is_hcl_like() {
        let mut map = BTreeMap::new();
        let _ = map.insert("y".to_string(), Value::Int(3));
        let _ = map.insert("x".to_string(), Value::from("a"));
        assert_eq!(Value::Map(map).to_string(), "{ x = \"a\", y = 3 }");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::Bool(false)]).to_string(),
            "[1, false]"
        );
    }

    #[test]
    fn value_deserializes_from_json() {
        let value: Value =
            serde_json::from_str(r#"{"digest": "d2", "sizes": [1, 2]}"#).expect("deserialize");
        let map = value.as_map().expect("map");
        assert_eq!(map["digest"], Value::from("d2"));
        assert_eq!(map["sizes"], Value::List(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn instance_id_serializes_as_string() {
        let json = serde_json::to_string(&InstanceId::named("bar", "x")).expect("serialize");
        assert_eq!(json, r#""bar[\"x\"]""#);
    }

    #[test]
    fn state_display_and_terminal() {
        assert_eq!(InstanceState::Done.to_string(), "done");
        assert!(InstanceState::Failed.is_terminal());
        assert!(!InstanceState::Running.is_terminal());
    }
}
