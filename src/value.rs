//! Loosely typed caller values.
//!
//! Attribute maps and modification groups arrive as tables whose keys may be
//! names or positional indices and whose values may be of any shape. The
//! change-set builder decides what is acceptable; this module only models it.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Table(Table),
}

impl Value {
    /// Short type name used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::Bytes(_) => "string",
            Value::List(_) | Value::Table(_) => "table",
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Convert a YAML document node. Nulls have no counterpart and are dropped.
    pub fn from_yaml(node: serde_yaml::Value) -> Option<Value> {
        match node {
            serde_yaml::Value::Null => None,
            serde_yaml::Value::Bool(b) => Some(Value::Bool(b)),
            serde_yaml::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Value::Int(i)),
                None => n.as_f64().map(Value::Float),
            },
            serde_yaml::Value::String(s) => Some(Value::Bytes(s.into_bytes())),
            serde_yaml::Value::Sequence(items) => Some(Value::List(
                items.into_iter().filter_map(Value::from_yaml).collect(),
            )),
            serde_yaml::Value::Mapping(map) => {
                let mut table = Table::new();
                for (k, v) in map {
                    let key = match k {
                        serde_yaml::Value::String(s) => Key::Name(s),
                        serde_yaml::Value::Number(n) => match n.as_i64() {
                            Some(i) => Key::Index(i),
                            None => continue,
                        },
                        _ => continue,
                    };
                    if let Some(v) = Value::from_yaml(v) {
                        table.insert(key, v);
                    }
                }
                Some(Value::Table(table))
            }
            serde_yaml::Value::Tagged(tagged) => Value::from_yaml(tagged.value),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Bytes(s.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Bytes(s.into_bytes())
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Table> for Value {
    fn from(t: Table) -> Self {
        Value::Table(t)
    }
}

impl From<Vec<&str>> for Value {
    fn from(items: Vec<&str>) -> Self {
        Value::List(items.into_iter().map(Value::from).collect())
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items.into_iter().map(Value::from).collect())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Name(String),
    /// Positional element, 1-based.
    Index(i64),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(n) => f.write_str(n),
            Key::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// Insertion-ordered map from [`Key`] to [`Value`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    entries: Vec<(Key, Value)>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of a named insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(Key::Name(name.into()), value.into());
        self
    }

    /// Builder form of appending a positional element.
    pub fn push(mut self, value: impl Into<Value>) -> Self {
        let next = self
            .entries
            .iter()
            .filter_map(|(k, _)| match k {
                Key::Index(i) => Some(*i),
                _ => None,
            })
            .max()
            .unwrap_or(0)
            + 1;
        self.insert(Key::Index(next), value.into());
        self
    }

    /// Insert or replace, keeping the original position of a replaced key.
    pub fn insert(&mut self, key: Key, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_name(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find_map(|(k, v)| match k {
            Key::Name(n) if n == name => Some(v),
            _ => None,
        })
    }

    pub fn get_index(&self, index: i64) -> Option<&Value> {
        self.get(&Key::Index(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
