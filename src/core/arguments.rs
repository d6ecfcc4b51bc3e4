use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::{OrchestrationError, Result};

/// Keyword arguments handed to a capability or a tool method.
///
/// Backed by a `BTreeMap` so prompts built from arguments render in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arguments(BTreeMap<String, Value>);

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Returns a copy of `self` overlaid with `overrides`; keys present in both take the override.
    pub fn merged(&self, overrides: &Arguments) -> Arguments {
        let mut out = self.clone();
        for (k, v) in overrides.iter() {
            out.0.insert(k.clone(), v.clone());
        }
        out
    }

    /// A required string argument.
    pub fn str(&self, name: &str) -> Result<&str> {
        match self.0.get(name) {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(OrchestrationError::invalid_args(
                format!("argument '{name}'"),
                format!("expected a string, got {other}"),
            )),
            None => Err(missing(name)),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        match self.0.get(name) {
            Some(value) => value.as_i64().ok_or_else(|| {
                OrchestrationError::invalid_args(
                    format!("argument '{name}'"),
                    format!("expected an int, got {value}"),
                )
            }),
            None => Err(missing(name)),
        }
    }

    pub fn float(&self, name: &str) -> Result<f64> {
        match self.0.get(name) {
            Some(value) => value.as_f64().ok_or_else(|| {
                OrchestrationError::invalid_args(
                    format!("argument '{name}'"),
                    format!("expected a float, got {value}"),
                )
            }),
            None => Err(missing(name)),
        }
    }

    /// A required argument rendered as prompt text.
    ///
    /// Strings are used verbatim, everything else is pretty-printed JSON.
    pub fn text(&self, name: &str) -> Result<String> {
        self.0.get(name).map(render_text).ok_or_else(|| missing(name))
    }

    /// Like [`text`](Self::text) but falls back to an empty string.
    pub fn text_or_default(&self, name: &str) -> String {
        self.0.get(name).map(render_text).unwrap_or_default()
    }

    /// A required list argument.
    pub fn list(&self, name: &str) -> Result<&Vec<Value>> {
        match self.0.get(name) {
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Err(OrchestrationError::invalid_args(
                format!("argument '{name}'"),
                format!("expected a list, got {other}"),
            )),
            None => Err(missing(name)),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect())
    }
}

fn missing(name: &str) -> OrchestrationError {
    OrchestrationError::invalid_args(format!("argument '{name}'"), "missing required argument")
}

pub(crate) fn render_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

impl FromIterator<(String, Value)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Arguments(iter.into_iter().collect())
    }
}

impl From<serde_json::Map<String, Value>> for Arguments {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        map.into_iter().collect()
    }
}

impl IntoIterator for Arguments {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
