//! Typed access to a pattern instance's configuration map.
//!
//! Every key read is remembered so that leftovers can be reported as
//! warnings once expansion is done.

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::{PatternError, PatternErrorKind};
use crate::domain::value_objects::SourceLocation;

pub struct ConfigReader<'a> {
    entity: &'a str,
    pattern: &'a str,
    location: Option<&'a SourceLocation>,
    map: &'a Map<String, Value>,
    read: BTreeSet<String>,
}

impl<'a> ConfigReader<'a> {
    pub fn new(
        entity: &'a str,
        pattern: &'a str,
        location: Option<&'a SourceLocation>,
        map: &'a Map<String, Value>,
    ) -> Self {
        Self {
            entity,
            pattern,
            location,
            map,
            read: BTreeSet::new(),
        }
    }

    pub fn entity(&self) -> &str {
        self.entity
    }

    pub fn error(&self, kind: PatternErrorKind) -> PatternError {
        PatternError {
            entity: self.entity.to_string(),
            pattern: self.pattern.to_string(),
            location: self.location.cloned(),
            kind,
        }
    }

    pub fn invalid(&self, key: &str, reason: impl Into<String>) -> PatternError {
        self.error(PatternErrorKind::InvalidValue {
            key: key.to_string(),
            reason: reason.into(),
        })
    }

    fn missing(&self, key: &str) -> PatternError {
        self.error(PatternErrorKind::MissingKey {
            key: key.to_string(),
        })
    }

    /// First of `keys` that is present, or the first one if none is.
    ///
    /// Lets a key keep its older spelling as an alias.
    pub fn alias<'k>(&self, keys: &[&'k str]) -> &'k str {
        keys.iter()
            .copied()
            .find(|k| self.map.contains_key(*k))
            .unwrap_or(keys[0])
    }

    pub fn value(&mut self, key: &str) -> Option<&'a Value> {
        self.read.insert(key.to_string());
        self.map.get(key).filter(|v| !v.is_null())
    }

    pub fn string(&mut self, key: &str) -> Result<Option<String>, PatternError> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(Some(s.clone())),
            Some(_) => Err(self.invalid(key, "expected a non-empty string")),
        }
    }

    pub fn required_string(&mut self, key: &str) -> Result<String, PatternError> {
        self.string(key)?.ok_or_else(|| self.missing(key))
    }

    /// A list of strings; a single string is read as a one-element list.
    pub fn strings(&mut self, key: &str) -> Result<Option<Vec<String>>, PatternError> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(vec![s.clone()])),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    _ => Err(self.invalid(key, "expected a list of strings")),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(_) => Err(self.invalid(key, "expected a list of strings")),
        }
    }

    /// A list that must be present and non-empty.
    pub fn required_strings(&mut self, key: &str) -> Result<Vec<String>, PatternError> {
        match self.strings(key)? {
            None => Err(self.missing(key)),
            Some(list) if list.is_empty() => Err(self.invalid(key, "must not be empty")),
            Some(list) => Ok(list),
        }
    }

    pub fn bool(&mut self, key: &str) -> Result<Option<bool>, PatternError> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(self.invalid(key, "expected true or false")),
        }
    }

    /// A positive integer.
    pub fn count(&mut self, key: &str) -> Result<Option<usize>, PatternError> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::Number(n)) => match n.as_u64() {
                Some(v) if v > 0 => Ok(Some(v as usize)),
                _ => Err(self.invalid(key, "expected a positive integer")),
            },
            Some(_) => Err(self.invalid(key, "expected a positive integer")),
        }
    }

    /// One of `allowed`, or `default` when absent.
    pub fn choice(&mut self, key: &str, allowed: &[&str], default: &str) -> Result<String, PatternError> {
        match self.string(key)? {
            None => Ok(default.to_string()),
            Some(s) if allowed.contains(&s.as_str()) => Ok(s),
            Some(s) => Err(self.invalid(
                key,
                format!("'{}' is not one of: {}", s, allowed.join(", ")),
            )),
        }
    }

    pub fn parse<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>, PatternError> {
        match self.value(key) {
            None => Ok(None),
            Some(v) => serde_json::from_value(v.clone())
                .map(Some)
                .map_err(|e| self.invalid(key, e.to_string())),
        }
    }

    /// Keys present in the map that no getter asked for.
    pub fn unused(&self) -> Vec<String> {
        self.map
            .keys()
            .filter(|k| !self.read.contains(*k))
            .cloned()
            .collect()
    }
}
