//! Parameter values and binding against a module's schema

use crate::descriptor::{Constraint, ModuleDescriptor, ParamType};
use crate::error::ParameterError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// A parameter value as it arrives on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::Str(_) => "string",
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Truthiness used for flag-style arguments
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            ParamValue::Bool(b) => *b,
            ParamValue::Int(i) => *i != 0,
            ParamValue::Float(f) => *f != 0.0,
            ParamValue::Str(s) => !s.is_empty(),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(i64::from(v))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

/// Parameters of one node after validation, with defaults filled in
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoundParams(BTreeMap<String, ParamValue>);

impl BoundParams {
    pub fn insert(&mut self, key: &str, value: ParamValue) {
        self.0.insert(key.to_string(), value);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[must_use]
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.0.get(key)?.as_f64()
    }

    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.0.get(key)? {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Validate supplied `(key, value)` pairs against a descriptor
///
/// Every problem is reported, not just the first. Required parameters must be
/// supplied even when they declare a default; defaults only fill optional ones.
///
/// # Errors
///
/// Returns all [`ParameterError`]s found for this node.
pub fn bind(
    node: &str,
    descriptor: &ModuleDescriptor,
    supplied: &[(String, ParamValue)],
) -> Result<BoundParams, Vec<ParameterError>> {
    let mut errors = Vec::new();
    let mut bound = BoundParams::default();
    let mut seen = HashSet::new();

    for (key, value) in supplied {
        if !seen.insert(key.as_str()) {
            errors.push(ParameterError::Duplicate {
                node: node.to_string(),
                key: key.clone(),
            });
            continue;
        }
        let Some(def) = descriptor.parameter(key) else {
            errors.push(ParameterError::Unknown {
                node: node.to_string(),
                key: key.clone(),
            });
            continue;
        };
        if !def.accepts_type(value) {
            errors.push(ParameterError::TypeMismatch {
                node: node.to_string(),
                key: key.clone(),
                expected: def.param_type,
                found: value.type_name().to_string(),
            });
            continue;
        }
        let value = match (def.param_type, value) {
            (ParamType::Float, ParamValue::Int(i)) => ParamValue::Float(*i as f64),
            _ => value.clone(),
        };
        match &def.constraint {
            Constraint::Range { min, max } => {
                let n = value.as_f64().unwrap_or_default();
                let lo = min.unwrap_or(f64::NEG_INFINITY);
                let hi = max.unwrap_or(f64::INFINITY);
                if n < lo || n > hi {
                    errors.push(ParameterError::OutOfRange {
                        node: node.to_string(),
                        key: key.clone(),
                        value: n,
                        min: lo,
                        max: hi,
                    });
                    continue;
                }
            }
            Constraint::Options(options) => {
                if def.check_constraint(&value).is_err() {
                    errors.push(ParameterError::InvalidOption {
                        node: node.to_string(),
                        key: key.clone(),
                        value: value.to_string(),
                        options: options.clone(),
                    });
                    continue;
                }
            }
            Constraint::None => {}
        }
        bound.insert(key, value);
    }

    for def in descriptor.parameters() {
        if seen.contains(def.name.as_str()) {
            continue;
        }
        if def.required {
            errors.push(ParameterError::MissingRequired {
                node: node.to_string(),
                key: def.name.clone(),
            });
        } else if let Some(default) = &def.default {
            let default = match (def.param_type, default) {
                (ParamType::Float, ParamValue::Int(i)) => ParamValue::Float(*i as f64),
                _ => default.clone(),
            };
            bound.insert(&def.name, default);
        }
    }

    if errors.is_empty() {
        Ok(bound)
    } else {
        Err(errors)
    }
}
