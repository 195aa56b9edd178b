//! Sandbox value model
//!
//! Chart scripts see every value through [`Value`]. Two mapping forms
//! exist: [`Value::Map`] is the host form stored inside a chart, and
//! [`Value::Dict`] is the sandbox form handed out by attribute reads.
//! Converting between them is [`Value::into_sandbox`] / [`Value::into_host`].

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use shalm_kube::K8s;
use std::fmt;
use std::sync::Arc;

use crate::callable::Callable;
use crate::chart::{Chart, ChartClass};
use crate::error::{Result, ShalmError};
use crate::jewel::Jewel;

/// A dynamically typed sandbox value
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    /// Host mapping, as stored in chart values
    Map(IndexMap<String, Value>),
    /// Sandbox dictionary, as returned by attribute access
    Dict(Dict),
    Chart(Arc<Chart>),
    Jewel(Arc<Jewel>),
    Class(ChartClass),
    K8s(K8sValue),
    Callable(Arc<dyn Callable>),
}

/// Sandbox dictionary with attribute-style access
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dict(IndexMap<String, Value>);

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
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

    /// Attribute read, failing on unknown keys
    pub fn attr(&self, name: &str) -> Result<Value> {
        self.0.get(name).cloned().ok_or_else(|| ShalmError::NoSuchAttr {
            owner: "dict".to_string(),
            attr: name.to_string(),
        })
    }

    pub fn into_inner(self) -> IndexMap<String, Value> {
        self.0
    }
}

impl From<IndexMap<String, Value>> for Dict {
    fn from(map: IndexMap<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Dict {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Cluster client handed to hooks
#[derive(Clone)]
pub struct K8sValue(Arc<dyn K8s>);

impl K8sValue {
    pub fn new(k8s: Arc<dyn K8s>) -> Self {
        Self(k8s)
    }

    pub fn client(&self) -> Arc<dyn K8s> {
        Arc::clone(&self.0)
    }
}

impl fmt::Debug for K8sValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("K8sValue")
    }
}

impl Value {
    /// Name of the value's type as shown in error messages
    pub fn type_name(&self) -> String {
        match self {
            Value::None => "NoneType".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::String(_) => "string".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Map(_) | Value::Dict(_) => "dict".to_string(),
            Value::Chart(_) => "chart".to_string(),
            Value::Jewel(jewel) => jewel.backend().name().to_string(),
            Value::Class(_) => "chart_class".to_string(),
            Value::K8s(_) => "k8s".to_string(),
            Value::Callable(_) => "builtin_function_or_method".to_string(),
        }
    }

    /// Truth value in boolean contexts
    ///
    /// Charts are always true, jewels always false.
    pub fn truth(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Dict(dict) => !dict.is_empty(),
            Value::Chart(_) => true,
            Value::Jewel(_) => false,
            Value::Class(_) | Value::K8s(_) | Value::Callable(_) => true,
        }
    }

    /// 32-bit hash, consistent with equality
    pub fn hash(&self) -> Result<u32> {
        match self {
            Value::None => Ok(0),
            Value::Bool(b) => Ok(u32::from(*b)),
            Value::Int(i) => Ok(hash_int(*i)),
            Value::Float(f) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    Ok(hash_int(*f as i64))
                } else {
                    let bits = f.to_bits();
                    Ok((bits ^ (bits >> 32)) as u32)
                }
            }
            Value::String(s) => Ok(hash_str(s)),
            Value::List(items) => {
                let mut x: u32 = 9_731;
                let mut m: u32 = 7_919;
                for item in items {
                    x ^= item.hash()?.wrapping_mul(m);
                    m = m.wrapping_add(1_000_003);
                }
                Ok(x)
            }
            Value::Chart(chart) => chart.hash(),
            Value::Class(class) => Ok(hash_str(&class.name)),
            Value::Map(_)
            | Value::Dict(_)
            | Value::Jewel(_)
            | Value::K8s(_)
            | Value::Callable(_) => Err(ShalmError::Unhashable(self.type_name())),
        }
    }

    /// Expose host mappings as sandbox dictionaries, recursively
    pub fn into_sandbox(self) -> Value {
        match self {
            Value::Map(map) => Value::Dict(map.into_iter().map(|(k, v)| (k, v.into_sandbox())).collect()),
            Value::List(items) => Value::List(items.into_iter().map(Value::into_sandbox).collect()),
            other => other,
        }
    }

    /// Convert sandbox dictionaries back to host mappings, recursively
    pub fn into_host(self) -> Value {
        match self {
            Value::Dict(dict) => Value::Map(
                dict.into_inner()
                    .into_iter()
                    .map(|(k, v)| (k, v.into_host()))
                    .collect(),
            ),
            Value::Map(map) => Value::Map(map.into_iter().map(|(k, v)| (k, v.into_host())).collect()),
            Value::List(items) => Value::List(items.into_iter().map(Value::into_host).collect()),
            other => other,
        }
    }

    /// Convert a JSON tree; objects become host mappings
    pub fn from_json(json: JsonValue) -> Value {
        match json {
            JsonValue::Null => Value::None,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(items) => Value::List(items.into_iter().map(Value::from_json).collect()),
            JsonValue::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Entries of either mapping form
    pub fn as_mapping(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            Value::Dict(dict) => Some(&dict.0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_chart(&self) -> Option<&Arc<Chart>> {
        match self {
            Value::Chart(chart) => Some(chart),
            _ => None,
        }
    }

    pub fn as_jewel(&self) -> Option<&Arc<Jewel>> {
        match self {
            Value::Jewel(jewel) => Some(jewel),
            _ => None,
        }
    }
}

/// FNV-1a over the UTF-8 bytes
pub(crate) fn hash_str(s: &str) -> u32 {
    let mut h: u32 = 0x811c_9dc5;
    for byte in s.as_bytes() {
        h ^= u32::from(*byte);
        h = h.wrapping_mul(0x0100_0193);
    }
    h
}

fn hash_int(i: i64) -> u32 {
    let u = i as u64;
    (u ^ (u >> 32)) as u32
}

/// Exact numeric equality; integers beyond 2^53 never match a rounded float
fn int_eq_float(i: i64, f: f64) -> bool {
    f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 && f as i64 == i
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                int_eq_float(*a, *b)
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(_) | Value::Dict(_), Value::Map(_) | Value::Dict(_)) => {
                self.as_mapping() == other.as_mapping()
            }
            (Value::Chart(a), Value::Chart(b)) => a.as_ref() == b.as_ref(),
            (Value::Jewel(a), Value::Jewel(b)) => Arc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::K8s(a), Value::K8s(b)) => std::ptr::addr_eq(Arc::as_ptr(&a.0), Arc::as_ptr(&b.0)),
            (Value::Callable(a), Value::Callable(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Map(_) | Value::Dict(_) => {
                f.write_str("{")?;
                for (i, (k, v)) in self.as_mapping().into_iter().flatten().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{:?}: {}", k, v)?;
                }
                f.write_str("}")
            }
            Value::Chart(chart) => write!(f, "{}", chart),
            Value::Jewel(jewel) => write!(f, "{}", jewel),
            Value::Class(class) => write!(f, "{}", class),
            Value::K8s(_) => f.write_str("<k8s>"),
            Value::Callable(callable) => write!(f, "<built-in function {}>", callable.name()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
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

impl From<Arc<Chart>> for Value {
    fn from(chart: Arc<Chart>) -> Self {
        Value::Chart(chart)
    }
}

impl From<Arc<Jewel>> for Value {
    fn from(jewel: Arc<Jewel>) -> Self {
        Value::Jewel(jewel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json() {
        let value = Value::from_json(json!({"a": 1, "b": [true, "x"], "c": 1.5, "d": null}));
        let map = value.as_mapping().unwrap();
        assert_eq!(map["a"], Value::Int(1));
        assert_eq!(
            map["b"],
            Value::List(vec![Value::Bool(true), Value::from("x")])
        );
        assert_eq!(map["c"], Value::Float(1.5));
        assert_eq!(map["d"], Value::None);
        assert!(matches!(value, Value::Map(_)));
    }

    #[test]
    fn test_sandbox_round_trip() {
        let host = Value::from_json(json!({"outer": {"inner": 1}, "list": [{"x": 1}]}));

        let wrapped = host.clone().into_sandbox();
        let Value::Dict(dict) = &wrapped else {
            panic!("expected dict, got {:?}", wrapped);
        };
        assert!(matches!(dict.get("outer"), Some(Value::Dict(_))));
        assert!(matches!(
            dict.get("list"),
            Some(Value::List(items)) if matches!(items[0], Value::Dict(_))
        ));

        let unwrapped = wrapped.into_host();
        assert!(matches!(unwrapped, Value::Map(_)));
        assert_eq!(unwrapped, host);
    }

    #[test]
    fn test_truth() {
        assert!(!Value::None.truth());
        assert!(!Value::from("").truth());
        assert!(Value::from("x").truth());
        assert!(!Value::Int(0).truth());
        assert!(!Value::List(vec![]).truth());
        assert!(Value::Map(IndexMap::from([("a".to_string(), Value::None)])).truth());
    }

    #[test]
    fn test_hash_consistent_with_equality() {
        assert_eq!(Value::Int(3).hash().unwrap(), Value::Float(3.0).hash().unwrap());
        assert_eq!(Value::from("abc").hash().unwrap(), Value::from("abc").hash().unwrap());
        assert_ne!(Value::from("abc").hash().unwrap(), Value::from("abd").hash().unwrap());
        assert_ne!(
            Value::List(vec![Value::Int(1), Value::Int(2)]).hash().unwrap(),
            Value::List(vec![Value::Int(2), Value::Int(1)]).hash().unwrap()
        );
    }

    #[test]
    fn test_large_ints_and_floats() {
        let int = Value::Int(9_007_199_254_740_993);
        let float = Value::Float(9_007_199_254_740_992.0);
        assert_ne!(int, float);

        let exact = Value::Int(9_007_199_254_740_992);
        assert_eq!(exact, float);
        assert_eq!(exact.hash().unwrap(), float.hash().unwrap());

        assert_ne!(Value::Int(i64::MAX), Value::Float(i64::MAX as f64));
        assert_ne!(Value::Int(1), Value::Float(1.5));
        assert_ne!(Value::Int(0), Value::Float(f64::NAN));
    }

    #[test]
    fn test_mappings_are_unhashable() {
        let err = Value::Map(IndexMap::new()).hash().unwrap_err();
        assert_eq!(err.to_string(), "unhashable type: dict");
    }

    #[test]
    fn test_fnv_reference_values() {
        assert_eq!(hash_str(""), 0x811c_9dc5);
        assert_eq!(hash_str("a"), 0xe40c_292c);
    }

    #[test]
    fn test_display() {
        let value = Value::Map(IndexMap::from([
            ("name".to_string(), Value::from("db")),
            ("replicas".to_string(), Value::Int(2)),
            ("tags".to_string(), Value::List(vec![Value::from("a")])),
            ("on".to_string(), Value::Bool(true)),
        ]));
        assert_eq!(
            value.to_string(),
            r#"{"name": "db", "replicas": 2, "tags": ["a"], "on": True}"#
        );
        assert_eq!(Value::None.to_string(), "None");
        assert_eq!(Value::Float(0.5).to_string(), "0.5");
    }

    #[test]
    fn test_dict_attr() {
        let dict: Dict = [("a".to_string(), Value::Int(1))].into_iter().collect();
        assert_eq!(dict.attr("a").unwrap(), Value::Int(1));
        assert_eq!(
            dict.attr("b").unwrap_err().to_string(),
            "dict has no .b attribute"
        );
    }
}
