//! Callables exposed to chart scripts
//!
//! Hooks stored in a chart's method table implement [`Callable`]. The
//! built-in hooks are [`Builtin`]s wrapping an async closure; package
//! scripts may install their own implementations.

use async_trait::async_trait;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::{Result, ShalmError};
use crate::value::{K8sValue, Value};

/// A value that can be called from a chart script
#[async_trait]
pub trait Callable: Send + Sync + fmt::Debug {
    /// Name used in error messages
    fn name(&self) -> &str;

    /// Invoke with positional and keyword arguments
    async fn call(&self, args: Args) -> Result<Value>;
}

/// Call arguments
#[derive(Debug, Clone, Default)]
pub struct Args {
    pub positional: Vec<Value>,
    pub kwargs: IndexMap<String, Value>,
}

impl Args {
    pub fn new(positional: Vec<Value>) -> Self {
        Self {
            positional,
            kwargs: IndexMap::new(),
        }
    }

    /// Arguments for a hook taking only a cluster client
    pub fn k8s(client: K8sValue) -> Self {
        Self::new(vec![Value::K8s(client)])
    }

    pub fn with_kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    /// Argument by keyword, falling back to its position
    pub fn get(&self, function: &str, index: usize, name: &str) -> Result<Option<Value>> {
        let by_name = self.kwargs.get(name).cloned();
        let by_position = self.positional.get(index).cloned();
        match (by_name, by_position) {
            (Some(_), Some(_)) => Err(ShalmError::invalid_argument(
                function,
                format!("got multiple values for argument '{}'", name),
            )),
            (value, None) | (None, value) => Ok(value),
        }
    }

    /// Required cluster client argument
    pub fn client(&self, function: &str, index: usize, name: &str) -> Result<K8sValue> {
        match self.get(function, index, name)? {
            Some(Value::K8s(client)) => Ok(client),
            Some(other) => Err(ShalmError::invalid_argument(
                function,
                format!("for parameter {}: got {}, want k8s", name, other.type_name()),
            )),
            None => Err(ShalmError::invalid_argument(
                function,
                format!("missing argument for {}", name),
            )),
        }
    }

    /// Optional string argument
    pub fn string(&self, function: &str, index: usize, name: &str) -> Result<Option<String>> {
        match self.get(function, index, name)? {
            None | Some(Value::None) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(ShalmError::invalid_argument(
                function,
                format!("for parameter {}: got {}, want string", name, other.type_name()),
            )),
        }
    }

    /// Deserialize every keyword argument except `skip` into `T`
    pub fn options<T: DeserializeOwned>(&self, function: &str, skip: &[&str]) -> Result<T> {
        let mut map = serde_json::Map::new();
        for (key, value) in &self.kwargs {
            if skip.contains(&key.as_str()) {
                continue;
            }
            map.insert(key.clone(), to_json(function, key, value)?);
        }
        serde_json::from_value(JsonValue::Object(map))
            .map_err(|e| ShalmError::invalid_argument(function, e.to_string()))
    }
}

fn to_json(function: &str, key: &str, value: &Value) -> Result<JsonValue> {
    Ok(match value {
        Value::None => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(i) => JsonValue::from(*i),
        Value::Float(f) => JsonValue::from(*f),
        Value::String(s) => JsonValue::String(s.clone()),
        Value::List(items) => JsonValue::Array(
            items
                .iter()
                .map(|item| to_json(function, key, item))
                .collect::<Result<_>>()?,
        ),
        Value::Map(_) | Value::Dict(_) => {
            let mut map = serde_json::Map::new();
            for (k, v) in value.as_mapping().into_iter().flatten() {
                map.insert(k.clone(), to_json(function, key, v)?);
            }
            JsonValue::Object(map)
        }
        other => {
            return Err(ShalmError::invalid_argument(
                function,
                format!("for parameter {}: unsupported type {}", key, other.type_name()),
            ));
        }
    })
}

type BuiltinFn = Arc<dyn Fn(Args) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Callable backed by a Rust closure
#[derive(Clone)]
pub struct Builtin {
    name: String,
    func: BuiltinFn,
}

impl Builtin {
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(move |args| Box::pin(func(args))),
        }
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtin").field("name", &self.name).finish()
    }
}

#[async_trait]
impl Callable for Builtin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, args: Args) -> Result<Value> {
        (self.func)(args).await
    }
}
