//! Recording in-memory cluster client for tests
//!
//! Objects are stored by kind, namespace and name. Every call is appended
//! to an ordered operation log so tests can assert the exact sequence of
//! gets, applies, deletes and progress reports a cascade produced.

use async_trait::async_trait;
use kube::api::DynamicObject;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{KubeError, Result};
use crate::k8s::{K8s, K8sOptions};
use crate::manifest::object_ref;

/// A recorded client call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    /// `kind/name` as requested
    Get(String),
    /// `Kind/name` of every applied object, in call order
    Apply(Vec<String>),
    /// `Kind/name` of every deleted object, in call order
    Delete(Vec<String>),
    /// Reported progress
    Progress(u8),
}

/// Operation class used for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Get,
    Apply,
    Delete,
}

impl OperationKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Apply => "apply",
            Self::Delete => "delete",
        }
    }
}

type ObjectKey = (String, String, String);

/// In-memory cluster client
#[derive(Clone)]
pub struct MockK8s {
    store: Arc<RwLock<BTreeMap<ObjectKey, DynamicObject>>>,
    operations: Arc<RwLock<Vec<MockOperation>>>,
    failures: Arc<RwLock<HashMap<OperationKind, String>>>,
    default_namespace: String,
}

impl Default for MockK8s {
    fn default() -> Self {
        Self::new()
    }
}

impl MockK8s {
    /// Create an empty client with `default` as its namespace
    pub fn new() -> Self {
        Self::with_namespace("default")
    }

    /// Create an empty client with a custom default namespace
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            store: Arc::new(RwLock::new(BTreeMap::new())),
            operations: Arc::new(RwLock::new(Vec::new())),
            failures: Arc::new(RwLock::new(HashMap::new())),
            default_namespace: namespace.into(),
        }
    }

    /// Seed an object without recording an operation
    pub fn insert(&self, obj: DynamicObject) -> Result<()> {
        let namespace = obj
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| self.default_namespace.clone());
        let key = key_for(&obj, &namespace)?;
        self.store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, obj);
        Ok(())
    }

    /// Look up a stored object
    pub fn object(&self, kind: &str, namespace: &str, name: &str) -> Option<DynamicObject> {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(kind.to_lowercase(), namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Number of stored objects
    pub fn object_count(&self) -> usize {
        self.store.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Recorded operations, oldest first
    pub fn operations(&self) -> Vec<MockOperation> {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forget recorded operations
    pub fn reset_operations(&self) {
        self.operations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Make every subsequent call of `kind` fail with `message`
    pub fn fail_on(&self, kind: OperationKind, message: impl Into<String>) {
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, message.into());
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn record(&self, operation: MockOperation) {
        self.operations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(operation);
    }

    fn check_failure(&self, kind: OperationKind) -> Result<()> {
        match self
            .failures
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
        {
            Some(message) => Err(KubeError::OperationFailed {
                operation: kind.as_str().to_string(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

fn key_for(obj: &DynamicObject, namespace: &str) -> Result<ObjectKey> {
    let kind = obj
        .types
        .as_ref()
        .map(|t| t.kind.to_lowercase())
        .ok_or_else(|| KubeError::InvalidManifest(format!("{} has no kind", object_ref(obj))))?;
    let name = obj
        .metadata
        .name
        .clone()
        .ok_or_else(|| KubeError::InvalidManifest(format!("{} has no name", object_ref(obj))))?;
    Ok((kind, namespace.to_string(), name))
}

#[async_trait]
impl K8s for MockK8s {
    async fn get(&self, kind: &str, name: &str, options: &K8sOptions) -> Result<DynamicObject> {
        self.record(MockOperation::Get(format!("{}/{}", kind, name)));
        self.check_failure(OperationKind::Get)?;

        let namespace = options
            .namespace
            .clone()
            .unwrap_or_else(|| self.default_namespace.clone());
        self.object(kind, &namespace, name)
            .ok_or_else(|| KubeError::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            })
    }

    async fn apply(&self, objects: Vec<DynamicObject>, options: &K8sOptions) -> Result<()> {
        self.record(MockOperation::Apply(objects.iter().map(object_ref).collect()));
        self.check_failure(OperationKind::Apply)?;

        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        for mut obj in objects {
            let namespace = options.effective_namespace(&obj, &self.default_namespace);
            let key = key_for(&obj, &namespace)?;
            obj.metadata.namespace = Some(namespace);
            store.insert(key, obj);
        }
        Ok(())
    }

    async fn delete(&self, objects: Vec<DynamicObject>, options: &K8sOptions) -> Result<()> {
        self.record(MockOperation::Delete(objects.iter().map(object_ref).collect()));
        self.check_failure(OperationKind::Delete)?;

        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        for obj in objects {
            let namespace = options.effective_namespace(&obj, &self.default_namespace);
            let key = key_for(&obj, &namespace)?;
            if store.remove(&key).is_none() && !options.ignore_not_found {
                return Err(KubeError::NotFound {
                    kind: key.0,
                    name: key.2,
                });
            }
        }
        Ok(())
    }

    fn progress(&self, percent: u8) {
        self.record(MockOperation::Progress(percent));
    }
}
