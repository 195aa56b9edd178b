//! Chart runtime object and apply/delete orchestration
//!
//! A chart owns a value mapping, a method table and its manifest templates.
//! Values may hold nested charts (sub-charts) and jewels. Sub-charts are
//! never applied on their own: the parent's `apply` hook applies them
//! before its own manifests, and its `delete` hook removes its own
//! manifests, then its jewels, then the sub-charts.

use indexmap::{IndexMap, IndexSet};
use semver::Version;
use shalm_core::{ChartSource, CoreError, Values};
use shalm_engine::{Engine, RenderResult};
use shalm_kube::{K8s, K8sOptions, K8sVault, parse_manifests};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use crate::callable::{Args, Builtin, Callable};
use crate::error::{Result, ShalmError};
use crate::jewel::Jewel;
use crate::merge::merge;
use crate::template::{self, RenderMode};
use crate::value::{K8sValue, Value, hash_str};

/// Attribute names resolved before values and methods
const RESERVED: &[&str] = &["name", "namespace", "__class__"];

/// Static package identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartClass {
    pub name: String,
    pub version: Version,
}

impl ChartClass {
    pub fn attr(&self, name: &str) -> Result<Value> {
        match name {
            "name" => Ok(Value::String(self.name.clone())),
            "version" => Ok(Value::String(self.version.to_string())),
            _ => Err(ShalmError::NoSuchAttr {
                owner: "chart_class".to_string(),
                attr: name.to_string(),
            }),
        }
    }
}

impl fmt::Display for ChartClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chart_class(name = {}, version = {})", self.name, self.version)
    }
}

/// Instantiation options
#[derive(Debug, Clone)]
pub struct ChartOptions {
    /// Target namespace
    pub namespace: String,

    /// Instance suffix, for several instances of one package per namespace
    pub suffix: Option<String>,

    /// Caller overrides merged over the package defaults
    pub values: Values,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self::new("default")
    }
}

impl ChartOptions {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            suffix: None,
            values: Values::new(),
        }
    }

    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn values(mut self, values: Values) -> Self {
        self.values = values;
        self
    }
}

/// A chart instance
pub struct Chart {
    class: ChartClass,
    namespace: String,
    suffix: Option<String>,
    values: RwLock<IndexMap<String, Value>>,
    methods: RwLock<IndexMap<String, Arc<dyn Callable>>>,
    templates: IndexMap<String, String>,
    engine: Engine,
}

impl Chart {
    /// Instantiate a loaded package
    pub fn from_source(source: ChartSource, options: ChartOptions) -> Result<Arc<Chart>> {
        let mut builder = Chart::builder(source.metadata.name)
            .version(source.metadata.version)
            .namespace(options.namespace)
            .overrides(options.values);
        if let Some(suffix) = options.suffix {
            builder = builder.suffix(suffix);
        }
        if let Some(defaults) = source.values.as_object() {
            for (key, value) in defaults {
                builder = builder.value(key.clone(), Value::from_json(value.clone()));
            }
        }
        for (name, body) in source.templates {
            builder = builder.template(name, body);
        }
        builder.build()
    }

    pub fn builder(name: impl Into<String>) -> ChartBuilder {
        ChartBuilder::new(name)
    }

    /// Instance name: `name` or `name-suffix`
    pub fn name(&self) -> String {
        match &self.suffix {
            Some(suffix) if !suffix.is_empty() => format!("{}-{}", self.class.name, suffix),
            _ => self.class.name.clone(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn class(&self) -> &ChartClass {
        &self.class
    }

    pub fn version(&self) -> &Version {
        &self.class.version
    }

    pub fn templates(&self) -> &IndexMap<String, String> {
        &self.templates
    }

    fn values_read(&self) -> RwLockReadGuard<'_, IndexMap<String, Value>> {
        self.values.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn values_write(&self) -> RwLockWriteGuard<'_, IndexMap<String, Value>> {
        self.values.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the value mapping
    pub fn values(&self) -> IndexMap<String, Value> {
        self.values_read().clone()
    }

    /// Stored value, without attribute resolution
    pub fn value(&self, key: &str) -> Option<Value> {
        self.values_read().get(key).cloned()
    }

    /// Attribute read
    ///
    /// Resolution order: reserved names, values, methods.
    pub fn attr(&self, name: &str) -> Result<Value> {
        match name {
            "namespace" => return Ok(Value::String(self.namespace.clone())),
            "name" => return Ok(Value::String(self.name())),
            "__class__" => return Ok(Value::Class(self.class.clone())),
            _ => {}
        }
        if let Some(value) = self.value(name) {
            return Ok(value.into_sandbox());
        }
        if let Some(method) = self.method(name) {
            return Ok(Value::Callable(method));
        }
        Err(ShalmError::NoSuchAttr {
            owner: format!("chart '{}'", self.name()),
            attr: name.to_string(),
        })
    }

    /// Every name `attr` resolves
    pub fn attr_names(&self) -> Vec<String> {
        let mut names: Vec<String> = RESERVED.iter().map(|s| s.to_string()).collect();
        for key in self.values_read().keys() {
            if !names.contains(key) {
                names.push(key.clone());
            }
        }
        for key in self.methods_read().keys() {
            if !names.contains(key) {
                names.push(key.clone());
            }
        }
        names
    }

    /// Attribute write, always into the value mapping
    pub fn set_field(&self, name: &str, value: Value) {
        if RESERVED.contains(&name) {
            tracing::warn!(
                chart = %self.name(),
                attr = %name,
                "value is stored but shadowed by a reserved attribute"
            );
        }
        self.values_write().insert(name.to_string(), value.into_host());
    }

    fn methods_read(&self) -> RwLockReadGuard<'_, IndexMap<String, Arc<dyn Callable>>> {
        self.methods.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn method(&self, name: &str) -> Option<Arc<dyn Callable>> {
        self.methods_read().get(name).cloned()
    }

    /// Install or replace a hook
    pub fn set_method(&self, name: impl Into<String>, method: Arc<dyn Callable>) {
        self.methods
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), method);
    }

    /// Invoke a hook from the method table
    pub async fn call_method(&self, name: &str, args: Args) -> Result<Value> {
        let method = self.method(name).ok_or_else(|| ShalmError::MissingMethod {
            chart: self.name(),
            method: name.to_string(),
        })?;
        method.call(args).await
    }

    /// Order-independent hash of the value mapping
    pub fn hash(&self) -> Result<u32> {
        let values = self.values();
        let mut keys: Vec<&String> = values.keys().collect();
        keys.sort();

        let mut x: u32 = 8731;
        let mut m: u32 = 9839;
        for key in keys {
            x ^= 3u32.wrapping_mul(hash_str(key));
            x ^= values[key].hash()?.wrapping_mul(m);
            m = m.wrapping_add(7349);
        }
        Ok(x)
    }

    /// Merge caller overrides into the value mapping
    pub fn merge_values(&self, values: &Values) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let entries = values.as_object().ok_or_else(|| CoreError::ValuesMerge {
            message: format!("values for chart '{}' must be a mapping", self.name()),
        })?;
        self.merge_entries(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), Value::from_json(v.clone())))
                .collect(),
        );
        Ok(())
    }

    /// Merge entries key by key into the value mapping
    pub fn merge_entries(&self, entries: IndexMap<String, Value>) {
        for (key, incoming) in entries {
            let existing = self.value(&key);
            let merged = merge(existing, incoming);
            self.values_write().insert(key, merged);
        }
    }

    /// Direct sub-charts, in value order
    ///
    /// A chart stored under several keys is listed once.
    pub fn sub_charts(&self) -> Vec<Arc<Chart>> {
        let mut seen = IndexSet::new();
        self.values_read()
            .values()
            .filter_map(Value::as_chart)
            .filter(|chart| seen.insert(Arc::as_ptr(chart)))
            .cloned()
            .collect()
    }

    /// Jewels owned directly by this chart, in value order
    ///
    /// A jewel stored under several keys is listed once.
    pub fn jewels(&self) -> Vec<Arc<Jewel>> {
        let mut seen = IndexSet::new();
        self.values_read()
            .values()
            .filter_map(Value::as_jewel)
            .filter(|jewel| seen.insert(Arc::as_ptr(jewel)))
            .cloned()
            .collect()
    }

    /// Render this chart's own manifests
    pub fn render(&self, mode: RenderMode, glob: Option<&str>) -> Result<RenderResult> {
        let context = template::render_context(self, mode);
        Ok(self.engine.render_templates(&self.templates, &context, glob)?)
    }

    /// Run the `apply` hook, then report completion
    pub async fn apply(&self, k8s: Arc<dyn K8s>) -> Result<()> {
        tracing::info!(chart = %self.name(), namespace = %self.namespace, "applying chart");
        self.call_method("apply", Args::k8s(K8sValue::new(Arc::clone(&k8s))))
            .await?;
        k8s.progress(100);
        tracing::info!(chart = %self.name(), "chart applied");
        Ok(())
    }

    /// Run the `delete` hook, then report completion
    pub async fn delete(&self, k8s: Arc<dyn K8s>) -> Result<()> {
        tracing::info!(chart = %self.name(), namespace = %self.namespace, "deleting chart");
        self.call_method("delete", Args::k8s(K8sValue::new(Arc::clone(&k8s))))
            .await?;
        k8s.progress(100);
        tracing::info!(chart = %self.name(), "chart deleted");
        Ok(())
    }

    /// Sub-charts first, then this chart's own manifests
    async fn apply_cascade(&self, k8s: &K8sValue) -> Result<()> {
        for sub_chart in self.sub_charts() {
            tracing::debug!(chart = %self.name(), sub_chart = %sub_chart.name(), "applying sub-chart");
            sub_chart.call_method("apply", Args::k8s(k8s.clone())).await?;
        }
        self.apply_local(k8s.client(), K8sOptions::default(), None)
            .await
    }

    /// This chart's own manifests and jewels first, then sub-charts
    async fn delete_cascade(&self, k8s: &K8sValue) -> Result<()> {
        self.delete_local(k8s.client(), K8sOptions::default(), None)
            .await?;
        for sub_chart in self.sub_charts() {
            tracing::debug!(chart = %self.name(), sub_chart = %sub_chart.name(), "deleting sub-chart");
            sub_chart.call_method("delete", Args::k8s(k8s.clone())).await?;
        }
        Ok(())
    }

    /// Apply this chart's own manifests
    ///
    /// Jewels read their stored payload before rendering, so templates see
    /// existing secrets. After rendering every jewel is completed and
    /// written back to the vault before the manifests are applied.
    pub async fn apply_local(
        &self,
        k8s: Arc<dyn K8s>,
        mut options: K8sOptions,
        glob: Option<&str>,
    ) -> Result<()> {
        let vault = K8sVault::new(Arc::clone(&k8s), self.namespace.clone());
        let jewels = self.jewels();
        for jewel in &jewels {
            jewel.read(&vault).await?;
        }

        options.namespaced = false;
        options.namespace.get_or_insert_with(|| self.namespace.clone());
        let rendered = self.render(RenderMode::Apply, glob)?;

        for jewel in &jewels {
            jewel.ensure()?;
            jewel.write(&vault).await?;
        }

        let objects = parse_manifests(&rendered.stream())?;
        tracing::debug!(chart = %self.name(), objects = objects.len(), "applying manifests");
        if !objects.is_empty() {
            k8s.apply(objects, &options).await?;
        }
        Ok(())
    }

    /// Delete this chart's own manifests, then release its jewels
    pub async fn delete_local(
        &self,
        k8s: Arc<dyn K8s>,
        mut options: K8sOptions,
        glob: Option<&str>,
    ) -> Result<()> {
        options.namespaced = false;
        options.namespace.get_or_insert_with(|| self.namespace.clone());
        let rendered = self.render(RenderMode::Delete, glob)?;

        let objects = parse_manifests(&rendered.stream())?;
        tracing::debug!(chart = %self.name(), objects = objects.len(), "deleting manifests");
        if !objects.is_empty() {
            k8s.delete(objects, &options).await?;
        }

        let vault = K8sVault::new(k8s, self.namespace.clone());
        for jewel in self.jewels() {
            jewel.delete(&vault).await?;
        }
        Ok(())
    }
}

/// Built-in hook bound to a chart through a weak reference
fn hook<F, Fut>(chart: &Weak<Chart>, name: &'static str, body: F) -> Arc<dyn Callable>
where
    F: Fn(Arc<Chart>, Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let chart = chart.clone();
    Arc::new(Builtin::new(name, move |args| {
        let call = chart.upgrade().map(|chart| body(chart, args));
        async move {
            match call {
                Some(call) => call.await.map(|()| Value::None),
                None => Err(ShalmError::ChartDropped(name.to_string())),
            }
        }
    }))
}

fn builtin_methods(chart: &Weak<Chart>) -> IndexMap<String, Arc<dyn Callable>> {
    let mut methods = IndexMap::new();
    methods.insert(
        "apply".to_string(),
        hook(chart, "apply", |chart, args| async move {
            let k8s = args.client("apply", 0, "k8s")?;
            chart.apply_cascade(&k8s).await
        }),
    );
    methods.insert(
        "delete".to_string(),
        hook(chart, "delete", |chart, args| async move {
            let k8s = args.client("delete", 0, "k8s")?;
            chart.delete_cascade(&k8s).await
        }),
    );
    methods.insert(
        "__apply".to_string(),
        hook(chart, "__apply", |chart, args| async move {
            let k8s = args.client("__apply", 0, "k8s")?;
            let glob = args.string("__apply", 1, "glob")?;
            let options: K8sOptions = args.options("__apply", &["k8s", "glob"])?;
            chart.apply_local(k8s.client(), options, glob.as_deref()).await
        }),
    );
    methods.insert(
        "__delete".to_string(),
        hook(chart, "__delete", |chart, args| async move {
            let k8s = args.client("__delete", 0, "k8s")?;
            let glob = args.string("__delete", 1, "glob")?;
            let options: K8sOptions = args.options("__delete", &["k8s", "glob"])?;
            chart.delete_local(k8s.client(), options, glob.as_deref()).await
        }),
    );
    methods
}

impl PartialEq for Chart {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || self.values() == other.values()
    }
}

impl fmt::Display for Chart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("chart(")?;
        for (i, (key, value)) in self.values().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} = {}", key, value)?;
        }
        f.write_str(")")
    }
}

impl fmt::Debug for Chart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chart")
            .field("name", &self.name())
            .field("version", &self.class.version)
            .field("namespace", &self.namespace)
            .finish()
    }
}

/// Builder for charts assembled in code
pub struct ChartBuilder {
    name: String,
    version: Version,
    namespace: String,
    suffix: Option<String>,
    values: IndexMap<String, Value>,
    overrides: Values,
    templates: IndexMap<String, String>,
    engine: Engine,
}

impl ChartBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Version::new(0, 0, 0),
            namespace: "default".to_string(),
            suffix: None,
            values: IndexMap::new(),
            overrides: Values::new(),
            templates: IndexMap::new(),
            engine: Engine::default(),
        }
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// Default value
    pub fn value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into().into_host());
        self
    }

    /// Caller overrides, merged over the defaults on build
    pub fn overrides(mut self, values: Values) -> Self {
        self.overrides = values;
        self
    }

    pub fn template(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.templates.insert(name.into(), body.into());
        self
    }

    pub fn engine(mut self, engine: Engine) -> Self {
        self.engine = engine;
        self
    }

    pub fn build(self) -> Result<Arc<Chart>> {
        let chart = Arc::new_cyclic(|weak| Chart {
            class: ChartClass {
                name: self.name,
                version: self.version,
            },
            namespace: self.namespace,
            suffix: self.suffix,
            values: RwLock::new(self.values),
            methods: RwLock::new(builtin_methods(weak)),
            templates: self.templates,
            engine: self.engine,
        });
        chart.merge_values(&self.overrides)?;
        tracing::debug!(
            chart = %chart.name(),
            version = %chart.version(),
            templates = chart.templates.len(),
            "chart created"
        );
        Ok(chart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jewel::tests::CountingBackend;
    use serde_json::json;

    fn chart(name: &str) -> Arc<Chart> {
        Chart::builder(name)
            .version(Version::new(1, 2, 3))
            .namespace("infra")
            .value("replicas", Value::Int(2))
            .value("db", Value::from_json(json!({"port": 3306})))
            .build()
            .unwrap()
    }

    #[test]
    fn test_name_with_suffix() {
        assert_eq!(chart("mariadb").name(), "mariadb");

        let suffixed = Chart::builder("mariadb").suffix("blue").build().unwrap();
        assert_eq!(suffixed.name(), "mariadb-blue");
        assert_eq!(suffixed.class().name, "mariadb");
    }

    #[test]
    fn test_attr_resolution_order() {
        let chart = chart("mariadb");

        assert_eq!(chart.attr("name").unwrap(), Value::from("mariadb"));
        assert_eq!(chart.attr("namespace").unwrap(), Value::from("infra"));
        assert_eq!(
            chart.attr("__class__").unwrap().to_string(),
            "chart_class(name = mariadb, version = 1.2.3)"
        );
        assert_eq!(chart.attr("replicas").unwrap(), Value::Int(2));
        assert!(matches!(chart.attr("db").unwrap(), Value::Dict(_)));
        assert!(matches!(chart.attr("apply").unwrap(), Value::Callable(_)));

        let err = chart.attr("nope").unwrap_err();
        assert_eq!(err.to_string(), "chart 'mariadb' has no .nope attribute");
    }

    #[test]
    fn test_reserved_names_shadow_values() {
        let chart = chart("mariadb");
        chart.set_field("name", Value::from("other"));

        assert_eq!(chart.attr("name").unwrap(), Value::from("mariadb"));
        assert_eq!(chart.value("name"), Some(Value::from("other")));
    }

    #[test]
    fn test_values_shadow_methods() {
        let chart = chart("mariadb");
        chart.set_field("apply", Value::Int(1));
        assert_eq!(chart.attr("apply").unwrap(), Value::Int(1));
    }

    #[test]
    fn test_set_field_unwraps_dicts() {
        let chart = chart("mariadb");
        let dict = chart.attr("db").unwrap();
        chart.set_field("copy", dict);
        assert!(matches!(chart.value("copy"), Some(Value::Map(_))));
    }

    #[test]
    fn test_attr_names() {
        let names = chart("mariadb").attr_names();
        assert_eq!(
            names,
            vec![
                "name", "namespace", "__class__", "replicas", "db", "apply", "delete", "__apply",
                "__delete"
            ]
        );
    }

    #[test]
    fn test_hash_is_permutation_invariant() {
        let a = Chart::builder("x")
            .value("a", Value::Int(1))
            .value("b", Value::from("two"))
            .value("c", Value::List(vec![Value::Bool(true)]))
            .build()
            .unwrap();
        let b = Chart::builder("x")
            .value("c", Value::List(vec![Value::Bool(true)]))
            .value("a", Value::Int(1))
            .value("b", Value::from("two"))
            .build()
            .unwrap();
        let c = Chart::builder("x")
            .value("a", Value::Int(1))
            .value("b", Value::from("three"))
            .value("c", Value::List(vec![Value::Bool(true)]))
            .build()
            .unwrap();

        assert_eq!(a.hash().unwrap(), b.hash().unwrap());
        assert_ne!(a.hash().unwrap(), c.hash().unwrap());
        assert_eq!(*a, *b);
        assert_ne!(*a, *c);
    }

    #[test]
    fn test_hash_fails_on_unhashable_values() {
        let chart = chart("mariadb");
        assert_eq!(chart.hash().unwrap_err().to_string(), "unhashable type: dict");

        let with_jewel = Chart::builder("x")
            .value(
                "pwd",
                Value::Jewel(Arc::new(Jewel::new(Arc::new(CountingBackend::default()), "p"))),
            )
            .build()
            .unwrap();
        assert_eq!(
            with_jewel.hash().unwrap_err().to_string(),
            "unhashable type: counting"
        );
    }

    #[test]
    fn test_display_and_truth() {
        let chart = Chart::builder("x")
            .value("a", Value::Int(1))
            .value("b", Value::from("s"))
            .build()
            .unwrap();
        assert_eq!(chart.to_string(), r#"chart(a = 1, b = "s")"#);

        let empty = Chart::builder("empty").build().unwrap();
        assert!(Value::Chart(empty).truth());
    }

    #[test]
    fn test_overrides_merge_into_defaults() {
        let chart = Chart::builder("x")
            .value("db", Value::from_json(json!({"user": "root", "port": 3306})))
            .value("replicas", Value::Int(1))
            .overrides(Values::from_yaml("db:\n  port: 3307\nextra: true\n").unwrap())
            .build()
            .unwrap();

        assert_eq!(
            chart.value("db").unwrap(),
            Value::from_json(json!({"user": "root", "port": 3307}))
        );
        assert_eq!(chart.value("replicas"), Some(Value::Int(1)));
        assert_eq!(chart.value("extra"), Some(Value::Bool(true)));
    }

    #[test]
    fn test_overrides_reach_sub_charts() {
        let sub = Chart::builder("redis")
            .value("port", Value::Int(6379))
            .value("persistence", Value::Bool(false))
            .build()
            .unwrap();
        let parent = Chart::builder("app")
            .value("redis", sub.clone())
            .overrides(Values::from_yaml("redis:\n  port: 6380\n").unwrap())
            .build()
            .unwrap();

        assert!(matches!(parent.value("redis"), Some(Value::Chart(_))));
        assert_eq!(sub.value("port"), Some(Value::Int(6380)));
        assert_eq!(sub.value("persistence"), Some(Value::Bool(false)));
    }

    #[test]
    fn test_sub_charts_and_jewels() {
        let sub = Chart::builder("redis").build().unwrap();
        let jewel = Arc::new(Jewel::new(Arc::new(CountingBackend::default()), "p"));
        let parent = Chart::builder("app")
            .value("cache", sub.clone())
            .value("password", jewel.clone())
            .value("plain", Value::Int(1))
            .build()
            .unwrap();

        assert_eq!(parent.sub_charts().len(), 1);
        assert!(Arc::ptr_eq(&parent.sub_charts()[0], &sub));
        assert_eq!(parent.jewels().len(), 1);
        assert!(Arc::ptr_eq(&parent.jewels()[0], &jewel));
    }

    #[test]
    fn test_aliased_values_are_listed_once() {
        let sub = Chart::builder("redis").build().unwrap();
        let jewel = Arc::new(Jewel::new(Arc::new(CountingBackend::default()), "cert"));
        let parent = Chart::builder("app")
            .value("tls", jewel.clone())
            .value("tls_alias", jewel.clone())
            .value("cache", sub.clone())
            .value("cache_alias", sub.clone())
            .build()
            .unwrap();

        assert_eq!(parent.jewels().len(), 1);
        assert_eq!(parent.sub_charts().len(), 1);
    }

    #[tokio::test]
    async fn test_aliased_jewel_is_released_once() {
        let k8s = shalm_kube::MockK8s::new();
        let backend = Arc::new(CountingBackend::complex());
        let jewel = Arc::new(Jewel::new(backend.clone(), "cert"));
        let chart = Chart::builder("app")
            .value("tls", jewel.clone())
            .value("tls_alias", jewel)
            .build()
            .unwrap();

        chart.delete(Arc::new(k8s.clone())).await.unwrap();

        assert_eq!(backend.deletes.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(
            k8s.operations(),
            vec![
                shalm_kube::MockOperation::Delete(vec!["Secret/cert".to_string()]),
                shalm_kube::MockOperation::Progress(100),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_hook_is_an_error() {
        let chart = chart("mariadb");
        let err = chart
            .call_method("upgrade", Args::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "chart 'mariadb' has no method 'upgrade'");
    }

    #[tokio::test]
    async fn test_hook_outliving_chart() {
        let apply = chart("mariadb").method("apply").unwrap();
        let err = apply.call(Args::default()).await.unwrap_err();
        assert!(matches!(err, ShalmError::ChartDropped(_)));
    }

    #[test]
    fn test_from_source() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("mariadb");
        std::fs::create_dir_all(dir.join("templates")).unwrap();
        std::fs::write(dir.join("Chart.yaml"), "version: 10.4.0\n").unwrap();
        std::fs::write(dir.join("values.yaml"), "replicas: 1\nimage: mariadb\n").unwrap();
        std::fs::write(dir.join("templates/cm.yaml"), "kind: ConfigMap\n").unwrap();

        let source = ChartSource::load(&dir).unwrap();
        let options = ChartOptions::new("db")
            .suffix("a")
            .values(Values::from_yaml("replicas: 3\n").unwrap());
        let chart = Chart::from_source(source, options).unwrap();

        assert_eq!(chart.name(), "mariadb-a");
        assert_eq!(chart.namespace(), "db");
        assert_eq!(chart.version(), &Version::new(10, 4, 0));
        assert_eq!(chart.value("replicas"), Some(Value::Int(3)));
        assert_eq!(chart.value("image"), Some(Value::from("mariadb")));
        assert_eq!(chart.templates().len(), 1);
    }
}
