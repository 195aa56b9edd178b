//! Bridge between chart values and the MiniJinja renderer
//!
//! Charts and jewels are exposed as lazy objects so that a jewel only
//! generates its payload when a template actually reads one of its fields.

use indexmap::IndexMap;
use minijinja::value::{Enumerator, Object, ObjectRepr};
use minijinja::{Error, ErrorKind, State, Value as MjValue, context};
use std::fmt;
use std::sync::Arc;

use crate::chart::{Chart, ChartClass};
use crate::jewel::Jewel;
use crate::value::Value;

/// Why a chart is being rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Apply,
    /// Jewels are not generated; fields render as currently held
    Delete,
}

impl RenderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderMode::Apply => "apply",
            RenderMode::Delete => "delete",
        }
    }
}

/// Template context for a chart's own manifests
pub fn render_context(chart: &Chart, mode: RenderMode) -> MjValue {
    let name = chart.name();
    context! {
        values => MjValue::from_object(ChartObject::snapshot(chart, mode)),
        chart => context! {
            name => name.clone(),
            version => chart.version().to_string(),
            namespace => chart.namespace(),
        },
        release => context! {
            name => name,
            namespace => chart.namespace(),
            operation => mode.as_str(),
        },
    }
}

/// Convert a sandbox value for template use
pub fn to_template_value(value: &Value, mode: RenderMode) -> MjValue {
    match value {
        Value::None => MjValue::from(()),
        Value::Bool(b) => MjValue::from(*b),
        Value::Int(i) => MjValue::from(*i),
        Value::Float(f) => MjValue::from(*f),
        Value::String(s) => MjValue::from(s.as_str()),
        Value::List(items) => MjValue::from(
            items
                .iter()
                .map(|item| to_template_value(item, mode))
                .collect::<Vec<_>>(),
        ),
        Value::Map(_) | Value::Dict(_) => {
            let entries: IndexMap<String, MjValue> = value
                .as_mapping()
                .into_iter()
                .flatten()
                .map(|(k, v)| (k.clone(), to_template_value(v, mode)))
                .collect();
            MjValue::from_iter(entries)
        }
        Value::Chart(chart) => MjValue::from_object(ChartObject::snapshot(chart, mode)),
        Value::Jewel(jewel) => MjValue::from_object(JewelObject {
            jewel: Arc::clone(jewel),
            mode,
        }),
        Value::Class(class) => class_value(class),
        Value::K8s(_) | Value::Callable(_) => MjValue::from(()),
    }
}

fn class_value(class: &ChartClass) -> MjValue {
    context! {
        name => class.name.as_str(),
        version => class.version.to_string(),
    }
}

/// A chart as seen from templates
#[derive(Debug)]
struct ChartObject {
    name: String,
    namespace: String,
    class: ChartClass,
    values: IndexMap<String, Value>,
    mode: RenderMode,
}

impl ChartObject {
    fn snapshot(chart: &Chart, mode: RenderMode) -> Self {
        Self {
            name: chart.name(),
            namespace: chart.namespace().to_string(),
            class: chart.class().clone(),
            values: chart.values(),
            mode,
        }
    }
}

impl Object for ChartObject {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Map
    }

    fn get_value(self: &Arc<Self>, key: &MjValue) -> Option<MjValue> {
        match key.as_str()? {
            "name" => Some(MjValue::from(self.name.as_str())),
            "namespace" => Some(MjValue::from(self.namespace.as_str())),
            "__class__" => Some(class_value(&self.class)),
            other => self
                .values
                .get(other)
                .map(|v| to_template_value(v, self.mode)),
        }
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Values(self.values.keys().map(|k| MjValue::from(k.as_str())).collect())
    }
}

/// A jewel as seen from templates
#[derive(Debug)]
struct JewelObject {
    jewel: Arc<Jewel>,
    mode: RenderMode,
}

impl JewelObject {
    fn field(&self, name: &str) -> crate::Result<String> {
        match self.mode {
            RenderMode::Apply if name != "name" => self.jewel.field(name),
            _ => self.jewel.peek(name),
        }
    }

    fn template_values(&self) -> crate::Result<IndexMap<String, String>> {
        match self.mode {
            RenderMode::Apply => self.jewel.template_values(),
            RenderMode::Delete => self
                .jewel
                .backend()
                .keys()
                .into_keys()
                .map(|field| self.jewel.peek(&field).map(|text| (field, text)))
                .collect(),
        }
    }
}

fn template_error(err: crate::ShalmError) -> Error {
    Error::new(ErrorKind::InvalidOperation, err.to_string())
}

impl Object for JewelObject {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Map
    }

    fn get_value(self: &Arc<Self>, key: &MjValue) -> Option<MjValue> {
        let key = key.as_str()?;
        Some(match self.field(key) {
            Ok(text) => MjValue::from(text),
            Err(err) => MjValue::from(template_error(err)),
        })
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Values(
            self.jewel
                .attr_names()
                .into_iter()
                .map(MjValue::from)
                .collect(),
        )
    }

    fn is_true(self: &Arc<Self>) -> bool {
        false
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State,
        method: &str,
        _args: &[MjValue],
    ) -> Result<MjValue, Error> {
        match method {
            "template_values" => {
                let values = self.template_values().map_err(template_error)?;
                Ok(MjValue::from_iter(values))
            }
            _ => Err(Error::new(
                ErrorKind::UnknownMethod,
                format!("{} has no method '{}'", self.jewel.backend().name(), method),
            )),
        }
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result
    where
        Self: Sized + 'static,
    {
        fmt::Display::fmt(&self.jewel, f)
    }
}
