//! Template engine based on MiniJinja

use indexmap::IndexMap;
use minijinja::Environment;

use crate::error::{EngineError, Result, TemplateError};
use crate::filters;

/// Result of rendering a chart's templates
#[derive(Debug, Default)]
pub struct RenderResult {
    /// Rendered manifests by template name, in template order
    pub manifests: IndexMap<String, String>,
}

impl RenderResult {
    /// Join all rendered manifests into one multi-document YAML stream
    pub fn stream(&self) -> String {
        self.manifests
            .values()
            .map(|m| m.trim())
            .collect::<Vec<_>>()
            .join("\n---\n")
    }
}

/// Template engine builder
pub struct EngineBuilder {
    strict_mode: bool,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self { strict_mode: true }
    }

    /// Set strict mode (fail on undefined variables)
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    /// Build the engine
    pub fn build(self) -> Engine {
        Engine::new(self.strict_mode)
    }
}

/// The template engine
#[derive(Debug, Clone, Copy)]
pub struct Engine {
    strict_mode: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Engine {
    /// Create a new engine with default settings
    pub fn new(strict_mode: bool) -> Self {
        Self { strict_mode }
    }

    /// Create a builder
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Create a configured MiniJinja environment
    fn create_environment(&self) -> Environment<'static> {
        let mut env = Environment::new();

        if self.strict_mode {
            env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        } else {
            env.set_undefined_behavior(minijinja::UndefinedBehavior::Lenient);
        }

        env.add_filter("toyaml", filters::toyaml);
        env.add_filter("tojson", filters::tojson);
        env.add_filter("b64encode", filters::b64encode);
        env.add_filter("b64decode", filters::b64decode);
        env.add_filter("quote", filters::quote);
        env.add_filter("nindent", filters::nindent);
        env.add_filter("indent", filters::indent);
        env.add_filter("required", filters::required);
        env.add_filter("sha256", filters::sha256sum);
        env.add_filter("trunc", filters::trunc);

        env.add_function("fail", filters::fail);

        env
    }

    /// Render a single template string
    pub fn render_string(
        &self,
        template: &str,
        context: &minijinja::Value,
        template_name: &str,
    ) -> Result<String> {
        let mut env = self.create_environment();

        env.add_template_owned(template_name.to_string(), template.to_string())
            .map_err(|e| TemplateError::from_minijinja(e, template_name, template))?;

        let tmpl = env
            .get_template(template_name)
            .map_err(|e| TemplateError::from_minijinja(e, template_name, template))?;

        Ok(tmpl
            .render(context)
            .map_err(|e| TemplateError::from_minijinja(e, template_name, template))?)
    }

    /// Render a set of templates
    ///
    /// All templates are loaded so that `include`/`import` can reach helper
    /// templates. Only templates whose name matches `filter` (a glob, empty
    /// or `None` meaning all) are emitted; helpers whose file name starts
    /// with `_` and templates that render to nothing are skipped.
    pub fn render_templates(
        &self,
        templates: &IndexMap<String, String>,
        context: &minijinja::Value,
        filter: Option<&str>,
    ) -> Result<RenderResult> {
        let pattern = match filter.filter(|f| !f.is_empty()) {
            Some(glob) => Some(glob::Pattern::new(glob).map_err(|e| {
                EngineError::InvalidGlob {
                    pattern: glob.to_string(),
                    message: e.to_string(),
                }
            })?),
            None => None,
        };

        let mut env = self.create_environment();
        for (name, source) in templates {
            env.add_template_owned(name.clone(), source.clone())
                .map_err(|e| TemplateError::from_minijinja(e, name, source))?;
        }

        let mut result = RenderResult::default();
        for (name, source) in templates {
            if is_helper(name) {
                continue;
            }
            if let Some(pattern) = &pattern
                && !pattern.matches(name)
            {
                continue;
            }

            let tmpl = env
                .get_template(name)
                .map_err(|e| TemplateError::from_minijinja(e, name, source))?;
            let rendered = tmpl
                .render(context)
                .map_err(|e| TemplateError::from_minijinja(e, name, source))?;

            let trimmed = rendered.trim();
            if trimmed.is_empty() || trimmed == "---" {
                continue;
            }

            let output_name = name.trim_end_matches(".j2").trim_end_matches(".jinja2");
            result.manifests.insert(output_name.to_string(), rendered);
        }

        Ok(result)
    }
}

fn is_helper(name: &str) -> bool {
    name.rsplit('/').next().is_some_and(|file| file.starts_with('_'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    fn templates(entries: &[(&str, &str)]) -> IndexMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_string() {
        let engine = Engine::default();
        let out = engine
            .render_string("name: {{ name | quote }}", &context! { name => "web" }, "t")
            .unwrap();
        assert_eq!(out, "name: \"web\"");
    }

    #[test]
    fn test_strict_undefined_fails() {
        let engine = Engine::builder().strict(true).build();
        let err = engine
            .render_string("{{ missing.key }}", &context! {}, "t.yaml")
            .unwrap_err();
        match err {
            EngineError::Template(e) => {
                assert_eq!(e.kind(), crate::TemplateErrorKind::UndefinedVariable);
                assert_eq!(e.template, "t.yaml");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_lenient_undefined_renders_empty() {
        let engine = Engine::builder().strict(false).build();
        let out = engine.render_string("[{{ missing }}]", &context! {}, "t").unwrap();
        assert_eq!(out, "[]");
    }

    #[test]
    fn test_render_templates_skips_helpers_and_empty() {
        let engine = Engine::default();
        let set = templates(&[
            ("_helpers.tpl", "{% macro label(n) %}app: {{ n }}{% endmacro %}"),
            (
                "cm.yaml",
                "{% from '_helpers.tpl' import label %}kind: ConfigMap\n{{ label(name) }}",
            ),
            ("empty.yaml", "{% if false %}kind: Never{% endif %}"),
        ]);

        let result = engine
            .render_templates(&set, &context! { name => "web" }, None)
            .unwrap();

        assert_eq!(result.manifests.len(), 1);
        insta::assert_snapshot!(result.stream(), @r"
        kind: ConfigMap
        app: web
        ");
    }

    #[test]
    fn test_render_templates_glob_filter() {
        let engine = Engine::default();
        let set = templates(&[
            ("deploy.yaml", "kind: Deployment"),
            ("crds/crd.yaml", "kind: CustomResourceDefinition"),
            ("svc.j2", "kind: Service"),
        ]);

        let only_crds = engine
            .render_templates(&set, &context! {}, Some("crds/*"))
            .unwrap();
        assert_eq!(
            only_crds.manifests.keys().collect::<Vec<_>>(),
            vec!["crds/crd.yaml"]
        );

        let all = engine.render_templates(&set, &context! {}, Some("")).unwrap();
        assert_eq!(
            all.manifests.keys().collect::<Vec<_>>(),
            vec!["deploy.yaml", "crds/crd.yaml", "svc"]
        );
    }

    #[test]
    fn test_invalid_glob() {
        let engine = Engine::default();
        let result = engine.render_templates(&IndexMap::new(), &context! {}, Some("[abc"));
        assert!(matches!(result, Err(EngineError::InvalidGlob { .. })));
    }

    #[test]
    fn test_stream_joins_documents() {
        let mut result = RenderResult::default();
        result.manifests.insert("a".into(), "kind: A\n".into());
        result.manifests.insert("b".into(), "\nkind: B".into());
        assert_eq!(result.stream(), "kind: A\n---\nkind: B");
    }
}
