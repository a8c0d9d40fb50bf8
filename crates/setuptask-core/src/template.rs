//! Template-driven setup tasks
//!
//! A template task renders a template with variables taken from its owner
//! and writes the result into the owner's stamp directory. Unless a custom
//! hash is given, the task's hash is the digest of the rendered output, so
//! the file is rewritten exactly when its content would change.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tera::{Context, Tera};
use tracing::{debug, info};

use crate::context::SetupTaskContext;
use crate::descriptor::TaskBuilder;
use crate::digest::content_hash;
use crate::error::{TaskError, TemplateError};
use crate::owner::SetupTaskOwner;

/// Renders named templates
pub trait TemplateRenderer: Send + Sync {
    /// Render `template` with `vars`
    ///
    /// # Errors
    /// Returns error if the template is unknown or fails to render
    fn render(&self, template: &str, vars: &serde_json::Value) -> Result<String, TemplateError>;
}

/// Jinja2-style renderer backed by tera
#[derive(Debug, Default)]
pub struct TeraRenderer {
    tera: Tera,
}

impl TeraRenderer {
    /// Empty renderer; add templates with [`TeraRenderer::add_raw`]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every file below `dir`, named by its path relative to `dir`
    ///
    /// # Errors
    /// Returns error if a template fails to parse
    pub fn from_dir(dir: &Path) -> Result<Self, TemplateError> {
        let glob = format!("{}/**/*", dir.display());
        let tera = Tera::new(&glob).map_err(TemplateError::Load)?;
        info!(
            dir = %dir.display(),
            templates = tera.get_template_names().count(),
            "loaded templates"
        );
        Ok(Self { tera })
    }

    /// Register a template from a string
    ///
    /// # Errors
    /// Returns error if the template fails to parse
    pub fn add_raw(&mut self, name: &str, content: &str) -> Result<(), TemplateError> {
        self.tera
            .add_raw_template(name, content)
            .map_err(TemplateError::Load)
    }
}

impl TemplateRenderer for TeraRenderer {
    fn render(&self, template: &str, vars: &serde_json::Value) -> Result<String, TemplateError> {
        let context = match vars {
            serde_json::Value::Null => Context::new(),
            serde_json::Value::Object(_) => {
                Context::from_value(vars.clone()).map_err(|_| TemplateError::InvalidVars {
                    template: template.to_string(),
                })?
            }
            _ => {
                return Err(TemplateError::InvalidVars {
                    template: template.to_string(),
                });
            }
        };

        self.tera
            .render(template, &context)
            .map_err(|source| TemplateError::Render {
                template: template.to_string(),
                source,
            })
    }
}

type VarsFn<O> = Arc<dyn Fn(&O) -> serde_json::Value + Send + Sync>;

/// Declares a setup task that renders a template into the stamp directory
pub struct TemplateTask<O> {
    name: String,
    template: String,
    output: Option<String>,
    renderer: Arc<dyn TemplateRenderer>,
    vars: Option<VarsFn<O>>,
    order: Option<i32>,
    before: Vec<String>,
    after: Vec<String>,
    hash: Option<Arc<dyn Fn(&O) -> String + Send + Sync>>,
}

impl<O: SetupTaskOwner> TemplateTask<O> {
    /// Render `template` through `renderer` as task `name`
    pub fn new(
        name: impl Into<String>,
        template: impl Into<String>,
        renderer: Arc<dyn TemplateRenderer>,
    ) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            output: None,
            renderer,
            vars: None,
            order: None,
            before: Vec::new(),
            after: Vec::new(),
            hash: None,
        }
    }

    /// Output file name inside the stamp directory
    ///
    /// Defaults to the template name without its final extension.
    #[must_use]
    pub fn output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Compute template variables from the owner
    #[must_use]
    pub fn vars<F>(mut self, vars: F) -> Self
    where
        F: Fn(&O) -> serde_json::Value + Send + Sync + 'static,
    {
        self.vars = Some(Arc::new(vars));
        self
    }

    #[must_use]
    pub fn order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    #[must_use]
    pub fn before(mut self, task: impl Into<String>) -> Self {
        self.before.push(task.into());
        self
    }

    #[must_use]
    pub fn after(mut self, task: impl Into<String>) -> Self {
        self.after.push(task.into());
        self
    }

    /// Replace the rendered-output hash with a custom one
    ///
    /// The output is then only rewritten when this hash changes.
    #[must_use]
    pub fn hash<F>(mut self, hash: F) -> Self
    where
        F: Fn(&O) -> String + Send + Sync + 'static,
    {
        self.hash = Some(Arc::new(hash));
        self
    }

    /// Turn the declaration into a task builder
    #[must_use]
    pub fn into_task(self) -> TaskBuilder<O> {
        let output = self
            .output
            .unwrap_or_else(|| output_name(&self.template));
        let render = Renderer {
            template: self.template.clone(),
            renderer: self.renderer,
            vars: self.vars,
        };

        let action_render = render.clone();
        let mut task = TaskBuilder::new(self.name)
            .description(format!("render {}", self.template))
            .action(move |owner: Arc<O>, _ctx: SetupTaskContext| {
                let render = action_render.clone();
                let output = output.clone();
                async move {
                    let rendered = render.render(&owner)?;
                    let dir = owner.stamp_path();
                    write_output(&dir, &output, &rendered).await?;
                    Ok::<(), TaskError>(())
                }
            });

        task = match self.hash {
            Some(hash) => task.hash(move |owner: &O| hash(owner)),
            None => task.try_hash(move |owner: &O| {
                Ok::<_, TaskError>(content_hash(render.render(owner)?.as_bytes()))
            }),
        };

        if let Some(order) = self.order {
            task = task.order(order);
        }
        for name in self.before {
            task = task.before(name);
        }
        for name in self.after {
            task = task.after(name);
        }
        task
    }
}

struct Renderer<O> {
    template: String,
    renderer: Arc<dyn TemplateRenderer>,
    vars: Option<VarsFn<O>>,
}

impl<O> Clone for Renderer<O> {
    fn clone(&self) -> Self {
        Self {
            template: self.template.clone(),
            renderer: Arc::clone(&self.renderer),
            vars: self.vars.clone(),
        }
    }
}

impl<O> Renderer<O> {
    fn render(&self, owner: &O) -> Result<String, TemplateError> {
        let vars = self
            .vars
            .as_ref()
            .map_or(serde_json::Value::Null, |vars| vars(owner));
        self.renderer.render(&self.template, &vars)
    }
}

async fn write_output(dir: &Path, output: &str, content: &str) -> Result<PathBuf, TemplateError> {
    let path = dir.join(output);
    let parent = path.parent().unwrap_or(dir).to_path_buf();
    tokio::fs::create_dir_all(&parent)
        .await
        .map_err(|source| TemplateError::Write {
            path: parent.clone(),
            source,
        })?;
    tokio::fs::write(&path, content)
        .await
        .map_err(|source| TemplateError::Write {
            path: path.clone(),
            source,
        })?;
    debug!(path = %path.display(), bytes = content.len(), "template rendered");
    Ok(path)
}

/// Default output name for a template: its name without the final extension
#[must_use]
pub fn output_name(template: &str) -> String {
    let file = template.rsplit('/').next().unwrap_or(template);
    match file.rfind('.') {
        Some(idx) if idx > 0 => file[..idx].to_string(),
        _ => file.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_name() {
        assert_eq!(output_name("motd.tera"), "motd");
        assert_eq!(output_name("template-2.j2"), "template-2");
        assert_eq!(output_name("etc/hosts.conf.j2"), "hosts.conf");
        assert_eq!(output_name("plain"), "plain");
        assert_eq!(output_name(".hidden"), ".hidden");
    }

    #[test]
    fn test_tera_renderer() {
        let mut renderer = TeraRenderer::new();
        renderer
            .add_raw("greeting.tera", "hello {{ name }}")
            .unwrap();

        let out = renderer
            .render("greeting.tera", &serde_json::json!({"name": "the name"}))
            .unwrap();
        assert_eq!(out, "hello the name");
    }

    #[test]
    fn test_tera_renderer_rejects_non_object_vars() {
        let mut renderer = TeraRenderer::new();
        renderer.add_raw("t", "x").unwrap();

        let err = renderer.render("t", &serde_json::json!([1, 2])).unwrap_err();
        assert!(matches!(err, TemplateError::InvalidVars { .. }));
    }

    #[test]
    fn test_unknown_template() {
        let renderer = TeraRenderer::new();
        let err = renderer.render("missing", &serde_json::Value::Null).unwrap_err();
        assert!(matches!(err, TemplateError::Render { .. }));
    }
}
