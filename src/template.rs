//! Template compilation for URLs, keys, and conditions
//!
//! A `src`, `key`, or `condition` value containing the marker `{{` is
//! compiled once at parse time and rendered per request. The render context
//! exposes `method`, `path`, `query`, `host`, a lowercased `header` map,
//! and a `cookie` map; dashed header names use subscript syntax, e.g.
//! `{{ header["accept-language"] }}`.

use crate::error::{EsiError, Result};
use crate::fetch::PageRequest;
use minijinja::{context, Environment, Value};
use std::collections::HashMap;
use tracing::warn;

/// Marker that switches a plain attribute value into a compiled template.
pub const TEMPLATE_MARKER: &str = "{{";

const TEMPLATE_NAME: &str = "esi";

/// True when the value must be compiled rather than used literally.
pub fn is_templated(value: &str) -> bool {
    value.contains(TEMPLATE_MARKER)
}

/// A compiled template owning its source. Each compiled template belongs to
/// exactly one `Resource` or `Entity` field.
#[derive(Debug)]
pub struct Template {
    env: Environment<'static>,
    source: String,
}

impl Template {
    /// Compile `source`. Failure is a static configuration bug.
    pub fn compile(source: &str) -> Result<Self> {
        let mut env = Environment::new();
        env.add_template_owned(TEMPLATE_NAME.to_string(), source.to_string())
            .map_err(|e| EsiError::TemplateCompile {
                source_text: source.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Template {
            env,
            source: source.to_string(),
        })
    }

    /// The original template source.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render against one request.
    pub fn render(&self, req: &PageRequest) -> Result<String> {
        let tpl = self
            .env
            .get_template(TEMPLATE_NAME)
            .map_err(|e| self.render_error(e))?;
        tpl.render(request_context(req))
            .map_err(|e| self.render_error(e))
    }

    fn render_error(&self, e: minijinja::Error) -> EsiError {
        EsiError::TemplateCompile {
            source_text: self.source.clone(),
            reason: format!("render failed: {}", e),
        }
    }
}

/// A compiled boolean expression deciding whether an include participates
/// in the query batch for a given request.
#[derive(Debug)]
pub struct Condition {
    tpl: Template,
}

impl Condition {
    pub fn compile(source: &str) -> Result<Self> {
        Ok(Condition {
            tpl: Template::compile(source)?,
        })
    }

    pub fn source(&self) -> &str {
        self.tpl.source()
    }

    /// Evaluate against one request. The trimmed render is false iff it is
    /// empty, `false`, or `0`. A render failure counts as false.
    pub fn evaluate(&self, req: &PageRequest) -> bool {
        match self.tpl.render(req) {
            Ok(out) => {
                let out = out.trim();
                !(out.is_empty() || out == "false" || out == "0")
            }
            Err(e) => {
                warn!("condition {:?} failed to render: {}", self.tpl.source(), e);
                false
            }
        }
    }
}

/// Build the render context for one request.
fn request_context(req: &PageRequest) -> Value {
    let mut headers: HashMap<String, String> = HashMap::new();
    for (name, value) in req.headers.iter() {
        if let Ok(v) = value.to_str() {
            headers
                .entry(name.as_str().to_ascii_lowercase())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(v);
                })
                .or_insert_with(|| v.to_string());
        }
    }

    let cookies = parse_cookies(headers.get("cookie").map(String::as_str).unwrap_or(""));

    context! {
        method => req.method.as_str(),
        path => req.uri.path(),
        query => req.uri.query().unwrap_or(""),
        host => req.uri.host().unwrap_or(""),
        header => headers,
        cookie => cookies,
    }
}

fn parse_cookies(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}
