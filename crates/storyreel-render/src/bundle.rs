//! Template bundling: compile composition templates with minijinja and bind
//! props into them.
//!
//! Output is HTML-escaped by default; `{{ html|safe }}` inserts markup
//! verbatim. Missing props and `null` render as nothing.

use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde_json::{Map, Value};
use storyreel_core::hash::{hash_source, ContentHash};
use storyreel_core::{RenderError, RenderResult};

/// Global the bound props are exposed under in page scripts.
pub const PROPS_GLOBAL: &str = "__STORYREEL_PROPS__";

const TEMPLATE_NAME: &str = "composition";

/// A compiled template.
#[derive(Debug, Clone)]
pub struct Bundle {
    hash: ContentHash,
    label: String,
    env: Environment<'static>,
}

fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_auto_escape_callback(|_| AutoEscape::Html);
    env.set_undefined_behavior(UndefinedBehavior::Chainable);
    env.set_formatter(|out, state, value| {
        if value.is_none() {
            return Ok(());
        }
        minijinja::escape_formatter(out, state, value)
    });
    env
}

impl Bundle {
    /// Compile `source`. `label` names the template in error messages.
    pub fn compile(label: &str, source: &str) -> RenderResult<Self> {
        let mut env = environment();
        env.add_template_owned(TEMPLATE_NAME, source.to_string())
            .map_err(|e| bundling_error(label, &e))?;
        Ok(Self {
            hash: hash_source(source),
            label: label.to_string(),
            env,
        })
    }

    /// Hash of the source this bundle was compiled from.
    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    /// Top-level prop names the template reads, sorted.
    pub fn placeholders(&self) -> Vec<String> {
        let mut names: Vec<String> = match self.env.get_template(TEMPLATE_NAME) {
            Ok(template) => template.undeclared_variables(false).into_iter().collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    /// Render the template with `props` as its context.
    pub fn bind(&self, props: &Map<String, Value>) -> RenderResult<String> {
        self.env
            .get_template(TEMPLATE_NAME)
            .and_then(|template| template.render(props))
            .map_err(|e| bundling_error(&self.label, &e))
    }
}

fn bundling_error(label: &str, err: &minijinja::Error) -> RenderError {
    let detail = err
        .detail()
        .map(str::to_string)
        .unwrap_or_else(|| err.kind().to_string());
    match err.line() {
        Some(line) => RenderError::Bundling(format!("{}: {} (line {})", label, detail, line)),
        None => RenderError::Bundling(format!("{}: {}", label, detail)),
    }
}

/// Expose `props` to page scripts as `window.__STORYREEL_PROPS__`.
///
/// The script goes right before `</head>`, or at the very start when the
/// document has no head.
pub fn inject_props(html: &str, props: &Map<String, Value>) -> String {
    // `</` would end the script element early.
    let json = Value::Object(props.clone()).to_string().replace("</", "<\\/");
    let script = format!("<script>window.{}={};</script>", PROPS_GLOBAL, json);

    match html.to_ascii_lowercase().find("</head>") {
        Some(at) => {
            let mut out = String::with_capacity(html.len() + script.len());
            out.push_str(&html[..at]);
            out.push_str(&script);
            out.push_str(&html[at..]);
            out
        }
        None => format!("{}{}", script, html),
    }
}
