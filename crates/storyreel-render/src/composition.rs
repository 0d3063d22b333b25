//! Composition registry: the named templates a render can ask for.
//!
//! Two compositions are built in (`ContentPillar` and `HTMLVideo`). A
//! configured directory adds one composition per `<id>.html` file; those
//! shadow built-ins with the same id.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{json, Map, Value};
use storyreel_core::{CompositionConfig, RenderError, RenderResult};

pub const CONTENT_PILLAR: &str = "ContentPillar";
pub const HTML_VIDEO: &str = "HTMLVideo";

const CONTENT_PILLAR_TEMPLATE: &str = include_str!("../templates/content_pillar.html");
const HTML_VIDEO_TEMPLATE: &str = include_str!("../templates/html_video.html");

/// Day palettes for `ContentPillar`: (day, accent, deep accent).
const DAY_PALETTES: [(&str, &str, &str); 7] = [
    ("monday", "#f8fafc", "#cbd5e1"),
    ("tuesday", "#fde68a", "#f59e0b"),
    ("wednesday", "#93c5fd", "#3b82f6"),
    ("thursday", "#86efac", "#22c55e"),
    ("friday", "#fca5a5", "#ef4444"),
    ("saturday", "#f9a8d4", "#ec4899"),
    ("sunday", "#8b5cf6", "#7c3aed"),
];

/// Where a composition's template text comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateSource {
    Embedded(&'static str),
    /// Read on every resolve, so edits show up without a restart.
    File(PathBuf),
}

/// Per-variant default props selected by one prop's value.
#[derive(Debug, Clone, PartialEq)]
pub struct Variants {
    /// Prop whose value picks the variant, e.g. `dayOfWeek`.
    pub prop: String,
    /// Declared variants in order; the first is the fallback.
    pub entries: Vec<(String, Map<String, Value>)>,
}

impl Variants {
    /// Variant for `value`, matched case-insensitively, else the first one.
    pub fn select(&self, value: Option<&Value>) -> Option<&(String, Map<String, Value>)> {
        let wanted = value.and_then(Value::as_str).map(str::to_lowercase);
        wanted
            .and_then(|w| self.entries.iter().find(|(name, _)| *name == w))
            .or_else(|| self.entries.first())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub id: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_ms: u64,
    pub default_props: Map<String, Value>,
    pub variants: Option<Variants>,
    pub source: TemplateSource,
}

impl Composition {
    /// `defaultProps` <- variant defaults <- `request`, later wins.
    pub fn merge_props(&self, request: &Map<String, Value>) -> Map<String, Value> {
        let mut merged = self.default_props.clone();
        if let Some(variants) = &self.variants {
            let chosen = request
                .get(&variants.prop)
                .or_else(|| self.default_props.get(&variants.prop));
            if let Some((_, defaults)) = variants.select(chosen) {
                merged.extend(defaults.clone());
            }
        }
        merged.extend(request.clone());
        merged
    }

    /// Template text to bundle.
    pub async fn load_source(&self) -> RenderResult<String> {
        match &self.source {
            TemplateSource::Embedded(text) => Ok((*text).to_string()),
            TemplateSource::File(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|e| RenderError::storage("read composition template", path, e)),
        }
    }

    pub fn info(&self) -> CompositionInfo {
        CompositionInfo {
            id: self.id.clone(),
            width: self.width,
            height: self.height,
            fps: self.fps,
            duration_ms: self.duration_ms,
            default_props: Value::Object(self.default_props.clone()),
            variants: self
                .variants
                .as_ref()
                .map(|v| v.entries.iter().map(|(name, _)| name.clone()).collect())
                .unwrap_or_default(),
            source: match &self.source {
                TemplateSource::Embedded(_) => "builtin".to_string(),
                TemplateSource::File(path) => path.display().to_string(),
            },
        }
    }
}

/// Listing entry, as served by `GET /compositions`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionInfo {
    pub id: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_ms: u64,
    pub default_props: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<String>,
    pub source: String,
}

#[derive(Debug, Clone, Default)]
pub struct CompositionRegistry {
    compositions: BTreeMap<String, Composition>,
}

impl CompositionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(content_pillar());
        registry.register(html_video());
        registry
    }

    /// Built-ins plus the configured template directory, if any.
    pub fn from_config(config: &CompositionConfig) -> RenderResult<Self> {
        let mut registry = Self::with_builtins();
        if let Some(dir) = &config.dir {
            let added = registry.load_dir(dir, config)?;
            tracing::info!(dir = %dir.display(), added, "loaded composition templates");
        }
        Ok(registry)
    }

    /// Register, replacing any composition with the same id.
    pub fn register(&mut self, composition: Composition) {
        if self.compositions.contains_key(&composition.id) {
            tracing::debug!(id = %composition.id, "composition shadows an earlier registration");
        }
        self.compositions.insert(composition.id.clone(), composition);
    }

    /// Register every `<id>.html` in `dir` with the configured defaults.
    /// Returns how many were added.
    pub fn load_dir(&mut self, dir: &Path, config: &CompositionConfig) -> RenderResult<usize> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| RenderError::storage("read composition directory", dir, e))?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RenderError::storage("read composition directory", dir, e))?;
            let path = entry.path();
            let is_html = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("html"))
                .unwrap_or(false);
            if is_html && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut added = 0;
        for path in paths {
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                tracing::warn!(path = %path.display(), "skipping template with a non UTF-8 name");
                continue;
            };
            self.register(Composition {
                id,
                width: config.default_width,
                height: config.default_height,
                fps: config.default_fps,
                duration_ms: config.default_duration_ms,
                default_props: Map::new(),
                variants: None,
                source: TemplateSource::File(path),
            });
            added += 1;
        }
        Ok(added)
    }

    pub fn get(&self, id: &str) -> RenderResult<&Composition> {
        self.compositions
            .get(id)
            .ok_or_else(|| RenderError::CompositionNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.compositions.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.compositions.keys().map(String::as_str)
    }

    pub fn list(&self) -> Vec<CompositionInfo> {
        self.compositions.values().map(Composition::info).collect()
    }

    pub fn len(&self) -> usize {
        self.compositions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compositions.is_empty()
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn content_pillar() -> Composition {
    let entries = DAY_PALETTES
        .iter()
        .map(|(day, accent, deep)| {
            let defaults = object(json!({
                "badgeText": day.to_uppercase(),
                "accent": accent,
                "accentDeep": deep,
            }));
            (day.to_string(), defaults)
        })
        .collect();

    Composition {
        id: CONTENT_PILLAR.to_string(),
        width: 1080,
        height: 1920,
        fps: 30.0,
        duration_ms: 7000,
        default_props: object(json!({
            "dayOfWeek": "monday",
            "templateType": "A",
            "title": "Sample Title",
            "description": "Sample Description",
            "imageUrl": "",
            "badgeText": "MONDAY",
            "subtitle": "Premium Selection",
        })),
        variants: Some(Variants {
            prop: "dayOfWeek".to_string(),
            entries,
        }),
        source: TemplateSource::Embedded(CONTENT_PILLAR_TEMPLATE),
    }
}

fn html_video() -> Composition {
    Composition {
        id: HTML_VIDEO.to_string(),
        width: 1080,
        height: 1920,
        fps: 30.0,
        duration_ms: 7000,
        default_props: object(json!({ "html": "<div />" })),
        variants: None,
        source: TemplateSource::Embedded(HTML_VIDEO_TEMPLATE),
    }
}
