//! Targets: what to crawl and what to extract
//!
//! A target holds two link matchers (content and navigation), the start
//! URLs, optional render directives per link class, and an [`Extractor`]
//! that turns a content page into a [`Record`]. Targets are described by
//! typed [`TargetConfig`] values and rebuilt by kind through a
//! [`TargetRegistry`], which is what lets a saved job be resumed.

mod matcher;
mod selector;

pub use matcher::{LinkMatcher, MatcherConfig};
pub use selector::{FieldRule, SelectorTarget};

use crate::config::validate_start_url;
use crate::crawler::{LinkKind, Page};
use crate::render::{RenderCallbacks, RenderDirective};
use crate::ConfigError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// One extracted record
pub type Record = serde_json::Map<String, Value>;

/// An extractor failed on a content page
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("extraction failed for {url}: {message}")]
pub struct ExtractionError {
    pub url: String,
    pub message: String,
}

impl ExtractionError {
    pub fn new(url: &Url, message: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            message: message.into(),
        }
    }
}

/// Turns a content page into a record
pub trait Extractor: Send + Sync {
    fn extract(&self, page: &Page) -> Result<Record, ExtractionError>;
}

impl<F> Extractor for F
where
    F: Fn(&Page) -> Result<Record, ExtractionError> + Send + Sync,
{
    fn extract(&self, page: &Page) -> Result<Record, ExtractionError> {
        self(page)
    }
}

/// The crawl-facing part of a target
#[derive(Debug, Clone)]
pub struct TargetDefinition {
    pub start_urls: Vec<Url>,
    pub content: LinkMatcher,
    pub navigation: LinkMatcher,
    pub content_render: Option<RenderDirective>,
    pub navigation_render: Option<RenderDirective>,
}

impl TargetDefinition {
    /// A definition with no matchers and no rendering
    pub fn new(start_urls: Vec<Url>) -> Self {
        Self {
            start_urls,
            content: LinkMatcher::none(),
            navigation: LinkMatcher::none(),
            content_render: None,
            navigation_render: None,
        }
    }

    pub fn with_content(mut self, matcher: LinkMatcher, render: Option<RenderDirective>) -> Self {
        self.content = matcher;
        self.content_render = render;
        self
    }

    pub fn with_navigation(
        mut self,
        matcher: LinkMatcher,
        render: Option<RenderDirective>,
    ) -> Self {
        self.navigation = matcher;
        self.navigation_render = render;
        self
    }

    /// The matcher for a link class
    pub fn matcher(&self, kind: LinkKind) -> &LinkMatcher {
        match kind {
            LinkKind::Content => &self.content,
            LinkKind::Navigation => &self.navigation,
        }
    }

    /// The render directive for a link class
    pub fn render(&self, kind: LinkKind) -> Option<&RenderDirective> {
        match kind {
            LinkKind::Content => self.content_render.as_ref(),
            LinkKind::Navigation => self.navigation_render.as_ref(),
        }
    }

    /// Whether any request of this target needs the render session
    pub fn uses_rendering(&self) -> bool {
        self.content_render.is_some() || self.navigation_render.is_some()
    }
}

/// A typed, serializable target configuration
///
/// Implementations validate their required fields in [`definition`] and
/// [`extractor`]; a configuration that fails either never becomes a target.
///
/// [`definition`]: TargetConfig::definition
/// [`extractor`]: TargetConfig::extractor
pub trait TargetConfig: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Registry key of this target kind
    const KIND: &'static str;

    fn definition(&self) -> Result<TargetDefinition, ConfigError>;

    fn extractor(&self) -> Result<Arc<dyn Extractor>, ConfigError>;

    /// Named render callbacks referenced by `Callback` directives
    fn render_callbacks(&self) -> RenderCallbacks {
        HashMap::new()
    }
}

/// A built target, erased over its configuration type
#[derive(Clone)]
pub struct Target {
    kind: String,
    config: Value,
    definition: Arc<TargetDefinition>,
    extractor: Arc<dyn Extractor>,
    callbacks: RenderCallbacks,
}

impl Target {
    /// Builds a target from a typed configuration
    pub fn new<C: TargetConfig>(config: &C) -> Result<Self, ConfigError> {
        Self::from_parts(
            C::KIND,
            serde_json::to_value(config)?,
            config.definition()?,
            config.extractor()?,
            config.render_callbacks(),
        )
    }

    /// Builds a target from already-constructed parts
    pub fn from_parts(
        kind: impl Into<String>,
        config: Value,
        definition: TargetDefinition,
        extractor: Arc<dyn Extractor>,
        callbacks: RenderCallbacks,
    ) -> Result<Self, ConfigError> {
        let kind = kind.into();

        if definition.start_urls.is_empty() {
            return Err(ConfigError::Validation(format!(
                "target '{}' has no start URLs",
                kind
            )));
        }

        for directive in [&definition.content_render, &definition.navigation_render]
            .into_iter()
            .flatten()
        {
            if let RenderDirective::Callback { name } = directive {
                if !callbacks.contains_key(name) {
                    return Err(ConfigError::Validation(format!(
                        "target '{}' uses render callback '{}' which it does not register",
                        kind, name
                    )));
                }
            }
        }

        Ok(Self {
            kind,
            config,
            definition: Arc::new(definition),
            extractor,
            callbacks,
        })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The serialized configuration this target was built from
    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn definition(&self) -> &TargetDefinition {
        &self.definition
    }

    pub fn callbacks(&self) -> &RenderCallbacks {
        &self.callbacks
    }

    /// Runs the extractor on a content page
    pub fn extract(&self, page: &Page) -> Result<Record, ExtractionError> {
        self.extractor.extract(page)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("kind", &self.kind)
            .field("config", &self.config)
            .field("definition", &self.definition)
            .field("callbacks", &self.callbacks.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.config == other.config
    }
}

/// Builds a target from its serialized configuration
pub type TargetBuilder = fn(&Value) -> Result<Target, ConfigError>;

fn build_typed<C: TargetConfig>(config: &Value) -> Result<Target, ConfigError> {
    let config: C = serde_json::from_value(config.clone())?;
    Target::new(&config)
}

/// Maps target kinds to their builders
#[derive(Clone, Default)]
pub struct TargetRegistry {
    builders: BTreeMap<String, TargetBuilder>,
}

impl fmt::Debug for TargetRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.builders.keys()).finish()
    }
}

impl TargetRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in target kinds
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register::<SelectorTarget>();
        registry
    }

    /// Registers a typed target configuration under its kind
    pub fn register<C: TargetConfig>(&mut self) -> &mut Self {
        self.register_builder(C::KIND, build_typed::<C>)
    }

    pub fn register_builder(&mut self, kind: impl Into<String>, builder: TargetBuilder) -> &mut Self {
        self.builders.insert(kind.into(), builder);
        self
    }

    /// Rebuilds a target of the given kind
    pub fn build(&self, kind: &str, config: &Value) -> Result<Target, ConfigError> {
        let builder = self
            .builders
            .get(kind)
            .ok_or_else(|| ConfigError::UnknownTarget(kind.to_string()))?;
        builder(config)
    }

    /// Registered kinds in sorted order
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.builders.keys().map(String::as_str)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.builders.contains_key(kind)
    }
}

/// Parses and validates a list of start URLs
pub fn parse_start_urls(urls: &[String]) -> Result<Vec<Url>, ConfigError> {
    urls.iter().map(|u| validate_start_url(u)).collect()
}
