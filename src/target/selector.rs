//! The built-in `selector` target
//!
//! Fields are extracted with CSS selectors:
//!
//! ```toml
//! kind = "selector"
//!
//! [config]
//! start-urls = ["https://books.example/catalogue"]
//! content = { allow = ['/book/\d+'] }
//! navigation = { allow = ['/catalogue\?page=\d+'] }
//!
//! [config.fields.title]
//! selector = "h1"
//! required = true
//!
//! [config.fields.tags]
//! selector = ".tag"
//! all = true
//! ```

use super::{
    parse_start_urls, ExtractionError, Extractor, LinkMatcher, MatcherConfig, Record,
    TargetConfig, TargetDefinition,
};
use crate::crawler::Page;
use crate::render::RenderDirective;
use crate::ConfigError;
use scraper::{ElementRef, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Configuration of a CSS selector target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SelectorTarget {
    pub start_urls: Vec<String>,

    /// Rules for content links; absent means no page is extracted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MatcherConfig>,

    /// Rules for navigation links; absent means no link is followed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation: Option<MatcherConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_render: Option<RenderDirective>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation_render: Option<RenderDirective>,

    #[serde(default)]
    pub fields: BTreeMap<String, FieldRule>,
}

/// How one record field is extracted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FieldRule {
    /// CSS selector of the element(s)
    pub selector: String,

    /// Read this attribute instead of the element text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,

    /// Collect every match into a list
    #[serde(default)]
    pub all: bool,

    /// Fail extraction when nothing matches
    #[serde(default)]
    pub required: bool,
}

impl FieldRule {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            attribute: None,
            all: false,
            required: false,
        }
    }

    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attribute = Some(name.into());
        self
    }

    pub fn all(mut self) -> Self {
        self.all = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

impl SelectorTarget {
    pub fn new<I, S>(start_urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            start_urls: start_urls.into_iter().map(Into::into).collect(),
            content: None,
            navigation: None,
            content_render: None,
            navigation_render: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn content(mut self, matcher: MatcherConfig) -> Self {
        self.content = Some(matcher);
        self
    }

    pub fn navigation(mut self, matcher: MatcherConfig) -> Self {
        self.navigation = Some(matcher);
        self
    }

    pub fn content_render(mut self, directive: RenderDirective) -> Self {
        self.content_render = Some(directive);
        self
    }

    pub fn navigation_render(mut self, directive: RenderDirective) -> Self {
        self.navigation_render = Some(directive);
        self
    }

    pub fn field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.fields.insert(name.into(), rule);
        self
    }
}

fn compile_matcher(config: &Option<MatcherConfig>) -> Result<LinkMatcher, ConfigError> {
    match config {
        Some(config) => config.compile(),
        None => Ok(LinkMatcher::none()),
    }
}

impl TargetConfig for SelectorTarget {
    const KIND: &'static str = "selector";

    fn definition(&self) -> Result<TargetDefinition, ConfigError> {
        Ok(TargetDefinition::new(parse_start_urls(&self.start_urls)?)
            .with_content(compile_matcher(&self.content)?, self.content_render.clone())
            .with_navigation(
                compile_matcher(&self.navigation)?,
                self.navigation_render.clone(),
            ))
    }

    fn extractor(&self) -> Result<Arc<dyn Extractor>, ConfigError> {
        let mut fields = Vec::with_capacity(self.fields.len());

        for (name, rule) in &self.fields {
            if name == "url" {
                return Err(ConfigError::Validation(
                    "field name 'url' is reserved".to_string(),
                ));
            }

            let selector = Selector::parse(&rule.selector).map_err(|e| {
                ConfigError::InvalidPattern(format!(
                    "Invalid selector '{}' for field '{}': {}",
                    rule.selector, name, e
                ))
            })?;

            fields.push(CompiledField {
                name: name.clone(),
                selector,
                attribute: rule.attribute.clone(),
                all: rule.all,
                required: rule.required,
            });
        }

        Ok(Arc::new(SelectorExtractor { fields }))
    }
}

struct CompiledField {
    name: String,
    selector: Selector,
    attribute: Option<String>,
    all: bool,
    required: bool,
}

impl CompiledField {
    fn value_of(&self, element: ElementRef<'_>) -> Option<String> {
        let value = match &self.attribute {
            Some(name) => element.value().attr(name)?.trim().to_string(),
            None => element
                .text()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
        };

        (!value.is_empty()).then_some(value)
    }
}

struct SelectorExtractor {
    fields: Vec<CompiledField>,
}

impl Extractor for SelectorExtractor {
    fn extract(&self, page: &Page) -> Result<Record, ExtractionError> {
        let document = page.document();
        let mut record = Record::new();
        record.insert("url".to_string(), Value::String(page.url.to_string()));

        for field in &self.fields {
            let mut values = document
                .select(&field.selector)
                .filter_map(|element| field.value_of(element));

            let value = if field.all {
                let values: Vec<Value> = values.map(Value::String).collect();
                if values.is_empty() {
                    None
                } else {
                    Some(Value::Array(values))
                }
            } else {
                values.next().map(Value::String)
            };

            match value {
                Some(value) => {
                    record.insert(field.name.clone(), value);
                }
                None if field.required => {
                    return Err(ExtractionError::new(
                        &page.url,
                        format!("required field '{}' not found", field.name),
                    ));
                }
                None => {
                    record.insert(field.name.clone(), Value::Null);
                }
            }
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Target;
    use url::Url;

    fn page(body: &str) -> Page {
        Page::new(Url::parse("https://books.example/book/1").unwrap(), 200, body)
    }

    fn target() -> Target {
        let config = SelectorTarget::new(["https://books.example/"])
            .content(MatcherConfig::allow([r"/book/\d+"]))
            .field("title", FieldRule::new("h1").required())
            .field("tags", FieldRule::new(".tag").all())
            .field("cover", FieldRule::new("img.cover").attribute("src"))
            .field("price", FieldRule::new(".price"));
        Target::new(&config).unwrap()
    }

    #[test]
    fn test_extracts_fields() {
        let html = r#"<html><body>
            <h1>  The   <em>Rust</em> Book </h1>
            <span class="tag">systems</span><span class="tag"> programming </span>
            <img class="cover" src="/covers/1.png">
        </body></html>"#;

        let record = target().extract(&page(html)).unwrap();

        assert_eq!(record["url"], "https://books.example/book/1");
        assert_eq!(record["title"], "The Rust Book");
        assert_eq!(record["tags"], serde_json::json!(["systems", "programming"]));
        assert_eq!(record["cover"], "/covers/1.png");
        assert_eq!(record["price"], Value::Null);
    }

    #[test]
    fn test_missing_required_field() {
        let error = target()
            .extract(&page("<html><body><p>nothing</p></body></html>"))
            .unwrap_err();
        assert_eq!(error.url, "https://books.example/book/1");
        assert!(error.message.contains("title"));
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let html = "<html><body><h1>Same</h1></body></html>";
        let target = target();
        assert_eq!(
            target.extract(&page(html)).unwrap(),
            target.extract(&page(html)).unwrap()
        );
    }

    #[test]
    fn test_absent_matchers_accept_nothing() {
        let definition = SelectorTarget::new(["https://books.example/"])
            .definition()
            .unwrap();
        let url = Url::parse("https://books.example/book/1").unwrap();
        assert!(!definition.content.matches(&url));
        assert!(!definition.navigation.matches(&url));
    }

    #[test]
    fn test_reserved_field_name() {
        let config = SelectorTarget::new(["https://books.example/"])
            .field("url", FieldRule::new("a"));
        assert!(matches!(
            Target::new(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_invalid_selector() {
        let config = SelectorTarget::new(["https://books.example/"])
            .field("title", FieldRule::new("h1[["));
        assert!(matches!(
            Target::new(&config),
            Err(ConfigError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_deserializes_from_kebab_case() {
        let config: SelectorTarget = serde_json::from_value(serde_json::json!({
            "start-urls": ["https://books.example/"],
            "content": {"allow": ["/book/"], "allow-domains": ["books.example"]},
            "content-render": {"mode": "browser", "scroll-to-bottom": true},
            "fields": {"title": {"selector": "h1", "required": true}}
        }))
        .unwrap();

        assert!(config.content_render.is_some());
        assert!(config.fields["title"].required);
        assert!(Target::new(&config).unwrap().definition().uses_rendering());
    }
}
