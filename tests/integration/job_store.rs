//! Job directories survive the handle that created them

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tempfile::TempDir;
use trawl::config::CrawlSettings;
use trawl::output::{read_records, ItemWriter};
use trawl::storage::{self, JobPaths};
use trawl::target::{parse_start_urls, ExtractionError, Extractor, LinkMatcher, MatcherConfig};
use trawl::{ConfigError, Page, Record, Target, TargetConfig, TargetDefinition, TargetRegistry};

/// A target that records the length of every content page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PageLength {
    start: String,
    min_length: usize,
}

impl TargetConfig for PageLength {
    const KIND: &'static str = "page-length";

    fn definition(&self) -> Result<TargetDefinition, ConfigError> {
        let start_urls = parse_start_urls(&[self.start.clone()])?;
        Ok(TargetDefinition::new(start_urls)
            .with_content(MatcherConfig::allow([r"/p/"]).compile()?, None)
            .with_navigation(LinkMatcher::none(), None))
    }

    fn extractor(&self) -> Result<Arc<dyn Extractor>, ConfigError> {
        let min_length = self.min_length;
        let extract = move |page: &Page| -> Result<Record, ExtractionError> {
            if page.body.len() < min_length {
                return Err(ExtractionError::new(&page.url, "page too short"));
            }
            let mut record = Record::new();
            record.insert("length".into(), page.body.len().into());
            Ok(record)
        };
        Ok(Arc::new(extract))
    }
}

fn registry() -> TargetRegistry {
    let mut registry = TargetRegistry::with_builtins();
    registry.register::<PageLength>();
    registry
}

#[test]
fn test_custom_target_roundtrip() {
    let dir = TempDir::new().unwrap();
    let config = PageLength {
        start: "https://docs.test/index".into(),
        min_length: 10,
    };
    let target = Target::new(&config).unwrap();
    let items = dir.path().join("out").join("items.jl");
    let settings = CrawlSettings {
        download_delay_ms: 250,
        ..CrawlSettings::default()
    };

    let saved_dir = storage::save(&target, &settings, &items, dir.path()).unwrap();
    assert_eq!(saved_dir, dir.path());

    let loaded = storage::load(dir.path(), &registry()).unwrap();
    assert_eq!(loaded.target, target);
    assert_eq!(loaded.target.kind(), "page-length");
    assert_eq!(loaded.items_path, items);
    assert_eq!(loaded.settings, settings);

    let page = Page::new("https://docs.test/p/1".parse().unwrap(), 200, "short");
    assert!(loaded.target.extract(&page).is_err());
}

#[test]
fn test_unregistered_kind_fails_to_load() {
    let dir = TempDir::new().unwrap();
    let target = Target::new(&PageLength {
        start: "https://docs.test/".into(),
        min_length: 0,
    })
    .unwrap();
    let paths = JobPaths::new(dir.path());
    storage::save(&target, &CrawlSettings::default(), &paths.items, dir.path()).unwrap();

    let err = storage::load(dir.path(), &TargetRegistry::with_builtins()).unwrap_err();
    assert!(err.to_string().contains("page-length"));
}

#[test]
fn test_items_append_across_writers() {
    let dir = TempDir::new().unwrap();
    let paths = JobPaths::new(dir.path());

    for n in 0..2 {
        let mut writer = ItemWriter::open(&paths.items).unwrap();
        let mut record = Record::new();
        record.insert("run".into(), n.into());
        writer.append(&record).unwrap();
    }

    let runs: Vec<i64> = read_records(&paths.items)
        .unwrap()
        .iter()
        .map(|r| r["run"].as_i64().unwrap())
        .collect();
    assert_eq!(runs, vec![0, 1]);

    storage::clear(dir.path()).unwrap();
    assert!(read_records(&paths.items).unwrap().is_empty());
    assert!(dir.path().is_dir());
}
