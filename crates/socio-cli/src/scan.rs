//! Run the full pipeline over a page fixture.

use std::fs;
use std::sync::Arc;

use serde::Serialize;
use socio_core::memory::{ElementSnapshot, MemoryDocument, PageFixture};
use socio_core::types::PipelineStatus;
use socio_core::{ModerationConfig, RuleSetBuilder};
use socio_engine::{
    ChannelSink, HttpRemote, JsonFileStore, KeyValueStore, MemoryStore, NullRemote, PipelineBuilder, PipelineEvent,
    RemoteClassifier,
};
use socio_rules::compile_rule_lists;

pub struct ScanOptions {
    pub page: String,
    pub config: Option<String>,
    pub backend: Option<String>,
    pub rules: Vec<String>,
    pub history: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub status: PipelineStatus,
    pub filtered: usize,
    pub backend_degraded: bool,
    pub elements: Vec<ElementSnapshot>,
}

pub fn load_config(path: Option<&str>, backend: Option<&str>) -> Result<ModerationConfig, String> {
    let mut config = match path {
        Some(path) => ModerationConfig::load(path).map_err(|e| format!("Failed to load config: {}", e))?,
        None => ModerationConfig::default(),
    };
    if let Some(url) = backend {
        config.backend_url = url.to_string();
    }
    Ok(config)
}

/// Without a backend URL every item is classified locally.
pub fn make_remote(config: &ModerationConfig, backend: Option<&str>) -> Result<Arc<dyn RemoteClassifier>, String> {
    match backend {
        Some(_) => HttpRemote::new(&config.backend_url, config.request_timeout())
            .map(|remote| Arc::new(remote) as Arc<dyn RemoteClassifier>)
            .map_err(|e| format!("Failed to create HTTP client: {}", e)),
        None => Ok(Arc::new(NullRemote)),
    }
}

pub async fn run_scan(options: &ScanOptions) -> Result<ScanReport, String> {
    let json = fs::read_to_string(&options.page).map_err(|e| format!("Failed to read '{}': {}", options.page, e))?;
    let fixture: PageFixture = serde_json::from_str(&json).map_err(|e| format!("Invalid page fixture: {}", e))?;
    let doc = MemoryDocument::from_fixture(&fixture);

    let config = load_config(options.config.as_deref(), options.backend.as_deref())?;
    let remote = make_remote(&config, options.backend.as_deref())?;
    let kv: Arc<dyn KeyValueStore> = match &options.history {
        Some(path) => Arc::new(JsonFileStore::new(path)),
        None => Arc::new(MemoryStore::new()),
    };
    let (sink, mut events) = ChannelSink::new();

    let mut builder = PipelineBuilder::new(doc.clone(), config.clone())
        .remote(remote)
        .store(kv)
        .sink(Arc::new(sink));
    if !options.rules.is_empty() {
        let mut base = RuleSetBuilder::with_builtin();
        config.extend_rules(&mut base);
        let (rules, stats) = compile_rule_lists(&options.rules, base).map_err(|e| e.to_string())?;
        log::info!("loaded {} rule lists ({} entries)", stats.lists, stats.optimize.after);
        builder = builder.rules(rules);
    }

    let (pipeline, handle) = builder.build().await.map_err(|e| e.to_string())?;
    let run = tokio::spawn(pipeline.run());

    handle.idle().await.map_err(|e| e.to_string())?;
    let status = handle.status().await.map_err(|e| e.to_string())?;
    handle.shutdown().map_err(|e| e.to_string())?;
    run.await.map_err(|e| format!("Pipeline task failed: {}", e))?;

    let mut filtered = 0;
    let mut backend_degraded = false;
    while let Ok(event) = events.try_recv() {
        match event {
            PipelineEvent::Filtered(_) => filtered += 1,
            PipelineEvent::BackendDegraded => backend_degraded = true,
        }
    }

    Ok(ScanReport {
        status,
        filtered,
        backend_degraded,
        elements: doc.snapshot(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use socio_core::dom::{ATTR_FILTERED, ATTR_RECORD};
    use std::io::Write;

    fn write_page(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_scan_fixture_offline() {
        let page = write_page(
            r#"{"url": "https://example.com/post", "elements": [
                {"type": "text", "text": "Call me on 9876543210 after lunch"},
                {"type": "text", "text": "The weather is lovely today"},
                {"type": "image", "src": "https://example.com/nsfw/pic.jpg", "width": 400, "height": 300}
            ]}"#,
        );
        let dir = tempfile::tempdir().unwrap();
        let history = dir.path().join("state.json");

        let options = ScanOptions {
            page: page.path().to_string_lossy().into_owned(),
            config: None,
            backend: None,
            rules: Vec::new(),
            history: Some(history.to_string_lossy().into_owned()),
        };
        let report = run_scan(&options).await.unwrap();

        assert!(report.status.enabled);
        assert!(!report.status.backend_reachable);
        assert!(report.backend_degraded);
        assert_eq!(report.filtered, 2);

        let phone = &report.elements[0];
        assert!(!phone.content.contains("9876543210"));
        assert_eq!(phone.attributes.get(ATTR_FILTERED).map(String::as_str), Some("encrypt"));
        assert!(phone.attributes.contains_key(ATTR_RECORD));

        let plain = &report.elements[1];
        assert_eq!(plain.content, "The weather is lovely today");
        assert!(!plain.attributes.contains_key(ATTR_FILTERED));

        assert!(report.elements[2].style.contains_key("filter"));

        let saved: serde_json::Value = serde_json::from_str(&fs::read_to_string(&history).unwrap()).unwrap();
        assert_eq!(saved["stats.textFiltered"], serde_json::json!(1));
        assert_eq!(saved["history"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_scan_missing_page() {
        let options = ScanOptions {
            page: "/nonexistent/page.json".into(),
            config: None,
            backend: None,
            rules: Vec::new(),
            history: None,
        };
        let err = run_scan(&options).await.unwrap_err();
        assert!(err.contains("Failed to read"));
    }
}
