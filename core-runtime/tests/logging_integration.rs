//! Integration tests for the global logging setup.

use async_trait::async_trait;
use bridge_traits::error::Result as SinkResult;
use bridge_traits::log::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{init_logging, redact_headers, LogFormat, LoggingConfig};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CollectingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for CollectingSink {
    async fn log(&self, entry: LogEntry) -> SinkResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}

// Only one global subscriber per process, so everything lives in one test.
#[test]
fn test_init_logging_forwards_to_sink_once() {
    let sink = Arc::new(CollectingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_filter("info")
        .with_logger_sink(sink.clone());

    init_logging(config.clone()).expect("first init succeeds");

    tracing::info!(track_id = "t1", "track changed");
    tracing::debug!("filtered out by the env filter");

    {
        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "track changed");
        assert_eq!(entries[0].fields.get("track_id"), Some(&"t1".to_string()));
    }

    assert!(init_logging(config).is_err(), "second init must fail");
}

#[test]
fn test_redact_headers_for_track_logging() {
    let mut headers = HashMap::new();
    headers.insert("Authorization".to_string(), "Bearer secret".to_string());
    let rendered = redact_headers(&headers);
    assert!(!rendered.contains("secret"));
    assert!(rendered.contains("Authorization=[REDACTED]"));
}
