//! Logging system demonstration
//!
//! Run with:
//! ```bash
//! cargo run --example logging_demo -- json
//! cargo run --example logging_demo -- compact "core_playback=trace"
//! ```

use bridge_traits::log::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{
    init_logging, redact_headers, strip_path, LogFormat, LoggingConfig,
};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use tracing::{debug, info, instrument, span, warn, Level};

/// Host sink that prints what it receives.
struct PrintSink;

#[async_trait::async_trait]
impl LoggerSink for PrintSink {
    async fn log(&self, entry: LogEntry) -> bridge_traits::error::Result<()> {
        println!("[host sink] {:?} {}", entry.level, entry.message);
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    let format = match args.get(1).map(String::as_str) {
        Some("json") => LogFormat::Json,
        Some("compact") => LogFormat::Compact,
        Some("pretty") => LogFormat::Pretty,
        _ => LogFormat::default(),
    };

    let mut config = LoggingConfig::default()
        .with_format(format)
        .with_level(LogLevel::Debug)
        .with_logger_sink(Arc::new(PrintSink))
        .with_spans(true);
    if let Some(filter) = args.get(2) {
        config = config.with_filter(filter.clone());
    }

    if let Err(e) = init_logging(config) {
        eprintln!("Failed to initialize logging: {}", e);
        return;
    }

    info!(format = ?format, "Logging initialized");
    simulate_session().await;
}

#[instrument]
async fn simulate_session() {
    let mut headers = HashMap::new();
    headers.insert("Authorization".to_string(), "Bearer secret".to_string());
    headers.insert("Accept".to_string(), "audio/*".to_string());

    info!(
        track_id = "t1",
        headers = %redact_headers(&headers),
        "Loading track"
    );

    {
        let span = span!(Level::DEBUG, "cache", key = "https://cdn.example.com/t1.mp3");
        let _enter = span.enter();
        debug!(
            file = %strip_path("/home/ana/.cache/track-player/media/3f/0.span"),
            bytes = 2_097_152,
            "Span written"
        );
        warn!(offset = 4_194_304, "Failed to evict span, skipping");
    }

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    info!(generation = 2, "Track prepared");
}
