//! Output module for delivering crawl results
//!
//! This module handles:
//! - The `BatchSink` interface batches are handed to
//! - Persisting batches to SQLite and JSON lines
//! - Fanning batches out to several sinks
//! - Reporting statistics over stored postings

mod jsonl;
mod sqlite_output;
pub mod stats;
mod traits;

pub use jsonl::{to_json_lines, JsonLinesSink};
pub use sqlite_output::SqliteSink;
pub use stats::{load_statistics, print_statistics, CrawlStatistics};
pub use traits::{BatchSink, OutputError, OutputResult};

use crate::posting::Posting;
use async_trait::async_trait;
use std::sync::Arc;

/// Delivers each batch to several sinks, one after another
///
/// Sinks receive the batch in the order they were added. The first
/// failure stops delivery of that batch and is returned.
#[derive(Default)]
pub struct SinkSet {
    sinks: Vec<Arc<dyn BatchSink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sink to the end of the delivery order
    pub fn with(mut self, sink: Arc<dyn BatchSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl BatchSink for SinkSet {
    async fn accept(&self, batch: Vec<Posting>) -> OutputResult<()> {
        let Some((last, rest)) = self.sinks.split_last() else {
            return Ok(());
        };

        for sink in rest {
            sink.accept(batch.clone()).await.map_err(|e| {
                tracing::warn!("Sink {} rejected a batch: {}", sink.name(), e);
                e
            })?;
        }
        last.accept(batch).await
    }

    fn name(&self) -> &str {
        "set"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl BatchSink for Recording {
        async fn accept(&self, batch: Vec<Posting>) -> OutputResult<()> {
            if self.fail {
                return Err(OutputError::Write("disk full".to_string()));
            }
            let ids: Vec<_> = batch.iter().map(|p| p.id.as_str()).collect();
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, ids.join(",")));
            Ok(())
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    fn recording(name: &'static str, log: &Arc<Mutex<Vec<String>>>, fail: bool) -> Arc<dyn BatchSink> {
        Arc::new(Recording {
            name,
            log: Arc::clone(log),
            fail,
        })
    }

    #[tokio::test]
    async fn test_fans_out_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let set = SinkSet::new()
            .with(recording("first", &log, false))
            .with(recording("second", &log, false));

        set.accept(vec![Posting::new("a", "A"), Posting::new("b", "B")])
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["first:a,b", "second:a,b"]);
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let set = SinkSet::new()
            .with(recording("broken", &log, true))
            .with(recording("second", &log, false));

        assert!(set.accept(vec![Posting::new("a", "A")]).await.is_err());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_set_accepts() {
        assert!(SinkSet::new().accept(vec![]).await.is_ok());
    }
}
