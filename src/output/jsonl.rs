//! JSON lines sink
//!
//! Writes one camelCase JSON object per posting, one posting per line.

use crate::output::traits::{BatchSink, OutputResult};
use crate::posting::Posting;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Appends batches to a JSON lines file
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    /// Opens `path` for appending, creating it if needed
    pub async fn append(path: &Path) -> OutputResult<Self> {
        Self::open(path, false).await
    }

    /// Opens `path` and discards anything already in it
    pub async fn create(path: &Path) -> OutputResult<Self> {
        Self::open(path, true).await
    }

    async fn open(path: &Path, truncate: bool) -> OutputResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut options = OpenOptions::new();
        options.create(true);
        if truncate {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(options.open(path).await?),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Serializes postings to JSON lines, each line terminated by `\n`
pub fn to_json_lines(postings: &[Posting]) -> OutputResult<String> {
    let mut out = String::new();
    for posting in postings {
        out.push_str(&serde_json::to_string(posting)?);
        out.push('\n');
    }
    Ok(out)
}

#[async_trait]
impl BatchSink for JsonLinesSink {
    async fn accept(&self, batch: Vec<Posting>) -> OutputResult<()> {
        let lines = to_json_lines(&batch)?;

        let mut file = self.file.lock().await;
        file.write_all(lines.as_bytes()).await?;
        file.flush().await?;

        tracing::debug!(
            "Appended {} postings to {}",
            batch.len(),
            self.path.display()
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_appends_one_line_per_posting() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("postings.jsonl");

        let sink = JsonLinesSink::append(&path).await.unwrap();
        sink.accept(vec![Posting::new("a", "ACME GmbH"), Posting::new("b", "Beta AG")])
            .await
            .unwrap();
        sink.accept(vec![Posting::new("c", "Gamma KG")]).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let ids: Vec<String> = content
            .lines()
            .map(|line| serde_json::from_str::<Posting>(line).unwrap().id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(content.contains("\"companyName\":\"ACME GmbH\""));
    }

    #[tokio::test]
    async fn test_create_truncates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("export.jsonl");
        std::fs::write(&path, "stale\n").unwrap();

        let sink = JsonLinesSink::create(&path).await.unwrap();
        sink.accept(vec![Posting::new("a", "ACME GmbH")]).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(!content.contains("stale"));
    }
}
