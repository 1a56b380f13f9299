//! The storage module keeps the invocation log: a JSON array file with one
//! entry per pipeline run, newest first.

use anyhow::Context;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::search::RelatedQuestion;

/// Record of one pipeline invocation, enriched as stages complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub people_also_ask: Option<Vec<RelatedQuestion>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faq_schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plain_text_faq: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LogEntry {
    /// Starts an entry for `url`, stamped with the current time.
    pub fn new(url: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            url: url.to_string(),
            keywords: None,
            people_also_ask: None,
            faq_schema: None,
            plain_text_faq: None,
            error: None,
        }
    }

    /// Appends `message` to the error field, separated by `"; "`.
    pub fn push_error(&mut self, message: impl AsRef<str>) {
        self.error = Some(match self.error.take() {
            Some(existing) => format!("{existing}; {}", message.as_ref()),
            None => message.as_ref().to_string(),
        });
    }
}

/// Append-only log file shared by all invocations.
///
/// Every write is a read-modify-write of the whole file; an async mutex
/// serialises them so concurrent invocations never lose entries.
#[derive(Clone)]
pub struct LogStore {
    path: Arc<PathBuf>,
    write_lock: Arc<Mutex<()>>,
}

impl LogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Adds `entry` in front of the existing ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the existing log cannot be read (anything but a
    /// missing file) or the file cannot be written. An unreadable log is left
    /// untouched.
    pub async fn append(&self, entry: LogEntry) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.read_entries().await?;
        entries.insert(0, entry);
        self.write_entries(&entries).await
    }

    /// Returns all entries sorted newest first. An unreadable log reads as
    /// empty.
    pub async fn entries(&self) -> Vec<LogEntry> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.read_entries().await.unwrap_or_else(|e| {
            warn!("{e:#}");
            Vec::new()
        });
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries
    }

    /// Resets the log to an empty array.
    ///
    /// # Errors
    ///
    /// Returns an error if the log file cannot be written.
    pub async fn clear(&self) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_entries(&[]).await?;
        info!("Log file cleared at {}", self.path.display());
        Ok(())
    }

    /// Reads the file. A missing file or one that is not a JSON log counts
    /// as empty; any other read failure is an error.
    async fn read_entries(&self) -> anyhow::Result<Vec<LogEntry>> {
        let content = match tokio::fs::read_to_string(self.path.as_path()).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Could not read log file {}", self.path.display())
                });
            }
        };

        Ok(serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(
                "Log file {} is not a valid log, starting a new one: {e}",
                self.path.display()
            );
            Vec::new()
        }))
    }

    async fn write_entries(&self, entries: &[LogEntry]) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(entries)?;
        tokio::fs::write(self.path.as_path(), content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store() -> (tempfile::TempDir, LogStore) {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = LogStore::new(dir.path().join("admin_logs.json"));
        (dir, store)
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let (_dir, store) = store();
        assert!(store.entries().await.is_empty());
    }

    #[tokio::test]
    async fn entries_come_back_newest_first() {
        let (_dir, store) = store();
        let mut older = LogEntry::new("https://example.com/old");
        older.timestamp = Utc::now() - Duration::minutes(5);
        let newer = LogEntry::new("https://example.com/new");

        store.append(newer).await.expect("append");
        store.append(older).await.expect("append");

        let urls: Vec<String> = store.entries().await.into_iter().map(|e| e.url).collect();
        assert_eq!(urls, vec!["https://example.com/new", "https://example.com/old"]);
    }

    #[tokio::test]
    async fn concurrent_appends_keep_every_entry() {
        let (_dir, store) = store();

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .append(LogEntry::new(&format!("https://example.com/{i}")))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.expect("task").expect("append");
        }

        assert_eq!(store.entries().await.len(), 20);
    }

    #[tokio::test]
    async fn clear_resets_to_empty_array() {
        let (_dir, store) = store();
        store
            .append(LogEntry::new("https://example.com"))
            .await
            .expect("append");

        store.clear().await.expect("clear");

        assert!(store.entries().await.is_empty());
        let content = std::fs::read_to_string(store.path()).expect("log file");
        assert_eq!(content.trim(), "[]");
    }

    #[tokio::test]
    async fn corrupt_file_is_replaced() {
        let (_dir, store) = store();
        std::fs::write(store.path(), "not json").expect("write");

        store
            .append(LogEntry::new("https://example.com"))
            .await
            .expect("append");

        assert_eq!(store.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn unreadable_file_is_never_overwritten() {
        let (_dir, store) = store();
        let bytes = [0x5b_u8, 0xff, 0xfe, 0x5d];
        std::fs::write(store.path(), bytes).expect("write");

        let outcome = store.append(LogEntry::new("https://example.com")).await;

        assert!(outcome.is_err());
        assert_eq!(std::fs::read(store.path()).expect("log file"), bytes);
        assert!(store.entries().await.is_empty());
    }

    #[test]
    fn errors_accumulate() {
        let mut entry = LogEntry::new("https://example.com");
        entry.push_error("first");
        entry.push_error("second");
        assert_eq!(entry.error.as_deref(), Some("first; second"));
    }

    #[test]
    fn serializes_with_camel_case_and_no_empty_fields() {
        let mut entry = LogEntry::new("https://example.com");
        entry.plain_text_faq = Some("問：Q\n答：A".to_string());
        let value = serde_json::to_value(&entry).expect("serializable");

        assert!(value.get("plainTextFaq").is_some());
        assert!(value.get("peopleAlsoAsk").is_none());
        assert!(value.get("timestamp").is_some());
    }
}
