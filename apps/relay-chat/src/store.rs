//! Local conversation cache.
//!
//! The gateway owns the real thread; this file only lets the terminal show
//! previous turns and reuse the thread id across sessions. A missing or
//! unreadable file starts an empty conversation.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

const APP_DIR: &str = "relay-chat";
const FILE_NAME: &str = "conversation.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("encode conversation: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    User,
    Assistant,
    Notice,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub kind: EntryKind,
    pub text: String,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub entries: Vec<Entry>,
}

impl Conversation {
    /// Insert keeping entries ordered by timestamp; ties keep arrival order.
    pub fn push(&mut self, kind: EntryKind, text: impl Into<String>, run_id: Option<&str>) {
        let entry = Entry {
            kind,
            text: text.into(),
            at: Utc::now(),
            run_id: run_id.map(str::to_string),
        };
        let idx = self.entries.partition_point(|e| e.at <= entry.at);
        self.entries.insert(idx, entry);
    }
}

/// Default location under the user's local data directory.
pub fn default_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(FILE_NAME)
}

pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Conversation {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Conversation::default()
            }
            Err(err) => {
                warn!(path = %self.path.display(), "conversation unreadable, starting fresh: {err}");
                return Conversation::default();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(conversation) => conversation,
            Err(err) => {
                warn!(path = %self.path.display(), "conversation corrupt, starting fresh: {err}");
                Conversation::default()
            }
        }
    }

    /// Written to a sibling temp file, then renamed over the target.
    pub fn save(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let body = serde_json::to_vec_pretty(conversation)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("none.json"));
        assert_eq!(store.load(), Conversation::default());
    }

    #[test]
    fn save_then_load_keeps_thread_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("nested").join("conversation.json"));
        let mut conversation = Conversation {
            thread_id: Some("t1".into()),
            ..Default::default()
        };
        conversation.push(EntryKind::User, "Hello", None);
        conversation.push(EntryKind::Assistant, "Hi there", Some("r1"));
        store.save(&conversation).unwrap();

        let loaded = store.load();
        assert_eq!(loaded, conversation);
        assert_eq!(loaded.entries[0].kind, EntryKind::User);
        assert_eq!(loaded.entries[1].run_id.as_deref(), Some("r1"));
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupt_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversation.json");
        std::fs::write(&path, b"{ not json").unwrap();
        assert_eq!(Store::new(&path).load(), Conversation::default());
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("conversation.json"));
        store.save(&Conversation::default()).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn entries_stay_time_ordered() {
        let mut conversation = Conversation::default();
        conversation.push(EntryKind::User, "late", None);
        let early = Entry {
            kind: EntryKind::Notice,
            text: "early".into(),
            at: conversation.entries[0].at - chrono::Duration::seconds(5),
            run_id: None,
        };
        conversation.entries.insert(0, early);
        conversation.push(EntryKind::Assistant, "latest", None);
        let texts: Vec<&str> = conversation.entries.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, ["early", "late", "latest"]);
        assert_eq!(conversation.entries.last().map(|e| e.kind), Some(EntryKind::Assistant));
    }
}
