//! Session state: the append-only conversation log and its JSON persistence.
//!
//! Each session persists as `conversation_<timestamp>.json` with the session
//! id, start time, message list and metadata. Writes are append-on-write: the
//! whole file is rewritten with the updated message list on every append.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::message::Message;

/// Session metadata persisted alongside the messages.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub backend_type: Option<String>,
    pub model: Option<String>,
    pub total_messages: usize,
}

/// One conversation session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub messages: Vec<Message>,
    pub metadata: SessionMetadata,
    /// Working directory and ad-hoc context keys; not part of the wire format
    /// consumed by other tools, but restored on load.
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl Session {
    pub fn new() -> Self {
        let started_at = Utc::now();
        Self {
            session_id: format!("conversation_{}", started_at.format("%Y%m%d_%H%M%S")),
            started_at,
            messages: Vec::new(),
            metadata: SessionMetadata::default(),
            working_directory: None,
            context: Map::new(),
        }
    }

    /// Appends one message; insertion order is significant and preserved.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
        self.metadata.total_messages = self.messages.len();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Persists sessions under a directory (default:
/// `$XDG_DATA_HOME/qwen-tui/conversations`).
pub struct SessionStore {
    directory: PathBuf,
}

impl SessionStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Store in the default data directory.
    pub fn default_location() -> Option<Self> {
        let base = match std::env::var_os("XDG_DATA_HOME") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::data_dir()?,
        };
        Some(Self::new(base.join("qwen-tui").join("conversations")))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.directory.join(format!("{}.json", session_id))
    }

    /// Writes the whole session to its file.
    pub fn save(&self, session: &Session) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.directory)?;
        let json = serde_json::to_string_pretty(session)
            .map_err(|e| ConfigError::Invalid(format!("failed to serialize session: {}", e)))?;
        std::fs::write(self.path_for(&session.session_id), json)?;
        Ok(())
    }

    /// Appends a message and persists, updating metadata when provided.
    pub fn append_message(
        &self,
        session: &mut Session,
        message: Message,
        backend_type: Option<&str>,
        model: Option<&str>,
    ) -> Result<(), ConfigError> {
        session.append(message);
        if let Some(backend) = backend_type {
            session.metadata.backend_type = Some(backend.to_string());
        }
        if let Some(model) = model {
            session.metadata.model = Some(model.to_string());
        }
        self.save(session)
    }

    pub fn load(&self, session_id: &str) -> Result<Session, ConfigError> {
        let content = std::fs::read_to_string(self.path_for(session_id))?;
        serde_json::from_str(&content)
            .map_err(|e| ConfigError::Invalid(format!("failed to parse session file: {}", e)))
    }

    /// Session ids on disk, newest first by modification time.
    pub fn list_sessions(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.directory) else {
            return Vec::new();
        };
        let mut sessions: Vec<(String, std::time::SystemTime)> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let id = name.strip_suffix(".json")?.to_string();
                if !id.starts_with("conversation_") {
                    return None;
                }
                let mtime = entry.metadata().and_then(|m| m.modified()).ok()?;
                Some((id, mtime))
            })
            .collect();
        sessions.sort_by_key(|(_, mtime)| std::cmp::Reverse(*mtime));
        sessions.into_iter().map(|(id, _)| id).collect()
    }
}
