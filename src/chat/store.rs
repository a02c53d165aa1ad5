use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Error, Result, bail};
use chrono::{DateTime, Local};
use tokio::fs;
use uuid::Uuid;

use crate::core::AppConfig;
use crate::openai::Message;

const SESSION_EXT: &str = "json";
const MAX_SESSION_ID_LEN: usize = 128;

/// Session ids name files on disk so only a conservative set of
/// characters is accepted.
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn snapshot_file_name(now: DateTime<Local>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("chat_{}_{}.json", now.format("%Y%m%d_%H%M%S"), &suffix[..8])
}

/// Stores each chat session as a JSON array of messages in its own
/// file. Every save rewrites the whole file.
///
/// The store does no locking of its own. Callers that load, modify
/// and save a session must serialize those steps themselves.
#[derive(Clone, Debug)]
pub struct SessionStore {
    sessions_path: PathBuf,
    snapshots_path: PathBuf,
}

impl SessionStore {
    pub fn new(sessions_path: impl Into<PathBuf>, snapshots_path: impl Into<PathBuf>) -> Self {
        Self {
            sessions_path: sessions_path.into(),
            snapshots_path: snapshots_path.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.sessions_path, &config.snapshots_path)
    }

    #[cfg(test)]
    pub fn snapshots_path(&self) -> &std::path::Path {
        &self.snapshots_path
    }

    fn session_path(&self, session_id: &str) -> Result<PathBuf, Error> {
        if !is_valid_session_id(session_id) {
            bail!("Invalid session id: {}", session_id);
        }
        Ok(self
            .sessions_path
            .join(format!("{}.{}", session_id, SESSION_EXT)))
    }

    /// Read the messages of a session. A session that was never saved
    /// has no messages.
    pub async fn load(&self, session_id: &str) -> Result<Vec<Message>, Error> {
        let path = self.session_path(session_id)?;
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        serde_json::from_slice(&data)
            .with_context(|| format!("Failed to decode chat session {}", path.display()))
    }

    pub async fn exists(&self, session_id: &str) -> Result<bool, Error> {
        let path = self.session_path(session_id)?;
        Ok(fs::try_exists(&path).await?)
    }

    /// Replace the stored messages of a session.
    ///
    /// The file is written next to the target first and then renamed
    /// over it so readers never see a partial write.
    pub async fn save(&self, session_id: &str, messages: &[Message]) -> Result<(), Error> {
        let path = self.session_path(session_id)?;
        fs::create_dir_all(&self.sessions_path)
            .await
            .with_context(|| format!("Failed to create {}", self.sessions_path.display()))?;

        let data = serde_json::to_vec_pretty(messages)?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, data)
            .await
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;

        Ok(())
    }

    /// Ids of every stored session, sorted.
    pub async fn list(&self) -> Result<Vec<String>, Error> {
        let mut entries = match fs::read_dir(&self.sessions_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to list {}", self.sessions_path.display()));
            }
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SESSION_EXT) {
                continue;
            }
            if let Some(id) = path.file_stem().and_then(|stem| stem.to_str())
                && is_valid_session_id(id)
            {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        ids.dedup();

        Ok(ids)
    }

    /// Write a copy of `messages` to a new, uniquely named file in the
    /// snapshots directory and return its path.
    pub async fn snapshot(&self, messages: &[Message]) -> Result<PathBuf, Error> {
        fs::create_dir_all(&self.snapshots_path)
            .await
            .with_context(|| format!("Failed to create {}", self.snapshots_path.display()))?;

        let path = self.snapshots_path.join(snapshot_file_name(Local::now()));
        let data = serde_json::to_vec_pretty(messages)?;
        fs::write(&path, data)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(path)
    }
}
