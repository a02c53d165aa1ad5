use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::chat::{RelayError, SessionStore, is_valid_session_id};
use crate::openai::{BoxedChatCompletion, Message, Role};

type SessionLock = Arc<tokio::sync::Mutex<()>>;

// One async mutex per session id. Held across load, the remote call
// and save so overlapping requests on a session can't lose updates.
#[derive(Clone, Default)]
struct SessionLocks(Arc<Mutex<HashMap<String, SessionLock>>>);

impl SessionLocks {
    async fn acquire(&self, session_id: &str) -> SessionGuard {
        let lock = {
            let mut locks = self.0.lock().expect("Session lock registry poisoned");
            Arc::clone(locks.entry(session_id.to_string()).or_default())
        };
        let guard = Arc::clone(&lock).lock_owned().await;

        SessionGuard {
            locks: self.clone(),
            session_id: session_id.to_string(),
            lock,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

// Releases the session and drops its registry entry when no other
// request holds or waits on it
struct SessionGuard {
    locks: SessionLocks,
    session_id: String,
    lock: SessionLock,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let Ok(mut locks) = self.locks.0.lock() else {
            return;
        };
        // Only the registry and this guard still point at the mutex
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.session_id);
        }
    }
}

fn check_session_id(session_id: &str) -> Result<(), RelayError> {
    if is_valid_session_id(session_id) {
        Ok(())
    } else {
        Err(RelayError::InvalidSessionId(session_id.to_string()))
    }
}

/// Relays chat messages to a completion backend and keeps the
/// history of each session in a [`SessionStore`].
#[derive(Clone)]
pub struct ChatRelay {
    store: SessionStore,
    client: BoxedChatCompletion,
    save_command: String,
    locks: SessionLocks,
}

impl ChatRelay {
    pub fn new(store: SessionStore, client: BoxedChatCompletion, save_command: &str) -> Self {
        Self {
            store,
            client,
            save_command: save_command.to_string(),
            locks: SessionLocks::default(),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Send `message` in the session and return the assistant's reply.
    ///
    /// When `context` is given it replaces the stored history in what
    /// is sent to the model, but only the new message and the reply
    /// are appended to the stored history. If the message is the save
    /// command the stored history is snapshotted instead and nothing
    /// is sent.
    pub async fn chat(
        &self,
        session_id: &str,
        message: Option<&str>,
        context: Option<Vec<Message>>,
    ) -> Result<String, RelayError> {
        let message = match message {
            Some(m) if !m.trim().is_empty() => m,
            _ => return Err(RelayError::MissingMessage),
        };
        check_session_id(session_id)?;

        let _guard = self.locks.acquire(session_id).await;

        let mut history = self
            .store
            .load(session_id)
            .await
            .map_err(RelayError::Storage)?;

        if message.trim() == self.save_command {
            return self.save_snapshot(session_id, &history).await;
        }

        let user_msg = Message::new(Role::User, message);
        let mut messages = match context {
            Some(context) => {
                tracing::debug!(
                    "Session {} using {} supplied context messages instead of {} stored",
                    session_id,
                    context.len(),
                    history.len()
                );
                context
            }
            None => history.clone(),
        };
        messages.push(user_msg.clone());

        let reply = self.client.complete(&messages).await.map_err(|e| {
            tracing::error!(
                "Chat completion for session {} failed: {}. Root cause: {}",
                session_id,
                e,
                e.root_cause()
            );
            RelayError::Remote(e)
        })?;

        history.push(user_msg);
        history.push(Message::new(Role::Assistant, &reply));
        self.store
            .save(session_id, &history)
            .await
            .map_err(RelayError::Storage)?;

        Ok(reply)
    }

    async fn save_snapshot(
        &self,
        session_id: &str,
        history: &[Message],
    ) -> Result<String, RelayError> {
        let path = self
            .store
            .snapshot(history)
            .await
            .map_err(RelayError::Storage)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        tracing::info!(
            "Saved {} messages of session {} to {}",
            history.len(),
            session_id,
            path.display()
        );

        Ok(format!("Chat history saved to {}", file_name))
    }

    /// Copy a stored session to a new session id and return the id.
    pub async fn branch(&self, session_id: &str) -> Result<String, RelayError> {
        check_session_id(session_id)?;

        let messages = {
            let _guard = self.locks.acquire(session_id).await;
            if !self
                .store
                .exists(session_id)
                .await
                .map_err(RelayError::Storage)?
            {
                return Err(RelayError::SessionNotFound(session_id.to_string()));
            }
            self.store
                .load(session_id)
                .await
                .map_err(RelayError::Storage)?
        };

        let new_session_id = Uuid::new_v4().to_string();
        self.store
            .save(&new_session_id, &messages)
            .await
            .map_err(RelayError::Storage)?;
        tracing::info!("Branched session {} to {}", session_id, new_session_id);

        Ok(new_session_id)
    }

    pub async fn sessions(&self) -> Result<Vec<String>, RelayError> {
        self.store.list().await.map_err(RelayError::Storage)
    }

    /// Stored messages of a session that has been saved at least once.
    pub async fn transcript(&self, session_id: &str) -> Result<Vec<Message>, RelayError> {
        check_session_id(session_id)?;
        if !self
            .store
            .exists(session_id)
            .await
            .map_err(RelayError::Storage)?
        {
            return Err(RelayError::SessionNotFound(session_id.to_string()));
        }
        self.store
            .load(session_id)
            .await
            .map_err(RelayError::Storage)
    }
}
