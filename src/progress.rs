//! Progress events for callers that want to follow an invocation live.
//!
//! The pipeline only sees an [`EventSink`]. The server owns a [`ProgressHub`]
//! (session-keyed broadcast channels) and hands each invocation a
//! [`SessionSink`] bound to the caller's session id. Events are purely
//! observational: a missing subscriber never affects the pipeline.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use crate::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Start,
    Progress,
    Complete,
    Error,
}

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub step: Stage,
    pub status: ProgressStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl ProgressEvent {
    pub fn new(step: Stage, status: ProgressStatus, message: impl Into<String>) -> Self {
        let progress = match status {
            ProgressStatus::Start | ProgressStatus::Progress => Some(step.progress()),
            ProgressStatus::Complete | ProgressStatus::Error => None,
        };

        Self {
            step,
            status,
            message: message.into(),
            progress,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn start(step: Stage, message: impl Into<String>) -> Self {
        Self::new(step, ProgressStatus::Start, message)
    }

    pub fn complete(step: Stage, message: impl Into<String>) -> Self {
        Self::new(step, ProgressStatus::Complete, message)
    }

    pub fn error(step: Stage, message: impl Into<String>) -> Self {
        Self::new(step, ProgressStatus::Error, message)
    }
}

/// Receives progress events from a running invocation.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Discards every event.
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// How long a finished session is remembered, so a late subscriber gets an
/// ended stream instead of a channel nobody will ever close.
const FINISHED_RETENTION: Duration = Duration::from_secs(300);

#[derive(Default)]
struct Sessions {
    live: HashMap<String, broadcast::Sender<ProgressEvent>>,
    finished: HashMap<String, Instant>,
}

/// Session-keyed broadcast channels for progress events.
///
/// Cloneable; clones share the same sessions.
#[derive(Clone)]
pub struct ProgressHub {
    sessions: Arc<RwLock<Sessions>>,
    capacity: usize,
    retention: Duration,
}

impl ProgressHub {
    /// Creates a hub with 64 buffered events per session.
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(Sessions::default())),
            capacity,
            retention: FINISHED_RETENTION,
        }
    }

    /// Sends an event to the session's subscribers. No-op without subscribers.
    pub fn publish(&self, session_id: &str, event: ProgressEvent) {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = sessions.live.get(session_id) {
            // No active receivers is fine.
            let _ = tx.send(event);
        }
    }

    /// Subscribes to a session, creating its channel if needed.
    ///
    /// A session that already finished yields a receiver that is closed
    /// right away.
    pub fn subscribe(&self, session_id: &str) -> broadcast::Receiver<ProgressEvent> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.finished.contains_key(session_id) {
            let (_, rx) = broadcast::channel(1);
            return rx;
        }

        sessions
            .live
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Drops the session's channel, which ends every subscriber's stream, and
    /// remembers the session as finished.
    pub fn close(&self, session_id: &str) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.live.remove(session_id);
        sessions
            .finished
            .insert(session_id.to_string(), Instant::now());
    }

    /// Removes sessions nobody listens to anymore and forgets finished
    /// sessions past their retention.
    pub fn cleanup(&self) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.live.retain(|_, tx| tx.receiver_count() > 0);
        let retention = self.retention;
        sessions
            .finished
            .retain(|_, closed_at| closed_at.elapsed() < retention);
    }

    /// Number of sessions with an open channel.
    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .live
            .len()
    }

    /// A sink publishing into one session. Reusing the id of a finished
    /// session starts it over.
    pub fn sink(&self, session_id: &str) -> SessionSink {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .finished
            .remove(session_id);

        SessionSink {
            hub: self.clone(),
            session_id: session_id.to_string(),
        }
    }

    #[cfg(test)]
    fn finished_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .finished
            .len()
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}

/// [`EventSink`] bound to one hub session.
pub struct SessionSink {
    hub: ProgressHub,
    session_id: String,
}

impl EventSink for SessionSink {
    fn emit(&self, event: ProgressEvent) {
        self.hub.publish(&self.session_id, event);
    }
}
