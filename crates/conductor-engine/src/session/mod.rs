//! Session and event log.
//!
//! A session is an append-only ordered record of events. Reading is shared:
//! [`Session`] handles are cheap to clone and [`Session::snapshot`] returns a
//! consistent prefix even while appends continue. Writing is not: each
//! session has exactly one [`SessionWriter`], and appending needs `&mut` on
//! it, so two invocations can only write to the same session if the
//! orchestrator hands the writer from one to the other.

use std::sync::{Arc, PoisonError, RwLock};

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use tokio::sync::broadcast;
use tracing::trace;

use conductor_core::event::{Event, EventDraft};

/// An event as seen by live subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct RunEvent {
    pub session_id: String,
    #[serde(flatten)]
    pub event: Event,
}

#[derive(Debug)]
struct SessionLog {
    id: String,
    events: RwLock<Vec<Event>>,
}

/// Read handle to a session.
#[derive(Debug, Clone)]
pub struct Session {
    log: Arc<SessionLog>,
}

impl Session {
    /// Create an empty session and its only writer.
    pub fn create() -> (Self, SessionWriter) {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> (Self, SessionWriter) {
        let log = Arc::new(SessionLog {
            id: id.into(),
            events: RwLock::new(Vec::new()),
        });
        let writer = SessionWriter {
            log: Arc::clone(&log),
            next_sequence: 1,
            feed: None,
        };
        (Self { log }, writer)
    }

    pub fn id(&self) -> &str {
        &self.log.id
    }

    /// Ordered copy of every event appended so far.
    pub fn snapshot(&self) -> Vec<Event> {
        self.log
            .events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.log
            .events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The most recent non-partial event, if any.
    pub fn last_final(&self) -> Option<Event> {
        self.log
            .events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|e| !e.partial)
            .cloned()
    }
}

impl Serialize for Session {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Session", 2)?;
        state.serialize_field("id", self.id())?;
        state.serialize_field("events", &self.snapshot())?;
        state.end()
    }
}

/// Exclusive append handle to a session.
#[derive(Debug)]
pub struct SessionWriter {
    log: Arc<SessionLog>,
    next_sequence: u64,
    feed: Option<broadcast::Sender<RunEvent>>,
}

impl SessionWriter {
    /// Mirror every appended event onto a live broadcast feed.
    #[must_use]
    pub fn with_feed(mut self, feed: broadcast::Sender<RunEvent>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.log.id
    }

    /// Read handle to the session this writer appends to.
    pub fn session(&self) -> Session {
        Session {
            log: Arc::clone(&self.log),
        }
    }

    /// Append an event, returning its sequence number.
    ///
    /// Sequence numbers start at 1 and increase by one per append.
    pub fn append(&mut self, draft: EventDraft) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let event = Event::from_draft(sequence, draft);
        trace!(
            session_id = %self.log.id,
            sequence,
            kind = ?event.kind,
            partial = event.partial,
            "Appending event"
        );

        let live = self.feed.as_ref().map(|_| event.clone());
        self.log
            .events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        if let (Some(feed), Some(event)) = (&self.feed, live) {
            // No receivers is fine; subscribers are optional.
            let _ = feed.send(RunEvent {
                session_id: self.log.id.clone(),
                event,
            });
        }
        sequence
    }
}
