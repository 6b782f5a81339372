//! Event bus - central pub/sub for roster events
//!
//! Built on tokio broadcast channels. Emission is fire-and-forget: with no
//! subscribers an event is dropped, and a full channel drops its oldest
//! events rather than blocking a writer.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::RosterEvent;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Central event bus for roster activity
pub struct EventBus {
    tx: broadcast::Sender<RosterEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: RosterEvent) {
        debug!(
            event_type = event.event_type(),
            session_id = event.session_id(),
            "EventBus::emit"
        );
        // no subscribers is fine
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<RosterEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Create an emitter handle bound to one session
    pub fn emitter_for(&self, session_id: impl Into<String>) -> EventEmitter {
        let session_id = session_id.into();
        debug!(%session_id, "EventBus::emitter_for: creating emitter");
        EventEmitter {
            tx: self.tx.clone(),
            session_id,
        }
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Create a shared event bus for the daemon
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::with_default_capacity())
}

/// Cheap-to-clone handle that emits events for a pre-set session
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<RosterEvent>,
    session_id: String,
}

impl EventEmitter {
    /// Session this emitter is bound to
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Emit a raw event
    pub fn emit(&self, event: RosterEvent) {
        debug!(event_type = event.event_type(), "EventEmitter::emit");
        let _ = self.tx.send(event);
    }

    // === Convenience methods ===

    pub fn session_created(&self, kind: &str, window: &str) {
        self.emit(RosterEvent::SessionCreated {
            session_id: self.session_id.clone(),
            kind: kind.to_string(),
            window: window.to_string(),
        });
    }

    pub fn session_confirmed(&self) {
        self.emit(RosterEvent::SessionConfirmed {
            session_id: self.session_id.clone(),
        });
    }

    pub fn session_declined(&self, reason: &str) {
        self.emit(RosterEvent::SessionDeclined {
            session_id: self.session_id.clone(),
            reason: reason.to_string(),
        });
    }

    pub fn confirmation_reset(&self) {
        self.emit(RosterEvent::ConfirmationReset {
            session_id: self.session_id.clone(),
        });
    }

    pub fn reschedule_requested(&self, reason: &str) {
        self.emit(RosterEvent::RescheduleRequested {
            session_id: self.session_id.clone(),
            reason: reason.to_string(),
        });
    }

    pub fn reschedule_approved(&self, proposal_id: &str) {
        self.emit(RosterEvent::RescheduleApproved {
            session_id: self.session_id.clone(),
            proposal_id: proposal_id.to_string(),
        });
    }

    pub fn reschedule_rejected(&self, proposal_id: &str) {
        self.emit(RosterEvent::RescheduleRejected {
            session_id: self.session_id.clone(),
            proposal_id: proposal_id.to_string(),
        });
    }

    pub fn conversation_started(&self, conversation_id: &str, staff_id: &str) {
        self.emit(RosterEvent::ConversationStarted {
            session_id: self.session_id.clone(),
            conversation_id: conversation_id.to_string(),
            staff_id: staff_id.to_string(),
        });
    }

    pub fn conversation_completed(&self, conversation_id: &str, decision: &str) {
        self.emit(RosterEvent::ConversationCompleted {
            session_id: self.session_id.clone(),
            conversation_id: conversation_id.to_string(),
            decision: decision.to_string(),
        });
    }

    pub fn conversation_cancelled(&self, conversation_id: &str) {
        self.emit(RosterEvent::ConversationCancelled {
            session_id: self.session_id.clone(),
            conversation_id: conversation_id.to_string(),
        });
    }

    pub fn prompt_sent(&self, conversation_id: &str, template_id: &str) {
        self.emit(RosterEvent::PromptSent {
            session_id: self.session_id.clone(),
            conversation_id: conversation_id.to_string(),
            template_id: template_id.to_string(),
        });
    }

    pub fn prompt_failed(&self, conversation_id: &str, error: &str) {
        self.emit(RosterEvent::PromptFailed {
            session_id: self.session_id.clone(),
            conversation_id: conversation_id.to_string(),
            error: error.to_string(),
        });
    }
}
