//! SessionRegistry - actor that owns the roster store
//!
//! Processes commands via channels for thread-safe access to persistent
//! state. Compound operations (conflict check + insert, proposal approval)
//! run inside a single actor turn so racing callers serialize cleanly.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::confirm::{self, ConfirmEvent};
use crate::conflict;
use crate::config::RegistryConfig;
use crate::domain::{
    ConfirmState, Conversation, Filter, IndexValue, ProposalStatus, RescheduleProposal, Resources, Session,
    SessionKind, Store, TimeWindow,
};
use crate::events::{EventBus, RosterEvent};
use chrono::NaiveDate;

use super::messages::{RegistryCommand, RegistryError, RegistryResponse};

/// Handle to send commands to the registry actor
#[derive(Clone)]
pub struct SessionRegistry {
    tx: mpsc::Sender<RegistryCommand>,
    bus: Arc<EventBus>,
    cas_retries: u32,
}

impl SessionRegistry {
    /// Spawn a new registry actor over the store at `db_path`
    pub fn spawn(db_path: impl AsRef<Path>, config: &RegistryConfig, bus: Arc<EventBus>) -> eyre::Result<Self> {
        debug!(db_path = %db_path.as_ref().display(), "spawn: called");
        let store = Store::open(db_path.as_ref())?;

        let (tx, rx) = mpsc::channel(config.command_buffer);

        // Spawn the actor task
        tokio::spawn(registry_loop(store, rx));

        info!("SessionRegistry spawned");

        Ok(Self {
            tx,
            bus,
            cas_retries: config.cas_retries,
        })
    }

    // === Session operations ===

    /// Create a session, rejecting any schedule that clashes with a
    /// persisted one
    pub async fn create_session(&self, session: Session) -> RegistryResponse<Session> {
        debug!(session_id = %session.id, kind = %session.kind(), "create_session: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(RegistryCommand::CreateSession {
                session,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelError)?;
        let result = reply_rx.await.map_err(|_| RegistryError::ChannelError)?;

        if let Ok(ref created) = result {
            self.bus.emit(RosterEvent::SessionCreated {
                session_id: created.id.clone(),
                kind: created.kind().to_string(),
                window: created.window.to_string(),
            });
        }

        result
    }

    /// Get a session by ID
    pub async fn get_session(&self, id: &str) -> RegistryResponse<Session> {
        debug!(%id, "get_session: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(RegistryCommand::GetSession {
                id: id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelError)?;
        reply_rx.await.map_err(|_| RegistryError::ChannelError)?
    }

    /// Update a session (version-guarded write)
    pub async fn update_session(&self, session: Session) -> RegistryResponse<Session> {
        debug!(session_id = %session.id, state = ?session.confirm_state, "update_session: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(RegistryCommand::UpdateSession {
                session,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelError)?;
        reply_rx.await.map_err(|_| RegistryError::ChannelError)?
    }

    /// List sessions with optional filters
    pub async fn list_sessions(
        &self,
        date_filter: Option<NaiveDate>,
        kind_filter: Option<SessionKind>,
        state_filter: Option<ConfirmState>,
        resource_filter: Option<String>,
    ) -> RegistryResponse<Vec<Session>> {
        debug!(?date_filter, ?kind_filter, ?state_filter, ?resource_filter, "list_sessions: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(RegistryCommand::ListSessions {
                date_filter,
                kind_filter,
                state_filter,
                resource_filter,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelError)?;
        reply_rx.await.map_err(|_| RegistryError::ChannelError)?
    }

    /// Run a confirmation event against a session
    ///
    /// Reads the session, applies the state machine, and writes back with
    /// the read version as precondition. A lost write is retried a bounded
    /// number of times by re-reading and re-applying the same event.
    pub async fn apply_transition(&self, id: &str, event: &ConfirmEvent) -> RegistryResponse<Session> {
        debug!(%id, event = event.name(), "apply_transition: called");
        for attempt in 0..=self.cas_retries {
            let mut session = self.get_session(id).await?;
            confirm::apply_to_session(&mut session, event)?;

            match self.update_session(session).await {
                Ok(updated) => {
                    self.emit_transition_event(&updated, event);
                    return Ok(updated);
                }
                Err(RegistryError::Store(e)) if e.is_version_conflict() => {
                    debug!(%id, attempt, "apply_transition: lost the write, re-applying");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        warn!(%id, retries = self.cas_retries, "apply_transition: retries exhausted");
        Err(RegistryError::ConcurrentModification(id.to_string()))
    }

    /// Restart the confirmation cycle for a session
    pub async fn reset_confirmation(&self, id: &str) -> RegistryResponse<Session> {
        debug!(%id, "reset_confirmation: called");
        self.apply_transition(id, &ConfirmEvent::AdminReset).await
    }

    fn emit_transition_event(&self, session: &Session, event: &ConfirmEvent) {
        match event {
            ConfirmEvent::Accept => self.bus.emit(RosterEvent::SessionConfirmed {
                session_id: session.id.clone(),
            }),
            ConfirmEvent::Decline { reason } => self.bus.emit(RosterEvent::SessionDeclined {
                session_id: session.id.clone(),
                reason: reason.clone(),
            }),
            ConfirmEvent::RequestReschedule { reason } => self.bus.emit(RosterEvent::RescheduleRequested {
                session_id: session.id.clone(),
                reason: reason.clone(),
            }),
            ConfirmEvent::AdminReset => self.bus.emit(RosterEvent::ConfirmationReset {
                session_id: session.id.clone(),
            }),
            // the proposal paths emit these with their proposal id
            ConfirmEvent::AdminApprove { .. } | ConfirmEvent::AdminReject => {}
        }
    }

    // === Reschedule proposal operations ===

    /// File a reschedule proposal for a session
    ///
    /// The proposed window is validated against persisted sessions
    /// (excluding the one being moved) before the proposal is admitted.
    /// The session itself is not touched until approval.
    pub async fn propose_reschedule(
        &self,
        session_id: &str,
        window: TimeWindow,
        resources: Resources,
        proposed_by: &str,
    ) -> RegistryResponse<RescheduleProposal> {
        debug!(%session_id, %window, %proposed_by, "propose_reschedule: called");
        let proposal = RescheduleProposal::new(session_id, window, resources, proposed_by);

        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(RegistryCommand::CreateProposal {
                proposal,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelError)?;
        reply_rx.await.map_err(|_| RegistryError::ChannelError)?
    }

    /// Get a proposal by ID
    pub async fn get_proposal(&self, id: &str) -> RegistryResponse<RescheduleProposal> {
        debug!(%id, "get_proposal: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(RegistryCommand::GetProposal {
                id: id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelError)?;
        reply_rx.await.map_err(|_| RegistryError::ChannelError)?
    }

    /// List proposals with optional filters
    pub async fn list_proposals(
        &self,
        session_filter: Option<String>,
        status_filter: Option<ProposalStatus>,
    ) -> RegistryResponse<Vec<RescheduleProposal>> {
        debug!(?session_filter, ?status_filter, "list_proposals: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(RegistryCommand::ListProposals {
                session_filter,
                status_filter,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelError)?;
        reply_rx.await.map_err(|_| RegistryError::ChannelError)?
    }

    /// Approve a pending proposal and swap the session onto its schedule
    pub async fn approve_reschedule(&self, proposal_id: &str) -> RegistryResponse<Session> {
        debug!(%proposal_id, "approve_reschedule: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(RegistryCommand::ApproveProposal {
                id: proposal_id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelError)?;
        let result = reply_rx.await.map_err(|_| RegistryError::ChannelError)?;

        if let Ok(ref session) = result {
            self.bus.emit(RosterEvent::RescheduleApproved {
                session_id: session.id.clone(),
                proposal_id: proposal_id.to_string(),
            });
        }

        result
    }

    /// Reject a pending proposal; the session returns to not-confirmed
    pub async fn reject_reschedule(&self, proposal_id: &str) -> RegistryResponse<Session> {
        debug!(%proposal_id, "reject_reschedule: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(RegistryCommand::RejectProposal {
                id: proposal_id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelError)?;
        let result = reply_rx.await.map_err(|_| RegistryError::ChannelError)?;

        if let Ok(ref session) = result {
            self.bus.emit(RosterEvent::RescheduleRejected {
                session_id: session.id.clone(),
                proposal_id: proposal_id.to_string(),
            });
        }

        result
    }

    // === Conversation operations ===

    /// Persist a new conversation
    pub async fn create_conversation(&self, conversation: Conversation) -> RegistryResponse<Conversation> {
        debug!(conversation_id = %conversation.id, "create_conversation: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(RegistryCommand::CreateConversation {
                conversation,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelError)?;
        reply_rx.await.map_err(|_| RegistryError::ChannelError)?
    }

    /// Get a conversation by ID
    pub async fn get_conversation(&self, id: &str) -> RegistryResponse<Conversation> {
        debug!(%id, "get_conversation: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(RegistryCommand::GetConversation {
                id: id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelError)?;
        reply_rx.await.map_err(|_| RegistryError::ChannelError)?
    }

    /// Update a conversation (version-guarded write)
    pub async fn update_conversation(&self, conversation: Conversation) -> RegistryResponse<Conversation> {
        debug!(conversation_id = %conversation.id, state = ?conversation.state, "update_conversation: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(RegistryCommand::UpdateConversation {
                conversation,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelError)?;
        reply_rx.await.map_err(|_| RegistryError::ChannelError)?
    }

    /// List conversations with optional filters
    pub async fn list_conversations(
        &self,
        phone_filter: Option<String>,
        staff_filter: Option<String>,
        session_filter: Option<String>,
        active_filter: Option<bool>,
    ) -> RegistryResponse<Vec<Conversation>> {
        debug!(
            ?phone_filter,
            ?staff_filter,
            ?session_filter,
            ?active_filter,
            "list_conversations: called"
        );
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(RegistryCommand::ListConversations {
                phone_filter,
                staff_filter,
                session_filter,
                active_filter,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelError)?;
        reply_rx.await.map_err(|_| RegistryError::ChannelError)?
    }

    /// Shutdown the registry actor
    pub async fn shutdown(&self) -> Result<(), RegistryError> {
        debug!("shutdown: called");
        self.tx
            .send(RegistryCommand::Shutdown)
            .await
            .map_err(|_| RegistryError::ChannelError)
    }
}

/// The actor loop that owns the Store and processes commands
async fn registry_loop(mut store: Store, mut rx: mpsc::Receiver<RegistryCommand>) {
    debug!("registry_loop: called");
    debug!("SessionRegistry actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            // Session operations
            RegistryCommand::CreateSession { session, reply } => {
                debug!(session_id = %session.id, "registry_loop: CreateSession command");
                let _ = reply.send(create_session_checked(&mut store, session));
            }

            RegistryCommand::GetSession { id, reply } => {
                debug!(%id, "registry_loop: GetSession command");
                let result = store.get::<Session>(&id).map_err(RegistryError::from);
                let _ = reply.send(result);
            }

            RegistryCommand::UpdateSession { session, reply } => {
                debug!(session_id = %session.id, "registry_loop: UpdateSession command");
                let result = store.update(session).map_err(RegistryError::from);
                let _ = reply.send(result);
            }

            RegistryCommand::ListSessions {
                date_filter,
                kind_filter,
                state_filter,
                resource_filter,
                reply,
            } => {
                debug!(
                    ?date_filter,
                    ?kind_filter,
                    ?state_filter,
                    ?resource_filter,
                    "registry_loop: ListSessions command"
                );
                let mut filters = Vec::new();
                if let Some(date) = date_filter {
                    filters.push(Filter::eq(
                        "date",
                        IndexValue::String(date.format("%Y-%m-%d").to_string()),
                    ));
                }
                if let Some(kind) = kind_filter {
                    filters.push(Filter::eq("kind", IndexValue::String(kind.to_string())));
                }
                if let Some(state) = state_filter {
                    filters.push(Filter::eq("state", IndexValue::String(state.to_string())));
                }
                if let Some(resource) = resource_filter {
                    filters.push(Filter::eq("resource", IndexValue::String(resource)));
                }

                let result = store.list::<Session>(&filters).map_err(RegistryError::from);
                let _ = reply.send(result);
            }

            // Reschedule proposal operations
            RegistryCommand::CreateProposal { proposal, reply } => {
                debug!(proposal_id = %proposal.id, "registry_loop: CreateProposal command");
                let _ = reply.send(create_proposal_checked(&mut store, proposal));
            }

            RegistryCommand::GetProposal { id, reply } => {
                debug!(%id, "registry_loop: GetProposal command");
                let result = store.get::<RescheduleProposal>(&id).map_err(RegistryError::from);
                let _ = reply.send(result);
            }

            RegistryCommand::ListProposals {
                session_filter,
                status_filter,
                reply,
            } => {
                debug!(?session_filter, ?status_filter, "registry_loop: ListProposals command");
                let mut filters = Vec::new();
                if let Some(session_id) = session_filter {
                    filters.push(Filter::eq("session_id", IndexValue::String(session_id)));
                }
                if let Some(status) = status_filter {
                    filters.push(Filter::eq("status", IndexValue::String(status.to_string())));
                }

                let result = store.list::<RescheduleProposal>(&filters).map_err(RegistryError::from);
                let _ = reply.send(result);
            }

            RegistryCommand::ApproveProposal { id, reply } => {
                debug!(%id, "registry_loop: ApproveProposal command");
                let _ = reply.send(approve_proposal(&mut store, &id));
            }

            RegistryCommand::RejectProposal { id, reply } => {
                debug!(%id, "registry_loop: RejectProposal command");
                let _ = reply.send(reject_proposal(&mut store, &id));
            }

            // Conversation operations
            RegistryCommand::CreateConversation { conversation, reply } => {
                debug!(conversation_id = %conversation.id, "registry_loop: CreateConversation command");
                let result = store.create(conversation).map_err(RegistryError::from);
                let _ = reply.send(result);
            }

            RegistryCommand::GetConversation { id, reply } => {
                debug!(%id, "registry_loop: GetConversation command");
                let result = store.get::<Conversation>(&id).map_err(RegistryError::from);
                let _ = reply.send(result);
            }

            RegistryCommand::UpdateConversation { conversation, reply } => {
                debug!(conversation_id = %conversation.id, "registry_loop: UpdateConversation command");
                let result = store.update(conversation).map_err(RegistryError::from);
                let _ = reply.send(result);
            }

            RegistryCommand::ListConversations {
                phone_filter,
                staff_filter,
                session_filter,
                active_filter,
                reply,
            } => {
                debug!(
                    ?phone_filter,
                    ?staff_filter,
                    ?session_filter,
                    ?active_filter,
                    "registry_loop: ListConversations command"
                );
                let mut filters = Vec::new();
                if let Some(phone) = phone_filter {
                    filters.push(Filter::eq("phone", IndexValue::String(phone)));
                }
                if let Some(staff_id) = staff_filter {
                    filters.push(Filter::eq("staff_id", IndexValue::String(staff_id)));
                }
                if let Some(session_id) = session_filter {
                    filters.push(Filter::eq("session_id", IndexValue::String(session_id)));
                }
                if let Some(active) = active_filter {
                    filters.push(Filter::eq("active", IndexValue::String(active.to_string())));
                }

                let result = store.list::<Conversation>(&filters).map_err(RegistryError::from);
                let _ = reply.send(result);
            }

            RegistryCommand::Shutdown => {
                debug!("registry_loop: Shutdown command");
                info!("SessionRegistry shutting down");
                break;
            }
        }
    }

    debug!("SessionRegistry actor stopped");
}

/// Conflict-checked insert, executed in one actor turn
fn create_session_checked(store: &mut Store, session: Session) -> RegistryResponse<Session> {
    debug!(session_id = %session.id, "create_session_checked: called");
    if let Some(other) = conflict::find_conflict(store, &session.window, &session.resources, None)? {
        debug!(other_id = %other.id, "create_session_checked: schedule clash");
        return Err(RegistryError::Conflict { other_id: other.id });
    }

    Ok(store.create(session)?)
}

/// Validate the proposed schedule before admitting the proposal
///
/// The session's current confirmation state is not gated here; the state
/// machine rules at approval time.
fn create_proposal_checked(store: &mut Store, proposal: RescheduleProposal) -> RegistryResponse<RescheduleProposal> {
    debug!(proposal_id = %proposal.id, session_id = %proposal.session_id, "create_proposal_checked: called");
    let session: Session = store.get(&proposal.session_id)?;

    if let Some(other) = conflict::find_conflict(store, &proposal.window, &proposal.resources, Some(&session.id))? {
        debug!(other_id = %other.id, "create_proposal_checked: proposed window clashes");
        return Err(RegistryError::Conflict { other_id: other.id });
    }

    Ok(store.create(proposal)?)
}

/// Approve a pending proposal: re-check the window, run the state machine,
/// swap the schedule, and close the proposal - all in one actor turn
fn approve_proposal(store: &mut Store, id: &str) -> RegistryResponse<Session> {
    debug!(%id, "approve_proposal: called");
    let mut proposal: RescheduleProposal = store.get(id)?;
    if !proposal.is_pending() {
        debug!(%id, status = %proposal.status, "approve_proposal: proposal already resolved");
        return Err(RegistryError::ProposalNotPending(id.to_string()));
    }

    let mut session: Session = store.get(&proposal.session_id)?;

    // the target window may have been taken since the proposal was filed
    if let Some(other) = conflict::find_conflict(store, &proposal.window, &proposal.resources, Some(&session.id))? {
        debug!(other_id = %other.id, "approve_proposal: window no longer free");
        return Err(RegistryError::Conflict { other_id: other.id });
    }

    confirm::apply_to_session(
        &mut session,
        &ConfirmEvent::AdminApprove {
            window: proposal.window.clone(),
            resources: proposal.resources.clone(),
        },
    )?;
    let session = store.update(session)?;

    proposal.set_status(ProposalStatus::Approved);
    store.update(proposal)?;

    Ok(session)
}

/// Reject a pending proposal; the session falls back to not-confirmed with
/// its original-reason snapshot intact
fn reject_proposal(store: &mut Store, id: &str) -> RegistryResponse<Session> {
    debug!(%id, "reject_proposal: called");
    let mut proposal: RescheduleProposal = store.get(id)?;
    if !proposal.is_pending() {
        debug!(%id, status = %proposal.status, "reject_proposal: proposal already resolved");
        return Err(RegistryError::ProposalNotPending(id.to_string()));
    }

    let mut session: Session = store.get(&proposal.session_id)?;

    confirm::apply_to_session(&mut session, &ConfirmEvent::AdminReject)?;
    let session = store.update(session)?;

    proposal.set_status(ProposalStatus::Rejected);
    store.update(proposal)?;

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RescheduleState, SessionDetail};
    use chrono::NaiveTime;
    use rosterstore::now_ms;
    use tempfile::tempdir;

    fn spawn_registry(dir: &Path) -> SessionRegistry {
        SessionRegistry::spawn(
            dir.join("roster.db"),
            &RegistryConfig::default(),
            crate::events::create_event_bus(),
        )
        .unwrap()
    }

    fn window(hour: u32, minute: u32, count: u32) -> TimeWindow {
        TimeWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            NaiveTime::from_hms_opt(hour, minute, 0).unwrap(),
            count,
        )
    }

    fn make_session(title: &str, room: &str, staff: &str, hour: u32, minute: u32, count: u32) -> Session {
        Session::new(
            title,
            SessionDetail::Pbl {
                block: "12".to_string(),
                group: "A".to_string(),
            },
            window(hour, minute, count),
            Resources::new(Some(room.to_string()), vec![staff.to_string()]),
            "admin-1",
        )
    }

    #[tokio::test]
    async fn test_registry_session_crud() {
        let temp = tempdir().unwrap();
        let registry = spawn_registry(temp.path());

        let created = registry
            .create_session(make_session("PBL Grup A", "R-101", "stf-ana", 7, 20, 2))
            .await
            .unwrap();
        assert_eq!(created.version, 1);

        let fetched = registry.get_session(&created.id).await.unwrap();
        assert_eq!(fetched.title, "PBL Grup A");
        assert_eq!(fetched.confirm_state, ConfirmState::NotConfirmed);

        let all = registry.list_sessions(None, None, None, None).await.unwrap();
        assert_eq!(all.len(), 1);

        let by_date = registry
            .list_sessions(NaiveDate::from_ymd_opt(2024, 1, 15), None, None, None)
            .await
            .unwrap();
        assert_eq!(by_date.len(), 1);

        let other_date = registry
            .list_sessions(NaiveDate::from_ymd_opt(2024, 1, 16), None, None, None)
            .await
            .unwrap();
        assert!(other_date.is_empty());

        let by_room = registry
            .list_sessions(None, None, None, Some("R-101".to_string()))
            .await
            .unwrap();
        assert_eq!(by_room.len(), 1);

        registry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_get_session_not_found() {
        let temp = tempdir().unwrap();
        let registry = spawn_registry(temp.path());

        let err = registry.get_session("sess-missing").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));

        registry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_session_conflict_same_room() {
        let temp = tempdir().unwrap();
        let registry = spawn_registry(temp.path());

        // 07:20-08:10
        let a = registry
            .create_session(make_session("Sesi A", "R-101", "stf-a", 7, 20, 1))
            .await
            .unwrap();

        // 08:00-08:50 overlaps A in the same room
        let err = registry
            .create_session(make_session("Sesi B", "R-101", "stf-b", 8, 0, 1))
            .await
            .unwrap_err();
        match err {
            RegistryError::Conflict { other_id } => assert_eq!(other_id, a.id),
            other => panic!("expected conflict, got {other:?}"),
        }

        // 08:10-09:00 is back-to-back with A, no overlap
        registry
            .create_session(make_session("Sesi C", "R-101", "stf-c", 8, 10, 1))
            .await
            .unwrap();

        registry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_accept_then_reset() {
        let temp = tempdir().unwrap();
        let registry = spawn_registry(temp.path());

        let session = registry
            .create_session(make_session("PBL Grup A", "R-101", "stf-ana", 7, 20, 2))
            .await
            .unwrap();

        let confirmed = registry.apply_transition(&session.id, &ConfirmEvent::Accept).await.unwrap();
        assert_eq!(confirmed.confirm_state, ConfirmState::Confirmed);

        let reset = registry.reset_confirmation(&session.id).await.unwrap();
        assert_eq!(reset.confirm_state, ConfirmState::NotConfirmed);
        assert!(reset.reason.is_none());

        registry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_transition_surfaces() {
        let temp = tempdir().unwrap();
        let registry = spawn_registry(temp.path());

        let session = registry
            .create_session(make_session("PBL Grup A", "R-101", "stf-ana", 7, 20, 2))
            .await
            .unwrap();

        registry.apply_transition(&session.id, &ConfirmEvent::Accept).await.unwrap();

        let err = registry
            .apply_transition(&session.id, &ConfirmEvent::Accept)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Transition(_)));

        registry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_apply_transition_not_found() {
        let temp = tempdir().unwrap();
        let registry = spawn_registry(temp.path());

        let err = registry
            .apply_transition("sess-missing", &ConfirmEvent::Accept)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));

        registry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_reschedule_approve_flow() {
        let temp = tempdir().unwrap();
        let registry = spawn_registry(temp.path());

        let session = registry
            .create_session(make_session("PBL Grup A", "R-101", "stf-ana", 7, 20, 2))
            .await
            .unwrap();

        let waiting = registry
            .apply_transition(
                &session.id,
                &ConfirmEvent::RequestReschedule {
                    reason: "sakit".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(waiting.confirm_state, ConfirmState::WaitingReschedule);
        assert_eq!(waiting.reschedule_state, Some(RescheduleState::Waiting));

        let new_window = window(13, 0, 2);
        let proposal = registry
            .propose_reschedule(
                &session.id,
                new_window.clone(),
                waiting.resources.clone(),
                "admin-1",
            )
            .await
            .unwrap();
        assert!(proposal.is_pending());

        let approved = registry.approve_reschedule(&proposal.id).await.unwrap();
        assert_eq!(approved.confirm_state, ConfirmState::Confirmed);
        assert_eq!(approved.reschedule_state, None);
        assert_eq!(approved.window, new_window);
        assert_eq!(approved.original_reason.as_deref(), Some("sakit"));

        let resolved = registry.get_proposal(&proposal.id).await.unwrap();
        assert_eq!(resolved.status, ProposalStatus::Approved);

        registry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_reschedule_reject_preserves_original_reason() {
        let temp = tempdir().unwrap();
        let registry = spawn_registry(temp.path());

        let session = registry
            .create_session(make_session("PBL Grup A", "R-101", "stf-ana", 7, 20, 2))
            .await
            .unwrap();
        registry
            .apply_transition(
                &session.id,
                &ConfirmEvent::RequestReschedule {
                    reason: "sakit".to_string(),
                },
            )
            .await
            .unwrap();

        let proposal = registry
            .propose_reschedule(
                &session.id,
                window(13, 0, 2),
                session.resources.clone(),
                "admin-1",
            )
            .await
            .unwrap();

        let rejected = registry.reject_reschedule(&proposal.id).await.unwrap();
        assert_eq!(rejected.confirm_state, ConfirmState::NotConfirmed);
        assert_eq!(rejected.reschedule_state, None);
        assert_eq!(rejected.original_reason.as_deref(), Some("sakit"));

        let resolved = registry.get_proposal(&proposal.id).await.unwrap();
        assert_eq!(resolved.status, ProposalStatus::Rejected);

        registry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_propose_into_taken_window_rejected() {
        let temp = tempdir().unwrap();
        let registry = spawn_registry(temp.path());

        let blocker = registry
            .create_session(make_session("Kuliah Pakar", "R-101", "stf-a", 13, 0, 2))
            .await
            .unwrap();
        let session = registry
            .create_session(make_session("PBL Grup A", "R-101", "stf-b", 7, 20, 2))
            .await
            .unwrap();

        // proposing into the blocker's window in the same room
        let err = registry
            .propose_reschedule(&session.id, window(13, 0, 2), session.resources.clone(), "admin-1")
            .await
            .unwrap_err();
        match err {
            RegistryError::Conflict { other_id } => assert_eq!(other_id, blocker.id),
            other => panic!("expected conflict, got {other:?}"),
        }

        registry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_approve_fails_when_window_was_taken() {
        let temp = tempdir().unwrap();
        let registry = spawn_registry(temp.path());

        let session = registry
            .create_session(make_session("PBL Grup A", "R-101", "stf-a", 7, 20, 2))
            .await
            .unwrap();
        registry
            .apply_transition(
                &session.id,
                &ConfirmEvent::RequestReschedule {
                    reason: "sakit".to_string(),
                },
            )
            .await
            .unwrap();

        // 13:00 is free at proposal time
        let proposal = registry
            .propose_reschedule(&session.id, window(13, 0, 2), session.resources.clone(), "admin-1")
            .await
            .unwrap();

        // someone books the room for 13:00 before the admin approves
        registry
            .create_session(make_session("Praktikum", "R-101", "stf-b", 13, 0, 2))
            .await
            .unwrap();

        let err = registry.approve_reschedule(&proposal.id).await.unwrap_err();
        assert!(matches!(err, RegistryError::Conflict { .. }));

        // the proposal survives for a retry with a different window
        let pending = registry.get_proposal(&proposal.id).await.unwrap();
        assert_eq!(pending.status, ProposalStatus::Pending);

        registry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_approve_twice_not_pending() {
        let temp = tempdir().unwrap();
        let registry = spawn_registry(temp.path());

        let session = registry
            .create_session(make_session("PBL Grup A", "R-101", "stf-ana", 7, 20, 2))
            .await
            .unwrap();
        registry
            .apply_transition(
                &session.id,
                &ConfirmEvent::RequestReschedule {
                    reason: "sakit".to_string(),
                },
            )
            .await
            .unwrap();
        let proposal = registry
            .propose_reschedule(&session.id, window(13, 0, 2), session.resources.clone(), "admin-1")
            .await
            .unwrap();

        registry.approve_reschedule(&proposal.id).await.unwrap();

        let err = registry.approve_reschedule(&proposal.id).await.unwrap_err();
        assert!(matches!(err, RegistryError::ProposalNotPending(_)));

        registry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_creates_one_winner() {
        let temp = tempdir().unwrap();
        let registry = spawn_registry(temp.path());

        let r1 = registry.clone();
        let r2 = registry.clone();
        let a = make_session("Sesi A", "R-101", "stf-a", 7, 20, 2);
        let b = make_session("Sesi B", "R-101", "stf-b", 8, 0, 2);

        let (res_a, res_b) = tokio::join!(r1.create_session(a), r2.create_session(b));

        assert!(
            res_a.is_ok() ^ res_b.is_ok(),
            "exactly one of the racing creations must win: {res_a:?} / {res_b:?}"
        );
        let loser = if res_a.is_err() { res_a } else { res_b };
        assert!(matches!(loser.unwrap_err(), RegistryError::Conflict { .. }));

        registry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_accepts_one_winner() {
        let temp = tempdir().unwrap();
        let registry = spawn_registry(temp.path());

        let session = registry
            .create_session(make_session("PBL Grup A", "R-101", "stf-ana", 7, 20, 2))
            .await
            .unwrap();

        let r1 = registry.clone();
        let r2 = registry.clone();
        let id1 = session.id.clone();
        let id2 = session.id.clone();

        let (res_a, res_b) = tokio::join!(
            r1.apply_transition(&id1, &ConfirmEvent::Accept),
            r2.apply_transition(&id2, &ConfirmEvent::Accept)
        );

        assert!(res_a.is_ok() ^ res_b.is_ok());
        let loser = if res_a.is_err() { res_a } else { res_b };
        assert!(matches!(loser.unwrap_err(), RegistryError::Transition(_)));

        let settled = registry.get_session(&session.id).await.unwrap();
        assert_eq!(settled.confirm_state, ConfirmState::Confirmed);

        registry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_conversation_crud_and_active_filter() {
        let temp = tempdir().unwrap();
        let registry = spawn_registry(temp.path());

        let session = registry
            .create_session(make_session("PBL Grup A", "R-101", "stf-ana", 7, 20, 2))
            .await
            .unwrap();

        let convo = registry
            .create_conversation(Conversation::new(
                "stf-ana",
                &session.id,
                SessionKind::Pbl,
                "6281234567890",
                now_ms() + 86_400_000,
            ))
            .await
            .unwrap();

        let by_phone = registry
            .list_conversations(Some("6281234567890".to_string()), None, None, None)
            .await
            .unwrap();
        assert_eq!(by_phone.len(), 1);

        let active = registry
            .list_conversations(None, None, Some(session.id.clone()), Some(true))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);

        let mut closed = convo.clone();
        closed.set_state(crate::domain::ConvoState::Completed);
        registry.update_conversation(closed).await.unwrap();

        let active = registry
            .list_conversations(None, None, Some(session.id.clone()), Some(true))
            .await
            .unwrap();
        assert!(active.is_empty());

        let inactive = registry
            .list_conversations(None, None, Some(session.id.clone()), Some(false))
            .await
            .unwrap();
        assert_eq!(inactive.len(), 1);

        registry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_emits_event() {
        let temp = tempdir().unwrap();
        let bus = crate::events::create_event_bus();
        let registry = SessionRegistry::spawn(
            temp.path().join("roster.db"),
            &RegistryConfig::default(),
            bus.clone(),
        )
        .unwrap();
        let mut rx = bus.subscribe();

        let session = registry
            .create_session(make_session("PBL Grup A", "R-101", "stf-ana", 7, 20, 2))
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "session_created");
        assert_eq!(event.session_id(), session.id);

        registry.shutdown().await.unwrap();
    }
}
