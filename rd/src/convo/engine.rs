//! ConvoEngine - actor that drives confirmation dialogues
//!
//! The engine actor serializes conversation starts (duplicate checks and
//! creation happen in one turn) and routes inbound replies to
//! per-conversation workers. A worker processes its jobs strictly in
//! order, so no two replies for the same conversation ever interleave;
//! different conversations proceed concurrently.
//!
//! Prompts are rendered and persisted on the conversation record before
//! delivery is attempted. A failed send leaves the record intact and the
//! stored bytes available for re-delivery.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use rosterstore::now_ms;

use crate::confirm::ConfirmEvent;
use crate::config::ConversationConfig;
use crate::domain::{Conversation, ConvoState, OutboundPrompt, Session};
use crate::events::{EventBus, RosterEvent};
use crate::gateway::{GatewayError, MessageId, NotificationGateway};
use crate::registry::{RegistryError, SessionRegistry};

use super::ConvoError;
use super::prompts::{self, PromptCatalog};
use super::reply::{self, ReplyAction};

const ENGINE_QUEUE_CAPACITY: usize = 256;
const WORKER_QUEUE_CAPACITY: usize = 16;

/// Handle to send commands to the conversation engine actor
#[derive(Clone)]
pub struct ConvoEngine {
    tx: mpsc::Sender<EngineCommand>,
}

enum EngineCommand {
    Start {
        session_id: String,
        staff_id: String,
        staff_name: String,
        phone: String,
        reply: oneshot::Sender<Result<Conversation, ConvoError>>,
    },
    Inbound {
        phone: String,
        text: String,
        reply: oneshot::Sender<Result<Conversation, ConvoError>>,
    },
    Redeliver {
        conversation_id: String,
        reply: oneshot::Sender<Result<Conversation, ConvoError>>,
    },
    Sweep {
        reply: oneshot::Sender<Result<usize, ConvoError>>,
    },
    Shutdown,
}

impl ConvoEngine {
    /// Spawn the engine actor
    pub fn spawn(
        registry: SessionRegistry,
        gateway: Arc<dyn NotificationGateway>,
        catalog: Arc<PromptCatalog>,
        config: &ConversationConfig,
        bus: Arc<EventBus>,
    ) -> Self {
        debug!(expiry_hours = config.expiry_hours, "spawn: called");
        let (tx, rx) = mpsc::channel(ENGINE_QUEUE_CAPACITY);

        let state = EngineState {
            registry,
            gateway,
            catalog,
            bus,
            expiry_ms: config.expiry_hours * 3_600_000,
            workers: HashMap::new(),
        };

        tokio::spawn(engine_loop(state, rx));

        info!("ConvoEngine spawned");
        Self { tx }
    }

    /// Open a confirmation dialogue and send the initial prompt
    pub async fn start_conversation(
        &self,
        session_id: &str,
        staff_id: &str,
        staff_name: &str,
        phone: &str,
    ) -> Result<Conversation, ConvoError> {
        debug!(%session_id, %staff_id, %phone, "start_conversation: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Start {
                session_id: session_id.to_string(),
                staff_id: staff_id.to_string(),
                staff_name: staff_name.to_string(),
                phone: phone.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| ConvoError::ChannelError)?;
        reply_rx.await.map_err(|_| ConvoError::ChannelError)?
    }

    /// Process an inbound reply from a phone number
    pub async fn on_reply(&self, phone: &str, text: &str) -> Result<Conversation, ConvoError> {
        debug!(%phone, "on_reply: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Inbound {
                phone: phone.to_string(),
                text: text.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| ConvoError::ChannelError)?;
        reply_rx.await.map_err(|_| ConvoError::ChannelError)?
    }

    /// Re-send the stored prompt of an active conversation verbatim
    pub async fn redeliver(&self, conversation_id: &str) -> Result<Conversation, ConvoError> {
        debug!(%conversation_id, "redeliver: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Redeliver {
                conversation_id: conversation_id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| ConvoError::ChannelError)?;
        reply_rx.await.map_err(|_| ConvoError::ChannelError)?
    }

    /// Cancel expired conversations; returns how many were cancelled
    pub async fn sweep_expired(&self) -> Result<usize, ConvoError> {
        debug!("sweep_expired: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Sweep { reply: reply_tx })
            .await
            .map_err(|_| ConvoError::ChannelError)?;
        reply_rx.await.map_err(|_| ConvoError::ChannelError)?
    }

    /// Shutdown the engine actor; drains per-conversation workers first
    pub async fn shutdown(&self) -> Result<(), ConvoError> {
        debug!("shutdown: called");
        self.tx
            .send(EngineCommand::Shutdown)
            .await
            .map_err(|_| ConvoError::ChannelError)
    }
}

/// Everything a worker needs to process jobs for one conversation
#[derive(Clone)]
struct WorkerCtx {
    conversation_id: String,
    registry: SessionRegistry,
    gateway: Arc<dyn NotificationGateway>,
    catalog: Arc<PromptCatalog>,
    bus: Arc<EventBus>,
    expiry_ms: i64,
}

enum WorkerJob {
    Inbound {
        text: String,
        reply: oneshot::Sender<Result<Conversation, ConvoError>>,
    },
    Redeliver {
        reply: oneshot::Sender<Result<Conversation, ConvoError>>,
    },
}

struct WorkerHandle {
    tx: mpsc::Sender<WorkerJob>,
    task: JoinHandle<()>,
}

struct EngineState {
    registry: SessionRegistry,
    gateway: Arc<dyn NotificationGateway>,
    catalog: Arc<PromptCatalog>,
    bus: Arc<EventBus>,
    expiry_ms: i64,

    /// Live workers by conversation id
    workers: HashMap<String, WorkerHandle>,
}

impl EngineState {
    /// Route a job to the conversation's worker, spawning one if needed
    async fn dispatch(&mut self, conversation_id: String, job: WorkerJob) {
        debug!(%conversation_id, "dispatch: called");
        if let Some(worker) = self.workers.get(&conversation_id) {
            if worker.task.is_finished() {
                debug!(%conversation_id, "dispatch: reaping finished worker");
                self.workers.remove(&conversation_id);
            }
        }

        let worker = self.workers.entry(conversation_id.clone()).or_insert_with(|| {
            debug!(%conversation_id, "dispatch: spawning worker");
            spawn_worker(WorkerCtx {
                conversation_id: conversation_id.clone(),
                registry: self.registry.clone(),
                gateway: self.gateway.clone(),
                catalog: self.catalog.clone(),
                bus: self.bus.clone(),
                expiry_ms: self.expiry_ms,
            })
        });

        if let Err(mpsc::error::SendError(job)) = worker.tx.send(job).await {
            warn!(%conversation_id, "dispatch: worker queue closed");
            self.workers.remove(&conversation_id);
            match job {
                WorkerJob::Inbound { reply, .. } => {
                    let _ = reply.send(Err(ConvoError::ChannelError));
                }
                WorkerJob::Redeliver { reply } => {
                    let _ = reply.send(Err(ConvoError::ChannelError));
                }
            }
        }
    }

    /// Close all worker queues and wait for in-flight jobs to finish
    async fn drain_workers(&mut self) {
        debug!(worker_count = self.workers.len(), "drain_workers: called");
        let mut tasks = Vec::new();
        for (_, worker) in self.workers.drain() {
            drop(worker.tx);
            tasks.push(worker.task);
        }

        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "worker task panicked during shutdown");
            }
        }
    }
}

async fn engine_loop(mut state: EngineState, mut rx: mpsc::Receiver<EngineCommand>) {
    debug!("ConvoEngine actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            EngineCommand::Start {
                session_id,
                staff_id,
                staff_name,
                phone,
                reply,
            } => {
                debug!(%session_id, %staff_id, "engine_loop: Start command");
                let result = start_conversation(&state, &session_id, &staff_id, &staff_name, &phone).await;
                let _ = reply.send(result);
            }

            EngineCommand::Inbound { phone, text, reply } => {
                debug!(%phone, "engine_loop: Inbound command");
                match resolve_conversation(&state.registry, &phone).await {
                    Ok(conversation_id) => {
                        state.dispatch(conversation_id, WorkerJob::Inbound { text, reply }).await;
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }

            EngineCommand::Redeliver { conversation_id, reply } => {
                debug!(%conversation_id, "engine_loop: Redeliver command");
                state.dispatch(conversation_id, WorkerJob::Redeliver { reply }).await;
            }

            EngineCommand::Sweep { reply } => {
                debug!("engine_loop: Sweep command");
                let result = sweep_expired(&state).await;
                let _ = reply.send(result);
            }

            EngineCommand::Shutdown => {
                debug!("engine_loop: Shutdown command");
                info!("ConvoEngine shutting down");
                state.drain_workers().await;
                break;
            }
        }
    }

    debug!("ConvoEngine actor stopped");
}

/// Open a dialogue: duplicate check, create, render, persist, deliver.
/// Runs inside the engine actor turn so racing starts for the same
/// (staff, session) pair cannot both pass the duplicate check.
async fn start_conversation(
    state: &EngineState,
    session_id: &str,
    staff_id: &str,
    staff_name: &str,
    phone: &str,
) -> Result<Conversation, ConvoError> {
    debug!(%session_id, %staff_id, %phone, "start_conversation: called");

    let existing = state
        .registry
        .list_conversations(
            None,
            Some(staff_id.to_string()),
            Some(session_id.to_string()),
            Some(true),
        )
        .await?;
    if !existing.is_empty() {
        debug!(%session_id, %staff_id, "start_conversation: active dialogue already open");
        return Err(ConvoError::ConversationExists {
            staff_id: staff_id.to_string(),
            session_id: session_id.to_string(),
        });
    }

    let session = state.registry.get_session(session_id).await?;

    let mut conversation = Conversation::new(
        staff_id,
        session_id,
        session.kind(),
        phone,
        now_ms() + state.expiry_ms,
    );
    conversation.insert_metadata("staff_name", staff_name);

    let template_id = prompts::state_template(&conversation.state)
        .ok_or_else(|| ConvoError::Template(format!("no template for state {}", conversation.state)))?;
    let variables = prompt_variables(&session, staff_name);
    let text = state
        .catalog
        .render(template_id, &variables)
        .map_err(|e| ConvoError::Template(e.to_string()))?;
    let prompt = OutboundPrompt {
        template_id: template_id.to_string(),
        variables,
        text,
    };
    conversation.set_last_prompt(prompt.clone());

    let conversation = state.registry.create_conversation(conversation).await?;

    state.bus.emit(RosterEvent::ConversationStarted {
        session_id: session_id.to_string(),
        conversation_id: conversation.id.clone(),
        staff_id: staff_id.to_string(),
    });

    // a failed send is reported on the bus; the stored prompt makes
    // re-delivery possible without re-rendering
    let _ = deliver(&state.gateway, &state.bus, &conversation, &prompt).await;

    Ok(conversation)
}

/// Map an inbound phone number to its most recently prompted active
/// conversation
async fn resolve_conversation(registry: &SessionRegistry, phone: &str) -> Result<String, ConvoError> {
    debug!(%phone, "resolve_conversation: called");
    let mut active = registry
        .list_conversations(Some(phone.to_string()), None, None, Some(true))
        .await?;

    // listings come back oldest-update first
    match active.pop() {
        Some(conversation) => Ok(conversation.id),
        None => Err(ConvoError::NoActiveConversation(phone.to_string())),
    }
}

/// Cancel active conversations whose expiry deadline has passed.
/// A conversation that advances concurrently wins the version race and
/// survives the sweep.
async fn sweep_expired(state: &EngineState) -> Result<usize, ConvoError> {
    debug!("sweep_expired: called");
    let now = now_ms();
    let active = state.registry.list_conversations(None, None, None, Some(true)).await?;

    let mut cancelled = 0;
    for mut conversation in active {
        if !conversation.is_expired(now) {
            continue;
        }

        let conversation_id = conversation.id.clone();
        conversation.set_state(ConvoState::Cancelled);
        match state.registry.update_conversation(conversation).await {
            Ok(updated) => {
                cancelled += 1;
                info!(conversation_id = %updated.id, session_id = %updated.session_id, "conversation expired");
                state.bus.emit(RosterEvent::ConversationCancelled {
                    session_id: updated.session_id.clone(),
                    conversation_id: updated.id.clone(),
                });
            }
            Err(RegistryError::Store(e)) if e.is_version_conflict() => {
                debug!(%conversation_id, "sweep_expired: conversation advanced during sweep, skipping");
            }
            Err(e) => return Err(e.into()),
        }
    }

    debug!(cancelled, "sweep_expired: complete");
    Ok(cancelled)
}

fn spawn_worker(ctx: WorkerCtx) -> WorkerHandle {
    let (tx, mut rx) = mpsc::channel(WORKER_QUEUE_CAPACITY);

    let task = tokio::spawn(async move {
        debug!(conversation_id = %ctx.conversation_id, "worker started");
        while let Some(job) = rx.recv().await {
            match job {
                WorkerJob::Inbound { text, reply } => {
                    let result = process_inbound(&ctx, &text).await;
                    let _ = reply.send(result);
                }
                WorkerJob::Redeliver { reply } => {
                    let result = redeliver_prompt(&ctx).await;
                    let _ = reply.send(result);
                }
            }
        }
        debug!(conversation_id = %ctx.conversation_id, "worker stopped");
    });

    WorkerHandle { tx, task }
}

/// Process one inbound reply against the conversation's current state
async fn process_inbound(ctx: &WorkerCtx, text: &str) -> Result<Conversation, ConvoError> {
    debug!(conversation_id = %ctx.conversation_id, "process_inbound: called");
    let conversation = ctx.registry.get_conversation(&ctx.conversation_id).await?;
    if !conversation.is_active() {
        return Err(ConvoError::Closed(conversation.id));
    }

    let action = reply::classify(&conversation.state, text);
    debug!(conversation_id = %conversation.id, state = %conversation.state, ?action, "process_inbound: classified");

    match action {
        ReplyAction::Accept => {
            ctx.registry
                .apply_transition(&conversation.session_id, &ConfirmEvent::Accept)
                .await?;
            close_conversation(ctx, conversation, "confirmed", "closing-confirmed").await
        }

        ReplyAction::OpenDecisionMenu => {
            advance_conversation(ctx, conversation, ConvoState::WaitingDecisionChoice).await
        }

        ReplyAction::ChooseDecline => advance_conversation(ctx, conversation, ConvoState::WaitingDeclineReason).await,

        ReplyAction::ChooseReschedule => {
            advance_conversation(ctx, conversation, ConvoState::WaitingRescheduleReason).await
        }

        ReplyAction::Reason(reason) => match conversation.state {
            ConvoState::WaitingDeclineReason => {
                ctx.registry
                    .apply_transition(&conversation.session_id, &ConfirmEvent::Decline { reason })
                    .await?;
                close_conversation(ctx, conversation, "declined", "closing-declined").await
            }
            ConvoState::WaitingRescheduleReason => {
                ctx.registry
                    .apply_transition(&conversation.session_id, &ConfirmEvent::RequestReschedule { reason })
                    .await?;
                close_conversation(ctx, conversation, "reschedule_requested", "closing-reschedule").await
            }
            _ => reprompt(ctx, conversation).await,
        },

        ReplyAction::Unrecognized => reprompt(ctx, conversation).await,
    }
}

/// Move the dialogue to the next state, refresh expiry, and send the
/// prompt for that state
async fn advance_conversation(
    ctx: &WorkerCtx,
    mut conversation: Conversation,
    next: ConvoState,
) -> Result<Conversation, ConvoError> {
    debug!(conversation_id = %conversation.id, from = %conversation.state, to = %next, "advance_conversation: called");
    conversation.set_state(next);
    conversation.refresh_expiry(now_ms() + ctx.expiry_ms);

    let template_id = prompts::state_template(&conversation.state)
        .ok_or_else(|| ConvoError::Template(format!("no template for state {}", conversation.state)))?;
    let prompt = render_for(ctx, &conversation, template_id).await?;
    conversation.set_last_prompt(prompt.clone());

    let conversation = ctx.registry.update_conversation(conversation).await?;

    let _ = deliver(&ctx.gateway, &ctx.bus, &conversation, &prompt).await;

    Ok(conversation)
}

/// Close the dialogue after a final decision and send the closing message
async fn close_conversation(
    ctx: &WorkerCtx,
    mut conversation: Conversation,
    decision: &str,
    template_id: &str,
) -> Result<Conversation, ConvoError> {
    debug!(conversation_id = %conversation.id, decision, "close_conversation: called");
    conversation.set_state(ConvoState::Completed);

    let prompt = render_for(ctx, &conversation, template_id).await?;
    conversation.set_last_prompt(prompt.clone());

    let conversation = ctx.registry.update_conversation(conversation).await?;

    ctx.bus.emit(RosterEvent::ConversationCompleted {
        session_id: conversation.session_id.clone(),
        conversation_id: conversation.id.clone(),
        decision: decision.to_string(),
    });

    let _ = deliver(&ctx.gateway, &ctx.bus, &conversation, &prompt).await;

    Ok(conversation)
}

/// Re-ask the current question without advancing the dialogue.
/// Nothing is persisted: the canonical state prompt stays recorded for
/// re-delivery, and unrecognized input does not refresh expiry.
async fn reprompt(ctx: &WorkerCtx, conversation: Conversation) -> Result<Conversation, ConvoError> {
    debug!(conversation_id = %conversation.id, state = %conversation.state, "reprompt: called");
    let template_id = prompts::reprompt_template(&conversation.state)
        .ok_or_else(|| ConvoError::Template(format!("no reprompt for state {}", conversation.state)))?;
    let text = ctx
        .catalog
        .render(template_id, &HashMap::new())
        .map_err(|e| ConvoError::Template(e.to_string()))?;
    let prompt = OutboundPrompt {
        template_id: template_id.to_string(),
        variables: HashMap::new(),
        text,
    };

    let _ = deliver(&ctx.gateway, &ctx.bus, &conversation, &prompt).await;

    Ok(conversation)
}

/// Re-send the stored prompt bytes verbatim; state is not touched
async fn redeliver_prompt(ctx: &WorkerCtx) -> Result<Conversation, ConvoError> {
    debug!(conversation_id = %ctx.conversation_id, "redeliver_prompt: called");
    let conversation = ctx.registry.get_conversation(&ctx.conversation_id).await?;
    if !conversation.is_active() {
        return Err(ConvoError::Closed(conversation.id));
    }

    let prompt = conversation
        .last_prompt
        .clone()
        .ok_or_else(|| ConvoError::NoPromptRecorded(conversation.id.clone()))?;

    deliver(&ctx.gateway, &ctx.bus, &conversation, &prompt).await?;

    Ok(conversation)
}

/// Render a template with the session's current schedule details
async fn render_for(ctx: &WorkerCtx, conversation: &Conversation, template_id: &str) -> Result<OutboundPrompt, ConvoError> {
    let session = ctx.registry.get_session(&conversation.session_id).await?;
    let staff_name = conversation
        .metadata
        .get("staff_name")
        .cloned()
        .unwrap_or_else(|| conversation.staff_id.clone());

    let variables = prompt_variables(&session, &staff_name);
    let text = ctx
        .catalog
        .render(template_id, &variables)
        .map_err(|e| ConvoError::Template(e.to_string()))?;

    Ok(OutboundPrompt {
        template_id: template_id.to_string(),
        variables,
        text,
    })
}

/// Template variables shared by the dialogue prompts
fn prompt_variables(session: &Session, staff_name: &str) -> HashMap<String, String> {
    let mut variables = HashMap::new();
    variables.insert("staff_name".to_string(), staff_name.to_string());
    variables.insert("title".to_string(), session.title.clone());
    variables.insert("kind".to_string(), session.kind().label().to_string());
    variables.insert("date".to_string(), session.window.date.format("%d-%m-%Y").to_string());
    variables.insert("start".to_string(), session.window.start.format("%H:%M").to_string());
    variables.insert("end".to_string(), session.window.end_time().format("%H:%M").to_string());
    if let Some(room) = &session.resources.room {
        variables.insert("room".to_string(), room.clone());
    }
    variables
}

/// Send a prompt and emit the delivery outcome on the bus
async fn deliver(
    gateway: &Arc<dyn NotificationGateway>,
    bus: &Arc<EventBus>,
    conversation: &Conversation,
    prompt: &OutboundPrompt,
) -> Result<MessageId, GatewayError> {
    debug!(conversation_id = %conversation.id, template_id = %prompt.template_id, "deliver: called");
    match gateway.send(&conversation.phone, prompt).await {
        Ok(message_id) => {
            debug!(conversation_id = %conversation.id, %message_id, "deliver: sent");
            bus.emit(RosterEvent::PromptSent {
                session_id: conversation.session_id.clone(),
                conversation_id: conversation.id.clone(),
                template_id: prompt.template_id.clone(),
            });
            Ok(message_id)
        }
        Err(e) => {
            warn!(conversation_id = %conversation.id, error = %e, "prompt delivery failed");
            bus.emit(RosterEvent::PromptFailed {
                session_id: conversation.session_id.clone(),
                conversation_id: conversation.id.clone(),
                error: e.to_string(),
            });
            Err(e)
        }
    }
}
