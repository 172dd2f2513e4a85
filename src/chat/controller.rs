//! Message lifecycle controller

use super::transition::{transition, Effect, MessageEvent};
use super::{ChatMessage, ChatSession, MessageStatus, Role, SentMessages};
use crate::error::SyncError;
use crate::gateway::{Command, CompletionStatus, Gateway, GatewayEvent, MessageId, SessionId};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

#[derive(Debug, Default)]
struct MessageTable {
    sessions: HashMap<SessionId, ChatSession>,
    messages: HashMap<MessageId, ChatMessage>,
    /// Last sequence number handed out per session
    sequences: HashMap<SessionId, u64>,
}

impl MessageTable {
    fn next_sequence(&mut self, session_id: &str) -> u64 {
        let counter = self.sequences.entry(session_id.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    fn insert_new(&mut self, session_id: &str, role: Role, content: String, status: MessageStatus) -> ChatMessage {
        let message = ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            role,
            content,
            sequence: self.next_sequence(session_id),
            status,
            created_at: Utc::now(),
        };
        self.messages.insert(message.id.clone(), message.clone());
        message
    }

    /// Move a message to a new id. Never overwrites a message tracked under
    /// the target id.
    fn rekey(&mut self, from: &str, to: &str) -> Rekey {
        if self.messages.contains_key(to) {
            return Rekey::Taken;
        }
        let Some(mut message) = self.messages.remove(from) else {
            return Rekey::Missing;
        };
        message.id = to.to_string();
        self.messages.insert(message.id.clone(), message.clone());
        Rekey::Moved(message)
    }
}

enum Rekey {
    Moved(ChatMessage),
    Missing,
    Taken,
}

/// Drives chat messages through the lifecycle as send intents and stream
/// events occur. Owns the message table; the lock is never held across a
/// gateway call.
pub struct MessageController<G> {
    gateway: Arc<G>,
    table: Mutex<MessageTable>,
    updates: broadcast::Sender<ChatMessage>,
}

impl<G: Gateway> MessageController<G> {
    pub fn new(gateway: Arc<G>, update_capacity: usize) -> Self {
        let (updates, _) = broadcast::channel(update_capacity.max(1));
        Self {
            gateway,
            table: Mutex::new(MessageTable::default()),
            updates,
        }
    }

    /// Receive a snapshot of every message after each applied change
    pub fn subscribe(&self) -> broadcast::Receiver<ChatMessage> {
        self.updates.subscribe()
    }

    // ==================== Sessions ====================

    /// Register a session. Re-opening keeps its messages and numbering.
    pub fn open_session(&self, session: ChatSession) {
        let mut table = self.lock();
        if !table.sessions.contains_key(&session.id) {
            tracing::info!(session_id = %session.id, recording_id = %session.recording_id, "Session opened");
            table.sessions.insert(session.id.clone(), session);
        }
    }

    pub fn session(&self, session_id: &str) -> Option<ChatSession> {
        self.lock().sessions.get(session_id).cloned()
    }

    /// Install history loaded from the backend. Numbering continues after the
    /// highest restored sequence.
    ///
    /// Messages already tracked are skipped so live state is never rolled
    /// back. The batch is rejected as a whole if it repeats an id or a
    /// sequence number, or reuses a sequence number a tracked message holds.
    pub fn restore_history(&self, session_id: &str, messages: Vec<ChatMessage>) -> Result<(), SyncError> {
        let mut table = self.lock();
        if !table.sessions.contains_key(session_id) {
            return Err(SyncError::validation(format!("unknown session {session_id}")));
        }
        if let Some(foreign) = messages.iter().find(|m| m.session_id != session_id) {
            return Err(SyncError::validation(format!(
                "message {} belongs to session {}",
                foreign.id, foreign.session_id
            )));
        }

        let (tracked, fresh): (Vec<_>, Vec<_>) = messages
            .into_iter()
            .partition(|m| table.messages.contains_key(&m.id));
        for message in &tracked {
            tracing::debug!(session_id, message_id = %message.id, "Skipping restored message already tracked");
        }

        let mut taken: HashSet<u64> = table
            .messages
            .values()
            .filter(|m| m.session_id == session_id)
            .map(|m| m.sequence)
            .collect();
        let mut ids = HashSet::new();
        for message in &fresh {
            if !ids.insert(message.id.as_str()) {
                return Err(SyncError::validation(format!(
                    "restored history repeats message {}",
                    message.id
                )));
            }
            if !taken.insert(message.sequence) {
                return Err(SyncError::validation(format!(
                    "restored message {} reuses sequence {}",
                    message.id, message.sequence
                )));
            }
        }

        let highest = fresh.iter().map(|m| m.sequence).max().unwrap_or(0);
        let counter = table.sequences.entry(session_id.to_string()).or_insert(0);
        *counter = (*counter).max(highest);
        let count = fresh.len();
        for message in fresh {
            table.messages.insert(message.id.clone(), message);
        }
        tracing::debug!(session_id, count, skipped = tracked.len(), "History restored");
        Ok(())
    }

    // ==================== Queries ====================

    pub fn message(&self, message_id: &str) -> Option<ChatMessage> {
        self.lock().messages.get(message_id).cloned()
    }

    /// Messages of a session ordered by sequence number
    pub fn messages(&self, session_id: &str) -> Vec<ChatMessage> {
        let mut messages: Vec<_> = self
            .lock()
            .messages
            .values()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.sequence);
        messages
    }

    pub fn all_messages(&self) -> Vec<ChatMessage> {
        let mut messages: Vec<_> = self.lock().messages.values().cloned().collect();
        messages.sort_by(|a, b| a.session_id.cmp(&b.session_id).then(a.sequence.cmp(&b.sequence)));
        messages
    }

    // ==================== Intents ====================

    /// Send user content to the assistant.
    ///
    /// The user message (complete) and the assistant placeholder (pending)
    /// are created together before the command is issued. Returns once the
    /// backend acknowledges the send, not when the reply finishes. If the
    /// send fails the assistant message goes straight to `error`.
    pub async fn send(&self, session_id: &str, content: &str) -> Result<SentMessages, SyncError> {
        if content.trim().is_empty() {
            return Err(SyncError::validation("message content is empty"));
        }

        let (recording_id, user, assistant) = {
            let mut table = self.lock();
            let recording_id = table
                .sessions
                .get(session_id)
                .map(|s| s.recording_id.clone())
                .ok_or_else(|| SyncError::validation(format!("unknown session {session_id}")))?;
            let user = table.insert_new(session_id, Role::User, content.to_string(), MessageStatus::Complete);
            let assistant = table.insert_new(session_id, Role::Assistant, String::new(), MessageStatus::Pending);
            (recording_id, user, assistant)
        };
        self.publish(user.clone());
        self.publish(assistant.clone());

        tracing::info!(
            session_id,
            user_message_id = %user.id,
            assistant_message_id = %assistant.id,
            "Sending chat message"
        );

        let command = Command::SendChat {
            recording_id,
            session_id: session_id.to_string(),
            user_message_id: user.id.clone(),
            assistant_message_id: assistant.id.clone(),
            content: content.to_string(),
        };
        let name = command.name();
        let acknowledged = match self.gateway.invoke(command).await {
            Ok(reply) => reply.into_sent(name),
            Err(e) => Err(e),
        };

        match acknowledged {
            Ok((user_id, assistant_id)) => Ok(SentMessages {
                user_message_id: self.adopt_id(&user.id, user_id),
                assistant_message_id: self.adopt_id(&assistant.id, assistant_id),
            }),
            Err(e) => {
                tracing::warn!(session_id, message_id = %assistant.id, error = %e, "Chat send failed");
                if let Err(stale) = self.apply(&assistant.id, MessageEvent::Fail {
                    error: Some(e.to_string()),
                }) {
                    tracing::debug!(error = %stale, "Assistant message settled before send failed");
                }
                Err(e.into())
            }
        }
    }

    /// Cancel a pending or streaming message, then tell the backend. Later
    /// events for the message are dropped. The message stays cancelled even
    /// if the backend call fails.
    pub async fn cancel(&self, message_id: &str) -> Result<(), SyncError> {
        let effects = self.apply(message_id, MessageEvent::Cancel)?;
        tracing::info!(message_id, "Message cancelled");

        for effect in effects {
            match effect {
                Effect::RequestCancel => {
                    let command = Command::CancelChat {
                        message_id: message_id.to_string(),
                    };
                    let name = command.name();
                    self.gateway.invoke(command).await?.into_ack(name)?;
                }
                Effect::AppendContent(_) => {}
            }
        }
        Ok(())
    }

    // ==================== Stream events ====================

    /// Append a streamed token. Unknown or terminal targets are left alone.
    pub fn apply_stream_token(&self, message_id: &str, token: &str) -> Result<(), SyncError> {
        self.apply(message_id, MessageEvent::Token(token.to_string()))
            .map(|_| ())
    }

    /// Finish a message. Duplicate or late completions are ignored.
    pub fn apply_complete(
        &self,
        message_id: &str,
        status: CompletionStatus,
        error: Option<String>,
    ) -> Result<(), SyncError> {
        let event = match status {
            CompletionStatus::Complete => MessageEvent::Complete,
            CompletionStatus::Error => MessageEvent::Fail { error },
        };
        self.apply(message_id, event).map(|_| ())
    }

    /// Dispatch a push event from the gateway
    pub fn handle_event(&self, event: GatewayEvent) -> Result<(), SyncError> {
        match event {
            GatewayEvent::Token {
                message_id,
                token,
                cumulative_content,
            } => {
                self.apply_stream_token(&message_id, &token)?;
                if let Some(expected) = cumulative_content {
                    self.check_cumulative(&message_id, &expected);
                }
                Ok(())
            }
            GatewayEvent::Complete {
                message_id,
                status,
                error,
                session_id: Some(session_id),
                content: Some(content),
            } if self.message(&message_id).is_none() => {
                self.adopt_completed(&session_id, message_id, content, status, error)
            }
            GatewayEvent::Complete {
                message_id,
                status,
                error,
                ..
            } => self.apply_complete(&message_id, status, error),
        }
    }

    /// Record an assistant message that finished without passing through this
    /// client. It enters the table already terminal.
    fn adopt_completed(
        &self,
        session_id: &str,
        message_id: MessageId,
        content: String,
        status: CompletionStatus,
        error: Option<String>,
    ) -> Result<(), SyncError> {
        let mut table = self.lock();
        if !table.sessions.contains_key(session_id) {
            tracing::debug!(session_id, message_id = %message_id, "Ignoring completion for unknown session");
            return Err(SyncError::unknown_message(message_id));
        }
        if table.messages.contains_key(&message_id) {
            // Tracked after all; treat as an ordinary completion
            drop(table);
            return self.apply_complete(&message_id, status, error);
        }

        let status = match status {
            CompletionStatus::Complete => MessageStatus::Complete,
            CompletionStatus::Error => MessageStatus::Error {
                message: error.unwrap_or_else(|| "generation failed without details".to_string()),
            },
        };
        let message = ChatMessage {
            id: message_id,
            session_id: session_id.to_string(),
            role: Role::Assistant,
            content,
            sequence: table.next_sequence(session_id),
            status,
            created_at: Utc::now(),
        };
        table.messages.insert(message.id.clone(), message.clone());
        drop(table);

        tracing::info!(session_id, message_id = %message.id, "Adopted completed message");
        self.publish(message);
        Ok(())
    }

    fn check_cumulative(&self, message_id: &str, expected: &str) {
        let table = self.lock();
        if let Some(message) = table.messages.get(message_id) {
            if message.content != expected {
                tracing::warn!(
                    message_id,
                    local_len = message.content.len(),
                    backend_len = expected.len(),
                    "Streamed content diverges from backend cumulative content"
                );
            }
        }
    }

    // ==================== Internals ====================

    /// Run one lifecycle transition under the lock and publish the result.
    /// Returns the effects that need I/O.
    fn apply(&self, message_id: &str, event: MessageEvent) -> Result<Vec<Effect>, SyncError> {
        let mut table = self.lock();
        let Some(message) = table.messages.get_mut(message_id) else {
            tracing::debug!(message_id, "Ignoring event for unknown message");
            return Err(SyncError::unknown_message(message_id));
        };

        let result = match transition(&message.status, event) {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(message_id, error = %e, "Ignoring event for settled message");
                return Err(SyncError::terminal_message(message_id, message.status.as_str()));
            }
        };

        let mut pending_io = Vec::new();
        for effect in result.effects {
            match effect {
                Effect::AppendContent(token) => message.content.push_str(&token),
                Effect::RequestCancel => pending_io.push(Effect::RequestCancel),
            }
        }
        if message.status != result.new_status {
            tracing::debug!(
                message_id,
                from = message.status.as_str(),
                to = result.new_status.as_str(),
                "Message status changed"
            );
        }
        message.status = result.new_status;
        let snapshot = message.clone();
        drop(table);

        self.publish(snapshot);
        Ok(pending_io)
    }

    /// Adopt the backend's id for a message when it differs from ours.
    /// Returns the id the message is tracked under afterwards.
    fn adopt_id(&self, local: &str, backend: MessageId) -> MessageId {
        if backend == local {
            return backend;
        }
        tracing::warn!(local_id = local, backend_id = %backend, "Backend assigned a different message id");
        let outcome = self.lock().rekey(local, &backend);
        match outcome {
            Rekey::Moved(message) => {
                self.publish(message);
                backend
            }
            Rekey::Missing => backend,
            Rekey::Taken => {
                tracing::warn!(
                    local_id = local,
                    backend_id = %backend,
                    "Backend id already names another message, keeping local id"
                );
                local.to_string()
            }
        }
    }

    fn publish(&self, message: ChatMessage) {
        // No subscribers is fine
        let _ = self.updates.send(message);
    }

    fn lock(&self) -> MutexGuard<'_, MessageTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
