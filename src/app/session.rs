#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

use tokio::task::JoinHandle;

use crate::app::resolver::{ConversationResolver, Resolution};
use crate::app::services::exchange::{ExchangeOutcome, ExchangeRequest, ExchangeService};
use crate::backend::ArcBackend;
use crate::config::constants::{DELIVERY_FAILURE_REPLY, HISTORY_LIMIT};
use crate::models::{
    ArcEventTx, ChatMessage, Event, Role, SendRejected, SessionContext, SessionError,
    TranscriptEntry,
};
use crate::storage::ArcStore;
use crate::{notice_error, notice_info, notice_warning};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Loading,
    Ready,
    Sending,
}

/// What a view needs to draw a chat surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub transcript: Vec<TranscriptEntry>,
    pub is_sending: bool,
    pub state: SessionState,
    pub conversation_id: Option<String>,
}

struct InFlight {
    pending_id: String,
    handle: JoinHandle<Result<ExchangeOutcome, SessionError>>,
}

/// One mounted chat surface: its transcript, the conversation it continues
/// and at most one outstanding exchange.
pub struct Session {
    context: SessionContext,
    store: ArcStore,
    resolver: ConversationResolver,
    exchange: ExchangeService,
    event_tx: ArcEventTx,
    history_limit: usize,

    state: SessionState,
    transcript: Vec<TranscriptEntry>,
    conversation_id: Option<String>,
    in_flight: Option<InFlight>,
}

impl Session {
    pub fn new(
        context: SessionContext,
        store: ArcStore,
        backend: ArcBackend,
        event_tx: ArcEventTx,
    ) -> Self {
        Self {
            context,
            resolver: ConversationResolver::new(store.clone()),
            exchange: ExchangeService::new(store.clone(), backend),
            store,
            event_tx,
            history_limit: HISTORY_LIMIT,
            state: SessionState::Loading,
            transcript: Vec::new(),
            conversation_id: None,
            in_flight: None,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn is_sending(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            transcript: self.transcript.clone(),
            is_sending: self.is_sending(),
            state: self.state,
            conversation_id: self.conversation_id.clone(),
        }
    }

    /// Resolve the conversation to continue and load its history.
    ///
    /// Never fails: store errors leave a ready surface with an empty
    /// transcript.
    pub async fn mount(&mut self) {
        if self.is_sending() {
            log::warn!("Ignoring mount while an exchange is in flight");
            return;
        }
        self.state = SessionState::Loading;

        let Some(user_id) = self.context.user_id().map(|s| s.to_string()) else {
            log::warn!("Mounting a chat surface without a user, history is not loaded");
            self.load_transcript(Vec::new()).await;
            return;
        };

        let resolution = match self
            .resolver
            .resolve(
                &user_id,
                self.context.conversation_id(),
                self.conversation_id.as_deref(),
            )
            .await
        {
            Ok(resolution) => resolution,
            Err(err) => {
                log::error!("Failed to resolve conversation for {}: {}", user_id, err);
                Resolution::Fresh
            }
        };
        log::info!(
            "Conversation for {} resolved by {} rule: {}",
            user_id,
            resolution.rule(),
            resolution.conversation_id().unwrap_or("<none>")
        );
        self.set_conversation_id(resolution.conversation_id().map(|s| s.to_string()))
            .await;

        let transcript = match resolution.conversation_id() {
            Some(conversation_id) => match self
                .store
                .list_by_conversation(&user_id, conversation_id, self.history_limit)
                .await
            {
                Ok(messages) => messages.into_iter().map(TranscriptEntry::from).collect(),
                Err(err) => {
                    let err = SessionError::persistence(&err);
                    log::error!("Failed to load history of {}: {}", conversation_id, err);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        self.load_transcript(transcript).await;
    }

    /// Append the user turn optimistically and start the exchange in the
    /// background. Call `settle` to fold its outcome into the transcript.
    pub async fn send(&mut self, text: &str) -> Result<(), SendRejected> {
        if text.trim().is_empty() {
            return Err(SendRejected::EmptyMessage);
        }

        if self.is_sending() {
            return Err(SendRejected::Busy);
        }

        if self.context.user_id().is_none() {
            let err = SessionError::Configuration("please sign in to use the chat".to_string());
            log::warn!("Rejected send: {}", err);
            self.emit(notice_error!(err.to_string())).await;
            return Err(SendRejected::Configuration(err.to_string()));
        }

        let entry = TranscriptEntry::pending(Role::User, text);
        let pending_id = entry.local_id().to_string();
        self.transcript.push(entry.clone());
        self.emit(Event::EntryAppended(entry)).await;

        let conversation_id = self
            .context
            .conversation_id()
            .map(|s| s.to_string())
            .or_else(|| self.conversation_id.clone());
        let request = ExchangeRequest::new(text)
            .with_session(&self.context)
            .with_conversation_id(conversation_id);
        let exchange = self.exchange.clone();
        let handle = tokio::spawn(async move { exchange.send(request).await });

        self.in_flight = Some(InFlight { pending_id, handle });
        self.set_state(SessionState::Sending).await;
        Ok(())
    }

    /// Wait for the outstanding exchange and apply it. Returns `false` when
    /// nothing was in flight.
    ///
    /// Cancel safe: dropping the future leaves the exchange outstanding.
    pub async fn settle(&mut self) -> bool {
        let joined = match self.in_flight.as_mut() {
            Some(in_flight) => (&mut in_flight.handle).await,
            None => return false,
        };
        let Some(InFlight { pending_id, .. }) = self.in_flight.take() else {
            return false;
        };

        match joined {
            Ok(Ok(outcome)) => self.apply_outcome(&pending_id, outcome).await,
            Ok(Err(err)) => {
                log::error!("Exchange rejected: {}", err);
                self.settle_entry(&pending_id, None).await;
                self.emit(notice_error!(err.to_string())).await;
            }
            Err(err) => {
                log::error!("Exchange task failed: {}", err);
                self.settle_entry(&pending_id, None).await;
                self.push_entry(TranscriptEntry::local(
                    Role::Assistant,
                    DELIVERY_FAILURE_REPLY,
                ))
                .await;
            }
        }

        self.set_state(SessionState::Ready).await;
        true
    }

    /// Forget the current conversation so the next send starts a new one.
    ///
    /// A surface pinned to an explicit conversation stays on it.
    pub async fn start_new_conversation(&mut self) -> Result<(), SendRejected> {
        if self.is_sending() {
            return Err(SendRejected::Busy);
        }

        if let Some(pinned) = self.context.conversation_id() {
            let notice = format!("This chat is pinned to conversation {}", pinned);
            self.emit(notice_warning!(notice)).await;
            return Ok(());
        }

        self.transcript.clear();
        self.emit(Event::TranscriptCleared).await;
        self.set_conversation_id(None).await;
        self.emit(notice_info!("Started a new conversation")).await;
        Ok(())
    }

    /// Delete every stored turn of the current conversation and start over.
    /// A pinned surface keeps its explicit conversation id.
    pub async fn delete_conversation(&mut self) -> Result<(), SendRejected> {
        if self.is_sending() {
            return Err(SendRejected::Busy);
        }

        let (Some(user_id), Some(conversation_id)) = (
            self.context.user_id().map(|s| s.to_string()),
            self.conversation_id.clone(),
        ) else {
            self.emit(notice_info!("There is no conversation to delete"))
                .await;
            return Ok(());
        };

        let deleted = self
            .store
            .delete_conversation(&user_id, &conversation_id)
            .await;
        match deleted {
            Ok(count) => {
                log::info!("Deleted {} turns of {}", count, conversation_id);
                self.transcript.clear();
                self.emit(Event::TranscriptCleared).await;
                let pinned = self.context.conversation_id().map(|s| s.to_string());
                self.set_conversation_id(pinned).await;
                self.emit(notice_info!(format!("Deleted {} messages", count)))
                    .await;
            }
            Err(err) => {
                let err = SessionError::persistence(&err);
                log::error!("Failed to delete {}: {}", conversation_id, err);
                self.emit(notice_error!(format!(
                    "Failed to delete conversation: {}",
                    err
                )))
                .await;
            }
        }
        Ok(())
    }

    async fn apply_outcome(&mut self, pending_id: &str, outcome: ExchangeOutcome) {
        self.settle_entry(pending_id, outcome.user_message).await;
        self.set_conversation_id(Some(outcome.conversation_id)).await;

        let entry = match outcome.reply {
            Ok(reply) => match reply.message {
                Some(message) => TranscriptEntry::from(message),
                None => TranscriptEntry::local(Role::Assistant, reply.text),
            },
            Err(_) => TranscriptEntry::local(Role::Assistant, DELIVERY_FAILURE_REPLY),
        };
        self.push_entry(entry).await;
    }

    async fn load_transcript(&mut self, transcript: Vec<TranscriptEntry>) {
        self.transcript = transcript;
        self.emit(Event::HistoryLoaded(self.transcript.clone()))
            .await;
        self.state = SessionState::Ready;
    }

    async fn settle_entry(&mut self, local_id: &str, message: Option<ChatMessage>) {
        let Some(entry) = self
            .transcript
            .iter_mut()
            .find(|entry| entry.local_id() == local_id)
        else {
            log::warn!("Pending entry {} is no longer in the transcript", local_id);
            return;
        };
        entry.settle(message);
        let entry = entry.clone();
        self.emit(Event::EntryUpdated(entry)).await;
    }

    async fn push_entry(&mut self, entry: TranscriptEntry) {
        self.transcript.push(entry.clone());
        self.emit(Event::EntryAppended(entry)).await;
    }

    async fn set_conversation_id(&mut self, conversation_id: Option<String>) {
        if self.conversation_id == conversation_id {
            return;
        }
        self.conversation_id = conversation_id;
        self.emit(Event::ConversationChanged(self.conversation_id.clone()))
            .await;
    }

    async fn set_state(&mut self, state: SessionState) {
        let was_sending = self.state == SessionState::Sending;
        self.state = state;
        let sending = state == SessionState::Sending;
        if was_sending != sending {
            self.emit(Event::SendingChanged(sending)).await;
        }
    }

    async fn emit(&self, event: Event) {
        self.event_tx.send(event).await.unwrap_or_else(|err| {
            log::error!("Failed to publish session event: {}", err);
        });
    }
}
