use std::sync::Arc;

use tokio::sync::mpsc;

use super::{NoticeMessage, TranscriptEntry};

/// Changes published by a chat session for its view.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Notice(NoticeMessage),

    HistoryLoaded(Vec<TranscriptEntry>),
    EntryAppended(TranscriptEntry),
    EntryUpdated(TranscriptEntry),
    TranscriptCleared,

    SendingChanged(bool),
    ConversationChanged(Option<String>),
}

#[macro_export]
macro_rules! notice_info {
    ($msg:expr) => {
        $crate::models::Event::Notice($crate::models::NoticeMessage::info($msg))
    };
}

#[macro_export]
macro_rules! notice_warning {
    ($msg:expr) => {
        $crate::models::Event::Notice($crate::models::NoticeMessage::warning($msg))
    };
}

#[macro_export]
macro_rules! notice_error {
    ($msg:expr) => {
        $crate::models::Event::Notice($crate::models::NoticeMessage::error($msg))
    };
}

#[async_trait::async_trait]
pub trait EventTx {
    async fn send(&self, event: Event) -> Result<(), mpsc::error::SendError<Event>>;
}

#[async_trait::async_trait]
impl EventTx for mpsc::Sender<Event> {
    async fn send(&self, event: Event) -> Result<(), mpsc::error::SendError<Event>> {
        self.send(event).await
    }
}

#[async_trait::async_trait]
impl EventTx for mpsc::UnboundedSender<Event> {
    async fn send(&self, event: Event) -> Result<(), mpsc::error::SendError<Event>> {
        self.send(event)
    }
}

pub type ArcEventTx = Arc<dyn EventTx + Send + Sync>;
