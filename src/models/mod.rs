pub mod backend;
pub mod context;
pub mod conversation;
pub mod error;
pub mod event;
pub mod message;
pub mod notice;
pub mod storage;

pub use backend::*;
pub use context::{Page, SessionContext};
pub use conversation::{Delivery, TranscriptEntry, mint_conversation_id};
pub use error::{DeliveryError, SendRejected, SessionError};
pub use event::{ArcEventTx, Event, EventTx};
pub use message::{ChatMessage, NewMessage, Role};
pub use notice::*;
