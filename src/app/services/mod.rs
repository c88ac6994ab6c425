pub mod exchange;

pub use exchange::{AssistantReply, ExchangeOutcome, ExchangeRequest, ExchangeService};
