pub mod app;
pub mod commands;
pub mod resolver;
pub mod services;
pub mod session;

pub use app::App;
pub use resolver::{ConversationResolver, Resolution};
pub use session::{Session, SessionSnapshot, SessionState};
