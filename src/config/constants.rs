/// Max turns loaded when a chat surface mounts
pub const HISTORY_LIMIT: usize = 50;

pub const LOG_FILE_PATH: &str = "/tmp/inkwell.log";

pub const LOG_LEVEL: &str = "info";

/// Assistant line shown when an exchange fails
pub const DELIVERY_FAILURE_REPLY: &str = "Sorry, I encountered an error. Please try again.";

pub const WEBHOOK_AUTH_HEADER: &str = "X-Webhook-Auth";

pub const REST_MESSAGES_PATH: &str = "/rest/v1/chat_messages";
