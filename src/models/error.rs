use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

impl SessionError {
    pub fn persistence(err: &eyre::Report) -> Self {
        SessionError::Persistence(format!("{:#}", err))
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("webhook unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("webhook responded with status {code}: {body}")]
    Status { code: u16, body: String },

    #[error("webhook returned an unparseable body: {0}")]
    MalformedBody(String),

    #[error("webhook reply has no recognised reply field{}", .error.as_deref().map(|e| format!(" (error: {})", e)).unwrap_or_default())]
    UnrecognizedReply { error: Option<String> },
}

/// Why `Session::send` did not start an exchange.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendRejected {
    #[error("message is empty")]
    EmptyMessage,

    #[error("an exchange is already in flight")]
    Busy,

    #[error("{0}")]
    Configuration(String),
}
