/// Error type shared across the botlink crates.
///
/// Connection-level failures (`Connect`, `Transport`) are retryable and feed
/// the supervisor's backoff loop. `LinkAbandoned` is the only condition an
/// owning application should treat as unrecoverable. Per-frame verification
/// failures never reach this type; see [`crate::envelope::VerifyError`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("not connected")]
    NotConnected,

    #[error("link abandoned after {attempts} connect cycles at maximum backoff")]
    LinkAbandoned { attempts: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;
