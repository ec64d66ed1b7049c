// src/error.rs

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Relay error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Encoded message does not fit in a queue slot
    #[error("Encoded message is {len} bytes, limit is {max}")]
    Overflow { len: usize, max: usize },

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Every queue slot is occupied
    #[error("Outbound queue full")]
    QueueFull,

    /// Queue has no remaining producers or consumer
    #[error("Outbound queue closed")]
    QueueClosed,

    /// Message padded to a different slot size than the queue's
    #[error("Slot size mismatch: expected {expected}, got {actual}")]
    SlotSize { expected: usize, actual: usize },

    #[error("Transport initialization failed: {0}")]
    TransportInit(String),

    #[error("Peer registration failed: {0}")]
    PeerRegistration(String),

    #[error("Send failed: {0}")]
    Send(String),

    /// Background task could not be spawned
    #[error("Task spawn failed: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}
