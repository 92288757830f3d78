use thiserror::Error;

/// Error taxonomy for the relay transport (spec §7: Transport / Protocol /
/// Unsupported-feature / Cancelled).
#[derive(Debug, Error)]
pub enum NetError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    /// The remote relay does not implement the requested extension
    /// (reconciliation). Recoverable: callers downgrade the cached
    /// capability flag and fall back to a plain subscription.
    #[error("unsupported by peer: {0}")]
    UnsupportedByPeer(String),

    #[error("operation timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,
}

impl From<nostr_relay_pool::pool::Error> for NetError {
    fn from(e: nostr_relay_pool::pool::Error) -> Self {
        NetError::Transport(e.to_string())
    }
}

impl From<nostr_relay_pool::relay::Error> for NetError {
    fn from(e: nostr_relay_pool::relay::Error) -> Self {
        NetError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NetError>;
