use thiserror::Error;

/// Errors classify as `unsupported-by-peer` (triggers fallback and
/// capability-cache downgrade) or `transport` (retried or bubbled), per
/// spec §4.8.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("peer does not support reconciliation: {0}")]
    UnsupportedByPeer(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Store(#[from] warden_store::StoreError),
}

impl From<warden_net::NetError> for ReconcileError {
    fn from(e: warden_net::NetError) -> Self {
        match e {
            warden_net::NetError::UnsupportedByPeer(m) => ReconcileError::UnsupportedByPeer(m),
            warden_net::NetError::Timeout | warden_net::NetError::Transport(_) => {
                ReconcileError::Transport(e.to_string())
            }
            other => ReconcileError::Protocol(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Permissive, case-insensitive substring match against a peer's NEG-ERR /
/// NOTICE message, deliberately erring toward fallback (spec §4.8).
const UNSUPPORTED_MARKERS: [&str; 4] = ["unsupported", "unknown message", "neg-err", "invalid"];

pub fn classify_peer_message(message: &str) -> ReconcileError {
    let lower = message.to_lowercase();
    if UNSUPPORTED_MARKERS.iter().any(|marker| lower.contains(marker)) {
        ReconcileError::UnsupportedByPeer(message.to_string())
    } else {
        ReconcileError::Transport(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_unsupported_markers() {
        assert!(matches!(
            classify_peer_message("unknown message: NEG-OPEN"),
            ReconcileError::UnsupportedByPeer(_)
        ));
        assert!(matches!(classify_peer_message("NEG-ERR: bad range"), ReconcileError::UnsupportedByPeer(_)));
    }

    #[test]
    fn falls_through_to_transport_for_unrelated_messages() {
        assert!(matches!(classify_peer_message("rate limited, slow down"), ReconcileError::Transport(_)));
    }
}
