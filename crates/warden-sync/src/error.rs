use thiserror::Error;

/// Error taxonomy for the sync engine (spec §7): `Config` is fatal at
/// startup, everything else either stays local to a task or is classified
/// by the lower-layer crate it was raised from.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid owner npub: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] warden_store::StoreError),

    #[error(transparent)]
    Net(#[from] warden_net::NetError),

    #[error(transparent)]
    Discovery(#[from] warden_discovery::DiscoveryError),

    #[error(transparent)]
    Reconcile(#[from] warden_reconcile::ReconcileError),

    #[error(transparent)]
    Retention(#[from] warden_retention::RetentionError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
