use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("invalid npub: {0}")]
    InvalidNpub(String),

    #[error("bootstrap failed: no seed relay yielded a usable response")]
    BootstrapFailed,

    #[error(transparent)]
    Net(#[from] warden_net::NetError),

    #[error(transparent)]
    Store(#[from] warden_store::StoreError),
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
