use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetentionError {
    #[error(transparent)]
    Store(#[from] warden_store::StoreError),
}

pub type Result<T> = std::result::Result<T, RetentionError>;
