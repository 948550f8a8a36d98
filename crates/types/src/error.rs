use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid asset id: {0}")]
    InvalidAssetId(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}
