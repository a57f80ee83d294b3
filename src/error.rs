use thiserror::Error;

use crate::monitor::service::ServiceId;
use crate::store::StoreError;

/// Errors surfaced by the roster API to the view / CLI layer.
#[derive(Error, Debug)]
pub enum HeraldError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Invalid name: {0}")]
    InvalidName(String),
    #[error("Service not found: {0}")]
    NotFound(ServiceId),
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),
}
