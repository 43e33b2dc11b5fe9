//! Dispatch error types

use thiserror::Error;

use super::route::Route;
use crate::error::ItemError;
use crate::hub::MonitorError;
use crate::protocol::{ErrorCode, InteractionModel};
use crate::store::StoreError;

/// Error type for routed requests
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No handler is registered under this name
    #[error("no handler for route '{0}'")]
    UnknownRoute(String),

    /// Route exists but was called with the wrong interaction model
    #[error("route {route} expects {expected}, got {actual}")]
    InteractionMismatch {
        route: Route,
        expected: InteractionModel,
        actual: InteractionModel,
    },

    /// Payload failed validation before reaching the store
    #[error("malformed item: {0}")]
    Malformed(#[from] ItemError),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Overflow(#[from] MonitorError),
}

impl DispatchError {
    /// Wire error code for this failure
    pub fn error_code(&self) -> ErrorCode {
        match self {
            DispatchError::UnknownRoute(_)
            | DispatchError::InteractionMismatch { .. }
            | DispatchError::Malformed(_) => ErrorCode::Invalid,
            DispatchError::Storage(_) => ErrorCode::ApplicationError,
            DispatchError::Overflow(_) => ErrorCode::Rejected,
        }
    }
}
