//! Error types and the last-error channel
//!
//! Simple, flat error hierarchy. Two tiers:
//! - `NativeError`: recoverable failures of the native layer, parked in the
//!   heap's `ErrorChannel` while the failing call returns `None`
//! - `ContractViolation`: programmer errors, see [`crate::contract`]

use crate::contract::ContractViolation;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, XmlError>;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error(transparent)]
    Contract(#[from] ContractViolation),

    #[error("native failure: {0}")]
    Native(#[from] NativeError),
}

impl XmlError {
    pub fn as_contract(&self) -> Option<&ContractViolation> {
        match self {
            XmlError::Contract(violation) => Some(violation),
            XmlError::Native(_) => None,
        }
    }
}

/// Subsystem a native failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorDomain {
    Tree,
    Namespace,
    Parser,
}

/// A failure reported by the native layer
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{domain:?} error {code}: {message}")]
pub struct NativeError {
    pub domain: ErrorDomain,
    pub code: i32,
    pub message: String,
}

impl NativeError {
    pub const INVALID_NAME: i32 = 1;
    pub const RESERVED_PREFIX: i32 = 2;
    pub const PREFIX_REDEFINED: i32 = 3;
    pub const RESERVED_PI_TARGET: i32 = 4;

    pub fn new(domain: ErrorDomain, code: i32, message: impl Into<String>) -> Self {
        Self {
            domain,
            code,
            message: message.into(),
        }
    }
}

/// Single overwritten slot holding the most recent native failure.
///
/// Last write wins and nothing clears it on success, so it only means
/// something right after a call that reported failure.
#[derive(Debug, Default)]
pub struct ErrorChannel {
    last: RefCell<Option<NativeError>>,
}

impl ErrorChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a failure, replacing whatever was there
    pub fn record(&self, error: NativeError) {
        tracing::debug!(domain = ?error.domain, code = error.code, "native failure: {}", error.message);
        *self.last.borrow_mut() = Some(error);
    }

    pub fn last_error(&self) -> Option<NativeError> {
        self.last.borrow().clone()
    }

    pub fn clear(&self) {
        self.last.borrow_mut().take();
    }
}
