//! Bridge error types.

use lunaris_core::CodecError;
use thiserror::Error;

use crate::value::ValueType;

/// Errors surfaced by the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The value has no live owning instance, or the instance was destroyed.
    #[error("value is not owned by a live Lua state")]
    NotOwned,

    /// A strict accessor was used on the wrong variant.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: ValueType,
        found: ValueType,
    },

    /// The interpreter raised an error during a call, load or resume.
    #[error("{0}")]
    Runtime(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A value produced by one instance was handed to another.
    #[error("value belongs to a different Lua state")]
    OwnershipConflict,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub(crate) fn runtime(msg: impl Into<String>) -> Self {
        BridgeError::Runtime(msg.into())
    }
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
