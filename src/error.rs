use thiserror::Error;

use crate::storage::Tier;

/// Errors surfaced by the storage core.
///
/// Every variant is recoverable by the caller. The UI layer is expected to turn
/// these into a transient notice and keep working on its in-memory copy.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing tier could not be reached or failed an I/O operation.
    #[error("{tier} storage unavailable: {reason}")]
    StorageUnavailable { tier: Tier, reason: String },

    /// A write was rejected because it would exceed the tier's quota.
    #[error("{tier} storage quota exceeded: {needed} bytes needed, limit is {limit}")]
    QuotaExceeded {
        tier: Tier,
        needed: usize,
        limit: usize,
    },

    /// A legacy key exists but is not list/object shaped.
    #[error("malformed legacy data under {tier}:{key}")]
    MalformedLegacyData { tier: Tier, key: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Caller input rejected before touching storage.
    #[error("invalid input: {0}")]
    Validation(String),

    /// A reject-when-full collection is already at its cap.
    #[error("{kind} collection is full (max {max})")]
    CapacityReached { kind: &'static str, max: usize },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },
}

impl StoreError {
    pub fn unavailable(tier: Tier, reason: impl Into<String>) -> Self {
        StoreError::StorageUnavailable {
            tier,
            reason: reason.into(),
        }
    }

    /// True for failures that came from the backing store rather than the caller.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            StoreError::StorageUnavailable { .. } | StoreError::QuotaExceeded { .. }
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
