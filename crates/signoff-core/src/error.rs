use thiserror::Error;
use uuid::Uuid;

use crate::model::{PersonId, Role};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{actor} has no pending signature {signature_id} on this document")]
    NotAnAssignedSigner {
        actor: PersonId,
        signature_id: Uuid,
    },

    #[error("Blocked by an existing rejection; it must be resolved first")]
    BlockedByExistingRejection,

    #[error("Waiting on other approvals ({outstanding} outstanding)")]
    WaitingOnOtherApprovals { outstanding: usize },

    #[error("Signature {0} is not rejected")]
    NotRejected(Uuid),

    #[error("Version {version_id} is {state} and cannot be {action}")]
    InvalidSourceState {
        version_id: Uuid,
        state: String,
        action: &'static str,
    },

    #[error("A justification is required to {0}")]
    MissingJustification(&'static str),

    #[error("Version {0} was modified concurrently; reload and retry")]
    ConflictRetry(Uuid),

    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(#[from] sqlx::Error),

    #[error("Notification failed: {0}")]
    NotificationFailed(String),

    #[error("Registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Role {0} already has a signature slot")]
    DuplicateRole(Role),

    #[error("A document needs at least one signer")]
    EmptySignerSet,

    #[error("Document not found: {0}")]
    DocumentNotFound(Uuid),

    #[error("Document version not found: {0}")]
    VersionNotFound(Uuid),

    #[error("Signature not found: {0}")]
    SignatureNotFound(Uuid),

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("Invalid signature status: {0}")]
    InvalidStatus(String),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Stable machine-readable name of the error class
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAnAssignedSigner { .. } => "not_an_assigned_signer",
            Self::BlockedByExistingRejection => "blocked_by_existing_rejection",
            Self::WaitingOnOtherApprovals { .. } => "waiting_on_other_approvals",
            Self::NotRejected(_) => "not_rejected",
            Self::InvalidSourceState { .. } => "invalid_source_state",
            Self::MissingJustification(_) => "missing_justification",
            Self::ConflictRetry(_) => "conflict_retry",
            Self::PersistenceUnavailable(_) => "persistence_unavailable",
            Self::NotificationFailed(_) => "notification_failed",
            Self::RegistrationFailed(_) => "registration_failed",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::DuplicateRole(_) => "duplicate_role",
            Self::EmptySignerSet => "empty_signer_set",
            Self::DocumentNotFound(_) => "document_not_found",
            Self::VersionNotFound(_) => "version_not_found",
            Self::SignatureNotFound(_) => "signature_not_found",
            Self::InvalidRole(_) => "invalid_role",
            Self::InvalidStatus(_) => "invalid_status",
            Self::CorruptRecord(_) => "corrupt_record",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Errors the caller can fix by changing the request or waiting on
    /// other signers. Shown to users verbatim.
    #[must_use]
    pub const fn is_caller_correctable(&self) -> bool {
        matches!(
            self,
            Self::NotAnAssignedSigner { .. }
                | Self::BlockedByExistingRejection
                | Self::WaitingOnOtherApprovals { .. }
                | Self::NotRejected(_)
                | Self::InvalidSourceState { .. }
                | Self::MissingJustification(_)
                | Self::InvalidTransition(_)
                | Self::DuplicateRole(_)
                | Self::EmptySignerSet
                | Self::InvalidRole(_)
                | Self::InvalidStatus(_)
        )
    }

    /// Safe to retry after reloading the version
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConflictRetry(_))
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::DocumentNotFound(_) | Self::VersionNotFound(_) | Self::SignatureNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
