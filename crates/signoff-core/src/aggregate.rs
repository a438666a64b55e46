use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{DocumentStatus, DocumentVersion, Registration, Signature, SignatureStatus};
use crate::resolution::{self, LogicalSigner};

/// Overall state of a version, always derived from its raw signatures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateStatus {
    Pending,
    Approved,
    Rejected,
}

impl AggregateStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for AggregateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any rejection rejects the version; unanimity approves it.
#[must_use]
pub fn aggregate_status(signatures: &[Signature]) -> AggregateStatus {
    if signatures
        .iter()
        .any(|s| s.status == SignatureStatus::Rejected)
    {
        AggregateStatus::Rejected
    } else if signatures
        .iter()
        .all(|s| s.status == SignatureStatus::Approved)
    {
        AggregateStatus::Approved
    } else {
        AggregateStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub approved: usize,
    pub total: usize,
}

/// Counted over raw signatures, so a coordinator who also advises needs
/// two approvals.
#[must_use]
pub fn progress(signatures: &[Signature]) -> Progress {
    Progress {
        approved: signatures
            .iter()
            .filter(|s| s.status == SignatureStatus::Approved)
            .count(),
        total: signatures.len(),
    }
}

/// Everything a caller needs to render one version's sign-off state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateView {
    pub version_id: Uuid,
    pub status: AggregateStatus,
    pub display_status: DocumentStatus,
    pub approved_count: usize,
    pub total_count: usize,
    pub signers: Vec<LogicalSigner>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration: Option<Registration>,
}

impl AggregateView {
    #[must_use]
    pub fn of(version: &DocumentVersion) -> Self {
        let signatures = version.signatures.as_slice();
        let Progress { approved, total } = progress(signatures);
        Self {
            version_id: version.id,
            status: aggregate_status(signatures),
            display_status: version.display_status(),
            approved_count: approved,
            total_count: total,
            signers: resolution::resolve(signatures),
            registration: version.registration.clone(),
        }
    }
}
