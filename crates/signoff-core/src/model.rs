use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{self, AggregateStatus};
use crate::ledger::SignatureLedger;

/// Identifier of a person as issued by the external directory
pub type PersonId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Advisor,
    Coordinator,
    Admin,
    Student,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Advisor => "advisor",
            Self::Coordinator => "coordinator",
            Self::Admin => "admin",
            Self::Student => "student",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "advisor" => Ok(Self::Advisor),
            "coordinator" => Ok(Self::Coordinator),
            "admin" => Ok(Self::Admin),
            "student" => Ok(Self::Student),
            _ => Err(crate::Error::InvalidRole(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureStatus {
    Pending,
    Approved,
    Rejected,
}

impl SignatureStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for SignatureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SignatureStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(crate::Error::InvalidStatus(s.to_string())),
        }
    }
}

/// One signer's stance on one document version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub id: Uuid,
    pub role: Role,
    pub approver_id: Option<PersonId>,
    pub status: SignatureStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
    /// Time of the last status change; `None` while pending
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Signature {
    #[must_use]
    pub fn new(role: Role, approver_id: Option<PersonId>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role,
            approver_id,
            status: SignatureStatus::Pending,
            justification: None,
            timestamp: None,
        }
    }

    #[must_use]
    pub fn is_held_by(&self, person: &str) -> bool {
        self.approver_id.as_deref() == Some(person)
    }
}

/// The caller on whose behalf an operation runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: PersonId,
}

impl Actor {
    #[must_use]
    pub fn new(id: impl Into<PersonId>) -> Self {
        Self { id: id.into() }
    }
}

/// Reference to the stored artifact; content is handled elsewhere
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFile {
    pub name: String,
    pub location: String,
}

/// A document lineage; every submitted version belongs to one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub author_id: PersonId,
    pub created_at: DateTime<Utc>,
}

impl Document {
    #[must_use]
    pub fn new(title: String, author_id: PersonId) -> Self {
        Self {
            id: Uuid::now_v7(),
            title,
            author_id,
            created_at: Utc::now(),
        }
    }
}

/// Receipt returned by the registration collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub receipt: String,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub id: Uuid,
    pub document_id: Uuid,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub file: DocumentFile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_grade: Option<f64>,
    pub signatures: SignatureLedger,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration: Option<Registration>,
}

impl DocumentVersion {
    #[must_use]
    pub fn first(document_id: Uuid, file: DocumentFile, signatures: SignatureLedger) -> Self {
        Self {
            id: Uuid::now_v7(),
            document_id,
            version: 1,
            created_at: Utc::now(),
            file,
            change_reason: None,
            final_grade: None,
            signatures,
            superseded_at: None,
            registration: None,
        }
    }

    /// Next version in the same lineage, with every slot reset to pending
    #[must_use]
    pub fn successor(
        &self,
        file: DocumentFile,
        change_reason: String,
        final_grade: Option<f64>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            document_id: self.document_id,
            version: self.version + 1,
            created_at: Utc::now(),
            file,
            change_reason: Some(change_reason),
            final_grade,
            signatures: self.signatures.fresh_copy(),
            superseded_at: None,
            registration: None,
        }
    }

    #[must_use]
    pub fn is_current(&self) -> bool {
        self.superseded_at.is_none()
    }

    #[must_use]
    pub fn aggregate_status(&self) -> AggregateStatus {
        aggregate::aggregate_status(self.signatures.as_slice())
    }

    #[must_use]
    pub fn display_status(&self) -> DocumentStatus {
        if self.is_current() {
            self.aggregate_status().into()
        } else {
            DocumentStatus::Inactive
        }
    }

    #[must_use]
    pub fn has_signer(&self, person: &str) -> bool {
        self.signatures.iter().any(|s| s.is_held_by(person))
    }
}

/// Status shown for a version, including retirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Approved,
    Rejected,
    Inactive,
}

impl From<AggregateStatus> for DocumentStatus {
    fn from(status: AggregateStatus) -> Self {
        match status {
            AggregateStatus::Pending => Self::Pending,
            AggregateStatus::Approved => Self::Approved,
            AggregateStatus::Rejected => Self::Rejected,
        }
    }
}
