use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Document, DocumentVersion, PersonId, Registration, Signature};
use crate::Result;

/// A version as loaded, with the revision used for the next compare-and-swap
#[derive(Debug, Clone)]
pub struct StoredVersion {
    pub version: DocumentVersion,
    pub revision: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Submit,
    Approve,
    Reject,
    RequestReconsideration,
    Replace,
    AssignApprover,
    NotifyApprover,
    Register,
}

impl AuditAction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::RequestReconsideration => "request_reconsideration",
            Self::Replace => "replace",
            Self::AssignApprover => "assign_approver",
            Self::NotifyApprover => "notify_approver",
            Self::Register => "register",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditAction {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "submit" => Ok(Self::Submit),
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            "request_reconsideration" => Ok(Self::RequestReconsideration),
            "replace" => Ok(Self::Replace),
            "assign_approver" => Ok(Self::AssignApprover),
            "notify_approver" => Ok(Self::NotifyApprover),
            "register" => Ok(Self::Register),
            _ => Err(crate::Error::CorruptRecord(format!("unknown audit action {s}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub version_id: Uuid,
    pub action: AuditAction,
    pub actor_id: PersonId,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    #[must_use]
    pub fn new(version_id: Uuid, action: AuditAction, actor_id: &str) -> Self {
        Self {
            id: Uuid::now_v7(),
            version_id,
            action,
            actor_id: actor_id.to_string(),
            detail: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Durable home of documents, versions and their signatures.
///
/// Every write that changes signatures or supersedes a version is a single
/// transaction guarded by the version's revision. A stale revision fails
/// with [`crate::Error::ConflictRetry`] and writes nothing.
#[async_trait::async_trait]
pub trait SignatureStore: Send + Sync {
    async fn insert_submission(
        &self,
        document: &Document,
        version: &DocumentVersion,
        audit: &AuditEntry,
    ) -> Result<()>;

    async fn get_document(&self, id: Uuid) -> Result<Document>;

    async fn load_version(&self, id: Uuid) -> Result<StoredVersion>;

    async fn load_signatures(&self, id: Uuid) -> Result<Vec<Signature>> {
        Ok(self.load_version(id).await?.version.signatures.into_inner())
    }

    /// Writes the signature set and returns the new revision.
    async fn save_signatures(
        &self,
        id: Uuid,
        signatures: &[Signature],
        expected_revision: i64,
        audit: &AuditEntry,
    ) -> Result<i64>;

    /// Supersedes `old_id` and inserts `new` in one step.
    async fn replace_version(
        &self,
        old_id: Uuid,
        expected_revision: i64,
        new: &DocumentVersion,
        audit: &AuditEntry,
    ) -> Result<()>;

    /// Records a registration receipt. A version is registered at most once.
    async fn record_registration(
        &self,
        id: Uuid,
        registration: &Registration,
        audit: &AuditEntry,
    ) -> Result<()>;

    /// All versions of a lineage, newest first.
    async fn list_versions(&self, document_id: Uuid) -> Result<Vec<DocumentVersion>>;

    /// Current versions the person authored or signs.
    async fn list_current_for_person(
        &self,
        person: &str,
    ) -> Result<Vec<(Document, DocumentVersion)>>;

    async fn append_audit(&self, entry: &AuditEntry) -> Result<()>;

    async fn list_audit(&self, version_id: Uuid) -> Result<Vec<AuditEntry>>;
}
