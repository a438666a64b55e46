use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{self, AggregateStatus, AggregateView};
use crate::gate;
use crate::model::{Actor, Document, DocumentStatus, DocumentVersion, PersonId, SignatureStatus};
use crate::resolution;
use crate::store::AuditEntry;
use crate::workflow::Engine;
use crate::Result;

/// One row of an actor's document listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document_id: Uuid,
    pub version_id: Uuid,
    pub title: String,
    pub author_id: PersonId,
    pub version: u32,
    pub status: AggregateStatus,
    pub approved_count: usize,
    pub total_count: usize,
    /// The actor's merged stance, when they sign this version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_status: Option<SignatureStatus>,
    /// Signatures the actor could evaluate right now
    pub actionable: Vec<Uuid>,
}

impl DocumentSummary {
    fn build(actor: &Actor, document: &Document, version: &DocumentVersion) -> Self {
        let signatures = version.signatures.as_slice();
        let progress = aggregate::progress(signatures);
        let signers = resolution::resolve(signatures);
        Self {
            document_id: document.id,
            version_id: version.id,
            title: document.title.clone(),
            author_id: document.author_id.clone(),
            version: version.version,
            status: aggregate::aggregate_status(signatures),
            approved_count: progress.approved,
            total_count: progress.total,
            my_status: resolution::signer_for(&signers, &actor.id).map(|s| s.status),
            actionable: gate::evaluable(actor, signatures),
        }
    }

    /// A signer sees documents by their own stance; an author who does not
    /// sign sees them by overall status.
    fn in_tab(&self, tab: SignatureStatus) -> bool {
        match self.my_status {
            Some(mine) => mine == tab,
            None => matches!(
                (self.status, tab),
                (AggregateStatus::Pending, SignatureStatus::Pending)
                    | (AggregateStatus::Approved, SignatureStatus::Approved)
                    | (AggregateStatus::Rejected, SignatureStatus::Rejected)
            ),
        }
    }
}

/// One entry of a lineage's version history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub version_id: Uuid,
    pub version: u32,
    pub status: DocumentStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_reason: Option<String>,
    pub file_name: String,
}

impl From<&DocumentVersion> for VersionSummary {
    fn from(v: &DocumentVersion) -> Self {
        Self {
            version_id: v.id,
            version: v.version,
            status: v.display_status(),
            created_at: v.created_at,
            change_reason: v.change_reason.clone(),
            file_name: v.file.name.clone(),
        }
    }
}

impl Engine {
    pub async fn get_version(&self, version_id: Uuid) -> Result<DocumentVersion> {
        Ok(self.store.load_version(version_id).await?.version)
    }

    pub async fn get_aggregate(&self, version_id: Uuid) -> Result<AggregateView> {
        let version = self.get_version(version_id).await?;
        Ok(AggregateView::of(&version))
    }

    /// Current versions the actor signs or authored, filtered by tab.
    pub async fn list_by_status(
        &self,
        actor: &Actor,
        tab: SignatureStatus,
    ) -> Result<Vec<DocumentSummary>> {
        let rows = self.store.list_current_for_person(&actor.id).await?;
        Ok(rows
            .iter()
            .map(|(document, version)| DocumentSummary::build(actor, document, version))
            .filter(|summary| summary.in_tab(tab))
            .collect())
    }

    pub async fn list_versions(&self, document_id: Uuid) -> Result<Vec<VersionSummary>> {
        let versions = self.store.list_versions(document_id).await?;
        Ok(versions.iter().map(VersionSummary::from).collect())
    }

    pub async fn history(&self, version_id: Uuid) -> Result<Vec<AuditEntry>> {
        // Unknown ids fail here instead of returning an empty history.
        self.store.load_version(version_id).await?;
        self.store.list_audit(version_id).await
    }

    /// Signature ids the actor may approve or reject on this version now.
    pub async fn evaluable_signatures(&self, actor: &Actor, version_id: Uuid) -> Result<Vec<Uuid>> {
        let version = self.get_version(version_id).await?;
        if !version.is_current() {
            return Ok(Vec::new());
        }
        Ok(gate::evaluable(actor, version.signatures.as_slice()))
    }
}
