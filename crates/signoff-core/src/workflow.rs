use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::aggregate::AggregateStatus;
use crate::gate;
use crate::ledger::SignatureLedger;
use crate::model::{
    Actor, Document, DocumentFile, DocumentVersion, PersonId, Registration, Role, SignatureStatus,
};
use crate::notify::{self, LogNotifier, Notification, Notifier};
use crate::registry::{LocalRegistrar, Registrar};
use crate::store::{AuditAction, AuditEntry, SignatureStore, StoredVersion};
use crate::{Error, Result};

/// Actor id written to the audit log for engine-initiated steps
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerSlot {
    pub role: Role,
    #[serde(default)]
    pub approver_id: Option<PersonId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub title: String,
    pub file: DocumentFile,
    pub signers: Vec<SignerSlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replacement {
    pub file: DocumentFile,
    pub change_reason: String,
    #[serde(default)]
    pub final_grade: Option<f64>,
}

/// State of a version right after a committed transition
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub version: DocumentVersion,
    pub revision: i64,
    pub aggregate: AggregateStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration: Option<Registration>,
}

/// Runs sign-off transitions against a [`SignatureStore`].
///
/// Holds no per-document state. Each transition loads the version, checks
/// preconditions and writes back with the revision it read, so two racing
/// writers cannot both succeed.
pub struct Engine {
    pub(crate) store: Arc<dyn SignatureStore>,
    registrar: Arc<dyn Registrar>,
    notifier: Arc<dyn Notifier>,
    /// Receipts issued by the registrar that the store failed to record
    unrecorded: Mutex<HashMap<Uuid, Registration>>,
}

impl Engine {
    #[must_use]
    pub fn new(store: Arc<dyn SignatureStore>) -> Self {
        Self {
            store,
            registrar: Arc::new(LocalRegistrar),
            notifier: Arc::new(LogNotifier),
            unrecorded: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_registrar(mut self, registrar: Arc<dyn Registrar>) -> Self {
        self.registrar = registrar;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    #[tracing::instrument(skip_all, fields(actor = %actor.id, title = %submission.title))]
    pub async fn submit(&self, actor: &Actor, submission: Submission) -> Result<TransitionOutcome> {
        if submission.signers.is_empty() {
            return Err(Error::EmptySignerSet);
        }

        let mut ledger = SignatureLedger::new();
        for slot in submission.signers {
            ledger.add_signature(slot.role, slot.approver_id)?;
        }

        let document = Document::new(submission.title, actor.id.clone());
        let version = DocumentVersion::first(document.id, submission.file, ledger);
        let audit = AuditEntry::new(version.id, AuditAction::Submit, &actor.id)
            .with_detail(json!({ "document_id": document.id }));

        self.store
            .insert_submission(&document, &version, &audit)
            .await?;

        tracing::info!(document_id = %document.id, version_id = %version.id, "document submitted");

        Ok(outcome(version, 0, None))
    }

    #[tracing::instrument(skip(self, actor, justification), fields(actor = %actor.id))]
    pub async fn approve(
        &self,
        actor: &Actor,
        version_id: Uuid,
        signature_id: Uuid,
        justification: Option<String>,
    ) -> Result<TransitionOutcome> {
        let StoredVersion {
            mut version,
            revision,
        } = self.store.load_version(version_id).await?;
        ensure_current(&version, "evaluated")?;

        let before = version.aggregate_status();
        checked_gate(actor, &version, signature_id)?;

        version.signatures.set_status(
            signature_id,
            SignatureStatus::Approved,
            justification.clone(),
            Utc::now(),
        )?;

        let audit = AuditEntry::new(version_id, AuditAction::Approve, &actor.id).with_detail(
            json!({ "signature_id": signature_id, "justification": justification }),
        );
        let revision = self
            .store
            .save_signatures(version_id, version.signatures.as_slice(), revision, &audit)
            .await?;

        let after = version.aggregate_status();
        tracing::info!(%signature_id, aggregate = %after, "signature approved");

        let registration = if before != AggregateStatus::Approved
            && after == AggregateStatus::Approved
        {
            self.register(&mut version).await
        } else {
            None
        };

        Ok(outcome(version, revision, registration))
    }

    #[tracing::instrument(skip(self, actor, justification), fields(actor = %actor.id))]
    pub async fn reject(
        &self,
        actor: &Actor,
        version_id: Uuid,
        signature_id: Uuid,
        justification: String,
    ) -> Result<TransitionOutcome> {
        let StoredVersion {
            mut version,
            revision,
        } = self.store.load_version(version_id).await?;
        ensure_current(&version, "evaluated")?;

        let role = checked_gate(actor, &version, signature_id)?.role;
        let justification = non_empty(justification, "reject")?;

        version.signatures.set_status(
            signature_id,
            SignatureStatus::Rejected,
            Some(justification.clone()),
            Utc::now(),
        )?;

        let audit = AuditEntry::new(version_id, AuditAction::Reject, &actor.id).with_detail(
            json!({ "signature_id": signature_id, "justification": justification }),
        );
        let revision = self
            .store
            .save_signatures(version_id, version.signatures.as_slice(), revision, &audit)
            .await?;

        tracing::info!(%signature_id, "signature rejected");

        let mut recipients = counterparts(&version, &actor.id);
        match self.store.get_document(version.document_id).await {
            Ok(document) if document.author_id != actor.id => {
                recipients.insert(document.author_id);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    document_id = %version.document_id,
                    error = %e,
                    "author lookup failed, rejection notice goes to signers only"
                );
            }
        }
        notify::dispatch(
            Arc::clone(&self.notifier),
            Notification::Rejected {
                version_id,
                signature_id,
                rejected_by: actor.id.clone(),
                role,
                justification,
                recipients: recipients.into_iter().collect(),
            },
        );

        Ok(outcome(version, revision, None))
    }

    /// Puts a rejected signature back to pending and asks the rejecter to
    /// look again. The reason travels with the notification only.
    #[tracing::instrument(skip(self, actor, reason), fields(actor = %actor.id))]
    pub async fn request_reconsideration(
        &self,
        actor: &Actor,
        version_id: Uuid,
        signature_id: Uuid,
        reason: String,
    ) -> Result<TransitionOutcome> {
        let StoredVersion {
            mut version,
            revision,
        } = self.store.load_version(version_id).await?;
        ensure_current(&version, "reconsidered")?;

        let signature = version
            .signatures
            .get(signature_id)
            .ok_or(Error::SignatureNotFound(signature_id))?;
        if signature.status != SignatureStatus::Rejected {
            return Err(Error::NotRejected(signature_id));
        }
        let rejecter = signature.approver_id.clone();
        let previous_justification = signature.justification.clone();
        let reason = non_empty(reason, "request reconsideration")?;

        version
            .signatures
            .set_status(signature_id, SignatureStatus::Pending, None, Utc::now())?;

        let audit = AuditEntry::new(version_id, AuditAction::RequestReconsideration, &actor.id)
            .with_detail(json!({
                "signature_id": signature_id,
                "reason": reason,
                "previous_justification": previous_justification,
            }));
        let revision = self
            .store
            .save_signatures(version_id, version.signatures.as_slice(), revision, &audit)
            .await?;

        tracing::info!(%signature_id, aggregate = %version.aggregate_status(), "reconsideration requested");

        if let Some(recipient) = rejecter {
            notify::dispatch(
                Arc::clone(&self.notifier),
                Notification::ReconsiderationRequested {
                    version_id,
                    signature_id,
                    requested_by: actor.id.clone(),
                    recipient,
                    reason,
                },
            );
        }

        Ok(outcome(version, revision, None))
    }

    /// Supersedes a settled version with a new file and a fresh, fully
    /// pending signature set over the same role assignments.
    #[tracing::instrument(skip(self, actor, replacement), fields(actor = %actor.id))]
    pub async fn replace_with_new_version(
        &self,
        actor: &Actor,
        version_id: Uuid,
        replacement: Replacement,
    ) -> Result<TransitionOutcome> {
        let StoredVersion { version, revision } = self.store.load_version(version_id).await?;
        ensure_current(&version, "replaced")?;

        match version.aggregate_status() {
            AggregateStatus::Rejected | AggregateStatus::Approved => {}
            AggregateStatus::Pending => {
                return Err(Error::InvalidSourceState {
                    version_id,
                    state: AggregateStatus::Pending.to_string(),
                    action: "replaced",
                });
            }
        }

        let change_reason = non_empty(replacement.change_reason, "replace a version")?;
        let next = version.successor(replacement.file, change_reason.clone(), replacement.final_grade);

        let audit = AuditEntry::new(next.id, AuditAction::Replace, &actor.id).with_detail(json!({
            "previous_version_id": version_id,
            "previous_status": version.aggregate_status(),
            "change_reason": change_reason,
        }));
        self.store
            .replace_version(version_id, revision, &next, &audit)
            .await?;

        tracing::info!(new_version_id = %next.id, version = next.version, "version replaced");

        let recipients: Vec<PersonId> = next
            .signatures
            .iter()
            .filter_map(|s| s.approver_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        notify::dispatch(
            Arc::clone(&self.notifier),
            Notification::NewVersionSubmitted {
                version_id: next.id,
                previous_version_id: version_id,
                change_reason,
                recipients,
            },
        );

        Ok(outcome(next, 0, None))
    }

    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn assign_approver(
        &self,
        actor: &Actor,
        version_id: Uuid,
        signature_id: Uuid,
        approver_id: PersonId,
    ) -> Result<TransitionOutcome> {
        let StoredVersion {
            mut version,
            revision,
        } = self.store.load_version(version_id).await?;
        ensure_current(&version, "reassigned")?;

        if version.signatures.get(signature_id).is_none() {
            return Err(Error::SignatureNotFound(signature_id));
        }
        version
            .signatures
            .assign_approver(signature_id, approver_id.clone())?;

        let audit = AuditEntry::new(version_id, AuditAction::AssignApprover, &actor.id)
            .with_detail(json!({ "signature_id": signature_id, "approver_id": approver_id }));
        let revision = self
            .store
            .save_signatures(version_id, version.signatures.as_slice(), revision, &audit)
            .await?;

        Ok(outcome(version, revision, None))
    }

    /// Sends an on-demand reminder to a signer who has not acted yet.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn notify_approver(
        &self,
        actor: &Actor,
        version_id: Uuid,
        signature_id: Uuid,
    ) -> Result<()> {
        let StoredVersion { version, .. } = self.store.load_version(version_id).await?;
        ensure_current(&version, "reminded about")?;

        let signature = version
            .signatures
            .get(signature_id)
            .ok_or(Error::SignatureNotFound(signature_id))?;
        if signature.status != SignatureStatus::Pending {
            return Err(Error::InvalidTransition(format!(
                "signature {signature_id} is already {}",
                signature.status
            )));
        }
        let Some(recipient) = signature.approver_id.clone() else {
            return Err(Error::InvalidTransition(format!(
                "signature {signature_id} has no approver yet"
            )));
        };

        let audit = AuditEntry::new(version_id, AuditAction::NotifyApprover, &actor.id)
            .with_detail(json!({ "signature_id": signature_id, "recipient": recipient }));
        self.store.append_audit(&audit).await?;

        notify::dispatch(
            Arc::clone(&self.notifier),
            Notification::ApprovalReminder {
                version_id,
                signature_id,
                requested_by: actor.id.clone(),
                recipient,
            },
        );
        Ok(())
    }

    /// Registers an approved version whose registration previously failed.
    ///
    /// A receipt the registrar already issued is recorded as is, so the
    /// registrar is not asked twice for the same version.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn retry_registration(&self, actor: &Actor, version_id: Uuid) -> Result<Registration> {
        let StoredVersion { version, .. } = self.store.load_version(version_id).await?;

        let status = version.aggregate_status();
        if status != AggregateStatus::Approved {
            return Err(Error::InvalidSourceState {
                version_id,
                state: status.to_string(),
                action: "registered",
            });
        }
        if version.registration.is_some() {
            return Err(Error::InvalidTransition(format!(
                "version {version_id} is already registered"
            )));
        }

        let pending = self.unrecorded.lock().await.get(&version_id).cloned();
        let registration = match pending {
            Some(registration) => registration,
            None => {
                self.registrar
                    .register(version_id, version.signatures.as_slice())
                    .await?
            }
        };
        let audit = AuditEntry::new(version_id, AuditAction::Register, &actor.id)
            .with_detail(json!({ "receipt": registration.receipt }));
        if let Err(e) = self
            .store
            .record_registration(version_id, &registration, &audit)
            .await
        {
            self.unrecorded
                .lock()
                .await
                .insert(version_id, registration);
            return Err(e);
        }
        self.unrecorded.lock().await.remove(&version_id);

        tracing::info!(receipt = %registration.receipt, "version registered on retry");
        Ok(registration)
    }

    /// Registration follows a committed approval; a failure here leaves the
    /// approval in place and the version unregistered.
    async fn register(&self, version: &mut DocumentVersion) -> Option<Registration> {
        let registration = match self
            .registrar
            .register(version.id, version.signatures.as_slice())
            .await
        {
            Ok(registration) => registration,
            Err(e) => {
                tracing::warn!(version_id = %version.id, error = %e, "registration failed");
                return None;
            }
        };

        let audit = AuditEntry::new(version.id, AuditAction::Register, SYSTEM_ACTOR)
            .with_detail(json!({ "receipt": registration.receipt }));
        if let Err(e) = self
            .store
            .record_registration(version.id, &registration, &audit)
            .await
        {
            tracing::error!(
                version_id = %version.id,
                receipt = %registration.receipt,
                error = %e,
                "registration succeeded but could not be recorded"
            );
            self.unrecorded
                .lock()
                .await
                .insert(version.id, registration);
            return None;
        }

        tracing::info!(version_id = %version.id, receipt = %registration.receipt, "version registered");
        version.registration = Some(registration.clone());
        Some(registration)
    }
}

fn outcome(
    version: DocumentVersion,
    revision: i64,
    registration: Option<Registration>,
) -> TransitionOutcome {
    TransitionOutcome {
        aggregate: version.aggregate_status(),
        version,
        revision,
        registration,
    }
}

fn ensure_current(version: &DocumentVersion, action: &'static str) -> Result<()> {
    if version.is_current() {
        Ok(())
    } else {
        Err(Error::InvalidSourceState {
            version_id: version.id,
            state: "superseded".to_string(),
            action,
        })
    }
}

fn checked_gate<'a>(
    actor: &Actor,
    version: &'a DocumentVersion,
    signature_id: Uuid,
) -> Result<&'a crate::model::Signature> {
    gate::check(actor, version.signatures.as_slice(), signature_id).inspect_err(|e| {
        tracing::debug!(%signature_id, reason = e.code(), "evaluation refused");
    })
}

fn non_empty(text: String, action: &'static str) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(Error::MissingJustification(action))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Everyone else who signs this version.
fn counterparts(version: &DocumentVersion, person: &str) -> BTreeSet<PersonId> {
    version
        .signatures
        .iter()
        .filter_map(|s| s.approver_id.as_ref())
        .filter(|id| id.as_str() != person)
        .cloned()
        .collect()
}
