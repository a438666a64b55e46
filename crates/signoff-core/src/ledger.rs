use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{PersonId, Role, Signature, SignatureStatus};
use crate::{Error, Result};

/// Authoritative signature list of one document version.
///
/// Only structural checks live here. Who may change which slot, and when,
/// is decided by [`crate::gate`] and [`crate::workflow`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignatureLedger {
    signatures: Vec<Signature>,
}

impl SignatureLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_signatures(signatures: Vec<Signature>) -> Self {
        Self { signatures }
    }

    /// Adds a pending slot for `role`. Each role has at most one slot.
    pub fn add_signature(&mut self, role: Role, approver_id: Option<PersonId>) -> Result<Uuid> {
        if self.signatures.iter().any(|s| s.role == role) {
            return Err(Error::DuplicateRole(role));
        }
        let signature = Signature::new(role, approver_id);
        let id = signature.id;
        self.signatures.push(signature);
        Ok(id)
    }

    pub fn set_status(
        &mut self,
        signature_id: Uuid,
        status: SignatureStatus,
        justification: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let justification = justification.filter(|j| !j.trim().is_empty());
        if status == SignatureStatus::Rejected && justification.is_none() {
            return Err(Error::InvalidTransition(format!(
                "signature {signature_id} cannot be rejected without a justification"
            )));
        }

        let signature = self.get_mut(signature_id)?;
        signature.status = status;
        match status {
            SignatureStatus::Pending => {
                signature.justification = None;
                signature.timestamp = None;
            }
            SignatureStatus::Approved | SignatureStatus::Rejected => {
                signature.justification = justification;
                signature.timestamp = Some(at);
            }
        }
        Ok(())
    }

    /// Resolves the holder of a slot that was created without one.
    pub fn assign_approver(&mut self, signature_id: Uuid, approver_id: PersonId) -> Result<()> {
        let signature = self.get_mut(signature_id)?;
        if signature.approver_id.is_some() {
            return Err(Error::InvalidTransition(format!(
                "signature {signature_id} already has an approver"
            )));
        }
        if signature.status != SignatureStatus::Pending {
            return Err(Error::InvalidTransition(format!(
                "signature {signature_id} is {} and cannot be reassigned",
                signature.status
            )));
        }
        signature.approver_id = Some(approver_id);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, signature_id: Uuid) -> Option<&Signature> {
        self.signatures.iter().find(|s| s.id == signature_id)
    }

    fn get_mut(&mut self, signature_id: Uuid) -> Result<&mut Signature> {
        self.signatures
            .iter_mut()
            .find(|s| s.id == signature_id)
            .ok_or_else(|| {
                Error::InvalidTransition(format!("signature {signature_id} does not exist"))
            })
    }

    /// Same role assignments, new ids, every slot pending.
    #[must_use]
    pub fn fresh_copy(&self) -> Self {
        Self {
            signatures: self
                .signatures
                .iter()
                .map(|s| Signature::new(s.role, s.approver_id.clone()))
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Signature> {
        self.signatures.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Signature] {
        &self.signatures
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<Signature> {
        self.signatures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_role_slot_is_refused() {
        let mut ledger = SignatureLedger::new();
        ledger.add_signature(Role::Advisor, Some("ana".into())).unwrap();
        let err = ledger.add_signature(Role::Advisor, Some("bob".into())).unwrap_err();
        assert!(matches!(err, Error::DuplicateRole(Role::Advisor)));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn rejection_requires_justification() {
        let mut ledger = SignatureLedger::new();
        let id = ledger.add_signature(Role::Advisor, Some("ana".into())).unwrap();

        let err = ledger
            .set_status(id, SignatureStatus::Rejected, Some("   ".into()), Utc::now())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));
        assert_eq!(ledger.get(id).unwrap().status, SignatureStatus::Pending);

        ledger
            .set_status(id, SignatureStatus::Rejected, Some("no method".into()), Utc::now())
            .unwrap();
        let sig = ledger.get(id).unwrap();
        assert_eq!(sig.status, SignatureStatus::Rejected);
        assert_eq!(sig.justification.as_deref(), Some("no method"));
        assert!(sig.timestamp.is_some());
    }

    #[test]
    fn unknown_signature_is_invalid_transition() {
        let mut ledger = SignatureLedger::new();
        let err = ledger
            .set_status(Uuid::now_v7(), SignatureStatus::Approved, None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));
    }

    #[test]
    fn reset_to_pending_clears_justification_and_timestamp() {
        let mut ledger = SignatureLedger::new();
        let id = ledger.add_signature(Role::Admin, Some("root".into())).unwrap();
        ledger
            .set_status(id, SignatureStatus::Rejected, Some("format".into()), Utc::now())
            .unwrap();
        ledger
            .set_status(id, SignatureStatus::Pending, None, Utc::now())
            .unwrap();

        let sig = ledger.get(id).unwrap();
        assert_eq!(sig.status, SignatureStatus::Pending);
        assert!(sig.justification.is_none());
        assert!(sig.timestamp.is_none());
    }

    #[test]
    fn approver_assigned_only_once() {
        let mut ledger = SignatureLedger::new();
        let id = ledger.add_signature(Role::Coordinator, None).unwrap();
        ledger.assign_approver(id, "carla".into()).unwrap();
        assert!(ledger.get(id).unwrap().is_held_by("carla"));
        assert!(ledger.assign_approver(id, "dan".into()).is_err());
    }
}
