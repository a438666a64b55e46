use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{PersonId, Role, Signature, SignatureStatus};

/// One person's merged view across every role they hold on a version.
///
/// Derived on demand from the raw signatures and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalSigner {
    pub approver_id: Option<PersonId>,
    pub roles: BTreeSet<Role>,
    pub signature_ids: Vec<Uuid>,
    pub status: SignatureStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl LogicalSigner {
    /// Roles to show in listings. A coordinator who also advises is shown
    /// only as coordinator; both signatures still count toward approval.
    #[must_use]
    pub fn display_roles(&self) -> Vec<Role> {
        let hide_advisor = self.roles.contains(&Role::Coordinator);
        self.roles
            .iter()
            .copied()
            .filter(|r| !(hide_advisor && *r == Role::Advisor))
            .collect()
    }

    #[must_use]
    pub fn holds(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

impl From<&Signature> for LogicalSigner {
    fn from(sig: &Signature) -> Self {
        Self {
            approver_id: sig.approver_id.clone(),
            roles: BTreeSet::from([sig.role]),
            signature_ids: vec![sig.id],
            status: sig.status,
            justification: sig.justification.clone(),
            timestamp: sig.timestamp,
        }
    }
}

/// Groups raw signatures by approver.
#[must_use]
pub fn resolve(signatures: &[Signature]) -> Vec<LogicalSigner> {
    merge(signatures.iter().map(LogicalSigner::from))
}

/// Merges signers that share an approver id, keeping first-seen order.
/// Unassigned signers are never merged with anything.
pub fn merge(signers: impl IntoIterator<Item = LogicalSigner>) -> Vec<LogicalSigner> {
    let mut groups: Vec<Vec<LogicalSigner>> = Vec::new();
    let mut by_person: HashMap<PersonId, usize> = HashMap::new();

    for signer in signers {
        match &signer.approver_id {
            Some(person) => {
                if let Some(&idx) = by_person.get(person) {
                    groups[idx].push(signer);
                } else {
                    by_person.insert(person.clone(), groups.len());
                    groups.push(vec![signer]);
                }
            }
            None => groups.push(vec![signer]),
        }
    }

    groups.into_iter().filter_map(combine).collect()
}

/// Finds the merged view of `person`, if they sign this version.
#[must_use]
pub fn signer_for<'a>(signers: &'a [LogicalSigner], person: &str) -> Option<&'a LogicalSigner> {
    signers
        .iter()
        .find(|s| s.approver_id.as_deref() == Some(person))
}

fn combine(mut group: Vec<LogicalSigner>) -> Option<LogicalSigner> {
    if group.len() <= 1 {
        return group.pop();
    }

    let roles: BTreeSet<Role> = group.iter().flat_map(|s| s.roles.iter().copied()).collect();
    let signature_ids: Vec<Uuid> = group
        .iter()
        .flat_map(|s| s.signature_ids.iter().copied())
        .collect();
    let approver_id = group[0].approver_id.clone();

    let decisive = latest_with(&group, SignatureStatus::Rejected)
        .or_else(|| group.iter().find(|s| s.status == SignatureStatus::Pending))
        .or_else(|| latest_with(&group, SignatureStatus::Approved))?;

    Some(LogicalSigner {
        approver_id,
        roles,
        signature_ids,
        status: decisive.status,
        justification: decisive.justification.clone(),
        timestamp: decisive.timestamp,
    })
}

fn latest_with(group: &[LogicalSigner], status: SignatureStatus) -> Option<&LogicalSigner> {
    group
        .iter()
        .filter(|s| s.status == status)
        .max_by_key(|s| s.timestamp)
}
