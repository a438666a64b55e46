//! Decides whether an actor may approve or reject a signature right now.

use uuid::Uuid;

use crate::model::{Actor, Role, Signature, SignatureStatus};
use crate::{Error, Result};

/// Checks that `actor` may evaluate `signature_id` given the current set.
///
/// The coordinator signs last: every signature held by someone else must be
/// approved, and no other signature may be rejected.
pub fn check<'a>(
    actor: &Actor,
    signatures: &'a [Signature],
    signature_id: Uuid,
) -> Result<&'a Signature> {
    let target = signatures
        .iter()
        .find(|s| s.id == signature_id)
        .ok_or(Error::SignatureNotFound(signature_id))?;

    if !target.is_held_by(&actor.id) || target.status != SignatureStatus::Pending {
        return Err(Error::NotAnAssignedSigner {
            actor: actor.id.clone(),
            signature_id,
        });
    }

    match target.role {
        Role::Coordinator => coordinator_may_sign(actor, signatures, target)?,
        Role::Advisor | Role::Admin | Role::Student => {}
    }

    Ok(target)
}

fn coordinator_may_sign(actor: &Actor, signatures: &[Signature], target: &Signature) -> Result<()> {
    if signatures
        .iter()
        .any(|s| s.id != target.id && s.status == SignatureStatus::Rejected)
    {
        return Err(Error::BlockedByExistingRejection);
    }

    let outstanding = signatures
        .iter()
        .filter(|s| !s.is_held_by(&actor.id) && s.status != SignatureStatus::Approved)
        .count();
    if outstanding > 0 {
        return Err(Error::WaitingOnOtherApprovals { outstanding });
    }

    Ok(())
}

/// The actor's own pending signatures, whether or not they may act yet.
#[must_use]
pub fn my_pending_approvals<'a>(actor: &Actor, signatures: &'a [Signature]) -> Vec<&'a Signature> {
    signatures
        .iter()
        .filter(|s| s.is_held_by(&actor.id) && s.status == SignatureStatus::Pending)
        .collect()
}

/// Signature ids the actor could approve or reject at this moment.
#[must_use]
pub fn evaluable(actor: &Actor, signatures: &[Signature]) -> Vec<Uuid> {
    my_pending_approvals(actor, signatures)
        .into_iter()
        .filter(|s| check(actor, signatures, s.id).is_ok())
        .map(|s| s.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(role: Role, who: &str, status: SignatureStatus) -> Signature {
        let mut s = Signature::new(role, Some(who.to_string()));
        s.status = status;
        s
    }

    #[test]
    fn stranger_is_not_an_assigned_signer() {
        let sigs = vec![sig(Role::Advisor, "ana", SignatureStatus::Pending)];
        let err = check(&Actor::new("eve"), &sigs, sigs[0].id).unwrap_err();
        assert!(matches!(err, Error::NotAnAssignedSigner { .. }));
    }

    #[test]
    fn already_signed_is_not_pending() {
        let sigs = vec![sig(Role::Advisor, "ana", SignatureStatus::Approved)];
        let err = check(&Actor::new("ana"), &sigs, sigs[0].id).unwrap_err();
        assert!(matches!(err, Error::NotAnAssignedSigner { .. }));
    }

    #[test]
    fn unknown_signature_id() {
        let sigs = vec![sig(Role::Advisor, "ana", SignatureStatus::Pending)];
        let err = check(&Actor::new("ana"), &sigs, Uuid::now_v7()).unwrap_err();
        assert!(matches!(err, Error::SignatureNotFound(_)));
    }

    #[test]
    fn advisor_may_sign_any_time() {
        let sigs = vec![
            sig(Role::Advisor, "ana", SignatureStatus::Pending),
            sig(Role::Admin, "root", SignatureStatus::Rejected),
            sig(Role::Coordinator, "carla", SignatureStatus::Pending),
        ];
        assert!(check(&Actor::new("ana"), &sigs, sigs[0].id).is_ok());
    }

    #[test]
    fn coordinator_waits_for_others() {
        let sigs = vec![
            sig(Role::Advisor, "ana", SignatureStatus::Pending),
            sig(Role::Coordinator, "carla", SignatureStatus::Pending),
        ];
        let err = check(&Actor::new("carla"), &sigs, sigs[1].id).unwrap_err();
        assert!(matches!(
            err,
            Error::WaitingOnOtherApprovals { outstanding: 1 }
        ));
    }

    #[test]
    fn coordinator_blocked_by_any_rejection() {
        for other in [Role::Advisor, Role::Admin, Role::Student] {
            let sigs = vec![
                sig(other, "someone", SignatureStatus::Rejected),
                sig(Role::Coordinator, "carla", SignatureStatus::Pending),
            ];
            let err = check(&Actor::new("carla"), &sigs, sigs[1].id).unwrap_err();
            assert!(matches!(err, Error::BlockedByExistingRejection));
        }
    }

    #[test]
    fn coordinator_blocked_by_own_advisor_rejection() {
        let sigs = vec![
            sig(Role::Advisor, "carla", SignatureStatus::Rejected),
            sig(Role::Coordinator, "carla", SignatureStatus::Pending),
        ];
        let err = check(&Actor::new("carla"), &sigs, sigs[1].id).unwrap_err();
        assert!(matches!(err, Error::BlockedByExistingRejection));
    }

    #[test]
    fn coordinator_who_advises_does_not_wait_on_self() {
        let sigs = vec![
            sig(Role::Advisor, "carla", SignatureStatus::Pending),
            sig(Role::Coordinator, "carla", SignatureStatus::Pending),
            sig(Role::Admin, "root", SignatureStatus::Approved),
        ];
        let actor = Actor::new("carla");
        assert!(check(&actor, &sigs, sigs[1].id).is_ok());
        assert_eq!(evaluable(&actor, &sigs).len(), 2);
    }

    #[test]
    fn unassigned_slot_keeps_coordinator_waiting() {
        let mut unassigned = Signature::new(Role::Admin, None);
        unassigned.status = SignatureStatus::Pending;
        let sigs = vec![
            unassigned,
            sig(Role::Coordinator, "carla", SignatureStatus::Pending),
        ];
        assert!(evaluable(&Actor::new("carla"), &sigs).is_empty());
        assert_eq!(my_pending_approvals(&Actor::new("carla"), &sigs).len(), 1);
    }
}
