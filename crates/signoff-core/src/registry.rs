use chrono::Utc;
use uuid::Uuid;

use crate::model::{Registration, Signature};
use crate::Result;

/// Records a fully approved version in the external ledger.
///
/// Called once per version, after the approval that completes it has been
/// committed. A receipt that could not be stored is reused by the engine on
/// retry; only a process restart in between can repeat a request for the
/// same version id.
#[async_trait::async_trait]
pub trait Registrar: Send + Sync {
    async fn register(&self, version_id: Uuid, signatures: &[Signature]) -> Result<Registration>;
}

/// Issues local receipts; for deployments without an external ledger
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalRegistrar;

#[async_trait::async_trait]
impl Registrar for LocalRegistrar {
    async fn register(&self, version_id: Uuid, signatures: &[Signature]) -> Result<Registration> {
        tracing::info!(
            %version_id,
            signatures = signatures.len(),
            "registering approved version locally"
        );
        Ok(Registration {
            receipt: format!("local-{}", Uuid::now_v7()),
            registered_at: Utc::now(),
        })
    }
}
