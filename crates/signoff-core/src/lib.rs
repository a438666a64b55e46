//! Approval workflow for academic documents that need sign-off from
//! several roles (advisor, coordinator, administrator).

pub mod aggregate;
pub mod error;
pub mod gate;
pub mod ledger;
pub mod model;
pub mod notify;
pub mod query;
pub mod registry;
pub mod resolution;
pub mod storage;
pub mod store;
pub mod workflow;

pub use aggregate::{AggregateStatus, AggregateView, Progress};
pub use error::{Error, Result};
pub use ledger::SignatureLedger;
pub use model::{
    Actor, Document, DocumentFile, DocumentStatus, DocumentVersion, PersonId, Registration, Role,
    Signature, SignatureStatus,
};
pub use notify::{LogNotifier, Notification, Notifier, WebhookNotifier};
pub use query::{DocumentSummary, VersionSummary};
pub use registry::{LocalRegistrar, Registrar};
pub use resolution::LogicalSigner;
pub use storage::Storage;
pub use store::{AuditAction, AuditEntry, SignatureStore, StoredVersion};
pub use workflow::{Engine, Replacement, SignerSlot, Submission, TransitionOutcome};
