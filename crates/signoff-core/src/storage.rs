use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite, SqliteConnection};
use uuid::Uuid;

use crate::{
    ledger::SignatureLedger,
    model::{Document, DocumentFile, DocumentVersion, Registration, Signature},
    store::{AuditEntry, SignatureStore, StoredVersion},
    Error, Result,
};

const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    author_id TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_author ON documents(author_id);

CREATE TABLE IF NOT EXISTS document_versions (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    version INTEGER NOT NULL,
    file_name TEXT NOT NULL,
    file_location TEXT NOT NULL,
    change_reason TEXT,
    final_grade REAL,
    created_at TEXT NOT NULL,
    superseded_at TEXT,
    superseded_by TEXT,
    revision INTEGER NOT NULL DEFAULT 0,
    registration_receipt TEXT,
    registered_at TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_versions_lineage ON document_versions(document_id, version);

CREATE TABLE IF NOT EXISTS signatures (
    id TEXT PRIMARY KEY,
    version_id TEXT NOT NULL REFERENCES document_versions(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    role TEXT NOT NULL,
    approver_id TEXT,
    status TEXT NOT NULL,
    justification TEXT,
    signed_at TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_signatures_slot ON signatures(version_id, role);
CREATE INDEX IF NOT EXISTS idx_signatures_approver ON signatures(approver_id);

CREATE TABLE IF NOT EXISTS audit_log (
    id TEXT PRIMARY KEY,
    version_id TEXT NOT NULL REFERENCES document_versions(id) ON DELETE CASCADE,
    action TEXT NOT NULL,
    actor_id TEXT NOT NULL,
    detail TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_version ON audit_log(version_id, created_at);
"#;

const VERSION_COLUMNS: &str = "id, document_id, version, file_name, file_location, change_reason, \
     final_grade, created_at, superseded_at, revision, registration_receipt, registered_at";

type VersionRow = (
    String,
    String,
    i64,
    String,
    String,
    Option<String>,
    Option<f64>,
    String,
    Option<String>,
    i64,
    Option<String>,
    Option<String>,
);

type SignatureRow = (
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
);

type AuditRow = (String, String, String, String, String, String);

pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn open(path: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!("sqlite:{path}?mode=rwc"))
            .await?;

        sqlx::query(INIT_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn open_memory() -> Result<Self> {
        // A single connection that never recycles, or the database vanishes.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        sqlx::query(INIT_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Waits for open connections to finish and refuses new ones.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn fetch_signatures(conn: &mut SqliteConnection, version_id: Uuid) -> Result<Vec<Signature>> {
        let rows: Vec<SignatureRow> = sqlx::query_as(
            r#"
            SELECT id, role, approver_id, status, justification, signed_at
            FROM signatures WHERE version_id = ? ORDER BY position
            "#,
        )
        .bind(version_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(parse_signature_row).collect()
    }

    async fn fetch_version(conn: &mut SqliteConnection, id: Uuid) -> Result<StoredVersion> {
        let row: VersionRow = sqlx::query_as(&format!(
            "SELECT {VERSION_COLUMNS} FROM document_versions WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(Error::VersionNotFound(id))?;

        let signatures = Self::fetch_signatures(conn, id).await?;
        parse_version_row(row, signatures)
    }

    async fn fetch_document(conn: &mut SqliteConnection, id: Uuid) -> Result<Document> {
        let row: (String, String, String, String) = sqlx::query_as(
            "SELECT id, title, author_id, created_at FROM documents WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(Error::DocumentNotFound(id))?;

        parse_document_row(row)
    }

    /// Distinguishes a missing version from a lost compare-and-swap.
    async fn cas_failure(conn: &mut SqliteConnection, id: Uuid) -> Error {
        let exists: std::result::Result<Option<(i64,)>, sqlx::Error> =
            sqlx::query_as("SELECT revision FROM document_versions WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&mut *conn)
                .await;

        match exists {
            Ok(Some(_)) => Error::ConflictRetry(id),
            Ok(None) => Error::VersionNotFound(id),
            Err(e) => Error::PersistenceUnavailable(e),
        }
    }
}

async fn insert_version(conn: &mut SqliteConnection, version: &DocumentVersion) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO document_versions
            (id, document_id, version, file_name, file_location, change_reason, final_grade, created_at, revision)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)
        "#,
    )
    .bind(version.id.to_string())
    .bind(version.document_id.to_string())
    .bind(i64::from(version.version))
    .bind(&version.file.name)
    .bind(&version.file.location)
    .bind(&version.change_reason)
    .bind(version.final_grade)
    .bind(version.created_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    for (position, sig) in version.signatures.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO signatures (id, version_id, position, role, approver_id, status, justification, signed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(sig.id.to_string())
        .bind(version.id.to_string())
        .bind(i64::try_from(position).unwrap_or(i64::MAX))
        .bind(sig.role.as_str())
        .bind(&sig.approver_id)
        .bind(sig.status.as_str())
        .bind(&sig.justification)
        .bind(sig.timestamp.map(|t| t.to_rfc3339()))
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

async fn insert_audit(conn: &mut SqliteConnection, entry: &AuditEntry) -> Result<()> {
    let detail = serde_json::to_string(&entry.detail)?;

    sqlx::query(
        r#"
        INSERT INTO audit_log (id, version_id, action, actor_id, detail, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.id.to_string())
    .bind(entry.version_id.to_string())
    .bind(entry.action.as_str())
    .bind(&entry.actor_id)
    .bind(detail)
    .bind(entry.created_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[async_trait::async_trait]
impl SignatureStore for Storage {
    async fn insert_submission(
        &self,
        document: &Document,
        version: &DocumentVersion,
        audit: &AuditEntry,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO documents (id, title, author_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(document.id.to_string())
        .bind(&document.title)
        .bind(&document.author_id)
        .bind(document.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        insert_version(&mut tx, version).await?;
        insert_audit(&mut tx, audit).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_document(&self, id: Uuid) -> Result<Document> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_document(&mut conn, id).await
    }

    async fn load_version(&self, id: Uuid) -> Result<StoredVersion> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_version(&mut conn, id).await
    }

    async fn save_signatures(
        &self,
        id: Uuid,
        signatures: &[Signature],
        expected_revision: i64,
        audit: &AuditEntry,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE document_versions SET revision = revision + 1
            WHERE id = ? AND revision = ? AND superseded_at IS NULL
            "#,
        )
        .bind(id.to_string())
        .bind(expected_revision)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::cas_failure(&mut tx, id).await);
        }

        for sig in signatures {
            let result = sqlx::query(
                r#"
                UPDATE signatures
                SET approver_id = ?, status = ?, justification = ?, signed_at = ?
                WHERE id = ? AND version_id = ?
                "#,
            )
            .bind(&sig.approver_id)
            .bind(sig.status.as_str())
            .bind(&sig.justification)
            .bind(sig.timestamp.map(|t| t.to_rfc3339()))
            .bind(sig.id.to_string())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(Error::SignatureNotFound(sig.id));
            }
        }

        insert_audit(&mut tx, audit).await?;
        tx.commit().await?;

        Ok(expected_revision + 1)
    }

    async fn replace_version(
        &self,
        old_id: Uuid,
        expected_revision: i64,
        new: &DocumentVersion,
        audit: &AuditEntry,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE document_versions
            SET superseded_at = ?, superseded_by = ?, revision = revision + 1
            WHERE id = ? AND revision = ? AND superseded_at IS NULL
            "#,
        )
        .bind(new.created_at.to_rfc3339())
        .bind(new.id.to_string())
        .bind(old_id.to_string())
        .bind(expected_revision)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::cas_failure(&mut tx, old_id).await);
        }

        insert_version(&mut tx, new).await.map_err(|e| match e {
            Error::PersistenceUnavailable(sqlx::Error::Database(ref db_err))
                if db_err.is_unique_violation() =>
            {
                Error::ConflictRetry(old_id)
            }
            other => other,
        })?;
        insert_audit(&mut tx, audit).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn record_registration(
        &self,
        id: Uuid,
        registration: &Registration,
        audit: &AuditEntry,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE document_versions SET registration_receipt = ?, registered_at = ?
            WHERE id = ? AND registration_receipt IS NULL
            "#,
        )
        .bind(&registration.receipt)
        .bind(registration.registered_at.to_rfc3339())
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(match Self::cas_failure(&mut tx, id).await {
                Error::ConflictRetry(_) => {
                    Error::InvalidTransition(format!("version {id} is already registered"))
                }
                other => other,
            });
        }

        insert_audit(&mut tx, audit).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_versions(&self, document_id: Uuid) -> Result<Vec<DocumentVersion>> {
        let mut conn = self.pool.acquire().await?;

        let rows: Vec<VersionRow> = sqlx::query_as(&format!(
            "SELECT {VERSION_COLUMNS} FROM document_versions WHERE document_id = ? ORDER BY version DESC"
        ))
        .bind(document_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

        if rows.is_empty() {
            // Distinguish an unknown lineage from one with no versions.
            Self::fetch_document(&mut conn, document_id).await?;
        }

        let mut versions = Vec::with_capacity(rows.len());
        for row in rows {
            let id = parse_uuid(&row.0)?;
            let signatures = Self::fetch_signatures(&mut conn, id).await?;
            versions.push(parse_version_row(row, signatures)?.version);
        }
        Ok(versions)
    }

    async fn list_current_for_person(
        &self,
        person: &str,
    ) -> Result<Vec<(Document, DocumentVersion)>> {
        let mut conn = self.pool.acquire().await?;

        let ids: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT DISTINCT v.id, v.document_id, v.created_at
            FROM document_versions v
            JOIN documents d ON d.id = v.document_id
            LEFT JOIN signatures s ON s.version_id = v.id
            WHERE v.superseded_at IS NULL AND (d.author_id = ? OR s.approver_id = ?)
            ORDER BY v.created_at DESC
            "#,
        )
        .bind(person)
        .bind(person)
        .fetch_all(&mut *conn)
        .await?;

        let mut out = Vec::with_capacity(ids.len());
        for (version_id, document_id, _) in ids {
            let document = Self::fetch_document(&mut conn, parse_uuid(&document_id)?).await?;
            let stored = Self::fetch_version(&mut conn, parse_uuid(&version_id)?).await?;
            out.push((document, stored.version));
        }
        Ok(out)
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        insert_audit(&mut conn, entry).await
    }

    async fn list_audit(&self, version_id: Uuid) -> Result<Vec<AuditEntry>> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            r#"
            SELECT id, version_id, action, actor_id, detail, created_at
            FROM audit_log WHERE version_id = ? ORDER BY created_at, id
            "#,
        )
        .bind(version_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_audit_row).collect()
    }
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    s.parse()
        .map_err(|_| Error::CorruptRecord(format!("invalid id {s}")))
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| Error::CorruptRecord(format!("invalid timestamp {s}")))
}

fn parse_document_row(row: (String, String, String, String)) -> Result<Document> {
    let (id, title, author_id, created_at) = row;

    Ok(Document {
        id: parse_uuid(&id)?,
        title,
        author_id,
        created_at: parse_time(&created_at)?,
    })
}

fn parse_signature_row(row: SignatureRow) -> Result<Signature> {
    let (id, role, approver_id, status, justification, signed_at) = row;

    Ok(Signature {
        id: parse_uuid(&id)?,
        role: role.parse()?,
        approver_id,
        status: status.parse()?,
        justification,
        timestamp: signed_at.as_deref().map(parse_time).transpose()?,
    })
}

fn parse_version_row(row: VersionRow, signatures: Vec<Signature>) -> Result<StoredVersion> {
    let (
        id,
        document_id,
        version,
        file_name,
        file_location,
        change_reason,
        final_grade,
        created_at,
        superseded_at,
        revision,
        registration_receipt,
        registered_at,
    ) = row;

    let registration = match (registration_receipt, registered_at) {
        (Some(receipt), Some(at)) => Some(Registration {
            receipt,
            registered_at: parse_time(&at)?,
        }),
        _ => None,
    };

    Ok(StoredVersion {
        version: DocumentVersion {
            id: parse_uuid(&id)?,
            document_id: parse_uuid(&document_id)?,
            version: u32::try_from(version)
                .map_err(|_| Error::CorruptRecord(format!("invalid version number {version}")))?,
            created_at: parse_time(&created_at)?,
            file: DocumentFile {
                name: file_name,
                location: file_location,
            },
            change_reason,
            final_grade,
            signatures: SignatureLedger::from_signatures(signatures),
            superseded_at: superseded_at.as_deref().map(parse_time).transpose()?,
            registration,
        },
        revision,
    })
}

fn parse_audit_row(row: AuditRow) -> Result<AuditEntry> {
    let (id, version_id, action, actor_id, detail, created_at) = row;

    Ok(AuditEntry {
        id: parse_uuid(&id)?,
        version_id: parse_uuid(&version_id)?,
        action: action.parse()?,
        actor_id,
        detail: serde_json::from_str(&detail)?,
        created_at: parse_time(&created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Role, SignatureStatus};
    use crate::store::AuditAction;

    fn submission() -> (Document, DocumentVersion) {
        let document = Document::new("On Graphs".to_string(), "stu".to_string());
        let mut ledger = SignatureLedger::new();
        ledger.add_signature(Role::Advisor, Some("ana".into())).unwrap();
        ledger.add_signature(Role::Coordinator, Some("carla".into())).unwrap();
        let version = DocumentVersion::first(
            document.id,
            DocumentFile {
                name: "thesis.pdf".to_string(),
                location: "store://1".to_string(),
            },
            ledger,
        );
        (document, version)
    }

    async fn seeded() -> (Storage, Document, DocumentVersion) {
        let storage = Storage::open_memory().await.unwrap();
        let (document, version) = submission();
        let audit = AuditEntry::new(version.id, AuditAction::Submit, "stu");
        storage
            .insert_submission(&document, &version, &audit)
            .await
            .unwrap();
        (storage, document, version)
    }

    #[tokio::test]
    async fn test_submission_roundtrip() {
        let (storage, document, version) = seeded().await;

        let stored = storage.load_version(version.id).await.unwrap();
        assert_eq!(stored.revision, 0);
        assert_eq!(stored.version, version);
        assert_eq!(storage.get_document(document.id).await.unwrap(), document);

        let audit = storage.list_audit(version.id).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, AuditAction::Submit);
    }

    #[tokio::test]
    async fn test_stale_revision_conflicts() {
        let (storage, _, version) = seeded().await;
        let mut sigs = version.signatures.clone();
        let advisor = sigs.as_slice()[0].id;
        sigs.set_status(advisor, SignatureStatus::Approved, None, Utc::now())
            .unwrap();
        let audit = AuditEntry::new(version.id, AuditAction::Approve, "ana");

        let rev = storage
            .save_signatures(version.id, sigs.as_slice(), 0, &audit)
            .await
            .unwrap();
        assert_eq!(rev, 1);

        let err = storage
            .save_signatures(version.id, sigs.as_slice(), 0, &audit)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConflictRetry(id) if id == version.id));

        let stored = storage.load_version(version.id).await.unwrap();
        assert_eq!(stored.revision, 1);
        assert_eq!(
            stored.version.signatures.get(advisor).unwrap().status,
            SignatureStatus::Approved
        );
    }

    #[tokio::test]
    async fn test_missing_version_is_not_a_conflict() {
        let storage = Storage::open_memory().await.unwrap();
        let audit = AuditEntry::new(Uuid::now_v7(), AuditAction::Approve, "ana");
        let err = storage
            .save_signatures(audit.version_id, &[], 0, &audit)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::VersionNotFound(_)));
    }

    #[tokio::test]
    async fn test_replace_supersedes_once() {
        let (storage, document, version) = seeded().await;
        let next = version.successor(
            DocumentFile {
                name: "thesis-v2.pdf".to_string(),
                location: "store://2".to_string(),
            },
            "fixed".to_string(),
            None,
        );
        let audit = AuditEntry::new(version.id, AuditAction::Replace, "stu");
        storage
            .replace_version(version.id, 0, &next, &audit)
            .await
            .unwrap();

        let old = storage.load_version(version.id).await.unwrap();
        assert!(!old.version.is_current());

        let again = version.successor(next.file.clone(), "again".to_string(), None);
        let err = storage
            .replace_version(version.id, 1, &again, &audit)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConflictRetry(_)));

        let versions = storage.list_versions(document.id).await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version, 2);

        let mine = storage.list_current_for_person("ana").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].1.id, next.id);
    }

    #[tokio::test]
    async fn test_registration_recorded_once() {
        let (storage, _, version) = seeded().await;
        let registration = Registration {
            receipt: "rcpt-1".to_string(),
            registered_at: Utc::now(),
        };
        let audit = AuditEntry::new(version.id, AuditAction::Register, "system");
        storage
            .record_registration(version.id, &registration, &audit)
            .await
            .unwrap();

        let err = storage
            .record_registration(version.id, &registration, &audit)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));

        let stored = storage.load_version(version.id).await.unwrap();
        assert_eq!(
            stored.version.registration.map(|r| r.receipt).as_deref(),
            Some("rcpt-1")
        );
    }
}
