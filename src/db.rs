use crate::statement::normalize_reference;
use crate::verifier::VerificationStatus;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// STORE ERRORS
// ============================================================================

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored data cannot be interpreted. Not recoverable by retrying.
    #[error("Corrupt submission log entry {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

// ============================================================================
// SUBMISSION
// ============================================================================

/// One claim plus its adjudicated outcome.
/// Append-only: never mutated after creation.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Submission {
    /// Stable identity (UUID v4)
    #[serde(default = "default_uuid")]
    pub id: String,

    pub timestamp: DateTime<Utc>,

    /// Reference as typed by the claimant (trimmed, case preserved)
    pub reference: String,

    /// Parsed amount; `None` when the input was not a number
    pub amount: Option<Decimal>,

    pub contact: String,

    #[serde(default)]
    pub address: String,

    pub status: VerificationStatus,

    pub message: String,
}

fn default_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Submission {
    /// Fingerprint of the exact claim (normalised reference + normalised amount).
    /// Audit only: reuse detection compares amounts within tolerance instead.
    pub fn claim_fingerprint(&self) -> String {
        compute_claim_fingerprint(&self.reference, self.amount)
    }

    pub fn is_verified(&self) -> bool {
        self.status == VerificationStatus::Verified
    }
}

pub fn compute_claim_fingerprint(reference: &str, amount: Option<Decimal>) -> String {
    let amount = amount.map_or_else(|| "-".to_string(), |a| a.normalize().to_string());

    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}", normalize_reference(reference), amount));
    format!("{:x}", hasher.finalize())
}

/// Event for audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

pub const EVENT_REFERENCE_FLAGGED: &str = "reference_flagged";
pub const ENTITY_REFERENCE: &str = "reference";

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }

    /// Reference moved to the blocklist after a verified claim was reused
    pub fn reference_flagged(submission: &Submission) -> Self {
        Event::new(
            EVENT_REFERENCE_FLAGGED,
            ENTITY_REFERENCE,
            &normalize_reference(&submission.reference),
            serde_json::json!({
                "submission_id": submission.id,
                "claim_fingerprint": submission.claim_fingerprint(),
                "reason": "reused",
            }),
            "claim_desk",
        )
    }
}

// ============================================================================
// SUBMISSION STORE
// ============================================================================

/// Typed repository for the submission log
pub trait SubmissionStore {
    /// All submissions in the order they were appended. Empty if none yet.
    fn load(&self) -> Result<Vec<Submission>, StoreError>;

    fn append(&mut self, submission: &Submission) -> Result<(), StoreError>;

    fn record_event(&mut self, _event: &Event) -> Result<(), StoreError> {
        Ok(())
    }

    /// Append a submission and its audit event: both are stored or neither is
    fn append_with_event(&mut self, submission: &Submission, event: &Event) -> Result<(), StoreError> {
        self.append(submission)?;
        self.record_event(event)
    }

    /// References blocklisted by earlier escalations
    fn flagged_references(&self) -> Result<Vec<String>, StoreError> {
        Ok(Vec::new())
    }
}

/// In-process store (tests, ephemeral runs)
#[derive(Debug, Default)]
pub struct MemorySubmissionStore {
    submissions: Vec<Submission>,
    events: Vec<Event>,
}

impl MemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }
}

impl SubmissionStore for MemorySubmissionStore {
    fn load(&self) -> Result<Vec<Submission>, StoreError> {
        Ok(self.submissions.clone())
    }

    fn append(&mut self, submission: &Submission) -> Result<(), StoreError> {
        self.submissions.push(submission.clone());
        Ok(())
    }

    fn record_event(&mut self, event: &Event) -> Result<(), StoreError> {
        self.events.push(event.clone());
        Ok(())
    }

    fn flagged_references(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .events
            .iter()
            .filter(|e| e.event_type == EVENT_REFERENCE_FLAGGED)
            .map(|e| e.entity_id.clone())
            .collect())
    }
}

/// SQLite-backed store (WAL journal)
pub struct SqliteSubmissionStore {
    conn: Connection,
}

impl SqliteSubmissionStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        debug!(path = ?path.as_ref(), "opened submission store");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        setup_database(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl SubmissionStore for SqliteSubmissionStore {
    fn load(&self) -> Result<Vec<Submission>, StoreError> {
        get_all_submissions(&self.conn)
    }

    fn append(&mut self, submission: &Submission) -> Result<(), StoreError> {
        insert_submission(&self.conn, submission)
    }

    fn record_event(&mut self, event: &Event) -> Result<(), StoreError> {
        insert_event(&self.conn, event)
    }

    fn append_with_event(&mut self, submission: &Submission, event: &Event) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        insert_submission(&tx, submission)?;
        insert_event(&tx, event)?;
        tx.commit()?;
        Ok(())
    }

    fn flagged_references(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT entity_id FROM events
             WHERE event_type = ?1 AND entity_type = ?2
             ORDER BY entity_id",
        )?;

        let references = stmt
            .query_map(params![EVENT_REFERENCE_FLAGGED, ENTITY_REFERENCE], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(references)
    }
}

pub fn setup_database(conn: &Connection) -> Result<(), StoreError> {
    // Enable WAL mode for crash recovery (in-memory databases report "memory")
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Submissions Table (append-only claim log)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS submissions (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            reference TEXT NOT NULL,
            amount TEXT,
            contact TEXT NOT NULL,
            address TEXT NOT NULL,
            status TEXT NOT NULL,
            message TEXT NOT NULL,
            claim_fingerprint TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_status ON submissions(status)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

pub fn insert_submission(conn: &Connection, submission: &Submission) -> Result<(), StoreError> {
    // Decimal text keeps the amount exact; NULL when unparsed
    let amount = submission.amount.map(|a| a.to_string());

    conn.execute(
        "INSERT INTO submissions (
            id, timestamp, reference, amount, contact, address,
            status, message, claim_fingerprint
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            submission.id,
            submission.timestamp.to_rfc3339(),
            submission.reference,
            amount,
            submission.contact,
            submission.address,
            submission.status.as_str(),
            submission.message,
            submission.claim_fingerprint(),
        ],
    )?;

    Ok(())
}

/// Raw row before status/timestamp are validated
struct SubmissionRow {
    id: String,
    timestamp: String,
    reference: String,
    amount: Option<String>,
    contact: String,
    address: String,
    status: String,
    message: String,
}

impl SubmissionRow {
    fn into_submission(self) -> Result<Submission, StoreError> {
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| StoreError::Corrupt {
                id: self.id.clone(),
                reason: format!("bad timestamp {:?}: {}", self.timestamp, e),
            })?
            .with_timezone(&Utc);

        let amount = match &self.amount {
            Some(text) => Some(text.parse::<Decimal>().map_err(|e| StoreError::Corrupt {
                id: self.id.clone(),
                reason: format!("bad amount {:?}: {}", text, e),
            })?),
            None => None,
        };

        let status = self
            .status
            .parse::<VerificationStatus>()
            .map_err(|reason| StoreError::Corrupt {
                id: self.id.clone(),
                reason,
            })?;

        Ok(Submission {
            id: self.id,
            timestamp,
            reference: self.reference,
            amount,
            contact: self.contact,
            address: self.address,
            status,
            message: self.message,
        })
    }
}

fn query_submissions(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<Submission>, StoreError> {
    let mut stmt = conn.prepare(sql)?;

    let rows = stmt
        .query_map(params, |row| {
            Ok(SubmissionRow {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                reference: row.get(2)?,
                amount: row.get(3)?,
                contact: row.get(4)?,
                address: row.get(5)?,
                status: row.get(6)?,
                message: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(SubmissionRow::into_submission).collect()
}

pub fn get_all_submissions(conn: &Connection) -> Result<Vec<Submission>, StoreError> {
    query_submissions(
        conn,
        "SELECT id, timestamp, reference, amount, contact, address, status, message
         FROM submissions
         ORDER BY seq",
        &[],
    )
}

/// Submissions for one reference (case-insensitive, trimmed)
pub fn get_submissions_by_reference(conn: &Connection, reference: &str) -> Result<Vec<Submission>, StoreError> {
    let normalized = normalize_reference(reference);
    query_submissions(
        conn,
        "SELECT id, timestamp, reference, amount, contact, address, status, message
         FROM submissions
         WHERE UPPER(TRIM(reference)) = ?1
         ORDER BY seq",
        &[&normalized as &dyn rusqlite::ToSql],
    )
}

/// Number of logged submissions
pub fn count_submissions(conn: &Connection) -> Result<i64, StoreError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM submissions", [], |row| row.get(0))?;
    Ok(count)
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<(), StoreError> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC",
    )?;

    let raw = stmt
        .query_map(params![entity_type, entity_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(event_id, timestamp, event_type, entity_type, entity_id, data, actor)| -> Result<Event, StoreError> {
            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|e| StoreError::Corrupt {
                    id: event_id.clone(),
                    reason: format!("bad event timestamp: {}", e),
                })?
                .with_timezone(&Utc);

            Ok(Event {
                event_id,
                timestamp,
                event_type,
                entity_type,
                entity_id,
                data: serde_json::from_str(&data)?,
                actor,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper function to create test submissions with all required fields
    fn create_test_submission(reference: &str, amount: &str, status: VerificationStatus) -> Submission {
        Submission {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            reference: reference.to_string(),
            amount: amount.parse().ok(),
            contact: "9876543210".to_string(),
            address: "42 Market Road".to_string(),
            status,
            message: format!("test {}", status),
        }
    }

    #[test]
    fn test_empty_store_loads_empty_log() {
        let store = SqliteSubmissionStore::open_in_memory().unwrap();

        assert!(store.load().unwrap().is_empty());
        assert_eq!(count_submissions(store.connection()).unwrap(), 0);
        assert!(store.flagged_references().unwrap().is_empty());
    }

    #[test]
    fn test_append_then_load_preserves_order() {
        let mut store = SqliteSubmissionStore::open_in_memory().unwrap();

        let first = create_test_submission("TXN001DEF", "500.00", VerificationStatus::Verified);
        let second = create_test_submission("UNKNOWN999", "50.00", VerificationStatus::NotFound);
        let third = create_test_submission("FAKE123", "1.00", VerificationStatus::Fraud);

        store.append(&first).unwrap();
        store.append(&second).unwrap();
        store.append(&third).unwrap();

        let loaded = store.load().unwrap();

        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].id, first.id);
        assert_eq!(loaded[1].status, VerificationStatus::NotFound);
        assert_eq!(loaded[2].reference, "FAKE123");
        assert_eq!(loaded[0].timestamp, first.timestamp);
        assert_eq!(count_submissions(store.connection()).unwrap(), 3);
    }

    #[test]
    fn test_amount_stored_exactly() {
        let mut store = SqliteSubmissionStore::open_in_memory().unwrap();

        let sub = create_test_submission("PAY789LMN", "299.0099", VerificationStatus::Verified);
        store.append(&sub).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded[0].amount, Some(Decimal::new(2990099, 4)));
        assert_eq!(loaded[0].amount.unwrap().to_string(), "299.0099");
    }

    #[test]
    fn test_missing_amount_round_trips() {
        let mut store = SqliteSubmissionStore::open_in_memory().unwrap();

        let sub = create_test_submission("PAY789LMN", "abc", VerificationStatus::NotFound);
        store.append(&sub).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded[0].amount, None);
    }

    #[test]
    fn test_missing_amount_json() {
        let sub = create_test_submission("PAY789LMN", "abc", VerificationStatus::NotFound);

        let json = serde_json::to_value(&sub).unwrap();
        assert!(json["amount"].is_null());
        assert_eq!(json["status"], "not-found");

        let back: Submission = serde_json::from_value(json).unwrap();
        assert_eq!(back.amount, None);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut store = SqliteSubmissionStore::open_in_memory().unwrap();
        let sub = create_test_submission("TXN001DEF", "500.00", VerificationStatus::Verified);

        store.append(&sub).unwrap();
        assert!(matches!(store.append(&sub), Err(StoreError::Database(_))));
    }

    #[test]
    fn test_corrupt_status_fails_loudly() {
        let store = SqliteSubmissionStore::open_in_memory().unwrap();

        store
            .connection()
            .execute(
                "INSERT INTO submissions (id, timestamp, reference, amount, contact, address, status, message, claim_fingerprint)
                 VALUES ('bad-1', ?1, 'X', '1.0', '', '', 'pending', '', '')",
                params![Utc::now().to_rfc3339()],
            )
            .unwrap();

        match store.load() {
            Err(StoreError::Corrupt { id, .. }) => assert_eq!(id, "bad-1"),
            other => panic!("expected corrupt error, got {:?}", other),
        }
    }

    #[test]
    fn test_corrupt_amount_fails_loudly() {
        let store = SqliteSubmissionStore::open_in_memory().unwrap();

        store
            .connection()
            .execute(
                "INSERT INTO submissions (id, timestamp, reference, amount, contact, address, status, message, claim_fingerprint)
                 VALUES ('bad-2', ?1, 'X', 'lots', '', '', 'verified', '', '')",
                params![Utc::now().to_rfc3339()],
            )
            .unwrap();

        assert!(matches!(store.load(), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_submissions_by_reference() {
        let mut store = SqliteSubmissionStore::open_in_memory().unwrap();

        store.append(&create_test_submission("txn001def", "500.00", VerificationStatus::Verified)).unwrap();
        store.append(&create_test_submission("TXN001DEF", "500.00", VerificationStatus::Fraud)).unwrap();
        store.append(&create_test_submission("UPI123ABC", "499.00", VerificationStatus::Verified)).unwrap();

        let found = get_submissions_by_reference(store.connection(), " Txn001Def ").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].status, VerificationStatus::Fraud);
    }

    #[test]
    fn test_claim_fingerprint() {
        let a = create_test_submission("pay789lmn", "299.00", VerificationStatus::Verified);
        let b = create_test_submission(" PAY789LMN ", "299", VerificationStatus::Fraud);
        let c = create_test_submission("PAY789LMN", "299.005", VerificationStatus::Verified);
        let d = create_test_submission("PAY789LMN", "", VerificationStatus::NotFound);

        assert_eq!(a.claim_fingerprint(), b.claim_fingerprint());
        assert_ne!(a.claim_fingerprint(), c.claim_fingerprint());
        assert_ne!(a.claim_fingerprint(), d.claim_fingerprint());
        assert_eq!(a.claim_fingerprint().len(), 64, "SHA-256 hash should be 64 hex characters");
    }

    #[test]
    fn test_event_log() {
        let mut store = SqliteSubmissionStore::open_in_memory().unwrap();
        let sub = create_test_submission("txn001def", "500.00", VerificationStatus::Fraud);

        store.record_event(&Event::reference_flagged(&sub)).unwrap();
        store.record_event(&Event::reference_flagged(&sub)).unwrap();

        let events = get_events_for_entity(store.connection(), ENTITY_REFERENCE, "TXN001DEF").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EVENT_REFERENCE_FLAGGED);
        assert_eq!(events[0].data["submission_id"], sub.id.as_str());

        assert_eq!(store.flagged_references().unwrap(), vec!["TXN001DEF".to_string()]);
    }

    #[test]
    fn test_append_with_event_commits_both() {
        let mut store = SqliteSubmissionStore::open_in_memory().unwrap();
        let sub = create_test_submission("TXN001DEF", "500.00", VerificationStatus::Fraud);

        store.append_with_event(&sub, &Event::reference_flagged(&sub)).unwrap();

        assert_eq!(count_submissions(store.connection()).unwrap(), 1);
        assert_eq!(store.flagged_references().unwrap(), vec!["TXN001DEF".to_string()]);
    }

    #[test]
    fn test_append_with_event_rolls_back_on_failure() {
        let mut store = SqliteSubmissionStore::open_in_memory().unwrap();
        let sub = create_test_submission("TXN001DEF", "500.00", VerificationStatus::Fraud);

        store.connection().execute("DROP TABLE events", []).unwrap();

        let result = store.append_with_event(&sub, &Event::reference_flagged(&sub));

        assert!(matches!(result, Err(StoreError::Database(_))));
        assert_eq!(count_submissions(store.connection()).unwrap(), 0);
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemorySubmissionStore::new();
        let sub = create_test_submission("FAKE123", "9", VerificationStatus::Fraud);

        store.append_with_event(&sub, &Event::reference_flagged(&sub)).unwrap();

        assert_eq!(store.load().unwrap(), vec![sub]);
        assert_eq!(store.events().len(), 1);
        assert_eq!(store.flagged_references().unwrap(), vec!["FAKE123".to_string()]);
    }
}
