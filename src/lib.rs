// Payment Claim Verifier - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod dashboard;
pub mod db;
pub mod intake;
pub mod statement;
pub mod verifier;

// Re-export commonly used types
pub use config::{AppConfig, ConfigError};
pub use dashboard::{format_amount, format_timestamp, DashboardSummary, VerifiedRow};
pub use db::{
    count_submissions, get_events_for_entity, get_submissions_by_reference, Event,
    MemorySubmissionStore, SqliteSubmissionStore, StoreError, Submission, SubmissionStore,
    ENTITY_REFERENCE,
};
pub use intake::{parse_amount, ClaimDesk, ClaimForm, ClaimReceipt};
pub use statement::{normalize_reference, within_tolerance, FraudSet, Statement, StatementEntry};
pub use verifier::{
    ClaimVerifier, VerificationReason, VerificationResult, VerificationStatus,
    DEFAULT_TOLERANCE,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
