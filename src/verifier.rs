// ✅ Claim Verifier - Decide whether a payment claim is genuine
//
// Decision order:
//   1. blocklisted reference              → fraud
//   2. no statement entry within tolerance → not-found (also when the
//      amount could not be parsed)
//   3. same claim already verified         → fraud (reference gets blocklisted)
//   4. otherwise                           → verified

use crate::db::Submission;
use crate::statement::{normalize_reference, within_tolerance, FraudSet, Statement};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Default absolute amount tolerance (strict `<`)
pub const DEFAULT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

// ============================================================================
// VERIFICATION STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationStatus {
    Verified,
    NotFound,
    Fraud,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Verified => "verified",
            VerificationStatus::NotFound => "not-found",
            VerificationStatus::Fraud => "fraud",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "verified" => Ok(VerificationStatus::Verified),
            "not-found" => Ok(VerificationStatus::NotFound),
            "fraud" => Ok(VerificationStatus::Fraud),
            other => Err(format!("unknown verification status: {}", other)),
        }
    }
}

// ============================================================================
// VERIFICATION RESULT
// ============================================================================

/// Why a claim ended up with its status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationReason {
    /// Reference is on the fraud blocklist
    Blocklisted,
    /// No statement entry matches reference and amount
    NoMatchingTransaction,
    /// Claim matches a statement entry that was already verified once
    AlreadyUsed,
    /// Claim matches a statement entry for the first time
    Matched,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub status: VerificationStatus,
    pub message: String,
    pub reason: VerificationReason,
}

impl VerificationResult {
    fn new(reason: VerificationReason) -> Self {
        let (status, message) = match reason {
            VerificationReason::Blocklisted => (
                VerificationStatus::Fraud,
                "🚫 This payment reference is flagged as fraudulent.",
            ),
            VerificationReason::AlreadyUsed => (
                VerificationStatus::Fraud,
                "🚫 This transaction has already been used. Fraud detected.",
            ),
            VerificationReason::NoMatchingTransaction => (
                VerificationStatus::NotFound,
                "❌ No matching transaction found. Please check the reference and amount.",
            ),
            VerificationReason::Matched => (
                VerificationStatus::Verified,
                "✅ Payment verified successfully!",
            ),
        };

        VerificationResult {
            status,
            message: message.to_string(),
            reason,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.status == VerificationStatus::Verified
    }

    /// True when this verification added the reference to the blocklist
    pub fn escalated(&self) -> bool {
        self.reason == VerificationReason::AlreadyUsed
    }
}

// ============================================================================
// CLAIM VERIFIER
// ============================================================================

pub struct ClaimVerifier {
    statement: Statement,
    fraud_set: FraudSet,

    /// Absolute amount tolerance (default: 0.01, strict `<`)
    pub tolerance: Decimal,
}

impl ClaimVerifier {
    pub fn new(statement: Statement, fraud_set: FraudSet) -> Self {
        ClaimVerifier {
            statement,
            fraud_set,
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn with_tolerance(statement: Statement, fraud_set: FraudSet, tolerance: Decimal) -> Self {
        ClaimVerifier {
            statement,
            fraud_set,
            tolerance,
        }
    }

    /// Verify a claimed payment against the statement, blocklist and log.
    ///
    /// Reuse of an already-verified claim blocklists the reference for every
    /// future claim, whatever the amount. `None` is an amount that could not
    /// be parsed; it never matches the statement.
    ///
    /// Example:
    /// ```
    /// use claim_verifier::{parse_amount, ClaimVerifier, FraudSet, Statement, VerificationStatus};
    ///
    /// let mut verifier = ClaimVerifier::new(Statement::default_entries(), FraudSet::default_blocklist());
    /// let result = verifier.verify("pay789lmn", parse_amount("299.00"), &[]);
    /// assert_eq!(result.status, VerificationStatus::Verified);
    /// ```
    pub fn verify(
        &mut self,
        reference: &str,
        amount: Option<Decimal>,
        prior: &[Submission],
    ) -> VerificationResult {
        let normalized = normalize_reference(reference);

        if self.fraud_set.contains(&normalized) {
            debug!(reference = %normalized, "claim rejected: blocklisted reference");
            return VerificationResult::new(VerificationReason::Blocklisted);
        }

        let amount = match amount {
            Some(amount) if self.statement.find_match(&normalized, amount, self.tolerance).is_some() => amount,
            _ => {
                debug!(reference = %normalized, amount = ?amount, "claim rejected: no matching transaction");
                return VerificationResult::new(VerificationReason::NoMatchingTransaction);
            }
        };

        if self.already_verified(&normalized, amount, prior) {
            self.fraud_set.insert(&normalized);
            warn!(reference = %normalized, %amount, "verified claim reused; reference blocklisted");
            return VerificationResult::new(VerificationReason::AlreadyUsed);
        }

        debug!(reference = %normalized, %amount, "claim verified");
        VerificationResult::new(VerificationReason::Matched)
    }

    fn already_verified(&self, normalized: &str, amount: Decimal, prior: &[Submission]) -> bool {
        prior.iter().any(|s| {
            s.status == VerificationStatus::Verified
                && normalize_reference(&s.reference) == normalized
                && s.amount.map_or(false, |used| within_tolerance(used, amount, self.tolerance))
        })
    }

    /// Blocklist a reference outside of verification (e.g. restored from audit log)
    pub fn flag_reference(&mut self, reference: &str) -> bool {
        self.fraud_set.insert(reference)
    }

    /// Undo an escalation that could not be persisted
    pub fn unflag_reference(&mut self, reference: &str) -> bool {
        self.fraud_set.remove(reference)
    }

    pub fn is_flagged(&self, reference: &str) -> bool {
        self.fraud_set.contains(reference)
    }

    pub fn fraud_set(&self) -> &FraudSet {
        &self.fraud_set
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }
}

impl Default for ClaimVerifier {
    fn default() -> Self {
        Self::new(Statement::default_entries(), FraudSet::default_blocklist())
    }
}

// ============================================================================
// TESTS
// ============================================================================
