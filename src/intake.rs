// 📥 Claim Desk - Turn a submitted form into a logged, adjudicated claim
//
// One submission is handled start to finish:
//   load log → verify → build Submission → append (with escalation event)
// Callers sharing a desk must serialise access (the server holds it in a Mutex).

use crate::dashboard::DashboardSummary;
use crate::db::{Event, StoreError, Submission, SubmissionStore};
use crate::verifier::{ClaimVerifier, VerificationResult};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Raw form input, exactly as typed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimForm {
    pub reference: String,
    pub amount: String,
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub address: String,
}

impl ClaimForm {
    pub fn new(reference: &str, amount: &str, contact: &str, address: &str) -> Self {
        ClaimForm {
            reference: reference.to_string(),
            amount: amount.to_string(),
            contact: contact.to_string(),
            address: address.to_string(),
        }
    }
}

/// Parse the leading decimal number of a form amount, ignoring whatever
/// follows it (`"500 INR"` is 500). `None` when no number leads the input;
/// such a claim matches no statement entry.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let text = raw.trim();
    let bytes = text.as_bytes();
    let digits_from = |start: usize| bytes[start..].iter().take_while(|b| b.is_ascii_digit()).count();

    let negative = bytes.first() == Some(&b'-');
    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));

    let int_start = end;
    end += digits_from(end);
    let integer = &text[int_start..end];

    let mut fraction = "";
    if bytes.get(end) == Some(&b'.') {
        let frac_len = digits_from(end + 1);
        fraction = &text[end + 1..end + 1 + frac_len];
        end += 1 + frac_len;
    }

    if integer.is_empty() && fraction.is_empty() {
        return None;
    }

    let mut number = format!(
        "{}{}",
        if negative { "-" } else { "" },
        if integer.is_empty() { "0" } else { integer }
    );
    if !fraction.is_empty() {
        number.push('.');
        number.push_str(fraction);
    }

    // Optional exponent, only when at least one digit follows it
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let sign_len = usize::from(matches!(bytes.get(end + 1), Some(b'+' | b'-')));
        let exp_len = digits_from(end + 1 + sign_len);
        if exp_len > 0 {
            let exponent = &text[end + 1..end + 1 + sign_len + exp_len];
            return Decimal::from_scientific(&format!("{}e{}", number, exponent)).ok();
        }
    }

    number.parse().ok()
}

/// Outcome handed to the presentation layer after each decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub submission: Submission,
    pub result: VerificationResult,
    pub summary: DashboardSummary,
}

pub struct ClaimDesk<S: SubmissionStore> {
    verifier: ClaimVerifier,
    store: S,
}

impl<S: SubmissionStore> ClaimDesk<S> {
    /// Create a desk; references flagged in earlier runs are re-applied
    pub fn new(mut verifier: ClaimVerifier, store: S) -> Result<Self, StoreError> {
        let mut restored = 0;
        for reference in store.flagged_references()? {
            if verifier.flag_reference(&reference) {
                restored += 1;
            }
        }

        if restored > 0 {
            info!(restored, "restored flagged references from audit log");
        }

        Ok(ClaimDesk { verifier, store })
    }

    /// Adjudicate one claim and append it to the log
    pub fn submit(&mut self, form: &ClaimForm) -> Result<ClaimReceipt, StoreError> {
        let mut log = self.store.load()?;

        let reference = form.reference.trim();
        let amount = parse_amount(&form.amount);
        let result = self.verifier.verify(reference, amount, &log);

        let submission = Submission {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            reference: reference.to_string(),
            amount,
            contact: form.contact.trim().to_string(),
            address: form.address.trim().to_string(),
            status: result.status,
            message: result.message.clone(),
        };

        let persisted = if result.escalated() {
            warn!(reference = %submission.reference, id = %submission.id, "reference flagged for reuse");
            self.store
                .append_with_event(&submission, &Event::reference_flagged(&submission))
        } else {
            self.store.append(&submission)
        };

        if let Err(e) = persisted {
            // Nothing was stored, so the blocklist must not keep the escalation either
            if result.escalated() {
                self.verifier.unflag_reference(reference);
            }
            return Err(e);
        }

        info!(
            id = %submission.id,
            reference = %submission.reference,
            status = %submission.status,
            "claim recorded"
        );

        log.push(submission.clone());

        Ok(ClaimReceipt {
            summary: DashboardSummary::from_submissions(&log),
            submission,
            result,
        })
    }

    pub fn submissions(&self) -> Result<Vec<Submission>, StoreError> {
        self.store.load()
    }

    pub fn summary(&self) -> Result<DashboardSummary, StoreError> {
        Ok(DashboardSummary::from_submissions(&self.store.load()?))
    }

    pub fn verifier(&self) -> &ClaimVerifier {
        &self.verifier
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_submissions, MemorySubmissionStore, SqliteSubmissionStore};
    use crate::verifier::{VerificationReason, VerificationStatus};

    fn dec(s: &str) -> Option<Decimal> {
        Some(s.parse().unwrap())
    }

    fn desk() -> ClaimDesk<MemorySubmissionStore> {
        ClaimDesk::new(ClaimVerifier::default(), MemorySubmissionStore::new()).unwrap()
    }

    fn claim(reference: &str, amount: &str) -> ClaimForm {
        ClaimForm::new(reference, amount, "9876543210", "12 Park Street")
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("299.00"), dec("299.00"));
        assert_eq!(parse_amount(" 999.5 "), dec("999.5"));
        assert_eq!(parse_amount("100"), dec("100"));
        assert_eq!(parse_amount("299.0099"), dec("299.0099"));
        assert_eq!(parse_amount(".5"), dec("0.5"));
        assert_eq!(parse_amount("-7."), dec("-7"));
        assert_eq!(parse_amount("+3"), dec("3"));
        assert_eq!(parse_amount("1e2"), dec("100"));
        assert_eq!(parse_amount("2.5E-1"), dec("0.25"));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("."), None);
        assert_eq!(parse_amount("-"), None);
    }

    #[test]
    fn test_parse_amount_ignores_trailing_text() {
        assert_eq!(parse_amount("500 INR"), dec("500"));
        assert_eq!(parse_amount("500.00abc"), dec("500.00"));
        assert_eq!(parse_amount("12,50"), dec("12"));
        assert_eq!(parse_amount("1e"), dec("1"));
        assert_eq!(parse_amount("4.5e+"), dec("4.5"));
    }

    #[test]
    fn test_parse_amount_rejects_non_finite_spellings() {
        for raw in ["inf", "infinity", "Infinity", "-inf", "nan", "NaN"] {
            assert_eq!(parse_amount(raw), None, "{:?} should not parse", raw);
        }
    }

    #[test]
    fn test_amount_with_currency_suffix_verifies() {
        let mut desk = desk();

        let receipt = desk.submit(&claim("TXN001DEF", "500 INR")).unwrap();

        assert_eq!(receipt.result.status, VerificationStatus::Verified);
        assert_eq!(receipt.submission.amount, dec("500"));
    }

    #[test]
    fn test_one_cent_off_claim_not_found() {
        let mut desk = desk();

        assert_eq!(desk.submit(&claim("PAY789LMN", "299.01")).unwrap().result.status, VerificationStatus::NotFound);
        assert_eq!(desk.submit(&claim("TXN001DEF", "500.01")).unwrap().result.status, VerificationStatus::NotFound);
        assert_eq!(desk.submit(&claim("PAY789LMN", "299.0099")).unwrap().result.status, VerificationStatus::Verified);
    }

    #[test]
    fn test_verified_claim_is_logged() {
        let mut desk = desk();

        let receipt = desk.submit(&claim("  pay789lmn ", "299.00")).unwrap();

        assert_eq!(receipt.result.status, VerificationStatus::Verified);
        assert_eq!(receipt.submission.reference, "pay789lmn");
        assert_eq!(receipt.submission.amount, dec("299"));
        assert_eq!(receipt.submission.contact, "9876543210");
        assert_eq!(receipt.submission.message, receipt.result.message);
        assert_eq!(receipt.summary.total, 1);
        assert_eq!(receipt.summary.verified_rows.len(), 1);

        assert_eq!(desk.submissions().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_claim_escalates() {
        let mut desk = desk();

        let first = desk.submit(&claim("TXN001DEF", "500.00")).unwrap();
        let second = desk.submit(&claim("TXN001DEF", "500")).unwrap();
        let third = desk.submit(&claim("TXN001DEF", "42.00")).unwrap();

        assert_eq!(first.result.status, VerificationStatus::Verified);
        assert_eq!(second.result.status, VerificationStatus::Fraud);
        assert_eq!(second.result.reason, VerificationReason::AlreadyUsed);
        assert_eq!(third.result.reason, VerificationReason::Blocklisted);

        assert_eq!(third.summary.total, 3);
        assert_eq!(third.summary.verified, 1);
        assert_eq!(third.summary.fraud, 2);

        // Only the reuse writes an audit event
        assert_eq!(desk.store().events().len(), 1);
        assert_eq!(desk.store().events()[0].entity_id, "TXN001DEF");
    }

    #[test]
    fn test_unparseable_amount_is_not_found() {
        let mut desk = desk();

        let receipt = desk.submit(&claim("PAY789LMN", "two hundred")).unwrap();

        assert_eq!(receipt.result.status, VerificationStatus::NotFound);
        assert_eq!(receipt.submission.amount, None);
        assert_eq!(receipt.summary.not_found, 1);
    }

    #[test]
    fn test_blocklisted_reference_with_bad_amount_is_fraud() {
        let mut desk = desk();

        let receipt = desk.submit(&claim("fake123", "")).unwrap();
        assert_eq!(receipt.result.status, VerificationStatus::Fraud);
    }

    #[test]
    fn test_unknown_reference_not_found() {
        let mut desk = desk();

        let receipt = desk.submit(&claim("UNKNOWN999", "50.00")).unwrap();
        assert_eq!(receipt.result.status, VerificationStatus::NotFound);
        assert_eq!(desk.summary().unwrap().not_found, 1);
    }

    #[test]
    fn test_failed_escalation_write_leaves_no_trace() {
        let store = SqliteSubmissionStore::open_in_memory().unwrap();
        let mut desk = ClaimDesk::new(ClaimVerifier::default(), store).unwrap();

        desk.submit(&claim("TXN001DEF", "500.00")).unwrap();
        desk.store().connection().execute("DROP TABLE events", []).unwrap();

        assert!(desk.submit(&claim("TXN001DEF", "500.00")).is_err());

        assert_eq!(count_submissions(desk.store().connection()).unwrap(), 1);
        assert!(!desk.verifier().is_flagged("TXN001DEF"));
    }

    #[test]
    fn test_flag_survives_restart() {
        let path = std::env::temp_dir().join(format!("{}-claims.db", uuid::Uuid::new_v4()));

        {
            let store = SqliteSubmissionStore::open(&path).unwrap();
            let mut desk = ClaimDesk::new(ClaimVerifier::default(), store).unwrap();
            desk.submit(&claim("UPI123ABC", "499.00")).unwrap();
            desk.submit(&claim("UPI123ABC", "499.00")).unwrap();
        }

        let store = SqliteSubmissionStore::open(&path).unwrap();
        let mut desk = ClaimDesk::new(ClaimVerifier::default(), store).unwrap();

        assert!(desk.verifier().is_flagged("UPI123ABC"));
        let receipt = desk.submit(&claim("UPI123ABC", "1.00")).unwrap();
        assert_eq!(receipt.result.reason, VerificationReason::Blocklisted);
        assert_eq!(receipt.summary.total, 3);

        drop(desk);
        for suffix in ["", "-wal", "-shm"] {
            std::fs::remove_file(format!("{}{}", path.display(), suffix)).ok();
        }
    }
}
