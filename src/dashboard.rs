// 📊 Dashboard - Running tally of submissions
// Presentation model only: counts per status plus the verified rows.

use crate::db::Submission;
use crate::verifier::VerificationStatus;
use chrono::{DateTime, Local, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One row of the verified-payments table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedRow {
    pub timestamp: DateTime<Utc>,
    pub reference: String,
    pub amount: Decimal,
    pub contact: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total: usize,
    pub verified: usize,
    pub not_found: usize,
    pub fraud: usize,
    pub verified_rows: Vec<VerifiedRow>,
}

impl DashboardSummary {
    /// Tally a submission log; verified rows keep log order
    pub fn from_submissions(submissions: &[Submission]) -> Self {
        let mut summary = DashboardSummary {
            total: submissions.len(),
            ..Default::default()
        };

        for s in submissions {
            match s.status {
                VerificationStatus::Verified => {
                    summary.verified += 1;
                    // A verified claim always carries a parsed amount
                    summary.verified_rows.push(VerifiedRow {
                        timestamp: s.timestamp,
                        reference: s.reference.clone(),
                        amount: s.amount.unwrap_or_default(),
                        contact: s.contact.clone(),
                    });
                }
                VerificationStatus::NotFound => summary.not_found += 1,
                VerificationStatus::Fraud => summary.fraud += 1,
            }
        }

        summary
    }

    pub fn count(&self, status: VerificationStatus) -> usize {
        match status {
            VerificationStatus::Verified => self.verified,
            VerificationStatus::NotFound => self.not_found,
            VerificationStatus::Fraud => self.fraud,
        }
    }

    pub fn verified_total(&self) -> Decimal {
        self.verified_rows.iter().map(|r| r.amount).sum()
    }
}

/// Format amount with two decimals and currency symbol (`₹299.00`).
/// A missing amount renders as `₹-`.
pub fn format_amount(amount: impl Into<Option<Decimal>>, symbol: &str) -> String {
    match amount.into() {
        Some(amount) => format!("{}{:.2}", symbol, amount),
        None => format!("{}-", symbol),
    }
}

/// Submission time in the viewer's local timezone
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

// ============================================================================
// TESTS
// ============================================================================
