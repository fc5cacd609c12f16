// 🧾 Statement & Blocklist - Ground truth for claim verification
// The statement lists payments that actually arrived; the blocklist lists
// references that must never verify.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Normalise a payment reference: trim surrounding whitespace, uppercase.
pub fn normalize_reference(reference: &str) -> String {
    reference.trim().to_uppercase()
}

/// Amounts match when they differ by strictly less than `tolerance`.
/// A difference too large to represent never matches.
pub fn within_tolerance(a: Decimal, b: Decimal, tolerance: Decimal) -> bool {
    a.checked_sub(b).map_or(false, |diff| diff.abs() < tolerance)
}

// ============================================================================
// STATEMENT ENTRY
// ============================================================================

/// One payment that actually hit the account (like a line from a bank export)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementEntry {
    pub reference: String,
    pub amount: Decimal,
}

impl StatementEntry {
    pub fn new(reference: &str, amount: Decimal) -> Self {
        StatementEntry {
            reference: reference.to_string(),
            amount,
        }
    }
}

// ============================================================================
// STATEMENT
// ============================================================================

/// Immutable list of statement entries, fixed at startup.
/// References are treated as unique keys; lookups return the first match.
#[derive(Debug, Clone, Default)]
pub struct Statement {
    entries: Vec<StatementEntry>,
}

impl Statement {
    pub fn new(entries: Vec<StatementEntry>) -> Self {
        Statement { entries }
    }

    /// Built-in statement used when no CSV is configured
    pub fn default_entries() -> Self {
        Statement::new(vec![
            StatementEntry::new("UPI123ABC", Decimal::new(49900, 2)),
            StatementEntry::new("REF456XYZ", Decimal::new(99950, 2)),
            StatementEntry::new("PAY789LMN", Decimal::new(29900, 2)),
            StatementEntry::new("TXN001DEF", Decimal::new(50000, 2)),
            StatementEntry::new("GOOGPAY2024", Decimal::new(10000, 2)),
        ])
    }

    /// Load statement from CSV with `reference,amount` headers
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut rdr = csv::Reader::from_path(path.as_ref())
            .with_context(|| format!("Failed to open statement CSV: {:?}", path.as_ref()))?;

        let mut entries = Vec::new();
        for result in rdr.deserialize() {
            let entry: StatementEntry = result.context("Failed to deserialize statement entry")?;
            entries.push(entry);
        }

        Ok(Statement::new(entries))
    }

    /// First entry whose reference matches (case-insensitive) and whose
    /// amount differs by strictly less than `tolerance`.
    pub fn find_match(
        &self,
        normalized_reference: &str,
        amount: Decimal,
        tolerance: Decimal,
    ) -> Option<&StatementEntry> {
        self.entries.iter().find(|entry| {
            normalize_reference(&entry.reference) == normalized_reference
                && within_tolerance(entry.amount, amount, tolerance)
        })
    }

    pub fn entries(&self) -> &[StatementEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// FRAUD SET
// ============================================================================

/// References treated as fraudulent regardless of any other check.
/// Grows at runtime when a verified claim is reused.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FraudSet {
    references: BTreeSet<String>,
}

impl FraudSet {
    pub fn new() -> Self {
        FraudSet {
            references: BTreeSet::new(),
        }
    }

    /// Known fake references shipped with the verifier
    pub fn default_blocklist() -> Self {
        let mut set = FraudSet::new();
        set.insert("FAKE123");
        set.insert("SCAM456");
        set
    }

    /// Load blocklist from a JSON array of references
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read blocklist file: {:?}", path.as_ref()))?;

        let references: Vec<String> = serde_json::from_str(&content)
            .context("Failed to parse blocklist JSON")?;

        Ok(references.iter().map(String::as_str).collect())
    }

    /// Returns true if the reference was not already present
    pub fn insert(&mut self, reference: &str) -> bool {
        self.references.insert(normalize_reference(reference))
    }

    /// Returns true if the reference was present
    pub fn remove(&mut self, reference: &str) -> bool {
        self.references.remove(&normalize_reference(reference))
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.references.contains(&normalize_reference(reference))
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.references.iter().map(String::as_str)
    }
}

impl<'a> FromIterator<&'a str> for FraudSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = FraudSet::new();
        for reference in iter {
            set.insert(reference);
        }
        set
    }
}

// ============================================================================
// TESTS
// ============================================================================
