//! Remittance ledger.
//!
//! Payments made against a period's liability.  Each period has its own
//! book behind its own mutex, so mutations to one period are serialised
//! while different periods proceed in parallel.  Every mutation bumps
//! the entry's version; callers pass the version they last saw and a
//! mismatch is reported as a conflict rather than merged.
//!
//! The ledger never pushes totals anywhere.  Callers ask for a
//! [`LedgerBalance`] explicitly after mutating.

use crate::error::{ensure_non_negative, TaxError, TaxResult};
use crate::models::{TaxKind, TaxPeriod};
use chrono::NaiveDate;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Lifecycle of a remittance.  Entries start out recorded; an external
/// review moves them to verified, which is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemittanceStatus {
    #[serde(alias = "draft")]
    Recorded,
    Verified,
}

/// A payment made towards a liability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Remittance {
    pub id: Uuid,
    /// Fixed at creation.  Edits cannot move a payment to another period.
    pub period: TaxPeriod,
    pub kind: TaxKind,
    pub paid_on: NaiveDate,
    pub amount: Decimal,
    pub reference: String,
    /// Pointer to a stored receipt, if one was uploaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
    pub status: RemittanceStatus,
    /// Incremented on every mutation.
    pub version: u64,
}

/// Fields supplied when recording a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRemittance {
    pub period: TaxPeriod,
    pub kind: TaxKind,
    pub paid_on: NaiveDate,
    pub amount: Decimal,
    pub reference: String,
    #[serde(default)]
    pub receipt: Option<String>,
}

/// Replacement values for an unverified payment.  All three fields are
/// replaced together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemittanceEdit {
    pub paid_on: NaiveDate,
    pub amount: Decimal,
    pub reference: String,
}

/// Consent obtained by the caller before a deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Pending,
}

impl From<bool> for Confirmation {
    fn from(confirmed: bool) -> Self {
        if confirmed {
            Confirmation::Confirmed
        } else {
            Confirmation::Pending
        }
    }
}

/// Payments for one obligation in one period, netted against its
/// liability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerBalance {
    pub period: TaxPeriod,
    pub kind: TaxKind,
    pub liability: Decimal,
    pub remitted: Decimal,
    /// Portion of `remitted` that has been verified.
    pub verified: Decimal,
    /// `liability - remitted`.  Not floored: negative means overpaid.
    pub pending: Decimal,
    pub overpaid: bool,
    pub entries: usize,
}

#[derive(Debug, Default)]
struct PeriodBook {
    entries: Vec<Remittance>,
}

impl PeriodBook {
    fn find_mut(&mut self, id: Uuid) -> TaxResult<&mut Remittance> {
        self.entries
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(TaxError::RemittanceNotFound(id))
    }
}

fn check_version(entry: &Remittance, expected: u64) -> TaxResult<()> {
    if entry.version != expected {
        return Err(TaxError::Conflict {
            id: entry.id,
            expected,
            actual: entry.version,
        });
    }
    Ok(())
}

fn validate_payment(amount: Decimal, reference: &str) -> TaxResult<()> {
    if amount <= Decimal::ZERO {
        return Err(TaxError::NonPositiveAmount {
            field: "amount".into(),
            amount,
        });
    }
    if reference.trim().is_empty() {
        return Err(TaxError::MissingField("reference".into()));
    }
    Ok(())
}

/// Remittances for every period, indexed by id.
///
/// `books` holds one mutex-guarded book per period that currently has
/// entries, and a book is dropped with its last entry; `index` maps each remittance id to the period it was filed
/// under.
#[derive(Debug, Default)]
pub struct RemittanceLedger {
    books: DashMap<TaxPeriod, Arc<Mutex<PeriodBook>>>,
    index: DashMap<Uuid, TaxPeriod>,
}

impl RemittanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn locate(&self, id: Uuid) -> TaxResult<Arc<Mutex<PeriodBook>>> {
        let period = self
            .index
            .get(&id)
            .map(|p| p.value().clone())
            .ok_or(TaxError::RemittanceNotFound(id))?;
        self.books
            .get(&period)
            .map(|book| Arc::clone(book.value()))
            .ok_or(TaxError::RemittanceNotFound(id))
    }

    /// Record a new payment in the `Recorded` state.
    pub fn record(&self, new: NewRemittance) -> TaxResult<Remittance> {
        new.period.validate()?;
        validate_payment(new.amount, &new.reference)?;

        let remittance = Remittance {
            id: Uuid::new_v4(),
            period: new.period,
            kind: new.kind,
            paid_on: new.paid_on,
            amount: new.amount,
            reference: new.reference,
            receipt: new.receipt,
            status: RemittanceStatus::Recorded,
            version: 1,
        };

        // Pushed while holding the map slot so a concurrent prune of the
        // same period cannot drop the entry.
        self.books
            .entry(remittance.period.clone())
            .or_default()
            .lock()
            .entries
            .push(remittance.clone());
        self.index.insert(remittance.id, remittance.period.clone());

        tracing::info!(
            id = %remittance.id,
            period = %remittance.period,
            kind = %remittance.kind,
            amount = %remittance.amount,
            "remittance recorded"
        );
        Ok(remittance)
    }

    pub fn get(&self, id: Uuid) -> TaxResult<Remittance> {
        let book = self.locate(id)?;
        let mut guard = book.lock();
        let found = guard.find_mut(id)?.clone();
        Ok(found)
    }

    /// All payments filed under `period`, in the order they were recorded.
    pub fn entries(&self, period: &TaxPeriod) -> Vec<Remittance> {
        let Some(book) = self.books.get(period).map(|book| Arc::clone(book.value())) else {
            return Vec::new();
        };
        let guard = book.lock();
        guard.entries.clone()
    }

    /// Replace amount, date and reference of an unverified payment.
    pub fn edit(&self, id: Uuid, expected_version: u64, edit: RemittanceEdit) -> TaxResult<Remittance> {
        validate_payment(edit.amount, &edit.reference)?;
        let book = self.locate(id)?;
        let mut guard = book.lock();
        let entry = guard.find_mut(id)?;
        check_version(entry, expected_version)?;
        if entry.status == RemittanceStatus::Verified {
            return Err(TaxError::AlreadyVerified(id));
        }

        entry.paid_on = edit.paid_on;
        entry.amount = edit.amount;
        entry.reference = edit.reference;
        entry.version += 1;

        tracing::info!(id = %id, amount = %entry.amount, version = entry.version, "remittance edited");
        Ok(entry.clone())
    }

    /// Mark a payment as verified.  Verified entries cannot be edited.
    pub fn verify(&self, id: Uuid, expected_version: u64) -> TaxResult<Remittance> {
        let book = self.locate(id)?;
        let mut guard = book.lock();
        let entry = guard.find_mut(id)?;
        check_version(entry, expected_version)?;
        if entry.status == RemittanceStatus::Verified {
            return Err(TaxError::AlreadyVerified(id));
        }

        entry.status = RemittanceStatus::Verified;
        entry.version += 1;

        tracing::info!(id = %id, "remittance verified");
        Ok(entry.clone())
    }

    /// Remove a payment in either state.  The caller must have obtained
    /// consent beforehand.
    pub fn delete(&self, id: Uuid, confirmation: Confirmation) -> TaxResult<Remittance> {
        if confirmation != Confirmation::Confirmed {
            return Err(TaxError::ConfirmationRequired(id));
        }
        let book = self.locate(id)?;
        let removed = {
            let mut guard = book.lock();
            let pos = guard
                .entries
                .iter()
                .position(|r| r.id == id)
                .ok_or(TaxError::RemittanceNotFound(id))?;
            guard.entries.remove(pos)
        };
        self.index.remove(&id);
        self.books
            .remove_if(&removed.period, |_, book| book.lock().entries.is_empty());

        tracing::info!(id = %id, period = %removed.period, "remittance deleted");
        Ok(removed)
    }

    /// Net the payments for `kind` in `period` against `liability`.
    pub fn balance(
        &self,
        period: &TaxPeriod,
        kind: TaxKind,
        liability: Decimal,
    ) -> TaxResult<LedgerBalance> {
        let liability = ensure_non_negative("liability", liability)?;
        let entries: Vec<Remittance> = self
            .entries(period)
            .into_iter()
            .filter(|r| r.kind == kind)
            .collect();

        let remitted: Decimal = entries.iter().map(|r| r.amount).sum();
        let verified: Decimal = entries
            .iter()
            .filter(|r| r.status == RemittanceStatus::Verified)
            .map(|r| r.amount)
            .sum();
        let pending = liability - remitted;

        Ok(LedgerBalance {
            period: period.clone(),
            kind,
            liability,
            remitted,
            verified,
            pending,
            overpaid: pending < Decimal::ZERO,
            entries: entries.len(),
        })
    }
}
