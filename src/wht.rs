//! Withholding tax credit reconciliation.
//!
//! Credits withheld at source are netted against the computed
//! liability.  Refund or carry-over of an excess is a policy decision
//! made elsewhere; this module only reports the figure.

use crate::error::{ensure_non_negative, TaxResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Liability before and after withholding credits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CreditReconciliation {
    /// Income tax computed before credits.
    pub liability: Decimal,
    /// Total WHT withheld at source for the period.
    pub credits_available: Decimal,
    /// Portion of the credits consumed by the liability.
    pub credits_applied: Decimal,
    /// `max(0, liability - credits)`.
    pub tax_after_credits: Decimal,
    /// `max(0, credits - liability)`.
    pub unused_credit: Decimal,
}

/// Apply `credits` against `liability`.
///
/// Both figures must be non-negative.  Credits never push the liability
/// below zero; the excess is returned as `unused_credit`.
pub fn reconcile(liability: Decimal, credits: Decimal) -> TaxResult<CreditReconciliation> {
    let liability = ensure_non_negative("liability", liability)?;
    let credits = ensure_non_negative("wht_credits", credits)?;
    let credits_applied = credits.min(liability);
    Ok(CreditReconciliation {
        liability,
        credits_available: credits,
        credits_applied,
        tax_after_credits: liability - credits_applied,
        unused_credit: credits - credits_applied,
    })
}
