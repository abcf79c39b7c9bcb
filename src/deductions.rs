//! Deduction and exemption aggregation.
//!
//! Turns gross income and a set of typed deduction claims into a single
//! taxable-income figure.  Caps are applied per deduction kind after
//! claims of the same kind are summed.  The exemption threshold is not
//! subtracted here; it lives in the bracket table as a 0% band and is
//! only used to decide the exemption flag.

use crate::brackets::round_money;
use crate::error::{ensure_non_negative, TaxError, TaxResult};
use crate::models::{AccountKind, AppliedDeduction, DeductionEntry, DeductionKind, ExemptionReason};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cap rules for the deductions that are not passed through as stated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReliefRules {
    /// Share of the rent paid in the period that qualifies as relief,
    /// e.g. `0.20`.
    pub rent_relief_rate: Decimal,
    /// Maximum rent relief for the period.
    pub rent_relief_cap: Decimal,
    /// NHF contributions are capped at this share of gross income.
    /// `None` passes the stated contribution through.
    #[serde(default)]
    pub nhf_rate: Option<Decimal>,
}

impl ReliefRules {
    /// Scale fixed caps down to a shorter period.
    ///
    /// The cap is rounded toward zero so that the caps of all periods in
    /// a year never add up to more than the annual cap.
    pub fn scaled(&self, divisor: u32) -> ReliefRules {
        if divisor <= 1 {
            return *self;
        }
        let cap = (self.rent_relief_cap / Decimal::from(divisor))
            .round_dp_with_strategy(2, RoundingStrategy::ToZero);
        ReliefRules {
            rent_relief_cap: cap,
            ..*self
        }
    }
}

/// Result of aggregating a period's deductions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeductionOutcome {
    pub applied: Vec<AppliedDeduction>,
    pub total: Decimal,
    pub taxable_income: Decimal,
    pub fully_exempt: bool,
    pub exemption_reason: Option<ExemptionReason>,
}

/// `min(rate * rent_paid, cap)`.
///
/// `rent_paid` is the rent paid within the period the rules were scaled
/// to: a year's rent for an annual period, one month's for a monthly one.
pub fn rent_relief(rent_paid: Decimal, rules: &ReliefRules) -> TaxResult<Decimal> {
    let rent = ensure_non_negative("rent_paid", rent_paid)?;
    Ok(round_money(rent * rules.rent_relief_rate).min(rules.rent_relief_cap))
}

/// `min(stated, nhf_rate * gross_income)` when a cap applies.
pub fn housing_fund_allowance(
    stated: Decimal,
    gross_income: Decimal,
    rules: &ReliefRules,
) -> TaxResult<Decimal> {
    let stated = ensure_non_negative("national_housing_fund", stated)?;
    Ok(match rules.nhf_rate {
        Some(rate) => stated.min(round_money(gross_income * rate)),
        None => stated,
    })
}

fn check_applicable(kind: DeductionKind, account: AccountKind) -> TaxResult<()> {
    let allowed = match account {
        AccountKind::Individual => kind.is_personal_relief(),
        AccountKind::Business => true,
        AccountKind::Company => !kind.is_personal_relief(),
    };
    if allowed {
        Ok(())
    } else {
        Err(TaxError::NotApplicable { kind, account })
    }
}

/// Apply each kind's cap, total the result and derive taxable income.
///
/// Taxable income is floored at zero.  The period is fully exempt when
/// taxable income does not exceed `exemption_threshold`.
pub fn aggregate(
    gross_income: Decimal,
    entries: &[DeductionEntry],
    account: AccountKind,
    rules: &ReliefRules,
    exemption_threshold: Decimal,
) -> TaxResult<DeductionOutcome> {
    let gross_income = ensure_non_negative("gross_income", gross_income)?;

    let mut claims: BTreeMap<DeductionKind, Decimal> = BTreeMap::new();
    for entry in entries {
        check_applicable(entry.kind, account)?;
        let amount = ensure_non_negative(&entry.kind.to_string(), entry.amount)?;
        *claims.entry(entry.kind).or_insert(Decimal::ZERO) += amount;
    }

    let mut applied = Vec::with_capacity(claims.len());
    for (kind, claimed) in claims {
        let allowed = match kind {
            DeductionKind::RentRelief => rent_relief(claimed, rules)?,
            DeductionKind::NationalHousingFund => {
                housing_fund_allowance(claimed, gross_income, rules)?
            }
            DeductionKind::Pension
            | DeductionKind::HealthInsurance
            | DeductionKind::LifeInsurance
            | DeductionKind::HousingLoanInterest
            | DeductionKind::BusinessExpense => claimed,
        };
        applied.push(AppliedDeduction {
            kind,
            claimed,
            allowed,
        });
    }

    let total: Decimal = applied.iter().map(|d| d.allowed).sum();
    let taxable_income = (gross_income - total).max(Decimal::ZERO);

    let fully_exempt = taxable_income <= exemption_threshold;
    let exemption_reason = if !fully_exempt {
        None
    } else if gross_income <= exemption_threshold {
        Some(ExemptionReason::IncomeBelowThreshold)
    } else {
        Some(ExemptionReason::ReducedByDeductions)
    };

    Ok(DeductionOutcome {
        applied,
        total,
        taxable_income,
        fully_exempt,
        exemption_reason,
    })
}
