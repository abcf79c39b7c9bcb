//! Tax computation engine.
//!
//! The `engine` module turns a period's [`PeriodInputs`] into a
//! [`TaxSummary`] and keeps exactly one authoritative summary per
//! period.  [`compute_summary`] is pure; [`TaxService`] wraps it with
//! the summary store and the remittance ledger.  Batches of periods are
//! computed in parallel with [`rayon`].

use crate::compliance::{self, ComplianceReport, ComplianceSignals};
use crate::error::{TaxError, TaxResult};
use crate::ledger::{LedgerBalance, RemittanceLedger};
use crate::models::{PeriodInputs, TaxKind, TaxPeriod, TaxSummary};
use crate::tax::{calculator_for, TaxLaw, TaxLawBook};
use crate::vat;
use crate::wht;
use dashmap::DashMap;
use rayon::prelude::*;
use rust_decimal::Decimal;

/// Compute a summary for `period` under `law`.
///
/// Remittance figures start out empty (`remitted` zero, `pending_balance`
/// equal to the liability); [`TaxService`] fills them from the ledger.
pub fn compute_summary(
    period: &TaxPeriod,
    inputs: &PeriodInputs,
    law: &TaxLaw,
) -> TaxResult<TaxSummary> {
    period.validate()?;

    let calculator = calculator_for(inputs.account_kind);
    let assessment = calculator.assess(period, inputs, law)?;
    let credits = wht::reconcile(assessment.liability, inputs.wht_credits)?;

    let vat = match &inputs.vat {
        Some(figures) => {
            let exempt = match inputs.turnover {
                Some(turnover) => law.company_sizes.is_vat_exempt(turnover)?,
                None => false,
            };
            let mut position = vat::net_position(figures, exempt)?;
            position.mismatch = vat::mismatch_exceeds(figures, law.vat_rate, law.vat_tolerance);
            Some(position)
        }
        None => None,
    };

    Ok(TaxSummary {
        period: period.clone(),
        account_kind: inputs.account_kind,
        rule_year: law.tax_year,
        gross_income: assessment.gross_income,
        deductions: assessment.deductions,
        total_deductions: assessment.total_deductions,
        taxable_income: assessment.taxable_income,
        brackets: assessment.brackets,
        classification: assessment.classification,
        tax_before_credits: credits.liability,
        credits_available: credits.credits_available,
        credits_applied: credits.credits_applied,
        unused_credit: credits.unused_credit,
        tax_after_credits: credits.tax_after_credits,
        fully_exempt: assessment.fully_exempt,
        exemption_reason: assessment.exemption_reason,
        vat,
        remitted: Decimal::ZERO,
        pending_balance: credits.tax_after_credits,
    })
}

/// Service object holding the rule sets, the authoritative summaries
/// and the remittance ledger.  No state lives outside it.
#[derive(Debug, Default)]
pub struct TaxService {
    laws: TaxLawBook,
    summaries: DashMap<TaxPeriod, TaxSummary>,
    ledger: RemittanceLedger,
}

impl TaxService {
    pub fn new(laws: TaxLawBook) -> Self {
        TaxService {
            laws,
            summaries: DashMap::new(),
            ledger: RemittanceLedger::new(),
        }
    }

    pub fn laws(&self) -> &TaxLawBook {
        &self.laws
    }

    pub fn ledger(&self) -> &RemittanceLedger {
        &self.ledger
    }

    /// Compute without storing anything.
    pub fn preview(&self, period: &TaxPeriod, inputs: &PeriodInputs) -> TaxResult<TaxSummary> {
        let mut summary = self.compute(period, inputs)?;
        let balance = self.ledger.balance(
            period,
            summary.income_tax_kind(),
            summary.tax_after_credits,
        )?;
        apply_balance(&mut summary, &balance);
        Ok(summary)
    }

    /// Recompute and replace the stored summary for `period`.
    ///
    /// The new summary is built completely before it is stored.  On any
    /// error the previous summary stays in place.
    pub fn recompute(&self, period: &TaxPeriod, inputs: &PeriodInputs) -> TaxResult<TaxSummary> {
        let summary = self
            .compute(period, inputs)
            .and_then(|summary| self.store(summary))
            .map_err(|err| {
                tracing::warn!(period = %period, error = %err, "tax summary recomputation failed");
                err
            })?;
        tracing::info!(
            period = %period,
            taxable_income = %summary.taxable_income,
            tax_after_credits = %summary.tax_after_credits,
            pending = %summary.pending_balance,
            "tax summary recomputed"
        );
        Ok(summary)
    }

    /// Recompute with inputs obtained from `fetch`.  A failed fetch fails
    /// the recomputation and leaves the stored summary untouched.
    pub fn recompute_with<F>(&self, period: &TaxPeriod, fetch: F) -> TaxResult<TaxSummary>
    where
        F: FnOnce(&TaxPeriod) -> anyhow::Result<PeriodInputs>,
    {
        let inputs = fetch(period).map_err(|err| {
            tracing::warn!(period = %period, error = %err, "failed to fetch period inputs");
            TaxError::InputUnavailable(err.to_string())
        })?;
        self.recompute(period, &inputs)
    }

    /// Recompute many periods.  Summaries are computed in parallel and
    /// stored one by one; results come back in input order.
    pub fn recompute_batch(&self, jobs: Vec<(TaxPeriod, PeriodInputs)>) -> Vec<TaxResult<TaxSummary>> {
        let computed: Vec<TaxResult<TaxSummary>> = jobs
            .into_par_iter()
            .map(|(period, inputs)| self.compute(&period, &inputs))
            .collect();

        computed
            .into_iter()
            .map(|result| result.and_then(|summary| self.store(summary)))
            .collect()
    }

    fn compute(&self, period: &TaxPeriod, inputs: &PeriodInputs) -> TaxResult<TaxSummary> {
        let law = self.laws.law_for(period.tax_year)?;
        compute_summary(period, inputs, law)
    }

    /// Read the ledger and store `summary` while holding the period's
    /// slot, so a concurrent [`refresh_ledger`](Self::refresh_ledger)
    /// cannot be overwritten with an older balance.
    fn store(&self, mut summary: TaxSummary) -> TaxResult<TaxSummary> {
        let slot = self.summaries.entry(summary.period.clone());
        let balance = self.ledger.balance(
            &summary.period,
            summary.income_tax_kind(),
            summary.tax_after_credits,
        )?;
        apply_balance(&mut summary, &balance);
        slot.insert(summary.clone());
        Ok(summary)
    }

    /// The stored summary.  Reading never triggers recomputation.
    pub fn summary(&self, period: &TaxPeriod) -> TaxResult<TaxSummary> {
        self.summaries
            .get(period)
            .map(|s| s.value().clone())
            .ok_or_else(|| TaxError::SummaryNotFound(period.clone()))
    }

    /// Re-read the ledger and update the stored summary's remitted and
    /// pending figures.  Call after any remittance mutation.
    pub fn refresh_ledger(&self, period: &TaxPeriod) -> TaxResult<TaxSummary> {
        let mut entry = self
            .summaries
            .get_mut(period)
            .ok_or_else(|| TaxError::SummaryNotFound(period.clone()))?;
        let balance = self.ledger.balance(
            period,
            entry.income_tax_kind(),
            entry.tax_after_credits,
        )?;
        apply_balance(&mut entry, &balance);
        tracing::debug!(
            period = %period,
            remitted = %balance.remitted,
            pending = %balance.pending,
            "ledger refreshed"
        );
        Ok(entry.clone())
    }

    /// VAT remittances netted against the stored VAT position.
    pub fn vat_balance(&self, period: &TaxPeriod) -> TaxResult<LedgerBalance> {
        let summary = self.summary(period)?;
        let payable = summary
            .vat
            .map(|position| position.amount_payable())
            .ok_or_else(|| TaxError::InputRequired("vat".into()))?;
        self.ledger.balance(period, TaxKind::Vat, payable)
    }

    /// Score the stored summary against `signals`.
    pub fn evaluate_compliance(
        &self,
        period: &TaxPeriod,
        signals: &ComplianceSignals,
    ) -> TaxResult<ComplianceReport> {
        let summary = self.summary(period)?;
        let report = compliance::evaluate(&summary, signals);
        tracing::debug!(
            period = %period,
            score = report.score,
            alerts = report.alerts.len(),
            "compliance evaluated"
        );
        Ok(report)
    }
}

fn apply_balance(summary: &mut TaxSummary, balance: &LedgerBalance) {
    summary.remitted = balance.remitted;
    summary.pending_balance = balance.pending;
}
