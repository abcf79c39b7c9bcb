//! Data models for the Tax Engine.
//!
//! The `models` module defines the serialisable structs and enums that
//! flow through the engine: the period key, the aggregated financial
//! inputs supplied by collaborators, and the derived [`TaxSummary`].
//! Status-like fields are closed enums so that illegal states cannot
//! be represented.

use crate::brackets::BracketSlice;
use crate::cit::CompanySize;
use crate::error::{TaxError, TaxResult};
use crate::vat::VatPosition;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Earliest tax year the rule sets are valid for.  Periods referencing
/// an earlier year are rejected rather than computed with current rules.
pub const MIN_SUPPORTED_TAX_YEAR: i32 = 2026;

/// Identifies the account and window a computation applies to.
///
/// A period is an immutable key: remittances and summaries are filed
/// under it and never move to another period.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaxPeriod {
    /// Identifier of the individual, business or company account.
    pub account_id: String,
    /// The tax year, e.g. `2026`.
    pub tax_year: i32,
    /// Calendar month (1-12).  `None` means annual aggregation.
    #[serde(default)]
    pub month: Option<u8>,
}

impl TaxPeriod {
    /// Build a validated period.
    pub fn new(account_id: impl Into<String>, tax_year: i32, month: Option<u8>) -> TaxResult<Self> {
        let period = TaxPeriod {
            account_id: account_id.into(),
            tax_year,
            month,
        };
        period.validate()?;
        Ok(period)
    }

    /// An annual period.
    pub fn annual(account_id: impl Into<String>, tax_year: i32) -> TaxResult<Self> {
        Self::new(account_id, tax_year, None)
    }

    /// A single-month period.
    pub fn monthly(account_id: impl Into<String>, tax_year: i32, month: u8) -> TaxResult<Self> {
        Self::new(account_id, tax_year, Some(month))
    }

    /// Re-check a period that arrived through deserialisation.
    pub fn validate(&self) -> TaxResult<()> {
        if self.account_id.trim().is_empty() {
            return Err(TaxError::MissingField("account_id".into()));
        }
        if self.tax_year < MIN_SUPPORTED_TAX_YEAR {
            return Err(TaxError::UnsupportedTaxYear {
                year: self.tax_year,
                minimum: MIN_SUPPORTED_TAX_YEAR,
            });
        }
        if let Some(month) = self.month {
            if !(1..=12).contains(&month) {
                return Err(TaxError::InvalidPeriod(format!(
                    "month {month} is outside 1-12"
                )));
            }
        }
        Ok(())
    }

    pub fn is_annual(&self) -> bool {
        self.month.is_none()
    }

    /// How many of these periods make up a year.
    pub fn periods_per_year(&self) -> u32 {
        if self.is_annual() {
            1
        } else {
            12
        }
    }
}

impl fmt::Display for TaxPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.month {
            Some(month) => write!(f, "{}/{}-{:02}", self.account_id, self.tax_year, month),
            None => write!(f, "{}/{}", self.account_id, self.tax_year),
        }
    }
}

/// How an account is taxed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    /// A natural person earning employment or other income.
    Individual,
    /// A sole proprietor or enterprise taxed under personal income tax
    /// but allowed to deduct business expenses.
    Business,
    /// An incorporated company subject to corporate income tax.
    Company,
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccountKind::Individual => "individual",
            AccountKind::Business => "business",
            AccountKind::Company => "company",
        };
        f.write_str(s)
    }
}

/// The obligation a liability or payment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxKind {
    Pit,
    Cit,
    Vat,
    Wht,
}

impl TaxKind {
    /// The income tax an account of the given kind pays.
    pub fn income_tax_for(account: AccountKind) -> TaxKind {
        match account {
            AccountKind::Company => TaxKind::Cit,
            AccountKind::Individual | AccountKind::Business => TaxKind::Pit,
        }
    }
}

impl fmt::Display for TaxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaxKind::Pit => "PIT",
            TaxKind::Cit => "CIT",
            TaxKind::Vat => "VAT",
            TaxKind::Wht => "WHT",
        };
        f.write_str(s)
    }
}

/// Where an income figure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeSource {
    Employment,
    BusinessRevenue,
    /// Anything else.  Requires a free-text description.
    Other,
}

/// A gross amount attributed to a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeFigure {
    pub source: IncomeSource,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl IncomeFigure {
    pub fn new(source: IncomeSource, amount: Decimal) -> Self {
        IncomeFigure {
            source,
            amount,
            description: None,
        }
    }

    pub fn other(amount: Decimal, description: impl Into<String>) -> Self {
        IncomeFigure {
            source: IncomeSource::Other,
            amount,
            description: Some(description.into()),
        }
    }
}

/// Statutory and discretionary deduction types.  Each has its own cap
/// rule, applied by [`crate::deductions::aggregate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeductionKind {
    Pension,
    NationalHousingFund,
    HealthInsurance,
    LifeInsurance,
    HousingLoanInterest,
    /// The stated amount is the rent paid within the period (a month's
    /// rent for a monthly period); the relief is derived from it.
    RentRelief,
    BusinessExpense,
}

impl DeductionKind {
    /// Personal reliefs are not available to companies.
    pub fn is_personal_relief(self) -> bool {
        !matches!(self, DeductionKind::BusinessExpense)
    }
}

impl fmt::Display for DeductionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeductionKind::Pension => "pension",
            DeductionKind::NationalHousingFund => "national housing fund",
            DeductionKind::HealthInsurance => "health insurance",
            DeductionKind::LifeInsurance => "life insurance",
            DeductionKind::HousingLoanInterest => "housing loan interest",
            DeductionKind::RentRelief => "rent relief",
            DeductionKind::BusinessExpense => "business expense",
        };
        f.write_str(s)
    }
}

/// A typed deduction claim for a period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeductionEntry {
    pub kind: DeductionKind,
    pub amount: Decimal,
}

impl DeductionEntry {
    pub fn new(kind: DeductionKind, amount: Decimal) -> Self {
        DeductionEntry { kind, amount }
    }
}

/// Output and input VAT recorded for a period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VatFigures {
    /// VAT collected on sales.
    pub output_vat: Decimal,
    /// VAT paid on qualifying purchases.
    pub input_vat: Decimal,
    /// Value of VAT-able sales, when known.  Used to cross-check the
    /// recorded output VAT.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vatable_sales: Option<Decimal>,
}

/// The already-resolved inputs for a single period.
///
/// Collaborators aggregate these from income, expense, invoice and
/// payroll ledgers.  The engine treats them as opaque values and
/// never fetches anything on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodInputs {
    pub account_kind: AccountKind,
    #[serde(default)]
    pub income: Vec<IncomeFigure>,
    #[serde(default)]
    pub deductions: Vec<DeductionEntry>,
    /// Withholding tax already deducted at source.
    #[serde(default)]
    pub wht_credits: Decimal,
    /// Annual turnover.  Required for companies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turnover: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vat: Option<VatFigures>,
}

impl PeriodInputs {
    pub fn new(account_kind: AccountKind) -> Self {
        PeriodInputs {
            account_kind,
            income: Vec::new(),
            deductions: Vec::new(),
            wht_credits: Decimal::ZERO,
            turnover: None,
            vat: None,
        }
    }
}

/// Why a period owes no income tax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExemptionReason {
    /// Gross income never exceeded the exemption threshold.
    IncomeBelowThreshold,
    /// Gross income exceeded the threshold but deductions brought
    /// taxable income down to (or below) it, possibly to zero.
    ReducedByDeductions,
    /// Turnover places the company in the small classification.
    SmallCompany,
}

/// A deduction claim after its cap was applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AppliedDeduction {
    pub kind: DeductionKind,
    /// Amount supplied by the caller.
    pub claimed: Decimal,
    /// Amount that counts towards total deductions.
    pub allowed: Decimal,
}

/// The computed, authoritative liability for one period.
///
/// A summary is never edited by hand.  It is rebuilt from inputs and
/// replaces the previous one as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxSummary {
    pub period: TaxPeriod,
    pub account_kind: AccountKind,
    /// Year of the rule set the liability was computed with.
    pub rule_year: i32,
    pub gross_income: Decimal,
    pub deductions: Vec<AppliedDeduction>,
    pub total_deductions: Decimal,
    pub taxable_income: Decimal,
    /// Per-bracket contributions.  Empty for companies and for zero
    /// taxable income.
    pub brackets: Vec<BracketSlice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<CompanySize>,
    pub tax_before_credits: Decimal,
    pub credits_available: Decimal,
    pub credits_applied: Decimal,
    pub unused_credit: Decimal,
    pub tax_after_credits: Decimal,
    pub fully_exempt: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exemption_reason: Option<ExemptionReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vat: Option<VatPosition>,
    /// Sum of remittances filed against the income tax obligation.
    pub remitted: Decimal,
    /// `tax_after_credits - remitted`.  Negative means overpaid.
    pub pending_balance: Decimal,
}

impl TaxSummary {
    /// The obligation whose remittances are netted in this summary.
    pub fn income_tax_kind(&self) -> TaxKind {
        TaxKind::income_tax_for(self.account_kind)
    }

    pub fn is_overpaid(&self) -> bool {
        self.pending_balance < Decimal::ZERO
    }
}
