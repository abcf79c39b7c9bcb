//! Compliance scoring.
//!
//! Starts at 100 and deducts a fixed number of points for each
//! triggered condition, never going below zero.  Alerts are rebuilt on
//! every call from the current summary and signals, so [`evaluate`] is
//! a pure function.

use crate::models::{AccountKind, TaxSummary};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const MAX_SCORE: u8 = 100;

const MISSING_TAX_ID_POINTS: u8 = 25;
const MISSING_REGISTRATION_POINTS: u8 = 15;
const FILING_OVERDUE_POINTS: u8 = 20;
const VAT_MISMATCH_POINTS: u8 = 10;
const OUTSTANDING_BALANCE_POINTS: u8 = 15;
const OVERPAYMENT_POINTS: u8 = 5;

/// How urgently an alert needs attention.  Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// The area of compliance an alert belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    /// Tax identification number.
    Identification,
    /// Business registration number.
    Registration,
    /// Return filing deadlines.
    Filing,
    Vat,
    /// Outstanding or excess remittances.
    Payment,
}

/// Band derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Score of 80 or more.
    Low,
    /// Score from 50 to 79.
    Moderate,
    /// Score below 50.
    High,
}

/// One triggered condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceAlert {
    pub severity: Severity,
    pub category: AlertCategory,
    /// Human-readable description naming the period or amounts involved.
    pub message: String,
    /// Points this alert took off the score.
    pub points: u8,
}

/// Facts about the account that the summary does not carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceSignals {
    /// Date the evaluation is performed for.
    pub as_of: NaiveDate,
    #[serde(default)]
    pub missing_tax_identifier: bool,
    /// Only meaningful for business and company accounts.
    #[serde(default)]
    pub missing_registration_number: bool,
    #[serde(default)]
    pub filing_deadline: Option<NaiveDate>,
    #[serde(default)]
    pub filed: bool,
    /// Mismatch detected outside the engine, e.g. against invoices.
    #[serde(default)]
    pub vat_mismatch: bool,
}

impl ComplianceSignals {
    pub fn as_of(date: NaiveDate) -> Self {
        ComplianceSignals {
            as_of: date,
            missing_tax_identifier: false,
            missing_registration_number: false,
            filing_deadline: None,
            filed: false,
            vat_mismatch: false,
        }
    }

    fn deadline_passed(&self) -> bool {
        self.filing_deadline.is_some_and(|deadline| self.as_of > deadline)
    }
}

/// Result of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    /// 0 to [`MAX_SCORE`].
    pub score: u8,
    pub risk: RiskLevel,
    pub alerts: Vec<ComplianceAlert>,
}

impl ComplianceReport {
    pub fn highest_severity(&self) -> Option<Severity> {
        self.alerts.iter().map(|a| a.severity).max()
    }
}

fn alert(category: AlertCategory, severity: Severity, points: u8, message: String) -> ComplianceAlert {
    ComplianceAlert {
        severity,
        category,
        message,
        points,
    }
}

fn risk_for(score: u8) -> RiskLevel {
    match score {
        80.. => RiskLevel::Low,
        50..=79 => RiskLevel::Moderate,
        _ => RiskLevel::High,
    }
}

/// Score a period from its summary and the external signals.
pub fn evaluate(summary: &TaxSummary, signals: &ComplianceSignals) -> ComplianceReport {
    let mut alerts = Vec::new();

    if signals.missing_tax_identifier {
        alerts.push(alert(
            AlertCategory::Identification,
            Severity::High,
            MISSING_TAX_ID_POINTS,
            "No tax identification number on file".to_string(),
        ));
    }

    if signals.missing_registration_number && summary.account_kind != AccountKind::Individual {
        alerts.push(alert(
            AlertCategory::Registration,
            Severity::Medium,
            MISSING_REGISTRATION_POINTS,
            format!("No business registration number for {} account", summary.account_kind),
        ));
    }

    if signals.deadline_passed() && !signals.filed {
        if let Some(deadline) = signals.filing_deadline {
            alerts.push(alert(
                AlertCategory::Filing,
                Severity::High,
                FILING_OVERDUE_POINTS,
                format!("Return for {} was due on {deadline} and has not been filed", summary.period),
            ));
        }
    }

    let vat_mismatch = signals.vat_mismatch || summary.vat.is_some_and(|v| v.mismatch);
    if vat_mismatch {
        alerts.push(alert(
            AlertCategory::Vat,
            Severity::Medium,
            VAT_MISMATCH_POINTS,
            "Recorded output VAT does not agree with VAT-able sales".to_string(),
        ));
    }

    if summary.pending_balance > Decimal::ZERO && signals.deadline_passed() {
        alerts.push(alert(
            AlertCategory::Payment,
            Severity::Medium,
            OUTSTANDING_BALANCE_POINTS,
            format!(
                "{} of {} remains unpaid after the deadline",
                summary.pending_balance, summary.tax_after_credits
            ),
        ));
    } else if summary.is_overpaid() {
        alerts.push(alert(
            AlertCategory::Payment,
            Severity::Low,
            OVERPAYMENT_POINTS,
            format!(
                "Remittances exceed the liability by {}",
                -summary.pending_balance
            ),
        ));
    }

    let score = alerts
        .iter()
        .fold(MAX_SCORE, |score, a| score.saturating_sub(a.points));

    ComplianceReport {
        score,
        risk: risk_for(score),
        alerts,
    }
}
