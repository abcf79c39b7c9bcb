//! Error kinds produced by the tax engine.
//!
//! Every calculator returns [`TaxResult`] so the caller decides whether
//! to retry, block, or surface the failure.  Nothing is defaulted or
//! coerced: a negative amount, an out-of-range year or a malformed
//! bracket table is reported with its own variant.

use crate::models::{AccountKind, DeductionKind, TaxPeriod};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Convenience alias used throughout the crate.
pub type TaxResult<T> = Result<T, TaxError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaxError {
    #[error("{field} must not be negative (got {amount})")]
    NegativeAmount { field: String, amount: Decimal },

    #[error("{field} must be greater than zero (got {amount})")]
    NonPositiveAmount { field: String, amount: Decimal },

    #[error("tax year {year} is not supported; the earliest supported year is {minimum}")]
    UnsupportedTaxYear { year: i32, minimum: i32 },

    #[error("invalid tax period: {0}")]
    InvalidPeriod(String),

    #[error("malformed bracket table: {0}")]
    MalformedBrackets(String),

    #[error("malformed company size table: {0}")]
    MalformedSizeTable(String),

    #[error("invalid rule set for {year}: {reason}")]
    InvalidRules { year: i32, reason: String },

    #[error("missing required field `{0}`")]
    MissingField(String),

    #[error("{kind} deductions do not apply to {account} accounts")]
    NotApplicable {
        kind: DeductionKind,
        account: AccountKind,
    },

    /// Upstream data the computation depends on has not been supplied.
    #[error("input required: {0}")]
    InputRequired(String),

    /// The aggregated inputs could not be fetched.
    #[error("inputs unavailable: {0}")]
    InputUnavailable(String),

    #[error("no rule set covers tax year {0}")]
    NoRulesForYear(i32),

    #[error("no summary has been computed for {0}")]
    SummaryNotFound(TaxPeriod),

    #[error("remittance {0} not found")]
    RemittanceNotFound(Uuid),

    #[error("remittance {0} is verified and can no longer be edited")]
    AlreadyVerified(Uuid),

    #[error("remittance {id} was modified concurrently (expected version {expected}, found {actual})")]
    Conflict { id: Uuid, expected: u64, actual: u64 },

    #[error("deleting remittance {0} requires explicit confirmation")]
    ConfirmationRequired(Uuid),
}

impl TaxError {
    /// Whether the error stems from caller-supplied values.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TaxError::NegativeAmount { .. }
                | TaxError::NonPositiveAmount { .. }
                | TaxError::UnsupportedTaxYear { .. }
                | TaxError::InvalidPeriod(_)
                | TaxError::MalformedBrackets(_)
                | TaxError::MalformedSizeTable(_)
                | TaxError::InvalidRules { .. }
                | TaxError::MissingField(_)
                | TaxError::NotApplicable { .. }
        )
    }
}

/// Reject negative amounts at the boundary.
pub(crate) fn ensure_non_negative(field: &str, amount: Decimal) -> TaxResult<Decimal> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(TaxError::NegativeAmount {
            field: field.to_string(),
            amount,
        });
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn negative_amounts_are_rejected() {
        let err = ensure_non_negative("gross_income", dec!(-1)).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "gross_income must not be negative (got -1)");
    }

    #[test]
    fn negative_zero_is_accepted() {
        assert_eq!(ensure_non_negative("x", -Decimal::ZERO).unwrap(), Decimal::ZERO);
        assert_eq!(ensure_non_negative("x", dec!(10)).unwrap(), dec!(10));
    }

    #[test]
    fn input_required_is_not_a_validation_error() {
        assert!(!TaxError::InputRequired("income".into()).is_validation());
    }
}
