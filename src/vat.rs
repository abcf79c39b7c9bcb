//! Net VAT position for a period.

use crate::brackets::round_money;
use crate::error::{ensure_non_negative, TaxResult};
use crate::models::VatFigures;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which way the period's VAT obligation points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VatStanding {
    /// Output exceeds input; the difference is owed.
    Payable,
    /// Input exceeds output; the difference is reclaimable.
    Refundable,
    /// Output and input cancel out.
    Nil,
    /// Turnover exempts the account; nothing is owed.
    Exempt,
}

/// Output and input VAT for a period and the resulting net figure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VatPosition {
    /// VAT charged on sales.
    pub output_vat: Decimal,
    /// VAT paid on purchases.
    pub input_vat: Decimal,
    /// `output - input`, sign preserved.  Zero when exempt.
    pub net_vat: Decimal,
    pub standing: VatStanding,
    /// Recorded output VAT disagrees with VAT-able sales beyond the
    /// rule set's tolerance.
    #[serde(default)]
    pub mismatch: bool,
}

impl VatPosition {
    /// Amount owed to the revenue authority, never negative.
    pub fn amount_payable(&self) -> Decimal {
        match self.standing {
            VatStanding::Payable => self.net_vat,
            _ => Decimal::ZERO,
        }
    }
}

/// Net output VAT against input VAT.
///
/// The sign of `net_vat` is kept: a negative figure is a refundable
/// position, not an error.  An exempt account still reports both
/// figures but owes nothing.
pub fn net_position(figures: &VatFigures, exempt: bool) -> TaxResult<VatPosition> {
    let output_vat = ensure_non_negative("output_vat", figures.output_vat)?;
    let input_vat = ensure_non_negative("input_vat", figures.input_vat)?;

    if exempt {
        return Ok(VatPosition {
            output_vat,
            input_vat,
            net_vat: Decimal::ZERO,
            standing: VatStanding::Exempt,
            mismatch: false,
        });
    }

    let net_vat = output_vat - input_vat;
    let standing = if net_vat > Decimal::ZERO {
        VatStanding::Payable
    } else if net_vat < Decimal::ZERO {
        VatStanding::Refundable
    } else {
        VatStanding::Nil
    };
    Ok(VatPosition {
        output_vat,
        input_vat,
        net_vat,
        standing,
        mismatch: false,
    })
}

/// Distance between recorded output VAT and what the VAT-able sales
/// imply at `vat_rate`.  `None` when sales were not supplied.
pub fn output_variance(figures: &VatFigures, vat_rate: Decimal) -> Option<Decimal> {
    figures
        .vatable_sales
        .map(|sales| (figures.output_vat - round_money(sales * vat_rate)).abs())
}

/// Whether recorded output VAT disagrees with sales beyond `tolerance`.
pub fn mismatch_exceeds(figures: &VatFigures, vat_rate: Decimal, tolerance: Decimal) -> bool {
    output_variance(figures, vat_rate).map_or(false, |variance| variance > tolerance)
}
