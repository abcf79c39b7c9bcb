//! Company size classification.
//!
//! One threshold table maps annual turnover to a size class.  The same
//! table decides both the corporate income tax rate and whether the
//! company is exempt from VAT, so the two checks can never disagree.

use crate::error::{ensure_non_negative, TaxError, TaxResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size class of a company, ordered from smallest to largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompanySize {
    /// Below the lowest threshold.  Usually exempt from CIT and VAT.
    Small,
    Medium,
    /// Above every bounded threshold.
    Large,
}

impl fmt::Display for CompanySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompanySize::Small => "small",
            CompanySize::Medium => "medium",
            CompanySize::Large => "large",
        };
        f.write_str(s)
    }
}

/// One row of the threshold table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeTier {
    /// Class assigned to turnover in this tier.
    pub size: CompanySize,
    /// Turnover strictly below this amount falls in the tier.  `None`
    /// on the last tier only.
    #[serde(default)]
    pub turnover_below: Option<Decimal>,
    /// Flat CIT rate applied to taxable profit, e.g. `0.30`.
    pub cit_rate: Decimal,
    /// Companies in this tier do not charge VAT.
    #[serde(default)]
    pub vat_exempt: bool,
}

/// What the table says about one company.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub size: CompanySize,
    pub cit_rate: Decimal,
    /// Whether any corporate income tax is due at all.
    pub cit_applies: bool,
    pub vat_exempt: bool,
}

/// Turnover thresholds ordered by ascending limit, ending with one
/// unbounded tier.  Validated on construction and on deserialisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<SizeTier>", into = "Vec<SizeTier>")]
pub struct SizeThresholds {
    tiers: Vec<SizeTier>,
}

impl SizeThresholds {
    pub fn new(tiers: Vec<SizeTier>) -> TaxResult<Self> {
        if tiers.is_empty() {
            return Err(invalid("size table is empty"));
        }
        for (idx, tier) in tiers.iter().enumerate() {
            if tier.cit_rate < Decimal::ZERO || tier.cit_rate > Decimal::ONE {
                return Err(invalid(format!(
                    "{} tier rate {} is outside 0-1",
                    tier.size, tier.cit_rate
                )));
            }
            let is_last = idx + 1 == tiers.len();
            if tier.turnover_below.is_none() != is_last {
                return Err(invalid("only the last tier may be open-ended"));
            }
            if let Some(prev) = idx.checked_sub(1).map(|i| tiers[i]) {
                if prev.size >= tier.size {
                    return Err(invalid("tiers must be ordered small to large"));
                }
                if let (Some(a), Some(b)) = (prev.turnover_below, tier.turnover_below) {
                    if b <= a {
                        return Err(invalid("turnover thresholds must ascend"));
                    }
                }
            }
        }
        Ok(SizeThresholds { tiers })
    }

    /// Wrap tiers known to be well-formed, such as built-in defaults.
    pub(crate) fn from_trusted(tiers: Vec<SizeTier>) -> Self {
        SizeThresholds { tiers }
    }

    pub fn tiers(&self) -> &[SizeTier] {
        &self.tiers
    }

    /// Classify a company by annual turnover.
    pub fn classify(&self, turnover: Decimal) -> TaxResult<Classification> {
        let turnover = ensure_non_negative("turnover", turnover)?;
        let tier = self
            .tiers
            .iter()
            .find(|tier| match tier.turnover_below {
                Some(limit) => turnover < limit,
                None => true,
            })
            .ok_or_else(|| invalid("no tier matched"))?;
        Ok(Classification {
            size: tier.size,
            cit_rate: tier.cit_rate,
            cit_applies: tier.cit_rate > Decimal::ZERO,
            vat_exempt: tier.vat_exempt,
        })
    }

    /// Turnover-based VAT exemption, read from the same table.
    pub fn is_vat_exempt(&self, turnover: Decimal) -> TaxResult<bool> {
        Ok(self.classify(turnover)?.vat_exempt)
    }
}

fn invalid(reason: impl Into<String>) -> TaxError {
    TaxError::MalformedSizeTable(reason.into())
}

impl TryFrom<Vec<SizeTier>> for SizeThresholds {
    type Error = TaxError;

    fn try_from(tiers: Vec<SizeTier>) -> Result<Self, Self::Error> {
        SizeThresholds::new(tiers)
    }
}

impl From<SizeThresholds> for Vec<SizeTier> {
    fn from(table: SizeThresholds) -> Self {
        table.tiers
    }
}
