//! Progressive bracket arithmetic.
//!
//! A [`BracketTable`] is an ordered, gap-free sequence of marginal
//! rates.  Tables are validated once on construction (or when
//! deserialised), so [`BracketTable::compute`] only has to walk them.

use crate::error::{ensure_non_negative, TaxError, TaxResult};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Round a monetary amount to two decimal places.
pub(crate) fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// A contiguous income range taxed at a single marginal rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bracket {
    pub lower: Decimal,
    /// `None` marks the open-ended top bracket.
    #[serde(default)]
    pub upper: Option<Decimal>,
    pub rate: Decimal,
}

impl Bracket {
    pub fn new(lower: Decimal, upper: Option<Decimal>, rate: Decimal) -> Self {
        Bracket { lower, upper, rate }
    }

    fn width(&self) -> Option<Decimal> {
        self.upper.map(|upper| upper - self.lower)
    }
}

/// The portion of income that fell into one bracket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BracketSlice {
    pub lower: Decimal,
    #[serde(default)]
    pub upper: Option<Decimal>,
    pub rate: Decimal,
    /// Income taxed within this bracket.
    pub amount: Decimal,
    /// Tax contributed by this bracket, rounded to two places.
    pub tax: Decimal,
}

/// Total tax with its per-bracket breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BracketTax {
    pub total: Decimal,
    pub slices: Vec<BracketSlice>,
}

/// Ordered, non-overlapping, gap-free brackets starting at zero and
/// ending with an unbounded bracket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Bracket>", into = "Vec<Bracket>")]
pub struct BracketTable {
    brackets: Vec<Bracket>,
}

impl BracketTable {
    pub fn new(brackets: Vec<Bracket>) -> TaxResult<Self> {
        let first = brackets
            .first()
            .ok_or_else(|| TaxError::MalformedBrackets("table is empty".into()))?;
        if !first.lower.is_zero() {
            return Err(TaxError::MalformedBrackets(format!(
                "first bracket must start at 0, not {}",
                first.lower
            )));
        }

        for (idx, bracket) in brackets.iter().enumerate() {
            if bracket.rate < Decimal::ZERO || bracket.rate > Decimal::ONE {
                return Err(TaxError::MalformedBrackets(format!(
                    "bracket {idx} has rate {} outside 0-1",
                    bracket.rate
                )));
            }
            let is_last = idx + 1 == brackets.len();
            match (bracket.upper, is_last) {
                (None, true) => {}
                (None, false) => {
                    return Err(TaxError::MalformedBrackets(format!(
                        "bracket {idx} is unbounded but is not the last bracket"
                    )));
                }
                (Some(_), true) => {
                    return Err(TaxError::MalformedBrackets(
                        "last bracket must be unbounded".into(),
                    ));
                }
                (Some(upper), false) => {
                    if upper <= bracket.lower {
                        return Err(TaxError::MalformedBrackets(format!(
                            "bracket {idx} upper bound {upper} is not above its lower bound {}",
                            bracket.lower
                        )));
                    }
                    let next = brackets[idx + 1].lower;
                    if next != upper {
                        return Err(TaxError::MalformedBrackets(format!(
                            "bracket {} starts at {next} but bracket {idx} ends at {upper}",
                            idx + 1
                        )));
                    }
                }
            }
        }

        Ok(BracketTable { brackets })
    }

    /// Wrap brackets known to be well-formed, such as built-in defaults.
    pub(crate) fn from_trusted(brackets: Vec<Bracket>) -> Self {
        BracketTable { brackets }
    }

    pub fn brackets(&self) -> &[Bracket] {
        &self.brackets
    }

    /// Upper bound of a leading 0% bracket, or zero when the table has
    /// no such band.
    pub fn zero_rate_band(&self) -> Decimal {
        match self.brackets.first() {
            Some(first) if first.rate.is_zero() => first.upper.unwrap_or(Decimal::ZERO),
            _ => Decimal::ZERO,
        }
    }

    /// Divide every bound by `divisor`, e.g. 12 to obtain a monthly table
    /// from an annual one.
    pub fn scaled(&self, divisor: u32) -> BracketTable {
        if divisor <= 1 {
            return self.clone();
        }
        let divisor = Decimal::from(divisor);
        let brackets = self
            .brackets
            .iter()
            .map(|b| Bracket {
                lower: b.lower / divisor,
                upper: b.upper.map(|upper| upper / divisor),
                rate: b.rate,
            })
            .collect();
        BracketTable { brackets }
    }

    /// Compute tax on a non-negative taxable income.
    ///
    /// Income exactly equal to a bracket's upper bound is taxed entirely
    /// within that bracket; the next bracket is not touched.
    pub fn compute(&self, taxable_income: Decimal) -> TaxResult<BracketTax> {
        let mut remaining = ensure_non_negative("taxable_income", taxable_income)?;
        let mut slices = Vec::new();
        let mut total = Decimal::ZERO;

        for bracket in &self.brackets {
            if remaining <= Decimal::ZERO {
                break;
            }
            let amount = match bracket.width() {
                Some(width) => remaining.min(width),
                None => remaining,
            };
            let tax = round_money(amount * bracket.rate);
            slices.push(BracketSlice {
                lower: bracket.lower,
                upper: bracket.upper,
                rate: bracket.rate,
                amount,
                tax,
            });
            total += tax;
            remaining -= amount;
        }

        Ok(BracketTax { total, slices })
    }
}

impl TryFrom<Vec<Bracket>> for BracketTable {
    type Error = TaxError;

    fn try_from(brackets: Vec<Bracket>) -> Result<Self, Self::Error> {
        BracketTable::new(brackets)
    }
}

impl From<BracketTable> for Vec<Bracket> {
    fn from(table: BracketTable) -> Self {
        table.brackets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn three_band() -> BracketTable {
        BracketTable::new(vec![
            Bracket::new(dec!(0), Some(dec!(800000)), dec!(0)),
            Bracket::new(dec!(800000), Some(dec!(3000000)), dec!(0.15)),
            Bracket::new(dec!(3000000), None, dec!(0.19)),
        ])
        .unwrap()
    }

    #[test]
    fn marginal_rates_accumulate() {
        let result = three_band().compute(dec!(4475000)).unwrap();
        assert_eq!(result.total, dec!(610250));
        assert_eq!(result.slices.len(), 3);
        assert_eq!(result.slices[1].tax, dec!(330000));
        assert_eq!(result.slices[2].amount, dec!(1475000));
        assert_eq!(result.slices[2].tax, dec!(280250));
    }

    #[test]
    fn income_within_a_bracket_matches_closed_form() {
        let table = three_band();
        for income in [dec!(800001), dec!(1234567.89), dec!(2999999.99)] {
            let expected = round_money((income - dec!(800000)) * dec!(0.15));
            assert_eq!(table.compute(income).unwrap().total, expected);
        }
        let above = dec!(7250000);
        let expected = dec!(330000) + round_money((above - dec!(3000000)) * dec!(0.19));
        assert_eq!(table.compute(above).unwrap().total, expected);
    }

    #[test]
    fn upper_bound_stays_in_its_bracket() {
        let result = three_band().compute(dec!(3000000)).unwrap();
        assert_eq!(result.total, dec!(330000));
        assert_eq!(result.slices.len(), 2);
        assert_eq!(result.slices.last().unwrap().upper, Some(dec!(3000000)));
    }

    #[test]
    fn zero_income_has_empty_breakdown() {
        let result = three_band().compute(Decimal::ZERO).unwrap();
        assert_eq!(result.total, Decimal::ZERO);
        assert!(result.slices.is_empty());
    }

    #[test]
    fn negative_income_is_rejected() {
        let err = three_band().compute(dec!(-0.01)).unwrap_err();
        assert!(matches!(err, TaxError::NegativeAmount { .. }));
    }

    #[test]
    fn malformed_tables_are_rejected() {
        assert!(BracketTable::new(vec![]).is_err());
        // gap
        assert!(BracketTable::new(vec![
            Bracket::new(dec!(0), Some(dec!(100)), dec!(0)),
            Bracket::new(dec!(150), None, dec!(0.1)),
        ])
        .is_err());
        // bounded top
        assert!(BracketTable::new(vec![Bracket::new(dec!(0), Some(dec!(100)), dec!(0.1))]).is_err());
        // unbounded middle
        assert!(BracketTable::new(vec![
            Bracket::new(dec!(0), None, dec!(0)),
            Bracket::new(dec!(100), None, dec!(0.1)),
        ])
        .is_err());
        // rate above 100%
        assert!(BracketTable::new(vec![Bracket::new(dec!(0), None, dec!(1.5))]).is_err());
        // not starting at zero
        assert!(BracketTable::new(vec![Bracket::new(dec!(10), None, dec!(0.1))]).is_err());
    }

    #[test]
    fn deserialisation_validates() {
        let bad = r#"[{"lower":"0","upper":"100","rate":"0.1"}]"#;
        assert!(serde_json::from_str::<BracketTable>(bad).is_err());
        let good = r#"[{"lower":"0","upper":"100","rate":"0"},{"lower":"100","rate":"0.1"}]"#;
        let table: BracketTable = serde_json::from_str(good).unwrap();
        assert_eq!(table.zero_rate_band(), dec!(100));
    }

    #[test]
    fn monthly_scaling_divides_bounds() {
        let monthly = three_band().scaled(12);
        assert_eq!(monthly.brackets()[2].lower, dec!(250000));
        // 12x the monthly tax on 1/12 of the income matches the annual tax
        let annual = three_band().compute(dec!(4800000)).unwrap().total;
        let month = monthly.compute(dec!(400000)).unwrap().total;
        assert_eq!(month * dec!(12), annual);
    }
}
