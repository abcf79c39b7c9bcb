//! Tax rule sets and calculators.
//!
//! The `tax` module defines the [`TaxLaw`] rule set for a tax year, the
//! [`TaxLawBook`] that picks the rule set in effect for a period, and
//! the [`TaxCalculator`] trait implemented once for personal income tax
//! and once for corporate income tax.  Rule sets are stored externally
//! as JSON files, one per year.

use crate::brackets::{round_money, Bracket, BracketSlice, BracketTable};
use crate::cit::{CompanySize, SizeThresholds, SizeTier};
use crate::deductions::{self, ReliefRules};
use crate::error::{ensure_non_negative, TaxError, TaxResult};
use crate::models::{
    AccountKind, AppliedDeduction, ExemptionReason, IncomeFigure, IncomeSource, PeriodInputs,
    TaxKind, TaxPeriod, MIN_SUPPORTED_TAX_YEAR,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

fn default_vat_tolerance() -> Decimal {
    Decimal::ONE
}

/// The rule set for one tax year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxLaw {
    /// Free-form label for the jurisdiction, e.g. `"NG"`.
    pub jurisdiction: String,
    /// First tax year the rule set applies to.  It stays in effect until
    /// a later rule set supersedes it.
    pub tax_year: i32,
    /// Personal income tax brackets.  The exemption threshold is the
    /// leading 0% band of this table.
    pub brackets: BracketTable,
    /// Upper bound of the 0% band.  Must match the bracket table.
    pub exemption_threshold: Decimal,
    pub reliefs: ReliefRules,
    /// Turnover thresholds shared by CIT rates and VAT exemption.
    pub company_sizes: SizeThresholds,
    pub vat_rate: Decimal,
    /// Allowed variance between recorded and expected output VAT.
    #[serde(default = "default_vat_tolerance")]
    pub vat_tolerance: Decimal,
}

impl TaxLaw {
    /// The rule set shipped in `tax_laws/2026.json`, re-labelled for
    /// `tax_year`.
    pub fn baseline(tax_year: i32) -> TaxLaw {
        let band = |lower: Decimal, upper: Option<Decimal>, rate: Decimal| Bracket {
            lower,
            upper,
            rate,
        };
        TaxLaw {
            jurisdiction: "NG".to_string(),
            tax_year,
            brackets: BracketTable::from_trusted(vec![
                band(dec!(0), Some(dec!(800000)), dec!(0)),
                band(dec!(800000), Some(dec!(3000000)), dec!(0.15)),
                band(dec!(3000000), Some(dec!(12000000)), dec!(0.18)),
                band(dec!(12000000), Some(dec!(25000000)), dec!(0.21)),
                band(dec!(25000000), Some(dec!(50000000)), dec!(0.23)),
                band(dec!(50000000), None, dec!(0.25)),
            ]),
            exemption_threshold: dec!(800000),
            reliefs: ReliefRules {
                rent_relief_rate: dec!(0.20),
                rent_relief_cap: dec!(500000),
                nhf_rate: Some(dec!(0.025)),
            },
            company_sizes: SizeThresholds::from_trusted(vec![
                SizeTier {
                    size: CompanySize::Small,
                    turnover_below: Some(dec!(25000000)),
                    cit_rate: dec!(0),
                    vat_exempt: true,
                },
                SizeTier {
                    size: CompanySize::Medium,
                    turnover_below: Some(dec!(100000000)),
                    cit_rate: dec!(0.20),
                    vat_exempt: false,
                },
                SizeTier {
                    size: CompanySize::Large,
                    turnover_below: None,
                    cit_rate: dec!(0.30),
                    vat_exempt: false,
                },
            ]),
            vat_rate: dec!(0.075),
            vat_tolerance: Decimal::ONE,
        }
    }

    /// Check the parts of the rule set that the component types cannot
    /// check on their own.
    pub fn validate(&self) -> TaxResult<()> {
        let invalid = |reason: String| TaxError::InvalidRules {
            year: self.tax_year,
            reason,
        };
        if self.tax_year < MIN_SUPPORTED_TAX_YEAR {
            return Err(TaxError::UnsupportedTaxYear {
                year: self.tax_year,
                minimum: MIN_SUPPORTED_TAX_YEAR,
            });
        }
        if self.exemption_threshold != self.brackets.zero_rate_band() {
            return Err(invalid(format!(
                "exemption threshold {} must equal the 0% band of the bracket table ({})",
                self.exemption_threshold,
                self.brackets.zero_rate_band()
            )));
        }
        let non_negative = [
            ("rent_relief_rate", self.reliefs.rent_relief_rate),
            ("rent_relief_cap", self.reliefs.rent_relief_cap),
            ("nhf_rate", self.reliefs.nhf_rate.unwrap_or_default()),
            ("vat_rate", self.vat_rate),
            ("vat_tolerance", self.vat_tolerance),
        ];
        for (field, value) in non_negative {
            if value < Decimal::ZERO {
                return Err(invalid(format!("{field} must not be negative")));
            }
        }
        let rates = [
            ("vat_rate", Some(self.vat_rate)),
            ("rent_relief_rate", Some(self.reliefs.rent_relief_rate)),
            ("nhf_rate", self.reliefs.nhf_rate),
        ];
        for (field, rate) in rates {
            if rate.is_some_and(|rate| rate > Decimal::ONE) {
                return Err(invalid(format!("{field} must not exceed 1")));
            }
        }
        Ok(())
    }
}

/// Rule sets indexed by the year they take effect.
#[derive(Debug, Clone, Default)]
pub struct TaxLawBook {
    laws: BTreeMap<i32, TaxLaw>,
}

impl TaxLawBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a book from already-loaded laws.  Later entries for the
    /// same year replace earlier ones.
    pub fn from_laws(laws: impl IntoIterator<Item = TaxLaw>) -> TaxResult<Self> {
        let mut book = TaxLawBook::new();
        for law in laws {
            book.insert(law)?;
        }
        Ok(book)
    }

    pub fn insert(&mut self, law: TaxLaw) -> TaxResult<()> {
        law.validate()?;
        self.laws.insert(law.tax_year, law);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.laws.is_empty()
    }

    pub fn years(&self) -> impl Iterator<Item = i32> + '_ {
        self.laws.keys().copied()
    }

    /// The rule set in effect for `tax_year`: the latest one that took
    /// effect in or before that year.
    pub fn law_for(&self, tax_year: i32) -> TaxResult<&TaxLaw> {
        if tax_year < MIN_SUPPORTED_TAX_YEAR {
            return Err(TaxError::UnsupportedTaxYear {
                year: tax_year,
                minimum: MIN_SUPPORTED_TAX_YEAR,
            });
        }
        self.laws
            .range(..=tax_year)
            .next_back()
            .map(|(_, law)| law)
            .ok_or(TaxError::NoRulesForYear(tax_year))
    }
}

/// Load all rule sets from a directory.
///
/// Every `.json` file is parsed as a [`TaxLaw`].  Files that fail to
/// parse or validate are skipped with a warning so one bad file does
/// not take the others down.  Files are read in name order.
pub fn load_tax_laws_from_dir(path: &Path) -> anyhow::Result<Vec<TaxLaw>> {
    let mut laws = Vec::new();
    if !path.is_dir() {
        tracing::warn!(path = %path.display(), "tax law directory not found");
        return Ok(laws);
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let file = entry.path();
        if entry.file_type()?.is_file() && file.extension().is_some_and(|ext| ext == "json") {
            files.push(file);
        }
    }
    files.sort();

    for file in files {
        let data = std::fs::read_to_string(&file)?;
        let law = match serde_json::from_str::<TaxLaw>(&data) {
            Ok(law) => law,
            Err(err) => {
                tracing::warn!(file = %file.display(), error = %err, "failed to parse tax law");
                continue;
            }
        };
        if let Err(err) = law.validate() {
            tracing::warn!(file = %file.display(), error = %err, "rejected tax law");
            continue;
        }
        tracing::debug!(file = %file.display(), tax_year = law.tax_year, "loaded tax law");
        laws.push(law);
    }
    Ok(laws)
}

/// Sum a period's income figures.
///
/// No figures at all is "input required", not zero income: the caller
/// has to supply an explicit zero figure if that is what it means.
pub fn gross_income(figures: &[IncomeFigure]) -> TaxResult<Decimal> {
    if figures.is_empty() {
        return Err(TaxError::InputRequired("income".into()));
    }
    let mut total = Decimal::ZERO;
    for figure in figures {
        if figure.source == IncomeSource::Other
            && figure.description.as_deref().map_or(true, |d| d.trim().is_empty())
        {
            return Err(TaxError::MissingField("income.description".into()));
        }
        total += ensure_non_negative("income", figure.amount)?;
    }
    Ok(total)
}

/// Income tax liability before credits, with the figures that led to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub gross_income: Decimal,
    pub deductions: Vec<AppliedDeduction>,
    pub total_deductions: Decimal,
    pub taxable_income: Decimal,
    pub brackets: Vec<BracketSlice>,
    pub classification: Option<CompanySize>,
    pub liability: Decimal,
    pub fully_exempt: bool,
    pub exemption_reason: Option<ExemptionReason>,
}

/// A tax calculator turns a period's inputs into an income tax
/// liability.  One implementation exists per kind of income tax.
///
/// Calculators must be thread-safe (`Send + Sync`) because the engine
/// may invoke them concurrently across multiple threads.
pub trait TaxCalculator: Send + Sync {
    /// The obligation this calculator assesses.
    fn kind(&self) -> TaxKind;

    /// Assess `inputs` for `period` under `law`.
    fn assess(&self, period: &TaxPeriod, inputs: &PeriodInputs, law: &TaxLaw)
        -> TaxResult<Assessment>;
}

/// Progressive personal income tax for individuals and businesses.
pub struct PersonalIncomeTax;

impl TaxCalculator for PersonalIncomeTax {
    fn kind(&self) -> TaxKind {
        TaxKind::Pit
    }

    fn assess(
        &self,
        period: &TaxPeriod,
        inputs: &PeriodInputs,
        law: &TaxLaw,
    ) -> TaxResult<Assessment> {
        let gross = gross_income(&inputs.income)?;
        let divisor = period.periods_per_year();
        let table = law.brackets.scaled(divisor);
        let reliefs = law.reliefs.scaled(divisor);

        let outcome = deductions::aggregate(
            gross,
            &inputs.deductions,
            inputs.account_kind,
            &reliefs,
            table.zero_rate_band(),
        )?;
        let tax = table.compute(outcome.taxable_income)?;

        Ok(Assessment {
            gross_income: gross,
            deductions: outcome.applied,
            total_deductions: outcome.total,
            taxable_income: outcome.taxable_income,
            brackets: tax.slices,
            classification: None,
            liability: tax.total,
            fully_exempt: outcome.fully_exempt,
            exemption_reason: outcome.exemption_reason,
        })
    }
}

/// Flat-rate corporate income tax chosen by company size.
pub struct CompanyIncomeTax;

impl TaxCalculator for CompanyIncomeTax {
    fn kind(&self) -> TaxKind {
        TaxKind::Cit
    }

    fn assess(
        &self,
        period: &TaxPeriod,
        inputs: &PeriodInputs,
        law: &TaxLaw,
    ) -> TaxResult<Assessment> {
        if !period.is_annual() {
            return Err(TaxError::InvalidPeriod(
                "corporate income tax is assessed on annual periods only".into(),
            ));
        }
        let gross = gross_income(&inputs.income)?;
        let turnover = inputs
            .turnover
            .ok_or_else(|| TaxError::InputRequired("turnover".into()))?;
        let class = law.company_sizes.classify(turnover)?;

        let outcome = deductions::aggregate(
            gross,
            &inputs.deductions,
            AccountKind::Company,
            &law.reliefs,
            Decimal::ZERO,
        )?;

        let liability = if class.cit_applies {
            round_money(outcome.taxable_income * class.cit_rate)
        } else {
            Decimal::ZERO
        };
        let (fully_exempt, exemption_reason) = if class.cit_applies {
            (outcome.fully_exempt, outcome.exemption_reason)
        } else {
            (true, Some(ExemptionReason::SmallCompany))
        };

        Ok(Assessment {
            gross_income: gross,
            deductions: outcome.applied,
            total_deductions: outcome.total,
            taxable_income: outcome.taxable_income,
            brackets: Vec::new(),
            classification: Some(class.size),
            liability,
            fully_exempt,
            exemption_reason,
        })
    }
}

static PERSONAL: PersonalIncomeTax = PersonalIncomeTax;
static COMPANY: CompanyIncomeTax = CompanyIncomeTax;

/// The calculator for an account's income tax.
pub fn calculator_for(account: AccountKind) -> &'static dyn TaxCalculator {
    match account {
        AccountKind::Individual | AccountKind::Business => &PERSONAL,
        AccountKind::Company => &COMPANY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeductionEntry, DeductionKind};
    use std::io::Write;

    fn scenario_law() -> TaxLaw {
        TaxLaw {
            brackets: BracketTable::new(vec![
                Bracket::new(dec!(0), Some(dec!(800000)), dec!(0)),
                Bracket::new(dec!(800000), Some(dec!(3000000)), dec!(0.15)),
                Bracket::new(dec!(3000000), None, dec!(0.19)),
            ])
            .unwrap(),
            ..TaxLaw::baseline(2026)
        }
    }

    fn employee(gross: Decimal) -> PeriodInputs {
        PeriodInputs {
            income: vec![IncomeFigure::new(IncomeSource::Employment, gross)],
            ..PeriodInputs::new(AccountKind::Individual)
        }
    }

    #[test]
    fn baseline_is_valid() {
        TaxLaw::baseline(2026).validate().unwrap();
    }

    #[test]
    fn shipped_rule_file_matches_baseline() {
        let data = include_str!("../tax_laws/2026.json");
        let law: TaxLaw = serde_json::from_str(data).unwrap();
        assert_eq!(law, TaxLaw::baseline(2026));
    }

    #[test]
    fn threshold_must_match_zero_band() {
        let law = TaxLaw {
            exemption_threshold: dec!(700000),
            ..TaxLaw::baseline(2026)
        };
        assert!(matches!(law.validate(), Err(TaxError::InvalidRules { .. })));
    }

    #[test]
    fn rates_above_one_are_rejected() {
        let mut law = TaxLaw::baseline(2026);
        law.reliefs.nhf_rate = Some(dec!(1.5));
        let err = law.validate().unwrap_err();
        assert_eq!(
            err,
            TaxError::InvalidRules {
                year: 2026,
                reason: "nhf_rate must not exceed 1".into()
            }
        );

        law.reliefs.nhf_rate = None;
        law.validate().unwrap();
        law.vat_rate = dec!(2);
        assert!(matches!(law.validate(), Err(TaxError::InvalidRules { .. })));
    }

    #[test]
    fn book_picks_rules_in_effect() {
        let book = TaxLawBook::from_laws([TaxLaw::baseline(2026), TaxLaw::baseline(2028)]).unwrap();
        assert_eq!(book.law_for(2026).unwrap().tax_year, 2026);
        assert_eq!(book.law_for(2027).unwrap().tax_year, 2026);
        assert_eq!(book.law_for(2031).unwrap().tax_year, 2028);
        assert!(matches!(
            book.law_for(2025),
            Err(TaxError::UnsupportedTaxYear { .. })
        ));
        let later = TaxLawBook::from_laws([TaxLaw::baseline(2028)]).unwrap();
        assert_eq!(later.law_for(2027).unwrap_err(), TaxError::NoRulesForYear(2027));
    }

    #[test]
    fn laws_before_cutoff_are_rejected() {
        assert!(TaxLawBook::from_laws([TaxLaw::baseline(2024)]).is_err());
    }

    #[test]
    fn load_from_directory_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = serde_json::to_string(&TaxLaw::baseline(2027)).unwrap();
        std::fs::write(dir.path().join("2027.json"), good).unwrap();
        let mut bad = std::fs::File::create(dir.path().join("broken.json")).unwrap();
        bad.write_all(b"{ not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let laws = load_tax_laws_from_dir(dir.path()).unwrap();
        assert_eq!(laws.len(), 1);
        assert_eq!(laws[0].tax_year, 2027);
    }

    #[test]
    fn missing_directory_yields_nothing() {
        let laws = load_tax_laws_from_dir(Path::new("/definitely/not/here")).unwrap();
        assert!(laws.is_empty());
    }

    #[test]
    fn gross_income_requires_figures() {
        assert_eq!(
            gross_income(&[]).unwrap_err(),
            TaxError::InputRequired("income".into())
        );
        let undescribed = IncomeFigure {
            source: IncomeSource::Other,
            amount: dec!(10),
            description: Some(" ".into()),
        };
        assert_eq!(
            gross_income(&[undescribed]).unwrap_err(),
            TaxError::MissingField("income.description".into())
        );
        let figures = [
            IncomeFigure::new(IncomeSource::Employment, dec!(100)),
            IncomeFigure::other(dec!(50), "royalties"),
        ];
        assert_eq!(gross_income(&figures).unwrap(), dec!(150));
    }

    #[test]
    fn personal_income_tax_scenario() {
        let period = TaxPeriod::annual("acct-1", 2026).unwrap();
        let mut inputs = employee(dec!(5000000));
        inputs.deductions = vec![
            DeductionEntry::new(DeductionKind::Pension, dec!(400000)),
            DeductionEntry::new(DeductionKind::NationalHousingFund, dec!(125000)),
        ];
        let assessment = PersonalIncomeTax
            .assess(&period, &inputs, &scenario_law())
            .unwrap();
        assert_eq!(assessment.taxable_income, dec!(4475000));
        assert_eq!(assessment.liability, dec!(610250));
        assert_eq!(assessment.brackets.len(), 3);
    }

    #[test]
    fn monthly_period_uses_scaled_band() {
        let period = TaxPeriod::monthly("acct-1", 2026, 1).unwrap();
        let assessment = PersonalIncomeTax
            .assess(&period, &employee(dec!(60000)), &scenario_law())
            .unwrap();
        assert!(assessment.fully_exempt);
        assert_eq!(assessment.liability, Decimal::ZERO);
        assert_eq!(
            assessment.exemption_reason,
            Some(ExemptionReason::IncomeBelowThreshold)
        );
    }

    #[test]
    fn monthly_rent_relief_adds_up_to_the_annual_relief() {
        let with_rent = |gross: Decimal, rent: Decimal| PeriodInputs {
            deductions: vec![DeductionEntry::new(DeductionKind::RentRelief, rent)],
            ..employee(gross)
        };
        let law = scenario_law();

        let annual = TaxPeriod::annual("acct-1", 2026).unwrap();
        let year = PersonalIncomeTax
            .assess(&annual, &with_rent(dec!(6000000), dec!(1200000)), &law)
            .unwrap();
        assert_eq!(year.total_deductions, dec!(240000));

        let months: Decimal = (1..=12)
            .map(|month| {
                let period = TaxPeriod::monthly("acct-1", 2026, month).unwrap();
                PersonalIncomeTax
                    .assess(&period, &with_rent(dec!(500000), dec!(100000)), &law)
                    .unwrap()
                    .total_deductions
            })
            .sum();
        assert_eq!(months, year.total_deductions);

        // a large rent hits the monthly cap every month but stays under
        // the annual cap in total
        let capped: Decimal = (1..=12)
            .map(|month| {
                let period = TaxPeriod::monthly("acct-1", 2026, month).unwrap();
                PersonalIncomeTax
                    .assess(&period, &with_rent(dec!(500000), dec!(1200000)), &law)
                    .unwrap()
                    .total_deductions
            })
            .sum();
        assert!(capped <= law.reliefs.rent_relief_cap);
    }

    #[test]
    fn company_tax_by_size() {
        let period = TaxPeriod::annual("co-1", 2026).unwrap();
        let law = TaxLaw::baseline(2026);
        let mut inputs = PeriodInputs {
            income: vec![IncomeFigure::new(IncomeSource::BusinessRevenue, dec!(60000000))],
            deductions: vec![DeductionEntry::new(DeductionKind::BusinessExpense, dec!(40000000))],
            turnover: Some(dec!(60000000)),
            ..PeriodInputs::new(AccountKind::Company)
        };
        let medium = CompanyIncomeTax.assess(&period, &inputs, &law).unwrap();
        assert_eq!(medium.classification, Some(CompanySize::Medium));
        assert_eq!(medium.taxable_income, dec!(20000000));
        assert_eq!(medium.liability, dec!(4000000));
        assert!(!medium.fully_exempt);

        inputs.turnover = Some(dec!(20000000));
        let small = CompanyIncomeTax.assess(&period, &inputs, &law).unwrap();
        assert_eq!(small.liability, Decimal::ZERO);
        assert_eq!(small.exemption_reason, Some(ExemptionReason::SmallCompany));
    }

    #[test]
    fn company_needs_turnover_and_annual_period() {
        let law = TaxLaw::baseline(2026);
        let inputs = PeriodInputs {
            income: vec![IncomeFigure::new(IncomeSource::BusinessRevenue, dec!(1))],
            ..PeriodInputs::new(AccountKind::Company)
        };
        let annual = TaxPeriod::annual("co-1", 2026).unwrap();
        assert_eq!(
            CompanyIncomeTax.assess(&annual, &inputs, &law).unwrap_err(),
            TaxError::InputRequired("turnover".into())
        );
        let monthly = TaxPeriod::monthly("co-1", 2026, 5).unwrap();
        assert!(matches!(
            CompanyIncomeTax.assess(&monthly, &inputs, &law),
            Err(TaxError::InvalidPeriod(_))
        ));
    }

    #[test]
    fn companies_cannot_claim_personal_reliefs() {
        let law = TaxLaw::baseline(2026);
        let inputs = PeriodInputs {
            income: vec![IncomeFigure::new(IncomeSource::BusinessRevenue, dec!(50000000))],
            deductions: vec![DeductionEntry::new(DeductionKind::Pension, dec!(1))],
            turnover: Some(dec!(50000000)),
            ..PeriodInputs::new(AccountKind::Company)
        };
        let period = TaxPeriod::annual("co-1", 2026).unwrap();
        assert!(matches!(
            CompanyIncomeTax.assess(&period, &inputs, &law),
            Err(TaxError::NotApplicable { .. })
        ));
    }

    #[test]
    fn calculator_selection() {
        assert_eq!(calculator_for(AccountKind::Individual).kind(), TaxKind::Pit);
        assert_eq!(calculator_for(AccountKind::Business).kind(), TaxKind::Pit);
        assert_eq!(calculator_for(AccountKind::Company).kind(), TaxKind::Cit);
    }
}
