//! Natural-history rates by age, HIV status and time on ART.
//!
//! The HIV-negative rates come straight from the age-specific parameters, with BCG
//! lowering the primary-disease proportion in children. HIV raises the risk of primary
//! and reactivation disease and weakens protection from prior infection in proportion
//! to how far the CD4 category sits below 500. ART then claws part of that back, but
//! never past the HIV-negative value: risks on ART are bounded below and protection
//! above by the HIV-negative baseline, and TB mortality on ART is bounded below by the
//! HIV-negative age-specific rate.

use crate::layout::{DiseaseState, Smear, Stratum, NUM_ART_DURATIONS, NUM_CD4, NUM_STATES};
use crate::numeric::clamp_probability;
use crate::parameters::Parameters;

/// Mid-point CD4 count of each untreated CD4 category, best first.
pub const CD4_MID_POINTS: [f64; NUM_CD4] = [500.0, 425.0, 300.0, 225.0, 150.0, 75.0, 25.0];

/// TB natural-history rates for one stratum at one age.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TbRates {
    /// Proportion of new infections progressing directly to disease
    pub primary_disease: f64,
    pub reactivation: f64,
    pub protection: f64,
    pub smear_positive: f64,
    pub smear_conversion: f64,
    pub self_cure: f64,
    pub mortality_smear_negative: f64,
    pub mortality_smear_positive: f64,
}

impl TbRates {
    /// TB mortality hazard for a disease state; zero outside active disease.
    #[inline]
    #[must_use]
    pub fn mortality(&self, state: DiseaseState) -> f64 {
        match state.smear() {
            Some(Smear::Negative) => self.mortality_smear_negative,
            Some(Smear::Positive) => self.mortality_smear_positive,
            None => 0.0,
        }
    }

    /// TB deaths per unit time in one cell.
    #[must_use]
    pub fn tb_deaths(&self, cell: &[f64; NUM_STATES]) -> f64 {
        use DiseaseState::*;
        let smear_negative = cell[SmearNegDsNaive.index()]
            + cell[SmearNegDsTreated.index()]
            + cell[SmearNegDrNaive.index()]
            + cell[SmearNegDrTreated.index()];
        let smear_positive = cell[SmearPosDsNaive.index()]
            + cell[SmearPosDsTreated.index()]
            + cell[SmearPosDrNaive.index()]
            + cell[SmearPosDrTreated.index()];
        smear_negative * self.mortality_smear_negative
            + smear_positive * self.mortality_smear_positive
    }
}

/// Rates for every stratum at a single age.
#[derive(Debug, Clone, PartialEq)]
pub struct AgeRates {
    pub hiv_negative: TbRates,
    pub hiv_positive: [TbRates; NUM_CD4],
    pub on_art: [[TbRates; NUM_ART_DURATIONS]; NUM_CD4],
}

impl AgeRates {
    #[inline]
    #[must_use]
    pub fn for_stratum(&self, stratum: Stratum) -> &TbRates {
        match stratum {
            Stratum::HivNegative => &self.hiv_negative,
            Stratum::HivPositive { cd4 } => &self.hiv_positive[cd4],
            Stratum::OnArt { cd4, duration } => &self.on_art[cd4][duration],
        }
    }
}

/// Derives [`AgeRates`] from the parameters and the current BCG coverage.
#[derive(Debug, Clone, Copy)]
pub struct NaturalHistory<'a> {
    parameters: &'a Parameters,
    /// Relative risk of primary disease in children given BCG coverage
    bcg_factor: f64,
}

impl<'a> NaturalHistory<'a> {
    #[must_use]
    pub fn new(parameters: &'a Parameters, bcg_coverage: f64) -> Self {
        let bcg_factor =
            bcg_coverage * (1.0 - parameters.bcg_efficacy) + (1.0 - bcg_coverage);
        NaturalHistory {
            parameters,
            bcg_factor,
        }
    }

    /// HIV-negative rates at `age`.
    #[must_use]
    pub fn hiv_negative(&self, age: usize) -> TbRates {
        let p = self.parameters;
        let primary = p.primary_disease.at_age(age);
        TbRates {
            primary_disease: if age < 15 {
                primary * self.bcg_factor
            } else {
                primary
            },
            reactivation: p.reactivation,
            protection: p.protection,
            smear_positive: p.smear_positive.at_age(age),
            smear_conversion: p.smear_conversion,
            self_cure: p.self_cure,
            mortality_smear_negative: p.mortality_smear_negative.at_age(age),
            mortality_smear_positive: p.mortality_smear_positive.at_age(age),
        }
    }

    /// Untreated HIV-positive rates, given the HIV-negative rates at the same age.
    #[must_use]
    pub fn hiv_positive(&self, baseline: &TbRates, cd4: usize) -> TbRates {
        let p = self.parameters;
        let mid = CD4_MID_POINTS[cd4];
        TbRates {
            primary_disease: clamp_probability(
                baseline.primary_disease * p.rr_primary_disease.at(mid, 1.0),
            ),
            reactivation: baseline.reactivation * p.rr_reactivation.at(mid, 1.0),
            protection: clamp_probability(p.protection * p.rr_protection.at(mid, -1.0)),
            smear_positive: p.smear_positive_hiv,
            smear_conversion: p.smear_conversion_hiv,
            self_cure: p.self_cure_hiv,
            mortality_smear_negative: p.mortality_smear_negative_hiv,
            mortality_smear_positive: p.mortality_smear_positive_hiv,
        }
    }

    /// On-ART rates, bounded by the HIV-negative baseline.
    #[must_use]
    pub fn on_art(&self, baseline: &TbRates, untreated: &TbRates, duration: usize) -> TbRates {
        let p = self.parameters;
        let tb_reduction = 1.0 - p.art_tb_reduction[duration];
        let mortality_reduction = 1.0 - p.art_mortality_reduction[duration];
        TbRates {
            primary_disease: (untreated.primary_disease * tb_reduction)
                .max(baseline.primary_disease),
            reactivation: (untreated.reactivation * tb_reduction).max(baseline.reactivation),
            protection: (1.0 - (1.0 - untreated.protection) * tb_reduction)
                .min(baseline.protection),
            mortality_smear_negative: (p.mortality_smear_negative_hiv * mortality_reduction)
                .max(baseline.mortality_smear_negative),
            mortality_smear_positive: (p.mortality_smear_positive_hiv * mortality_reduction)
                .max(baseline.mortality_smear_positive),
            ..*untreated
        }
    }

    /// Rates for every stratum at `age`.
    #[must_use]
    pub fn at_age(&self, age: usize) -> AgeRates {
        let hiv_negative = self.hiv_negative(age);
        let hiv_positive: [TbRates; NUM_CD4] =
            std::array::from_fn(|cd4| self.hiv_positive(&hiv_negative, cd4));
        let on_art = std::array::from_fn(|cd4| {
            std::array::from_fn(|duration| {
                self.on_art(&hiv_negative, &hiv_positive[cd4], duration)
            })
        });
        AgeRates {
            hiv_negative,
            hiv_positive,
            on_art,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::NUM_AGES;
    use crate::parameters::RelativeRisk;
    use approx::assert_relative_eq;

    #[test]
    fn bcg_lowers_primary_disease_in_children_only() {
        let parameters = Parameters::default();
        let without = NaturalHistory::new(&parameters, 0.0);
        let with = NaturalHistory::new(&parameters, 1.0);
        let factor = 1.0 - parameters.bcg_efficacy;
        assert_relative_eq!(
            with.hiv_negative(3).primary_disease,
            without.hiv_negative(3).primary_disease * factor
        );
        assert_relative_eq!(
            with.hiv_negative(40).primary_disease,
            without.hiv_negative(40).primary_disease
        );
    }

    #[test]
    fn child_bands_select_child_parameters() {
        let parameters = Parameters::default();
        let history = NaturalHistory::new(&parameters, 0.0);
        assert_relative_eq!(
            history.hiv_negative(12).mortality_smear_positive,
            parameters.mortality_smear_positive.children[2]
        );
        assert_relative_eq!(
            history.hiv_negative(15).smear_positive,
            parameters.smear_positive.adult
        );
    }

    #[test]
    fn highest_cd4_category_only_applies_base_relative_risk() {
        let parameters = Parameters::default();
        let history = NaturalHistory::new(&parameters, 0.0);
        let baseline = history.hiv_negative(30);
        let hiv = history.hiv_positive(&baseline, 0);
        assert_relative_eq!(
            hiv.reactivation,
            baseline.reactivation * parameters.rr_reactivation.base
        );
        assert_relative_eq!(hiv.smear_positive, parameters.smear_positive_hiv);
    }

    #[test]
    fn extreme_relative_risks_are_clamped() {
        let mut parameters = Parameters::default();
        parameters.rr_primary_disease = RelativeRisk {
            base: 50.0,
            per_100_cd4: 10.0,
        };
        parameters.rr_protection = RelativeRisk {
            base: 40.0,
            per_100_cd4: 0.1,
        };
        let history = NaturalHistory::new(&parameters, 0.5);
        for age in 0..NUM_AGES {
            let rates = history.at_age(age);
            for cd4 in 0..NUM_CD4 {
                let hiv = &rates.hiv_positive[cd4];
                assert!((0.0..=1.0).contains(&hiv.primary_disease));
                assert!((0.0..=1.0).contains(&hiv.protection));
                for art in &rates.on_art[cd4] {
                    assert!((0.0..=1.0).contains(&art.primary_disease));
                    assert!(art.primary_disease >= rates.hiv_negative.primary_disease);
                    assert!(art.primary_disease <= hiv.primary_disease);
                }
            }
        }
    }

    #[test]
    fn art_mortality_never_better_than_hiv_negative() {
        let mut parameters = Parameters::default();
        parameters.art_mortality_reduction = [1.0, 1.0, 1.0];
        let history = NaturalHistory::new(&parameters, 0.0);
        let rates = history.at_age(50);
        for cd4 in 0..NUM_CD4 {
            for art in &rates.on_art[cd4] {
                assert_relative_eq!(
                    art.mortality_smear_positive,
                    rates.hiv_negative.mortality_smear_positive
                );
            }
        }
    }

    #[test]
    fn tb_deaths_only_count_active_disease() {
        let rates = NaturalHistory::new(&Parameters::default(), 0.0).hiv_negative(40);
        let mut cell = [1.0; NUM_STATES];
        cell[DiseaseState::Susceptible.index()] = 1000.0;
        let expected = 4.0 * rates.mortality_smear_negative + 4.0 * rates.mortality_smear_positive;
        assert_relative_eq!(rates.tb_deaths(&cell), expected);
        assert_relative_eq!(rates.mortality(DiseaseState::LatentDsNaive), 0.0);
    }
}
