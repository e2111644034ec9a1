//! Mortality bookkeeping for one single-year age.
//!
//! The background mortality forcing is all-cause mortality, so it already contains
//! TB and HIV deaths. HIV mortality hazards likewise already contain TB deaths among
//! people with HIV. To avoid counting those deaths twice, each HIV/ART hazard first has
//! the stratum's current TB death rate taken out of it, and then the per-capita rate
//! of all disease deaths at that age is taken out of the background hazard. Both
//! corrections are floored at zero and skipped when their denominator is empty.

use strum::IntoEnumIterator;

use crate::layout::{Stratum, NUM_ART_DURATIONS, NUM_CD4};
use crate::natural_history::AgeRates;
use crate::numeric::ratio_or;
use crate::population::{cell_total, Population};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AgeMortality {
    /// Everyone of this age, in every stratum
    pub population: f64,
    /// Background hazard with disease deaths removed
    pub background: f64,
    /// HIV mortality hazard without ART, net of TB deaths
    pub hiv_positive: [f64; NUM_CD4],
    /// HIV mortality hazard on ART, net of TB deaths
    pub on_art: [[f64; NUM_ART_DURATIONS]; NUM_CD4],
    pub tb_deaths_hiv_negative: f64,
    pub tb_deaths_hiv_positive: f64,
    pub tb_deaths_on_art: f64,
    pub hiv_deaths_untreated: f64,
    pub hiv_deaths_on_art: f64,
    /// Deaths among people on ART from every cause, used to size ART initiation
    pub expected_art_deaths: f64,
}

impl AgeMortality {
    /// `hiv_mortality` and `art_mortality` are the uncorrected hazards at this age.
    /// With `adjust_background` off the background hazard is used as given.
    #[must_use]
    pub fn new(
        population: &Population,
        age: usize,
        rates: &AgeRates,
        hiv_mortality: &[f64; NUM_CD4],
        art_mortality: &[[f64; NUM_ART_DURATIONS]; NUM_CD4],
        raw_background: f64,
        adjust_background: bool,
    ) -> Self {
        let mut mortality = AgeMortality::default();
        let mut on_art_population = 0.0;

        for stratum in Stratum::iter() {
            let cell = population.cell(stratum, age);
            let size = cell_total(cell);
            let tb_deaths = rates.for_stratum(stratum).tb_deaths(cell);
            mortality.population += size;
            match stratum {
                Stratum::HivNegative => mortality.tb_deaths_hiv_negative += tb_deaths,
                Stratum::HivPositive { cd4 } => {
                    let hazard = net_of_tb(hiv_mortality[cd4], tb_deaths, size);
                    mortality.hiv_positive[cd4] = hazard;
                    mortality.tb_deaths_hiv_positive += tb_deaths;
                    mortality.hiv_deaths_untreated += hazard * size;
                }
                Stratum::OnArt { cd4, duration } => {
                    let hazard = net_of_tb(art_mortality[cd4][duration], tb_deaths, size);
                    mortality.on_art[cd4][duration] = hazard;
                    mortality.tb_deaths_on_art += tb_deaths;
                    mortality.hiv_deaths_on_art += hazard * size;
                    on_art_population += size;
                }
            }
        }

        let disease_rate = if adjust_background {
            ratio_or(mortality.disease_deaths(), mortality.population, 0.0)
        } else {
            0.0
        };
        mortality.background = (raw_background - disease_rate).max(0.0);
        mortality.expected_art_deaths = mortality.tb_deaths_on_art
            + mortality.hiv_deaths_on_art
            + mortality.background * on_art_population;
        mortality
    }

    #[must_use]
    pub fn tb_deaths(&self) -> f64 {
        self.tb_deaths_hiv_negative + self.tb_deaths_hiv_positive + self.tb_deaths_on_art
    }

    /// TB and HIV deaths per unit time.
    #[must_use]
    pub fn disease_deaths(&self) -> f64 {
        self.tb_deaths() + self.hiv_deaths_untreated + self.hiv_deaths_on_art
    }

    #[must_use]
    pub fn total_deaths(&self) -> f64 {
        self.background * self.population + self.disease_deaths()
    }

    /// Corrected HIV mortality hazard for a stratum; zero for HIV-negative people.
    #[inline]
    #[must_use]
    pub fn hiv_hazard(&self, stratum: Stratum) -> f64 {
        match stratum {
            Stratum::HivNegative => 0.0,
            Stratum::HivPositive { cd4 } => self.hiv_positive[cd4],
            Stratum::OnArt { cd4, duration } => self.on_art[cd4][duration],
        }
    }
}

fn net_of_tb(hazard: f64, tb_deaths: f64, size: f64) -> f64 {
    if size > 0.0 {
        (hazard - tb_deaths / size).max(0.0)
    } else {
        hazard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::DiseaseState;
    use crate::natural_history::NaturalHistory;
    use crate::parameters::Parameters;
    use approx::assert_relative_eq;

    const AGE: usize = 40;

    fn rates() -> AgeRates {
        NaturalHistory::new(&Parameters::default(), 0.0).at_age(AGE)
    }

    fn compute(population: &Population, raw: f64, adjust: bool) -> AgeMortality {
        AgeMortality::new(
            population,
            AGE,
            &rates(),
            &[0.1; NUM_CD4],
            &[[0.05; NUM_ART_DURATIONS]; NUM_CD4],
            raw,
            adjust,
        )
    }

    #[test]
    fn empty_age_group_keeps_raw_hazards() {
        let mortality = compute(&Population::zeros(), 0.02, true);
        assert_eq!(mortality.population, 0.0);
        assert_relative_eq!(mortality.background, 0.02);
        assert_relative_eq!(mortality.hiv_positive[3], 0.1);
        assert_relative_eq!(mortality.on_art[6][2], 0.05);
        assert_eq!(mortality.total_deaths(), 0.0);
    }

    #[test]
    fn disease_deaths_are_taken_out_of_background() {
        let mut population = Population::zeros();
        population.add(Stratum::HivNegative, AGE, DiseaseState::Susceptible, 9_000.0);
        population.add(Stratum::HivNegative, AGE, DiseaseState::SmearPosDsNaive, 100.0);
        population.add(Stratum::HivPositive { cd4: 2 }, AGE, DiseaseState::Susceptible, 900.0);
        let mortality = compute(&population, 0.02, true);

        let tb = 100.0 * rates().hiv_negative.mortality_smear_positive;
        let hiv = 0.1 * 900.0;
        assert_relative_eq!(mortality.tb_deaths(), tb);
        assert_relative_eq!(mortality.hiv_deaths_untreated, hiv);
        assert_relative_eq!(
            mortality.background,
            (0.02 - (tb + hiv) / 10_000.0).max(0.0)
        );
        assert_relative_eq!(
            mortality.total_deaths(),
            mortality.background * 10_000.0 + tb + hiv
        );
    }

    #[test]
    fn switch_off_leaves_background_unadjusted() {
        let mut population = Population::zeros();
        population.add(Stratum::HivNegative, AGE, DiseaseState::SmearNegDrNaive, 50.0);
        let mortality = compute(&population, 0.02, false);
        assert_relative_eq!(mortality.background, 0.02);
    }

    #[test]
    fn hiv_hazard_is_floored_at_zero() {
        let mut population = Population::zeros();
        let stratum = Stratum::OnArt {
            cd4: 1,
            duration: 0,
        };
        population.add(stratum, AGE, DiseaseState::SmearPosDrTreated, 10.0);
        let mortality = compute(&population, 0.0, true);
        assert_eq!(mortality.hiv_hazard(stratum), 0.0);
        assert_eq!(mortality.background, 0.0);
        assert_relative_eq!(
            mortality.expected_art_deaths,
            10.0 * rates().on_art[1][0].mortality_smear_positive
        );
    }
}
