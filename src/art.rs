//! ART initiation for one single-year age.
//!
//! The number of people who should be on ART is the coverage target applied to everyone
//! with HIV in an eligible CD4 category, on ART or not. People already on ART who are
//! expected to die this period do not count towards it. The shortfall is capped at the
//! eligible untreated population and shared among eligible CD4 categories, half by
//! their share of the eligible population and half by their share of its HIV deaths.

use strum::IntoEnumIterator;

use crate::forcings::Forcings;
use crate::layout::{DiseaseState, Stratum, NUM_ART_DURATIONS, NUM_CD4};
use crate::population::{cell_total, Population};

/// Inputs to ART allocation at one age.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ArtDemand {
    /// Untreated HIV-positive population by CD4 category
    pub untreated: [f64; NUM_CD4],
    /// Untreated HIV deaths by CD4 category, at the uncorrected hazard
    pub untreated_deaths: [f64; NUM_CD4],
    /// On-ART population by CD4 category at initiation, over all duration bands
    pub on_art: [f64; NUM_CD4],
    pub eligible: [bool; NUM_CD4],
    pub coverage: f64,
    pub expected_art_deaths: f64,
}

/// New ART initiations at one age and the per-capita initiation rate by CD4 category.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ArtAllocation {
    pub initiations: f64,
    /// Eligible people not yet on ART
    pub eligible_untreated: f64,
    /// Fraction of each untreated CD4 cell starting ART per unit time
    pub rates: [f64; NUM_CD4],
}

impl ArtDemand {
    #[must_use]
    pub fn at_age(
        population: &Population,
        age: usize,
        hiv_mortality: &[f64; NUM_CD4],
        forcings: &Forcings,
        expected_art_deaths: f64,
    ) -> Self {
        let mut demand = ArtDemand {
            coverage: forcings.art_coverage_at(age),
            expected_art_deaths,
            ..ArtDemand::default()
        };
        for cd4 in 0..NUM_CD4 {
            let untreated = cell_total(population.cell(Stratum::HivPositive { cd4 }, age));
            demand.untreated[cd4] = untreated;
            demand.untreated_deaths[cd4] = hiv_mortality[cd4] * untreated;
            demand.on_art[cd4] = (0..NUM_ART_DURATIONS)
                .map(|duration| cell_total(population.cell(Stratum::OnArt { cd4, duration }, age)))
                .sum();
            demand.eligible[cd4] = forcings.art_eligible(cd4);
        }
        demand
    }

    #[must_use]
    pub fn allocate(&self) -> ArtAllocation {
        let mut target = 0.0;
        let mut eligible_untreated = 0.0;
        let mut eligible_deaths = 0.0;
        for cd4 in (0..NUM_CD4).filter(|cd4| self.eligible[*cd4]) {
            target += (self.untreated[cd4] + self.on_art[cd4]) * self.coverage;
            eligible_untreated += self.untreated[cd4];
            eligible_deaths += self.untreated_deaths[cd4];
        }
        let currently_on_art: f64 = self.on_art.iter().sum();
        let initiations = (target - (currently_on_art - self.expected_art_deaths))
            .max(0.0)
            .min(eligible_untreated);

        let mut rates = [0.0; NUM_CD4];
        if eligible_untreated > 0.0 {
            for cd4 in (0..NUM_CD4).filter(|cd4| self.eligible[*cd4]) {
                let size = self.untreated[cd4];
                if size > 0.0 {
                    let population_share = size / eligible_untreated;
                    let death_share = if eligible_deaths > 0.0 {
                        self.untreated_deaths[cd4] / eligible_deaths
                    } else {
                        population_share
                    };
                    rates[cd4] = (population_share + death_share) / 2.0 * initiations / size;
                }
            }
        }
        ArtAllocation {
            initiations,
            eligible_untreated,
            rates,
        }
    }
}

impl ArtAllocation {
    /// People starting ART per unit time out of one compartment of an untreated cell.
    #[inline]
    #[must_use]
    pub fn outflow(&self, cd4: usize, count: f64) -> f64 {
        self.rates[cd4] * count
    }

    /// Total initiations implied by the per-category rates.
    #[must_use]
    pub fn allocated(&self, population: &Population, age: usize) -> f64 {
        (0..NUM_CD4)
            .map(|cd4| {
                let cell = population.cell(Stratum::HivPositive { cd4 }, age);
                DiseaseState::iter()
                    .map(|state| self.outflow(cd4, cell[state.index()]))
                    .sum::<f64>()
            })
            .sum()
    }
}
