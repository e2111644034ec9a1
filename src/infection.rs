//! Population totals and the force of infection for each strain.

use strum::IntoEnumIterator;

use crate::layout::{DiseaseState, Smear, Strain, Stratum, NUM_AGES};
use crate::numeric::ratio_or;
use crate::parameters::Parameters;
use crate::population::Population;

/// Whole-population sums used for transmission and reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PopulationTotals {
    pub total: f64,
    pub susceptible: f64,
    pub latent_ds: f64,
    pub latent_dr: f64,
    pub post_therapy: f64,
    /// Active disease indexed `[strain][smear]` for HIV-negative people
    pub active_hiv_negative: [[f64; 2]; 2],
    /// Active disease indexed `[strain][smear]` for HIV-positive people, on ART or not
    pub active_hiv_positive: [[f64; 2]; 2],
}

fn strain_slot(strain: Strain) -> usize {
    match strain {
        Strain::Susceptible => 0,
        Strain::Resistant => 1,
    }
}

fn smear_slot(smear: Smear) -> usize {
    match smear {
        Smear::Negative => 0,
        Smear::Positive => 1,
    }
}

impl PopulationTotals {
    #[must_use]
    pub fn from_population(population: &Population) -> Self {
        let mut totals = PopulationTotals::default();
        for stratum in Stratum::iter() {
            for age in 0..NUM_AGES {
                let cell = population.cell(stratum, age);
                for state in DiseaseState::iter() {
                    let count = cell[state.index()];
                    totals.total += count;
                    match (state.smear(), state.strain()) {
                        (Some(smear), Some(strain)) => {
                            let active = if stratum == Stratum::HivNegative {
                                &mut totals.active_hiv_negative
                            } else {
                                &mut totals.active_hiv_positive
                            };
                            active[strain_slot(strain)][smear_slot(smear)] += count;
                        }
                        (None, Some(Strain::Susceptible)) => totals.latent_ds += count,
                        (None, Some(Strain::Resistant)) => totals.latent_dr += count,
                        _ if state == DiseaseState::Susceptible => totals.susceptible += count,
                        _ => totals.post_therapy += count,
                    }
                }
            }
        }
        totals
    }

    #[must_use]
    pub fn active(&self, strain: Strain, smear: Smear) -> f64 {
        let (s, m) = (strain_slot(strain), smear_slot(smear));
        self.active_hiv_negative[s][m] + self.active_hiv_positive[s][m]
    }

    #[must_use]
    pub fn active_strain(&self, strain: Strain) -> f64 {
        self.active(strain, Smear::Negative) + self.active(strain, Smear::Positive)
    }

    #[must_use]
    pub fn active_smear(&self, smear: Smear) -> f64 {
        self.active(Strain::Susceptible, smear) + self.active(Strain::Resistant, smear)
    }
}

/// Per-susceptible infection hazard for each strain.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ForceOfInfection {
    pub susceptible: f64,
    pub resistant: f64,
}

impl ForceOfInfection {
    /// Smear-negative cases count at their relative infectiousness, which differs by
    /// HIV status; smear-positive cases count fully. Resistant strains transmit at
    /// `fitness_cost` times the rate. An empty population has no infection pressure.
    #[must_use]
    pub fn new(parameters: &Parameters, totals: &PopulationTotals) -> Self {
        let infectious = |strain: Strain| {
            let s = strain_slot(strain);
            totals.active_hiv_negative[s][0] * parameters.relative_infectiousness_smear_negative
                + totals.active_hiv_positive[s][0]
                    * parameters.relative_infectiousness_smear_negative_hiv
                + totals.active_hiv_negative[s][1]
                + totals.active_hiv_positive[s][1]
        };
        ForceOfInfection {
            susceptible: parameters.beta
                * ratio_or(infectious(Strain::Susceptible), totals.total, 0.0),
            resistant: parameters.fitness_cost
                * parameters.beta
                * ratio_or(infectious(Strain::Resistant), totals.total, 0.0),
        }
    }

    #[inline]
    #[must_use]
    pub fn of(&self, strain: Strain) -> f64 {
        match strain {
            Strain::Susceptible => self.susceptible,
            Strain::Resistant => self.resistant,
        }
    }
}
