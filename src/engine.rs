//! The derivative engine: rates of change of every compartment, plus the reporting
//! aggregates, at one point in time.
//!
//! A [`Model`] holds the immutable parameter context and the HIV tables derived from it.
//! Each call to [`Model::derivative`] is a pure function of its arguments, so a model
//! can be shared between threads and called in any order.
//!
//! Per age the evaluation runs:
//! 1. mortality bookkeeping ([`AgeMortality`]), which needs the whole age group;
//! 2. ART allocation ([`ArtDemand::allocate`]);
//! 3. for each stratum, the TB flows of its cell ([`cell_flows`]) followed by the
//!    demographic flows: background and HIV death, migration, HIV incidence, CD4
//!    progression, ART initiation and progression through ART duration bands.
//!
//! With the HIV switch off only the HIV-negative stratum is evaluated, HIV incidence is
//! not applied, and the derivative of every HIV-positive compartment is exactly zero.

use log::{error, trace};
use strum::IntoEnumIterator;

use crate::art::{ArtAllocation, ArtDemand};
use crate::error::{check_len, ModelError};
use crate::flows::{cell_flows, CareRates, Destination, FlowSet, Notifications};
use crate::forcings::Forcings;
use crate::hiv::HivTables;
use crate::infection::{ForceOfInfection, PopulationTotals};
use crate::layout::{
    DiseaseState, Smear, Strain, Stratum, NUM_AGES, NUM_ART_DURATIONS, NUM_CD4, STATE_LEN,
};
use crate::mortality::AgeMortality;
use crate::natural_history::NaturalHistory;
use crate::numeric::ratio_or;
use crate::parameters::Parameters;
use crate::population::{Cell, Population};

pub const NUM_AGGREGATES: usize = 42;
/// Fewer auxiliary output slots than this is a caller error.
pub const MIN_AUX_OUTPUTS: usize = 2;

/// Names of the aggregate outputs, in output order.
pub const AGGREGATE_NAMES: [&str; NUM_AGGREGATES] = [
    "total",
    "susceptible",
    "latent_ds",
    "latent_dr",
    "latent",
    "smear_negative_ds",
    "smear_negative_dr",
    "smear_negative",
    "smear_positive_ds",
    "smear_positive_dr",
    "smear_positive",
    "active_ds",
    "active_dr",
    "foi_ds_percent",
    "foi_dr_percent",
    "untreated_cd4_0",
    "untreated_cd4_1",
    "untreated_cd4_2",
    "untreated_cd4_3",
    "untreated_cd4_4",
    "untreated_cd4_5",
    "untreated_cd4_6",
    "on_art_cd4_0",
    "on_art_cd4_1",
    "on_art_cd4_2",
    "on_art_cd4_3",
    "on_art_cd4_4",
    "on_art_cd4_5",
    "on_art_cd4_6",
    "tb_deaths",
    "tb_deaths_hiv_negative",
    "tb_deaths_hiv_positive",
    "new_cases_hiv_negative",
    "new_cases_hiv_positive",
    "new_cases_on_art",
    "births",
    "total_deaths",
    "notified_ds_first_line",
    "notified_dr_first_line",
    "notified_dr_second_line",
    "notified_ds_second_line",
    "notified_false_positive",
];

/// Whole-population outputs of one evaluation. All counts are per unit time except
/// the population sizes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregates {
    pub totals: PopulationTotals,
    pub force_of_infection: ForceOfInfection,
    pub untreated_by_cd4: [f64; NUM_CD4],
    pub on_art_by_cd4: [f64; NUM_CD4],
    pub tb_deaths_hiv_negative: f64,
    /// TB deaths among people with HIV, on ART or not
    pub tb_deaths_hiv_positive: f64,
    pub new_cases_hiv_negative: f64,
    pub new_cases_hiv_positive: f64,
    pub new_cases_on_art: f64,
    pub births: f64,
    pub total_deaths: f64,
    pub notifications: Notifications,
}

impl Aggregates {
    #[must_use]
    pub fn tb_deaths(&self) -> f64 {
        self.tb_deaths_hiv_negative + self.tb_deaths_hiv_positive
    }

    /// Flattens into output order; see [`AGGREGATE_NAMES`].
    #[must_use]
    pub fn to_vec(&self) -> Vec<f64> {
        let t = &self.totals;
        let latent = t.latent_ds + t.latent_dr;
        let mut values = vec![
            t.total,
            t.susceptible,
            t.latent_ds,
            t.latent_dr,
            latent,
            t.active(Strain::Susceptible, Smear::Negative),
            t.active(Strain::Resistant, Smear::Negative),
            t.active_smear(Smear::Negative),
            t.active(Strain::Susceptible, Smear::Positive),
            t.active(Strain::Resistant, Smear::Positive),
            t.active_smear(Smear::Positive),
            t.active_strain(Strain::Susceptible),
            t.active_strain(Strain::Resistant),
            self.force_of_infection.susceptible * 100.0,
            self.force_of_infection.resistant * 100.0,
        ];
        values.extend_from_slice(&self.untreated_by_cd4);
        values.extend_from_slice(&self.on_art_by_cd4);
        values.extend_from_slice(&[
            self.tb_deaths(),
            self.tb_deaths_hiv_negative,
            self.tb_deaths_hiv_positive,
            self.new_cases_hiv_negative,
            self.new_cases_hiv_positive,
            self.new_cases_on_art,
            self.births,
            self.total_deaths,
            self.notifications.ds_first_line,
            self.notifications.dr_first_line,
            // Includes resistance-test sensitivity, unlike the reference model's
            // second-line series, so it matches the treatment flow itself.
            self.notifications.dr_second_line,
            self.notifications.ds_second_line,
            self.notifications.false_positive,
        ]);
        values
    }

    /// Writes the first `aux.len()` aggregates into `aux`, padding with zeros.
    pub fn fill(&self, aux: &mut [f64]) {
        let values = self.to_vec();
        for (i, slot) in aux.iter_mut().enumerate() {
            *slot = values.get(i).copied().unwrap_or(0.0);
        }
    }
}

/// The result of [`Model::derivative`].
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub derivative: Vec<f64>,
    pub aux: Vec<f64>,
    pub aggregates: Aggregates,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    parameters: Parameters,
    hiv: HivTables,
}

impl Model {
    /// # Errors
    ///
    /// Returns `ModelError::ConfigError` if the parameters are out of range.
    pub fn new(parameters: Parameters) -> Result<Model, ModelError> {
        let hiv = HivTables::new(&parameters);
        Model::with_hiv_tables(parameters, hiv)
    }

    /// Builds a model around caller-supplied HIV tables, for scenarios that switch
    /// parts of HIV demography off.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::ConfigError` if the parameters are out of range.
    pub fn with_hiv_tables(parameters: Parameters, hiv: HivTables) -> Result<Model, ModelError> {
        parameters.validate()?;
        check_len("HIV table", hiv.cd4_progression.len(), NUM_AGES)?;
        check_len("HIV table", hiv.hiv_mortality.len(), NUM_AGES)?;
        check_len("HIV table", hiv.new_infection_cd4.len(), NUM_AGES)?;
        check_len("HIV table", hiv.art_mortality.len(), NUM_AGES)?;
        Ok(Model { parameters, hiv })
    }

    #[must_use]
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    #[must_use]
    pub fn hiv_tables(&self) -> &HivTables {
        &self.hiv
    }

    /// Evaluates the derivative of `state` at `time` and `aux_count` aggregate outputs.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::ConfigError` if `aux_count` is below [`MIN_AUX_OUTPUTS`] or
    /// `state` has the wrong length.
    pub fn derivative(
        &self,
        time: f64,
        state: &[f64],
        forcings: &Forcings,
        aux_count: usize,
    ) -> Result<Evaluation, ModelError> {
        let mut derivative = vec![0.0; STATE_LEN];
        let mut aux = vec![0.0; aux_count];
        let aggregates = self.derivative_into(time, state, forcings, &mut derivative, &mut aux)?;
        Ok(Evaluation {
            derivative,
            aux,
            aggregates,
        })
    }

    /// Like [`Model::derivative`] but writes into caller-owned buffers, so an
    /// integrator can reuse them across calls.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::ConfigError` if `aux` has fewer than [`MIN_AUX_OUTPUTS`]
    /// slots, `state` or `out` has the wrong length, or a `forcings` table is not
    /// sized by age or age band. Nothing is written on error.
    pub fn derivative_into(
        &self,
        time: f64,
        state: &[f64],
        forcings: &Forcings,
        out: &mut [f64],
        aux: &mut [f64],
    ) -> Result<Aggregates, ModelError> {
        if aux.len() < MIN_AUX_OUTPUTS {
            error!(
                "derivative requested with {} auxiliary outputs; at least {MIN_AUX_OUTPUTS} are required",
                aux.len()
            );
            return Err(ModelError::ConfigError(format!(
                "at least {MIN_AUX_OUTPUTS} auxiliary outputs are required, got {}",
                aux.len()
            )));
        }
        check_len("output vector", out.len(), STATE_LEN)?;
        forcings.check_tables()?;
        let population = Population::unpack(state)?;

        let mut derivative = Population::zeros();
        let aggregates = self.evaluate(&population, forcings, &mut derivative);
        derivative.pack_into(out)?;
        aggregates.fill(aux);
        trace!(
            "t = {time}: population {:.1}, FoI {:.3e}/{:.3e}, births {:.1}, deaths {:.1}",
            aggregates.totals.total,
            aggregates.force_of_infection.susceptible,
            aggregates.force_of_infection.resistant,
            aggregates.births,
            aggregates.total_deaths
        );
        Ok(aggregates)
    }

    fn evaluate(
        &self,
        population: &Population,
        forcings: &Forcings,
        derivative: &mut Population,
    ) -> Aggregates {
        let parameters = &self.parameters;
        let hiv_on = parameters.hiv_run;
        let totals = PopulationTotals::from_population(population);
        let foi = ForceOfInfection::new(parameters, &totals);
        let history = NaturalHistory::new(parameters, forcings.bcg_coverage);
        let care_hiv_negative = CareRates::for_stratum(Stratum::HivNegative, parameters, forcings);
        let care_hiv_positive =
            CareRates::for_stratum(Stratum::HivPositive { cd4: 0 }, parameters, forcings);
        let care_on_art = CareRates::for_stratum(
            Stratum::OnArt {
                cd4: 0,
                duration: 0,
            },
            parameters,
            forcings,
        );

        let mut aggregates = Aggregates {
            totals,
            force_of_infection: foi,
            births: forcings.birth_rate * totals.total / 1000.0,
            ..Aggregates::default()
        };
        let mut flows = FlowSet::new();

        for age in 0..NUM_AGES {
            let rates = history.at_age(age);
            let mortality = AgeMortality::new(
                population,
                age,
                &rates,
                &self.hiv.hiv_mortality[age],
                &self.hiv.art_mortality[age],
                forcings.background_mortality[age],
                forcings.adjust_background_mortality,
            );
            aggregates.tb_deaths_hiv_negative += mortality.tb_deaths_hiv_negative;
            aggregates.tb_deaths_hiv_positive +=
                mortality.tb_deaths_hiv_positive + mortality.tb_deaths_on_art;
            aggregates.total_deaths += mortality.total_deaths();

            let allocation = if hiv_on {
                let demand = ArtDemand::at_age(
                    population,
                    age,
                    &self.hiv.hiv_mortality[age],
                    forcings,
                    mortality.expected_art_deaths,
                );
                for cd4 in 0..NUM_CD4 {
                    aggregates.untreated_by_cd4[cd4] += demand.untreated[cd4];
                    aggregates.on_art_by_cd4[cd4] += demand.on_art[cd4];
                }
                demand.allocate()
            } else {
                ArtAllocation::default()
            };
            let demography = AgeDemography {
                age,
                mortality: &mortality,
                allocation: &allocation,
                migration: ratio_or(forcings.migration_at(age), mortality.population, 0.0),
                hiv_incidence: if hiv_on {
                    forcings.hiv_incidence_at(age)
                } else {
                    0.0
                },
            };

            for stratum in Stratum::iter() {
                if !hiv_on && stratum != Stratum::HivNegative {
                    continue;
                }
                let cell = population.cell(stratum, age);
                let care = match stratum {
                    Stratum::HivNegative => &care_hiv_negative,
                    Stratum::HivPositive { .. } => &care_hiv_positive,
                    Stratum::OnArt { .. } => &care_on_art,
                };
                let summary = cell_flows(
                    cell,
                    rates.for_stratum(stratum),
                    care,
                    &foi,
                    parameters.superinfection,
                    &mut flows,
                );
                apply_flows(derivative, stratum, age, &flows);
                match stratum {
                    Stratum::HivNegative => aggregates.new_cases_hiv_negative += summary.new_cases,
                    Stratum::HivPositive { .. } => {
                        aggregates.new_cases_hiv_positive += summary.new_cases;
                    }
                    Stratum::OnArt { .. } => aggregates.new_cases_on_art += summary.new_cases,
                }
                aggregates.notifications += summary.notifications;

                self.demographic_flows(derivative, stratum, cell, &demography);
            }
        }
        aggregates
    }

    fn demographic_flows(
        &self,
        derivative: &mut Population,
        stratum: Stratum,
        cell: &Cell,
        demography: &AgeDemography,
    ) {
        let age = demography.age;
        let deaths = demography.mortality.background + demography.mortality.hiv_hazard(stratum);
        for state in DiseaseState::iter() {
            let count = cell[state.index()];
            if count == 0.0 {
                continue;
            }
            derivative.add(stratum, age, state, (demography.migration - deaths) * count);
            match stratum {
                Stratum::HivNegative => {
                    let infected = demography.hiv_incidence * count;
                    if infected > 0.0 {
                        derivative.add(stratum, age, state, -infected);
                        for (cd4, share) in self.hiv.new_infection_cd4[age].iter().enumerate() {
                            derivative.add(Stratum::HivPositive { cd4 }, age, state, infected * share);
                        }
                    }
                }
                Stratum::HivPositive { cd4 } => {
                    if cd4 + 1 < NUM_CD4 {
                        derivative.transfer(
                            (stratum, state),
                            (Stratum::HivPositive { cd4: cd4 + 1 }, state),
                            age,
                            self.hiv.cd4_progression[age][cd4] * count,
                        );
                    }
                    derivative.transfer(
                        (stratum, state),
                        (Stratum::OnArt { cd4, duration: 0 }, state),
                        age,
                        demography.allocation.outflow(cd4, count),
                    );
                }
                Stratum::OnArt { cd4, duration } => {
                    if duration + 1 < NUM_ART_DURATIONS {
                        derivative.transfer(
                            (stratum, state),
                            (
                                Stratum::OnArt {
                                    cd4,
                                    duration: duration + 1,
                                },
                                state,
                            ),
                            age,
                            self.hiv.art_progression[duration] * count,
                        );
                    }
                }
            }
        }
    }
}

/// Per-age demographic inputs shared by every stratum at that age.
struct AgeDemography<'a> {
    age: usize,
    mortality: &'a AgeMortality,
    allocation: &'a ArtAllocation,
    /// Net migrants per person per unit time
    migration: f64,
    hiv_incidence: f64,
}

fn apply_flows(derivative: &mut Population, stratum: Stratum, age: usize, flows: &FlowSet) {
    for flow in flows {
        derivative.add(stratum, age, flow.from, -flow.amount);
        match flow.to {
            Destination::Within(to) => derivative.add(stratum, age, to, flow.amount),
            Destination::StartArt(to) => {
                let entry = stratum.art_entry().unwrap_or(stratum);
                derivative.add(entry, age, to, flow.amount);
            }
            Destination::Exit => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Compartment;
    use approx::assert_relative_eq;

    fn seeded_state() -> Vec<f64> {
        let mut state = vec![0.0; STATE_LEN];
        for age in 0..NUM_AGES {
            let susceptible = Compartment::new(Stratum::HivNegative, DiseaseState::Susceptible, age);
            state[susceptible.index()] = 10_000.0;
            let case = Compartment::new(Stratum::HivNegative, DiseaseState::SmearPosDsNaive, age);
            state[case.index()] = 100.0;
            let hiv = Compartment::new(Stratum::HivPositive { cd4: 5 }, DiseaseState::LatentDsNaive, age);
            state[hiv.index()] = 500.0;
            let art = Compartment::new(
                Stratum::OnArt {
                    cd4: 6,
                    duration: 1,
                },
                DiseaseState::SmearNegDrTreated,
                age,
            );
            state[art.index()] = 50.0;
        }
        state
    }

    #[test]
    fn too_few_aux_outputs_is_a_config_error() {
        let model = Model::new(Parameters::default()).unwrap();
        let state = seeded_state();
        for aux_count in [0, 1] {
            let result = model.derivative(0.0, &state, &Forcings::default(), aux_count);
            assert!(matches!(result, Err(ModelError::ConfigError(_))));
        }
    }

    #[test]
    fn wrong_state_length_is_a_config_error() {
        let model = Model::new(Parameters::default()).unwrap();
        let result = model.derivative(0.0, &[1.0; 10], &Forcings::default(), 42);
        assert!(matches!(result, Err(ModelError::ConfigError(_))));
    }

    #[test]
    fn short_forcing_tables_are_a_config_error() {
        let model = Model::new(Parameters::default()).unwrap();
        let state = seeded_state();
        let truncations: [fn(&mut Forcings); 4] = [
            |f| f.background_mortality.truncate(40),
            |f| f.hiv_incidence.truncate(3),
            |f| f.migration.truncate(3),
            |f| f.art_coverage.clear(),
        ];
        for truncate in truncations {
            let mut forcings = Forcings::default();
            truncate(&mut forcings);
            let result = model.derivative(0.0, &state, &forcings, NUM_AGGREGATES);
            assert!(matches!(result, Err(ModelError::ConfigError(_))));
        }
    }

    #[test]
    fn aux_is_truncated_or_padded() {
        let model = Model::new(Parameters::default()).unwrap();
        let state = seeded_state();
        let short = model.derivative(0.0, &state, &Forcings::default(), 2).unwrap();
        assert_eq!(short.aux.len(), 2);
        assert_relative_eq!(short.aux[0], short.aggregates.totals.total);

        let long = model.derivative(0.0, &state, &Forcings::default(), 50).unwrap();
        assert_eq!(long.aux.len(), 50);
        assert_eq!(&long.aux[..NUM_AGGREGATES], &long.aggregates.to_vec()[..]);
        assert!(long.aux[NUM_AGGREGATES..].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn aggregates_have_one_name_each() {
        let aggregates = Aggregates::default();
        assert_eq!(aggregates.to_vec().len(), NUM_AGGREGATES);
        assert_eq!(AGGREGATE_NAMES.len(), NUM_AGGREGATES);
    }

    #[test]
    fn population_aggregates_match_state() {
        let model = Model::new(Parameters::default()).unwrap();
        let state = seeded_state();
        let forcings = Forcings::default();
        let evaluation = model.derivative(0.0, &state, &forcings, NUM_AGGREGATES).unwrap();
        let aux = &evaluation.aux;
        let total: f64 = state.iter().sum();
        assert_relative_eq!(aux[0], total, max_relative = 1e-12);
        assert_relative_eq!(aux[1], 10_000.0 * NUM_AGES as f64, max_relative = 1e-12);
        assert_relative_eq!(aux[2], 500.0 * NUM_AGES as f64, max_relative = 1e-12);
        assert_relative_eq!(aux[6], 50.0 * NUM_AGES as f64, max_relative = 1e-12);
        assert_relative_eq!(aux[20], 500.0 * NUM_AGES as f64, max_relative = 1e-12);
        assert_relative_eq!(aux[28], 50.0 * NUM_AGES as f64, max_relative = 1e-12);
        assert_relative_eq!(aux[35], forcings.birth_rate * total / 1000.0);
        assert!(aux[13] > 0.0 && aux[14] > 0.0);
        assert!(aux[32] > 0.0 && aux[33] > 0.0);
        assert!(aux[37] > 0.0 && aux[39] > 0.0 && aux[41] > 0.0);
    }

    #[test]
    fn art_initiation_moves_people_into_first_duration_band() {
        let model = Model::new(Parameters::default()).unwrap();
        let mut forcings = Forcings::closed_population();
        forcings.art_coverage = vec![1.0; forcings.art_coverage.len()];
        let mut state = vec![0.0; STATE_LEN];
        let untreated = Compartment::new(Stratum::HivPositive { cd4: 6 }, DiseaseState::Susceptible, 30);
        state[untreated.index()] = 1_000.0;
        let evaluation = model.derivative(0.0, &state, &forcings, 2).unwrap();
        let started = Compartment::new(
            Stratum::OnArt {
                cd4: 6,
                duration: 0,
            },
            DiseaseState::Susceptible,
            30,
        );
        assert!(evaluation.derivative[started.index()] > 0.0);
        assert!(evaluation.derivative[untreated.index()] < 0.0);
    }

    #[test]
    fn hiv_incidence_splits_into_top_cd4_categories() {
        let mut parameters = Parameters::default();
        parameters.reactivation = 0.0;
        let model = Model::new(parameters).unwrap();
        let mut forcings = Forcings::closed_population();
        forcings.hiv_incidence = vec![0.02; forcings.hiv_incidence.len()];
        forcings.presentation_without_tb = 0.0;
        let mut state = vec![0.0; STATE_LEN];
        let latent = Compartment::new(Stratum::HivNegative, DiseaseState::LatentDrNaive, 40);
        state[latent.index()] = 1_000.0;
        let evaluation = model.derivative(0.0, &state, &forcings, 2).unwrap();
        let split = model.hiv_tables().new_infection_cd4[40];
        for cd4 in 0..2 {
            let positive = Compartment::new(Stratum::HivPositive { cd4 }, DiseaseState::LatentDrNaive, 40);
            assert_relative_eq!(evaluation.derivative[positive.index()], 20.0 * split[cd4]);
        }
        assert_relative_eq!(evaluation.derivative[latent.index()], -20.0);
    }
}
