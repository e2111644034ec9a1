use approx::{assert_abs_diff_eq, assert_relative_eq};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tbhiv::art::ArtDemand;
use tbhiv::flows::{cell_flows, CareRates, FlowSet};
use tbhiv::hiv::HivTables;
use tbhiv::infection::{ForceOfInfection, PopulationTotals};
use tbhiv::layout::{age_blocks, Stratum, MAX_AGE, NUM_AGES, NUM_CD4};
use tbhiv::natural_history::NaturalHistory;
use tbhiv::numeric::ACC;
use tbhiv::parameters::RelativeRisk;
use tbhiv::population::Population;
use tbhiv::{
    apply_annual_event, assert_almost_eq, Compartment, DiseaseState, Forcings, Model, Parameters,
    NUM_AGGREGATES, STATE_LEN,
};

const SEED: u64 = 0x7b_41_76;

fn random_state(rng: &mut SmallRng) -> Vec<f64> {
    (0..STATE_LEN)
        .map(|_| {
            if rng.random_bool(0.3) {
                0.0
            } else {
                rng.random_range(0.0..5_000.0)
            }
        })
        .collect()
}

fn random_parameters(rng: &mut SmallRng) -> Parameters {
    let mut parameters = Parameters::default();
    parameters.beta = rng.random_range(0.0..30.0);
    parameters.primary_disease.adult = rng.random_range(0.0..=1.0);
    parameters.reactivation = rng.random_range(0.0..0.01);
    parameters.protection = rng.random_range(0.0..=1.0);
    parameters.smear_positive.adult = rng.random_range(0.0..=1.0);
    parameters.self_cure = rng.random_range(0.0..0.5);
    parameters.superinfection = rng.random_range(0.0..=1.0);
    parameters.acquired_resistance = rng.random_range(0.0..0.1);
    parameters.first_line_efficacy_resistant =
        [rng.random_range(0.0..=1.0), rng.random_range(0.0..=1.0)];
    parameters.rr_primary_disease.base = rng.random_range(0.5..5.0);
    parameters.rr_reactivation.per_100_cd4 = rng.random_range(0.5..3.0);
    parameters.rr_protection.per_100_cd4 = rng.random_range(0.5..3.0);
    parameters
}

fn random_forcings(rng: &mut SmallRng) -> Forcings {
    let mut forcings = Forcings::default();
    forcings.detection_hiv_negative = rng.random_range(0.0..2.0);
    forcings.detection_hiv_positive = rng.random_range(0.0..2.0);
    forcings.dst_hiv_negative.naive = rng.random_range(0.0..=1.0);
    forcings.dst_hiv_positive.treated = rng.random_range(0.0..=1.0);
    forcings.linkage_first_line = rng.random_range(0.0..=1.0);
    forcings.linkage_second_line = rng.random_range(0.0..=1.0);
    forcings.presentation_without_tb = rng.random_range(0.0..0.1);
    forcings.hiv_tested = rng.random_range(0.0..=1.0);
    forcings.art_linkage = rng.random_range(0.0..=1.0);
    forcings.art_threshold = f64::from(rng.random_range(0..=7_u8));
    forcings.art_coverage = (0..forcings.art_coverage.len())
        .map(|_| rng.random_range(0.0..=1.0))
        .collect();
    forcings
}

/// Parameters and HIV tables under which nobody dies of TB or HIV.
fn deathless_model() -> Model {
    let mut parameters = Parameters::default();
    for mortality in [
        &mut parameters.mortality_smear_negative,
        &mut parameters.mortality_smear_positive,
    ] {
        mortality.adult = 0.0;
        mortality.children = [0.0; 3];
    }
    parameters.mortality_smear_negative_hiv = 0.0;
    parameters.mortality_smear_positive_hiv = 0.0;
    parameters.art_mortality = vec![0.0; parameters.art_mortality.len()];
    let mut hiv = HivTables::new(&parameters);
    for row in &mut hiv.hiv_mortality {
        *row = [0.0; NUM_CD4];
    }
    Model::with_hiv_tables(parameters, hiv).unwrap()
}

#[test]
fn derivative_sums_to_zero_without_demography() {
    let model = deathless_model();
    let mut forcings = Forcings::closed_population();
    forcings.hiv_incidence = Forcings::default().hiv_incidence;
    let mut rng = SmallRng::seed_from_u64(SEED);
    for _ in 0..5 {
        let state = random_state(&mut rng);
        let time = rng.random_range(0.0..50.0);
        let evaluation = model.derivative(time, &state, &forcings, NUM_AGGREGATES).unwrap();
        let net: f64 = evaluation.derivative.iter().sum();
        let gross: f64 = evaluation.derivative.iter().map(|v| v.abs()).sum();
        assert!(gross > 0.0);
        assert_abs_diff_eq!(net, 0.0, epsilon = 1e-10 * gross);
        assert_eq!(evaluation.aggregates.total_deaths, 0.0);
    }
}

#[test]
fn every_flow_is_nonnegative() {
    let mut rng = SmallRng::seed_from_u64(SEED + 1);
    let mut flows = FlowSet::new();
    for _ in 0..20 {
        let parameters = random_parameters(&mut rng);
        let forcings = random_forcings(&mut rng);
        let population = Population::unpack(&random_state(&mut rng)).unwrap();
        let totals = PopulationTotals::from_population(&population);
        let foi = ForceOfInfection::new(&parameters, &totals);
        let history = NaturalHistory::new(&parameters, forcings.bcg_coverage);
        let age = rng.random_range(0..NUM_AGES);
        let rates = history.at_age(age);
        for stratum in Stratum::iter() {
            let care = CareRates::for_stratum(stratum, &parameters, &forcings);
            let cell = population.cell(stratum, age);
            let summary = cell_flows(
                cell,
                rates.for_stratum(stratum),
                &care,
                &foi,
                parameters.superinfection,
                &mut flows,
            );
            for flow in &flows {
                assert!(
                    flow.amount.is_finite() && flow.amount >= 0.0,
                    "{flow:?} in {stratum:?} at age {age}"
                );
            }
            assert!(summary.new_cases >= 0.0);
            assert!(summary.notifications.false_positive >= 0.0);
        }
    }
}

#[test]
fn aggregates_are_nonnegative_for_random_inputs() {
    let mut rng = SmallRng::seed_from_u64(SEED + 2);
    for _ in 0..3 {
        let model = Model::new(random_parameters(&mut rng)).unwrap();
        let forcings = random_forcings(&mut rng);
        let evaluation = model
            .derivative(0.0, &random_state(&mut rng), &forcings, NUM_AGGREGATES)
            .unwrap();
        for (i, value) in evaluation.aux.iter().enumerate() {
            assert!(value.is_finite() && *value >= 0.0, "aggregate {i} = {value}");
        }
    }
}

#[test]
fn no_infectious_people_means_zero_force_of_infection() {
    let model = Model::new(Parameters::default()).unwrap();
    let mut rng = SmallRng::seed_from_u64(SEED + 3);
    let mut state = random_state(&mut rng);
    for (index, value) in state.iter_mut().enumerate() {
        if Compartment::from_index(index).unwrap().state.is_active() {
            *value = 0.0;
        }
    }
    let evaluation = model.derivative(0.0, &state, &Forcings::default(), NUM_AGGREGATES).unwrap();
    assert!(evaluation.aggregates.totals.total > 0.0);
    assert_eq!(evaluation.aggregates.force_of_infection, ForceOfInfection::default());
    assert_eq!(evaluation.aux[13], 0.0);
    assert_eq!(evaluation.aux[14], 0.0);
}

#[test]
fn art_initiations_never_exceed_eligible_untreated() {
    let mut rng = SmallRng::seed_from_u64(SEED + 4);
    let hiv = HivTables::new(&Parameters::default());
    for _ in 0..10 {
        let population = Population::unpack(&random_state(&mut rng)).unwrap();
        let forcings = random_forcings(&mut rng);
        for age in 0..NUM_AGES {
            let expected_art_deaths = rng.random_range(0.0..1_000.0);
            let demand = ArtDemand::at_age(
                &population,
                age,
                &hiv.hiv_mortality[age],
                &forcings,
                expected_art_deaths,
            );
            let allocation = demand.allocate();
            assert!(allocation.initiations >= 0.0);
            assert!(allocation.initiations <= allocation.eligible_untreated * (1.0 + 1e-12));
            let allocated = allocation.allocated(&population, age);
            assert!(allocated <= allocation.eligible_untreated * (1.0 + 1e-9));
        }
    }
}

#[test]
fn adjusted_probabilities_stay_in_bounds() {
    for (base, per_100_cd4) in [(1.0, 1.0), (3.0, 2.0), (10.0, 5.0), (100.0, 10.0)] {
        let mut parameters = Parameters::default();
        let risk = RelativeRisk { base, per_100_cd4 };
        parameters.rr_primary_disease = risk;
        parameters.rr_reactivation = risk;
        parameters.rr_protection = risk;
        parameters.primary_disease.adult = 0.9;
        let history = NaturalHistory::new(&parameters, 0.5);
        for age in [0, 7, 12, 30, MAX_AGE] {
            let rates = history.at_age(age);
            let baseline = rates.hiv_negative;
            for cd4 in 0..NUM_CD4 {
                let untreated = rates.hiv_positive[cd4];
                assert!((0.0..=1.0).contains(&untreated.primary_disease));
                assert!((0.0..=1.0).contains(&untreated.protection));
                for on_art in &rates.on_art[cd4] {
                    assert!(on_art.primary_disease >= baseline.primary_disease);
                    assert!(on_art.primary_disease <= untreated.primary_disease);
                    assert!(on_art.reactivation >= baseline.reactivation);
                    assert!(on_art.reactivation <= untreated.reactivation);
                    assert!(on_art.protection <= baseline.protection);
                    assert!(on_art.mortality_smear_positive >= baseline.mortality_smear_positive);
                }
            }
        }
    }
}

#[test]
fn annual_event_balances_population() {
    let mut rng = SmallRng::seed_from_u64(SEED + 5);
    for _ in 0..5 {
        let mut state = random_state(&mut rng);
        let before = state.clone();
        let birth_rate = rng.random_range(0.0..50.0);
        let total: f64 = before.iter().sum();
        let births = apply_annual_event(1.0, &mut state, birth_rate).unwrap();

        assert_almost_eq!(births, total * birth_rate / 1000.0, ACC * total);
        assert_relative_eq!(
            state.iter().sum::<f64>(),
            total * (1.0 + birth_rate / 1000.0),
            max_relative = 1e-12
        );

        let newborn = Compartment::new(Stratum::HivNegative, DiseaseState::Susceptible, 0);
        for block in age_blocks() {
            let start = block.range().start;
            if start != newborn.index() {
                assert_eq!(state[start], 0.0);
            }
            for age in 1..MAX_AGE {
                assert_eq!(state[start + age], before[start + age - 1]);
            }
        }
    }
}

#[test]
fn hiv_off_leaves_hiv_positive_compartments_alone() {
    let mut parameters = Parameters::default();
    parameters.hiv_run = false;
    let model = Model::new(parameters).unwrap();
    let mut forcings = Forcings::default();
    forcings.hiv_incidence = vec![0.0; forcings.hiv_incidence.len()];
    let mut rng = SmallRng::seed_from_u64(SEED + 6);
    let state = random_state(&mut rng);

    let evaluation = model.derivative(0.0, &state, &forcings, NUM_AGGREGATES).unwrap();
    for (index, value) in evaluation.derivative.iter().enumerate() {
        if Compartment::from_index(index).unwrap().stratum != Stratum::HivNegative {
            assert_eq!(*value, 0.0, "compartment {index}");
        }
    }
    assert!(evaluation.aux[15..29].iter().all(|value| *value == 0.0));
    let hiv_negative = &evaluation.derivative[..tbhiv::layout::HIV_POSITIVE_OFFSET];
    assert!(hiv_negative.iter().any(|value| *value != 0.0));
}

#[test]
fn seeded_cohort_ages_one_year() {
    let mut state = vec![0.0; STATE_LEN];
    let newborn = Compartment::new(Stratum::HivNegative, DiseaseState::Susceptible, 0);
    let one_year_old = Compartment::new(Stratum::HivNegative, DiseaseState::Susceptible, 1);
    state[newborn.index()] = 1_000_000.0;

    apply_annual_event(0.0, &mut state, 0.0).unwrap();
    assert_eq!(state[newborn.index()], 0.0);
    assert_eq!(state[one_year_old.index()], 1_000_000.0);
    assert_eq!(state.iter().sum::<f64>(), 1_000_000.0);
}

#[test]
fn concurrent_evaluations_match_sequential() {
    let model = Model::new(Parameters::default()).unwrap();
    let forcings = Forcings::default();
    let mut rng = SmallRng::seed_from_u64(SEED + 7);
    let states: Vec<Vec<f64>> = (0..4).map(|_| random_state(&mut rng)).collect();
    let sequential: Vec<Vec<f64>> = states
        .iter()
        .map(|state| model.derivative(0.0, state, &forcings, NUM_AGGREGATES).unwrap().derivative)
        .collect();

    let concurrent: Vec<Vec<f64>> = std::thread::scope(|scope| {
        let handles: Vec<_> = states
            .iter()
            .map(|state| {
                let (model, forcings) = (&model, &forcings);
                scope.spawn(move || {
                    model
                        .derivative(0.0, state, forcings, NUM_AGGREGATES)
                        .unwrap()
                        .derivative
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });
    assert_eq!(sequential, concurrent);
}

#[test]
fn evaluation_order_does_not_matter() {
    let model = Model::new(Parameters::default()).unwrap();
    let forcings = Forcings::default();
    let mut rng = SmallRng::seed_from_u64(SEED + 8);
    let state = random_state(&mut rng);
    let first = model.derivative(3.0, &state, &forcings, NUM_AGGREGATES).unwrap();
    model.derivative(1.0, &random_state(&mut rng), &forcings, NUM_AGGREGATES).unwrap();
    let again = model.derivative(3.0, &state, &forcings, NUM_AGGREGATES).unwrap();
    assert_eq!(first, again);
}
