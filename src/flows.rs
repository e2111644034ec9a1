//! The TB flows of a single `(stratum, age)` cell.
//!
//! One routine serves all three kinds of stratum. What differs between them is carried
//! by the inputs: the [`TbRates`] for the stratum, and the [`CareRates`] holding the
//! detection, testing and treatment inputs that apply to people of that HIV/ART status.
//! In the untreated HIV-positive stratum some treated and falsely diagnosed people are
//! also tested for HIV and linked to ART; those flows leave the stratum for ART
//! duration band 0 of the same CD4 category ([`Destination::StartArt`]).
//!
//! Demographic flows (background and HIV death, HIV incidence, CD4 and ART
//! progression, ART initiation, migration) are handled by the engine.

use strum::{EnumCount, EnumIter, IntoEnumIterator, IntoStaticStr};

use crate::forcings::{DstCoverage, Forcings, TestAccuracy};
use crate::infection::ForceOfInfection;
use crate::layout::{DiseaseState, History, Smear, Strain, Stratum};
use crate::natural_history::TbRates;
use crate::parameters::Parameters;
use crate::population::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, IntoStaticStr)]
pub enum FlowKind {
    /// New infection of a susceptible, or reinfection ending in latency
    Infection,
    /// Primary disease, reactivation or reinfection disease
    Disease,
    /// Replacement of one latent strain by the other
    StrainReplacement,
    SmearConversion,
    SelfCure,
    TbDeath,
    AcquiredResistance,
    TreatmentSuccess,
    TreatmentFailure,
    /// Treatment of a false-positive diagnosis
    FalsePositive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Another state of the same stratum
    Within(DiseaseState),
    /// A state of the ART stratum entered from this one
    StartArt(DiseaseState),
    /// Leaves the population
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Flow {
    pub kind: FlowKind,
    pub from: DiseaseState,
    pub to: Destination,
    /// People per unit time
    pub amount: f64,
}

/// A reusable buffer of flows for one cell.
#[derive(Debug, Clone, Default)]
pub struct FlowSet {
    flows: Vec<Flow>,
}

impl FlowSet {
    #[must_use]
    pub fn new() -> Self {
        FlowSet::default()
    }

    pub fn clear(&mut self) {
        self.flows.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flow> {
        self.flows.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.flows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Total of all flows of one kind.
    #[must_use]
    pub fn total(&self, kind: FlowKind) -> f64 {
        self.flows
            .iter()
            .filter(|flow| flow.kind == kind)
            .map(|flow| flow.amount)
            .sum()
    }

    fn push(&mut self, kind: FlowKind, from: DiseaseState, to: Destination, amount: f64) {
        self.flows.push(Flow {
            kind,
            from,
            to,
            amount,
        });
    }

    fn within(&mut self, kind: FlowKind, from: DiseaseState, to: DiseaseState, amount: f64) {
        self.push(kind, from, Destination::Within(to), amount);
    }

    /// Splits a flow between staying in the stratum and linking to ART.
    fn linked(
        &mut self,
        kind: FlowKind,
        from: DiseaseState,
        to: DiseaseState,
        amount: f64,
        art_link: f64,
    ) {
        self.within(kind, from, to, amount * (1.0 - art_link));
        if art_link > 0.0 {
            self.push(kind, from, Destination::StartArt(to), amount * art_link);
        }
    }
}

impl<'a> IntoIterator for &'a FlowSet {
    type Item = &'a Flow;
    type IntoIter = std::slice::Iter<'a, Flow>;

    fn into_iter(self) -> Self::IntoIter {
        self.flows.iter()
    }
}

/// Detection, testing and treatment inputs for one HIV/ART status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CareRates {
    pub detection: f64,
    pub relative_detection_smear_negative: f64,
    pub tests: TestAccuracy,
    pub dst: DstCoverage,
    pub linkage_first_line: f64,
    pub linkage_second_line: f64,
    pub first_line_success: f64,
    pub second_line_success: f64,
    /// First-line efficacy against resistant disease, for naive and treated cases
    pub first_line_efficacy_resistant: [f64; 2],
    pub acquired_resistance: f64,
    pub presentation_without_tb: f64,
    /// Proportion of treated TB patients who are tested for HIV and linked to ART
    pub art_link: f64,
}

impl CareRates {
    #[must_use]
    pub fn for_stratum(stratum: Stratum, parameters: &Parameters, forcings: &Forcings) -> Self {
        let (detection, tests, dst) = match stratum {
            Stratum::HivNegative => (
                forcings.detection_hiv_negative,
                forcings.tests_hiv_negative,
                forcings.dst_hiv_negative,
            ),
            _ => (
                forcings.detection_hiv_positive,
                forcings.tests_hiv_positive,
                forcings.dst_hiv_positive,
            ),
        };
        let (first_line_success, second_line_success) = match stratum {
            Stratum::HivNegative => (
                forcings.first_line_success.hiv_negative,
                forcings.second_line_success.hiv_negative,
            ),
            Stratum::HivPositive { .. } => (
                forcings.first_line_success.hiv_positive,
                forcings.second_line_success.hiv_positive,
            ),
            Stratum::OnArt { .. } => (
                forcings.first_line_success.on_art,
                forcings.second_line_success.on_art,
            ),
        };
        let art_link = match stratum {
            Stratum::HivPositive { .. } => forcings.hiv_tested * forcings.art_linkage,
            _ => 0.0,
        };
        CareRates {
            detection,
            relative_detection_smear_negative: forcings.relative_detection_smear_negative,
            tests,
            dst,
            linkage_first_line: forcings.linkage_first_line,
            linkage_second_line: forcings.linkage_second_line,
            first_line_success,
            second_line_success,
            first_line_efficacy_resistant: parameters.first_line_efficacy_resistant,
            acquired_resistance: parameters.acquired_resistance,
            presentation_without_tb: forcings.presentation_without_tb,
            art_link,
        }
    }

    /// Rate at which people without active TB are diagnosed and started on treatment.
    #[must_use]
    pub fn false_positive_rate(&self) -> f64 {
        self.presentation_without_tb
            * self.detection
            * (1.0
                - self.tests.specificity_smear_positive * self.tests.specificity_smear_negative)
            * self.linkage_first_line
    }

    fn detection_of(&self, smear: Smear) -> f64 {
        match smear {
            Smear::Positive => self.detection * self.tests.sensitivity_smear_positive,
            Smear::Negative => {
                self.detection
                    * self.tests.sensitivity_smear_negative
                    * self.relative_detection_smear_negative
            }
        }
    }

    fn dst_coverage(&self, history: History) -> f64 {
        match history {
            History::Naive => self.dst.naive,
            History::Treated => self.dst.treated,
        }
    }

    fn efficacy_against_resistant(&self, history: History) -> f64 {
        match history {
            History::Naive => self.first_line_efficacy_resistant[0],
            History::Treated => self.first_line_efficacy_resistant[1],
        }
    }
}

/// Treatment starts in one cell, split by regimen and by whether the regimen matched
/// the strain.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Notifications {
    /// Drug-susceptible cases started on first-line treatment
    pub ds_first_line: f64,
    /// Drug-susceptible cases wrongly started on second-line treatment
    pub ds_second_line: f64,
    /// Drug-resistant cases wrongly started on first-line treatment
    pub dr_first_line: f64,
    /// Drug-resistant cases started on second-line treatment
    pub dr_second_line: f64,
    /// People without active TB started on treatment
    pub false_positive: f64,
}

impl std::ops::AddAssign for Notifications {
    fn add_assign(&mut self, other: Notifications) {
        self.ds_first_line += other.ds_first_line;
        self.ds_second_line += other.ds_second_line;
        self.dr_first_line += other.dr_first_line;
        self.dr_second_line += other.dr_second_line;
        self.false_positive += other.false_positive;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CellSummary {
    /// Flows into active disease from susceptible, latent and post-therapy states
    pub new_cases: f64,
    pub notifications: Notifications,
}

/// Fills `flows` with every TB flow out of the compartments of `cell` and returns
/// the cell's incidence and notifications. `flows` is cleared first.
pub fn cell_flows(
    cell: &Cell,
    rates: &TbRates,
    care: &CareRates,
    foi: &ForceOfInfection,
    superinfection: f64,
    flows: &mut FlowSet,
) -> CellSummary {
    flows.clear();
    let mut notifications = Notifications::default();
    let false_positive_rate = care.false_positive_rate();

    for state in DiseaseState::iter() {
        let count = cell[state.index()];
        if count == 0.0 {
            continue;
        }
        if state.is_active() {
            active_flows(state, count, rates, care, flows, &mut notifications);
        } else {
            infection_flows(state, count, rates, foi, superinfection, flows);
            false_positive_flows(state, count, care, false_positive_rate, flows);
            notifications.false_positive += false_positive_rate * count;
        }
    }

    CellSummary {
        new_cases: flows.total(FlowKind::Disease),
        notifications,
    }
}

// Infection, reinfection, reactivation and strain replacement out of a state without
// active disease. Prior infection protects only against reinfection.
fn infection_flows(
    state: DiseaseState,
    count: f64,
    rates: &TbRates,
    foi: &ForceOfInfection,
    superinfection: f64,
    flows: &mut FlowSet,
) {
    let history = state.history();
    let primary = rates.primary_disease;
    let smear_positive = rates.smear_positive;
    let unprotected = if state == DiseaseState::Susceptible {
        1.0
    } else {
        1.0 - rates.protection
    };

    for strain in [Strain::Susceptible, Strain::Resistant] {
        let force = foi.of(strain);
        let mut disease = force * primary * unprotected;
        if state.strain() == Some(strain) {
            disease += rates.reactivation;
        }
        flows.within(
            FlowKind::Disease,
            state,
            DiseaseState::active(Smear::Negative, strain, history),
            disease * (1.0 - smear_positive) * count,
        );
        flows.within(
            FlowKind::Disease,
            state,
            DiseaseState::active(Smear::Positive, strain, history),
            disease * smear_positive * count,
        );

        // Latent infection with a strain the person does not already carry
        if state.strain() != Some(strain) {
            let replacement = match (state, strain) {
                (DiseaseState::Susceptible, _) => 1.0,
                (_, Strain::Resistant) => superinfection,
                (_, Strain::Susceptible) if state.is_latent() => 1.0 - superinfection,
                (_, Strain::Susceptible) => 1.0,
            };
            let kind = if state.is_latent() {
                FlowKind::StrainReplacement
            } else {
                FlowKind::Infection
            };
            flows.within(
                kind,
                state,
                DiseaseState::latent(strain, history),
                force * (1.0 - primary) * unprotected * replacement * count,
            );
        }
    }
}

// Natural history and the diagnosis and treatment cascade of an active state.
// Cases lost to follow-up return to the state they came from, so they are not flows.
fn active_flows(
    state: DiseaseState,
    count: f64,
    rates: &TbRates,
    care: &CareRates,
    flows: &mut FlowSet,
    notifications: &mut Notifications,
) {
    let (Some(smear), Some(strain)) = (state.smear(), state.strain()) else {
        return;
    };
    let history = state.history();

    if smear == Smear::Negative {
        flows.within(
            FlowKind::SmearConversion,
            state,
            DiseaseState::active(Smear::Positive, strain, history),
            rates.smear_conversion * count,
        );
    }
    flows.within(
        FlowKind::SelfCure,
        state,
        DiseaseState::latent(strain, history),
        rates.self_cure * count,
    );
    flows.push(
        FlowKind::TbDeath,
        state,
        Destination::Exit,
        rates.mortality(state) * count,
    );

    let detected = care.detection_of(smear) * count;
    let tested = detected * care.dst_coverage(history);
    let cured = DiseaseState::latent(strain, History::Treated);
    let failed = DiseaseState::active(smear, strain, History::Treated);
    let link = care.art_link;

    match strain {
        Strain::Susceptible => {
            let misclassified = tested * (1.0 - care.tests.specificity_resistance);
            let first_line = care.linkage_first_line * (detected - misclassified);
            let second_line = care.linkage_second_line * misclassified;
            let resistant = first_line * care.acquired_resistance;
            let completed = first_line - resistant;

            flows.linked(
                FlowKind::AcquiredResistance,
                state,
                DiseaseState::active(smear, Strain::Resistant, History::Treated),
                resistant,
                link,
            );
            flows.linked(
                FlowKind::TreatmentSuccess,
                state,
                cured,
                completed * care.first_line_success,
                link,
            );
            flows.linked(
                FlowKind::TreatmentFailure,
                state,
                failed,
                completed * (1.0 - care.first_line_success),
                link,
            );
            flows.linked(
                FlowKind::TreatmentSuccess,
                state,
                cured,
                second_line * care.second_line_success,
                link,
            );
            flows.linked(
                FlowKind::TreatmentFailure,
                state,
                failed,
                second_line * (1.0 - care.second_line_success),
                link,
            );
            notifications.ds_first_line += first_line;
            notifications.ds_second_line += second_line;
        }
        Strain::Resistant => {
            let identified = tested * care.tests.sensitivity_resistance;
            let first_line = care.linkage_first_line * (detected - identified);
            let second_line = care.linkage_second_line * identified;
            let first_line_cured =
                first_line * care.first_line_success * care.efficacy_against_resistant(history);

            flows.linked(
                FlowKind::TreatmentSuccess,
                state,
                cured,
                first_line_cured,
                link,
            );
            flows.linked(
                FlowKind::TreatmentFailure,
                state,
                failed,
                first_line - first_line_cured,
                link,
            );
            flows.linked(
                FlowKind::TreatmentSuccess,
                state,
                cured,
                second_line * care.second_line_success,
                link,
            );
            flows.linked(
                FlowKind::TreatmentFailure,
                state,
                failed,
                second_line * (1.0 - care.second_line_success),
                link,
            );
            notifications.dr_first_line += first_line;
            notifications.dr_second_line += second_line;
        }
    }
}

// People without active TB who are diagnosed anyway. Treatment only changes anything
// for drug-susceptible latent infection, which it clears into post-therapy. In the
// untreated HIV-positive stratum the diagnosis also links a share of them to ART.
fn false_positive_flows(
    state: DiseaseState,
    count: f64,
    care: &CareRates,
    rate: f64,
    flows: &mut FlowSet,
) {
    let diagnosed = rate * count;
    let link = care.art_link;
    if state.is_latent() && state.strain() == Some(Strain::Susceptible) {
        let cleared = DiseaseState::post_therapy(state.history());
        flows.linked(
            FlowKind::FalsePositive,
            state,
            cleared,
            diagnosed * care.first_line_success,
            link,
        );
        if link > 0.0 {
            flows.push(
                FlowKind::FalsePositive,
                state,
                Destination::StartArt(state),
                diagnosed * (1.0 - care.first_line_success) * link,
            );
        }
    } else if link > 0.0 {
        flows.push(
            FlowKind::FalsePositive,
            state,
            Destination::StartArt(state),
            diagnosed * link,
        );
    }
}
