//! The flat state vector layout.
//!
//! Every compartment is identified by a [`Compartment`]: a [`Stratum`] (HIV-negative,
//! untreated HIV-positive in one of seven CD4 categories, or on ART by CD4 category at
//! initiation and duration band), a [`DiseaseState`], and a single-year age `0..=80`.
//!
//! The packing puts age on the fastest axis everywhere, then CD4 category, then ART
//! duration, then disease state:
//!
//! | stratum           | offset of `(state, cd4, duration, age)`                 |
//! |-------------------|---------------------------------------------------------|
//! | HIV-negative      | `state·81 + age`                                         |
//! | HIV-positive      | `1215 + state·567 + cd4·81 + age`                        |
//! | on ART            | `9720 + state·1701 + duration·567 + cd4·81 + age`        |
//!
//! Each `(stratum, state)` pair therefore owns one contiguous run of 81 ages, an
//! [`AgeBlock`]. The yearly event walks these blocks and the derivative engine reads
//! and writes through [`Compartment::index`], so nothing else computes offsets.

use std::ops::Range;

use serde_derive::Serialize;
use strum::{EnumCount, EnumIter, IntoEnumIterator, IntoStaticStr};

pub const NUM_AGES: usize = 81;
pub const MAX_AGE: usize = NUM_AGES - 1;
pub const NUM_STATES: usize = DiseaseState::COUNT;
pub const NUM_CD4: usize = 7;
pub const NUM_ART_DURATIONS: usize = 3;
/// Five-year age bands used by banded forcings and the on-ART mortality table.
pub const NUM_AGE_BANDS: usize = 17;
/// One HIV-negative cell plus seven untreated and 21 on-ART cells per age.
pub const NUM_STRATA: usize = 1 + NUM_CD4 + NUM_CD4 * NUM_ART_DURATIONS;

pub const HIV_NEGATIVE_OFFSET: usize = 0;
pub const HIV_POSITIVE_OFFSET: usize = NUM_AGES * NUM_STATES;
pub const ON_ART_OFFSET: usize = HIV_POSITIVE_OFFSET + NUM_AGES * NUM_CD4 * NUM_STATES;
/// Length of every state and derivative vector.
pub const STATE_LEN: usize = ON_ART_OFFSET + NUM_AGES * NUM_CD4 * NUM_ART_DURATIONS * NUM_STATES;

/// Five-year band for a single-year age. The plus-group at 80 has its own band.
#[inline]
#[must_use]
pub fn age_band(age: usize) -> usize {
    (age / 5).min(NUM_AGE_BANDS - 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strain {
    /// Drug-susceptible
    Susceptible,
    /// Drug-resistant
    Resistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum History {
    Naive,
    Treated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Smear {
    Negative,
    Positive,
}

/// Disease and treatment states in packing order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, IntoStaticStr, Serialize,
)]
pub enum DiseaseState {
    #[strum(serialize = "S")]
    Susceptible,
    #[strum(serialize = "Lsn")]
    LatentDsNaive,
    #[strum(serialize = "Lsp")]
    LatentDsTreated,
    #[strum(serialize = "Lmn")]
    LatentDrNaive,
    #[strum(serialize = "Lmp")]
    LatentDrTreated,
    #[strum(serialize = "Nsn")]
    SmearNegDsNaive,
    #[strum(serialize = "Nsp")]
    SmearNegDsTreated,
    #[strum(serialize = "Nmn")]
    SmearNegDrNaive,
    #[strum(serialize = "Nmp")]
    SmearNegDrTreated,
    #[strum(serialize = "Isn")]
    SmearPosDsNaive,
    #[strum(serialize = "Isp")]
    SmearPosDsTreated,
    #[strum(serialize = "Imn")]
    SmearPosDrNaive,
    #[strum(serialize = "Imp")]
    SmearPosDrTreated,
    #[strum(serialize = "PTn")]
    PostTherapyNaive,
    #[strum(serialize = "PTp")]
    PostTherapyTreated,
}

impl DiseaseState {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn from_index(index: usize) -> Option<DiseaseState> {
        DiseaseState::iter().nth(index)
    }

    #[must_use]
    pub fn code(self) -> &'static str {
        self.into()
    }

    #[must_use]
    pub fn latent(strain: Strain, history: History) -> DiseaseState {
        match (strain, history) {
            (Strain::Susceptible, History::Naive) => DiseaseState::LatentDsNaive,
            (Strain::Susceptible, History::Treated) => DiseaseState::LatentDsTreated,
            (Strain::Resistant, History::Naive) => DiseaseState::LatentDrNaive,
            (Strain::Resistant, History::Treated) => DiseaseState::LatentDrTreated,
        }
    }

    #[must_use]
    pub fn active(smear: Smear, strain: Strain, history: History) -> DiseaseState {
        use DiseaseState::*;
        match (smear, strain, history) {
            (Smear::Negative, Strain::Susceptible, History::Naive) => SmearNegDsNaive,
            (Smear::Negative, Strain::Susceptible, History::Treated) => SmearNegDsTreated,
            (Smear::Negative, Strain::Resistant, History::Naive) => SmearNegDrNaive,
            (Smear::Negative, Strain::Resistant, History::Treated) => SmearNegDrTreated,
            (Smear::Positive, Strain::Susceptible, History::Naive) => SmearPosDsNaive,
            (Smear::Positive, Strain::Susceptible, History::Treated) => SmearPosDsTreated,
            (Smear::Positive, Strain::Resistant, History::Naive) => SmearPosDrNaive,
            (Smear::Positive, Strain::Resistant, History::Treated) => SmearPosDrTreated,
        }
    }

    #[must_use]
    pub fn post_therapy(history: History) -> DiseaseState {
        match history {
            History::Naive => DiseaseState::PostTherapyNaive,
            History::Treated => DiseaseState::PostTherapyTreated,
        }
    }

    /// Strain of a latent or active state.
    #[must_use]
    pub fn strain(self) -> Option<Strain> {
        use DiseaseState::*;
        match self {
            LatentDsNaive | LatentDsTreated | SmearNegDsNaive | SmearNegDsTreated
            | SmearPosDsNaive | SmearPosDsTreated => Some(Strain::Susceptible),
            LatentDrNaive | LatentDrTreated | SmearNegDrNaive | SmearNegDrTreated
            | SmearPosDrNaive | SmearPosDrTreated => Some(Strain::Resistant),
            Susceptible | PostTherapyNaive | PostTherapyTreated => None,
        }
    }

    /// Treatment history. Susceptibles count as naive.
    #[must_use]
    pub fn history(self) -> History {
        use DiseaseState::*;
        match self {
            LatentDsTreated | LatentDrTreated | SmearNegDsTreated | SmearNegDrTreated
            | SmearPosDsTreated | SmearPosDrTreated | PostTherapyTreated => History::Treated,
            _ => History::Naive,
        }
    }

    /// Smear status of an active state.
    #[must_use]
    pub fn smear(self) -> Option<Smear> {
        use DiseaseState::*;
        match self {
            SmearNegDsNaive | SmearNegDsTreated | SmearNegDrNaive | SmearNegDrTreated => {
                Some(Smear::Negative)
            }
            SmearPosDsNaive | SmearPosDsTreated | SmearPosDrNaive | SmearPosDrTreated => {
                Some(Smear::Positive)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn is_active(self) -> bool {
        self.smear().is_some()
    }

    #[must_use]
    pub fn is_latent(self) -> bool {
        self.strain().is_some() && !self.is_active()
    }
}

/// A population stratum: one cell of the HIV/CD4/ART cross product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stratum {
    HivNegative,
    HivPositive { cd4: usize },
    OnArt { cd4: usize, duration: usize },
}

impl Stratum {
    /// All strata in packing order: HIV-negative, then untreated by CD4, then on ART
    /// with CD4 varying fastest inside each duration band.
    pub fn iter() -> impl Iterator<Item = Stratum> {
        std::iter::once(Stratum::HivNegative)
            .chain((0..NUM_CD4).map(|cd4| Stratum::HivPositive { cd4 }))
            .chain((0..NUM_ART_DURATIONS).flat_map(|duration| {
                (0..NUM_CD4).map(move |cd4| Stratum::OnArt { cd4, duration })
            }))
    }

    /// Dense position of this stratum in `0..NUM_STRATA`, matching [`Stratum::iter`].
    #[inline]
    #[must_use]
    pub fn ordinal(self) -> usize {
        match self {
            Stratum::HivNegative => 0,
            Stratum::HivPositive { cd4 } => 1 + cd4,
            Stratum::OnArt { cd4, duration } => 1 + NUM_CD4 + duration * NUM_CD4 + cd4,
        }
    }

    #[must_use]
    pub fn from_ordinal(ordinal: usize) -> Option<Stratum> {
        match ordinal {
            0 => Some(Stratum::HivNegative),
            o if o <= NUM_CD4 => Some(Stratum::HivPositive { cd4: o - 1 }),
            o if o < NUM_STRATA => {
                let rest = o - 1 - NUM_CD4;
                Some(Stratum::OnArt {
                    cd4: rest % NUM_CD4,
                    duration: rest / NUM_CD4,
                })
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn cd4(self) -> Option<usize> {
        match self {
            Stratum::HivNegative => None,
            Stratum::HivPositive { cd4 } | Stratum::OnArt { cd4, .. } => Some(cd4),
        }
    }

    /// The ART cell that people from this stratum enter when they start treatment.
    #[must_use]
    pub fn art_entry(self) -> Option<Stratum> {
        match self {
            Stratum::HivPositive { cd4 } => Some(Stratum::OnArt { cd4, duration: 0 }),
            _ => None,
        }
    }

    fn is_valid(self) -> bool {
        match self {
            Stratum::HivNegative => true,
            Stratum::HivPositive { cd4 } => cd4 < NUM_CD4,
            Stratum::OnArt { cd4, duration } => cd4 < NUM_CD4 && duration < NUM_ART_DURATIONS,
        }
    }

    /// Start of the 81-age run holding `state` for this stratum.
    #[inline]
    #[must_use]
    pub fn block_offset(self, state: DiseaseState) -> usize {
        let state = state.index();
        match self {
            Stratum::HivNegative => HIV_NEGATIVE_OFFSET + state * NUM_AGES,
            Stratum::HivPositive { cd4 } => {
                HIV_POSITIVE_OFFSET + state * NUM_AGES * NUM_CD4 + cd4 * NUM_AGES
            }
            Stratum::OnArt { cd4, duration } => {
                ON_ART_OFFSET
                    + state * NUM_AGES * NUM_CD4 * NUM_ART_DURATIONS
                    + duration * NUM_AGES * NUM_CD4
                    + cd4 * NUM_AGES
            }
        }
    }
}

/// One entry of the state vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Compartment {
    pub stratum: Stratum,
    pub state: DiseaseState,
    pub age: usize,
}

impl Compartment {
    #[must_use]
    pub fn new(stratum: Stratum, state: DiseaseState, age: usize) -> Self {
        Compartment {
            stratum,
            state,
            age,
        }
    }

    /// Flat offset into the state vector.
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        debug_assert!(self.age < NUM_AGES && self.stratum.is_valid());
        self.stratum.block_offset(self.state) + self.age
    }

    /// Inverse of [`Compartment::index`]. `None` past the end of the state vector.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Compartment> {
        if index >= STATE_LEN {
            return None;
        }
        let age = index % NUM_AGES;
        let (stratum, state) = if index < HIV_POSITIVE_OFFSET {
            (Stratum::HivNegative, index / NUM_AGES)
        } else if index < ON_ART_OFFSET {
            let rest = (index - HIV_POSITIVE_OFFSET) / NUM_AGES;
            (
                Stratum::HivPositive { cd4: rest % NUM_CD4 },
                rest / NUM_CD4,
            )
        } else {
            let rest = (index - ON_ART_OFFSET) / NUM_AGES;
            let cd4 = rest % NUM_CD4;
            let rest = rest / NUM_CD4;
            (
                Stratum::OnArt {
                    cd4,
                    duration: rest % NUM_ART_DURATIONS,
                },
                rest / NUM_ART_DURATIONS,
            )
        };
        Some(Compartment {
            stratum,
            state: DiseaseState::from_index(state)?,
            age,
        })
    }
}

/// A contiguous run of the 81 single-year ages of one `(stratum, state)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeBlock {
    pub stratum: Stratum,
    pub state: DiseaseState,
}

impl AgeBlock {
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        let start = self.stratum.block_offset(self.state);
        start..start + NUM_AGES
    }
}

/// Every age block of the state vector. Together they cover `0..STATE_LEN` exactly once.
pub fn age_blocks() -> impl Iterator<Item = AgeBlock> {
    Stratum::iter().flat_map(|stratum| {
        DiseaseState::iter().map(move |state| AgeBlock { stratum, state })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_match_reference_layout() {
        assert_eq!(NUM_STATES, 15);
        assert_eq!(HIV_POSITIVE_OFFSET, 1215);
        assert_eq!(ON_ART_OFFSET, 9720);
        assert_eq!(STATE_LEN, 35235);
        assert_eq!(Stratum::iter().count(), NUM_STRATA);
    }

    #[test]
    fn known_offsets() {
        let c = Compartment::new(Stratum::HivNegative, DiseaseState::LatentDsNaive, 3);
        assert_eq!(c.index(), 84);
        let c = Compartment::new(
            Stratum::HivPositive { cd4: 2 },
            DiseaseState::LatentDsNaive,
            5,
        );
        assert_eq!(c.index(), 1215 + 567 + 162 + 5);
        let c = Compartment::new(
            Stratum::OnArt {
                cd4: 6,
                duration: 2,
            },
            DiseaseState::PostTherapyTreated,
            80,
        );
        assert_eq!(c.index(), STATE_LEN - 1);
    }

    #[test]
    fn index_is_a_bijection() {
        let mut seen = vec![false; STATE_LEN];
        for stratum in Stratum::iter() {
            for state in DiseaseState::iter() {
                for age in 0..NUM_AGES {
                    let c = Compartment::new(stratum, state, age);
                    let index = c.index();
                    assert!(!seen[index], "duplicate index {index}");
                    seen[index] = true;
                    assert_eq!(Compartment::from_index(index), Some(c));
                }
            }
        }
        assert!(seen.iter().all(|s| *s));
        assert_eq!(Compartment::from_index(STATE_LEN), None);
    }

    #[test]
    fn ordinal_round_trips() {
        for (position, stratum) in Stratum::iter().enumerate() {
            assert_eq!(stratum.ordinal(), position);
            assert_eq!(Stratum::from_ordinal(position), Some(stratum));
        }
        assert_eq!(Stratum::from_ordinal(NUM_STRATA), None);
    }

    #[test]
    fn age_blocks_tile_the_state_vector() {
        let mut covered = 0;
        let mut ranges: Vec<_> = age_blocks().map(|block| block.range()).collect();
        ranges.sort_by_key(|r| r.start);
        for range in ranges {
            assert_eq!(range.start, covered);
            covered = range.end;
        }
        assert_eq!(covered, STATE_LEN);
    }

    #[test]
    fn state_constructors_agree_with_accessors() {
        for state in DiseaseState::iter() {
            if let Some(smear) = state.smear() {
                let strain = state.strain().unwrap();
                assert_eq!(DiseaseState::active(smear, strain, state.history()), state);
            } else if let Some(strain) = state.strain() {
                assert_eq!(DiseaseState::latent(strain, state.history()), state);
            }
        }
        assert_eq!(DiseaseState::Susceptible.code(), "S");
        assert_eq!(DiseaseState::SmearPosDrTreated.code(), "Imp");
        assert_eq!(
            DiseaseState::post_therapy(History::Treated),
            DiseaseState::PostTherapyTreated
        );
        assert!(DiseaseState::LatentDrNaive.is_latent());
        assert!(!DiseaseState::PostTherapyNaive.is_latent());
    }

    #[test]
    fn age_bands() {
        assert_eq!(age_band(0), 0);
        assert_eq!(age_band(4), 0);
        assert_eq!(age_band(5), 1);
        assert_eq!(age_band(79), 15);
        assert_eq!(age_band(80), 16);
    }
}
