//! HIV and ART demography: where new HIV infections land by CD4 category, how fast
//! untreated people move down the CD4 categories, HIV mortality with and without ART,
//! and progression through time-on-ART bands.
//!
//! The untreated tables are fixed AIM-style values by age group. On-ART mortality comes
//! from the parameter table by five-year age band.

use crate::layout::{age_band, NUM_AGES, NUM_ART_DURATIONS, NUM_CD4};
use crate::parameters::Parameters;

/// Hazard of moving from each ART duration band to the next. The last band is absorbing.
pub const ART_DURATION_PROGRESSION: [f64; NUM_ART_DURATIONS] = [2.0, 2.0, 0.0];

// Share of new infections entering the two highest CD4 categories,
// for ages <25, 25-34, 35-44 and 45+.
const NEW_INFECTION_CD4: [[f64; 2]; 4] = [
    [0.643, 0.357],
    [0.607, 0.393],
    [0.585, 0.415],
    [0.552, 0.448],
];

// Hazard of leaving each CD4 category for the next one down,
// for ages <15, 15-24, 25-34, 35-44 and 45+.
const CD4_PROGRESSION: [[f64; NUM_CD4]; 5] = [
    [0.298, 0.239, 0.183, 0.183, 0.130, 0.130, 0.0],
    [0.117, 0.223, 0.294, 0.508, 0.214, 0.348, 0.0],
    [0.147, 0.240, 0.452, 1.087, 0.637, 1.449, 0.0],
    [0.183, 0.355, 0.581, 1.250, 0.676, 1.449, 0.0],
    [0.213, 0.535, 0.855, 1.818, 0.952, 2.000, 0.0],
];

// Untreated HIV mortality by CD4 category,
// for ages <5, 5-14, 15-24, 25-34, 35-44 and 45+.
const HIV_MORTALITY: [[f64; NUM_CD4]; 6] = [
    [0.312, 0.382, 0.466, 0.466, 0.569, 0.569, 0.569],
    [0.039, 0.048, 0.058, 0.058, 0.071, 0.071, 0.071],
    [0.005, 0.011, 0.026, 0.061, 0.139, 0.321, 0.737],
    [0.004, 0.010, 0.026, 0.069, 0.185, 0.499, 1.342],
    [0.005, 0.013, 0.036, 0.096, 0.258, 0.691, 1.851],
    [0.005, 0.013, 0.032, 0.080, 0.203, 0.513, 1.295],
];

fn adult_group(age: usize) -> usize {
    match age {
        0..=24 => 0,
        25..=34 => 1,
        35..=44 => 2,
        _ => 3,
    }
}

fn progression_group(age: usize) -> usize {
    match age {
        0..=14 => 0,
        15..=24 => 1,
        25..=34 => 2,
        35..=44 => 3,
        _ => 4,
    }
}

fn mortality_group(age: usize) -> usize {
    match age {
        0..=4 => 0,
        5..=14 => 1,
        15..=24 => 2,
        25..=34 => 3,
        35..=44 => 4,
        _ => 5,
    }
}

/// Per-age HIV/ART tables. Fields are public so scenarios can switch parts off.
#[derive(Debug, Clone, PartialEq)]
pub struct HivTables {
    /// Distribution of new infections across CD4 categories, by age
    pub new_infection_cd4: Vec<[f64; NUM_CD4]>,
    /// Hazard of leaving each CD4 category downwards, by age
    pub cd4_progression: Vec<[f64; NUM_CD4]>,
    /// Untreated HIV mortality hazard, by age
    pub hiv_mortality: Vec<[f64; NUM_CD4]>,
    /// HIV mortality on ART by age, CD4 at initiation and duration band
    pub art_mortality: Vec<[[f64; NUM_ART_DURATIONS]; NUM_CD4]>,
    pub art_progression: [f64; NUM_ART_DURATIONS],
}

impl HivTables {
    #[must_use]
    pub fn new(parameters: &Parameters) -> Self {
        let new_infection_cd4 = (0..NUM_AGES)
            .map(|age| {
                let [top, next] = NEW_INFECTION_CD4[adult_group(age)];
                let mut split = [0.0; NUM_CD4];
                split[0] = top;
                split[1] = next;
                split
            })
            .collect();
        let cd4_progression = (0..NUM_AGES)
            .map(|age| CD4_PROGRESSION[progression_group(age)])
            .collect();
        let hiv_mortality = (0..NUM_AGES)
            .map(|age| HIV_MORTALITY[mortality_group(age)])
            .collect();
        let art_mortality = (0..NUM_AGES)
            .map(|age| {
                let band = age_band(age);
                std::array::from_fn(|cd4| {
                    std::array::from_fn(|duration| {
                        parameters.art_mortality(band, cd4, duration)
                    })
                })
            })
            .collect();
        HivTables {
            new_infection_cd4,
            cd4_progression,
            hiv_mortality,
            art_mortality,
            art_progression: ART_DURATION_PROGRESSION,
        }
    }
}
