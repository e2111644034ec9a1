//! Time-invariant model parameters.
//!
//! [`Parameters`] names every entry of the 404-value reference parameter vector. It can
//! be built from the flat vector ([`Parameters::from_values`]), written back to it
//! ([`Parameters::to_values`]), or deserialized from named JSON.

use serde_derive::{Deserialize, Serialize};

use crate::error::{check_len, ModelError};
use crate::layout::{NUM_AGE_BANDS, NUM_ART_DURATIONS, NUM_CD4};

/// Number of entries in the flat parameter vector.
pub const NUM_PARAMETERS: usize = FIRST_ART_MORTALITY + ART_MORTALITY_LEN;
const FIRST_ART_MORTALITY: usize = 47;
const ART_MORTALITY_LEN: usize = NUM_AGE_BANDS * NUM_CD4 * NUM_ART_DURATIONS;

/// A value given separately for children aged 0-4, 5-9 and 10-14 and for adults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgeSpecific {
    pub adult: f64,
    pub children: [f64; 3],
}

impl AgeSpecific {
    #[must_use]
    pub fn at_age(&self, age: usize) -> f64 {
        if age < 15 {
            self.children[age / 5]
        } else {
            self.adult
        }
    }
}

/// Relative risk by CD4 category: `base · per_100_cd4^((500 - mid point) / 100)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativeRisk {
    pub base: f64,
    pub per_100_cd4: f64,
}

impl RelativeRisk {
    /// Multiplier at a CD4 mid point. `exponent_sign` is -1 for protection, which
    /// weakens as CD4 falls.
    #[must_use]
    pub fn at(&self, cd4_mid_point: f64, exponent_sign: f64) -> f64 {
        self.base * self.per_100_cd4.powf(exponent_sign * (500.0 - cd4_mid_point) / 100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    /// Transmission coefficient
    pub beta: f64,
    /// Proportion of infections progressing directly to disease
    pub primary_disease: AgeSpecific,
    /// Reactivation rate from latent infection
    pub reactivation: f64,
    /// Protection against disease on reinfection conferred by latent infection
    pub protection: f64,
    /// Proportion of incident disease that is smear-positive
    pub smear_positive: AgeSpecific,
    pub relative_infectiousness_smear_negative: f64,
    pub smear_conversion: f64,
    pub self_cure: f64,
    pub mortality_smear_negative: AgeSpecific,
    pub mortality_smear_positive: AgeSpecific,
    /// Relative transmissibility of resistant strains
    pub fitness_cost: f64,
    /// Proportion of first-line starts acquiring resistance
    pub acquired_resistance: f64,
    /// Susceptibility to superinfection with the other strain
    pub superinfection: f64,
    /// First-line efficacy against resistant disease, naive and treated
    pub first_line_efficacy_resistant: [f64; 2],
    pub mortality_smear_negative_hiv: f64,
    pub mortality_smear_positive_hiv: f64,
    pub rr_primary_disease: RelativeRisk,
    pub rr_reactivation: RelativeRisk,
    pub rr_protection: RelativeRisk,
    /// Reduction in TB risk by ART duration band
    pub art_tb_reduction: [f64; NUM_ART_DURATIONS],
    /// Reduction in TB mortality by ART duration band
    pub art_mortality_reduction: [f64; NUM_ART_DURATIONS],
    pub bcg_efficacy: f64,
    pub smear_positive_hiv: f64,
    pub self_cure_hiv: f64,
    pub relative_infectiousness_smear_negative_hiv: f64,
    pub smear_conversion_hiv: f64,
    /// When false the HIV-positive and on-ART strata are frozen.
    pub hiv_run: bool,
    /// HIV mortality on ART by `(age band, CD4 at initiation, duration)`, duration fastest.
    pub art_mortality: Vec<f64>,
}

impl Parameters {
    /// Builds parameters from the flat reference vector.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::ConfigError` if `values` does not hold exactly
    /// [`NUM_PARAMETERS`] entries or a value is out of range.
    pub fn from_values(values: &[f64]) -> Result<Parameters, ModelError> {
        check_len("parameter vector", values.len(), NUM_PARAMETERS)?;
        let v = values;
        let parameters = Parameters {
            beta: v[0],
            primary_disease: AgeSpecific {
                adult: v[1],
                children: [v[2], v[3], v[4]],
            },
            reactivation: v[5],
            protection: v[6],
            smear_positive: AgeSpecific {
                adult: v[7],
                children: [v[8], v[9], v[10]],
            },
            relative_infectiousness_smear_negative: v[11],
            smear_conversion: v[12],
            self_cure: v[13],
            mortality_smear_negative: AgeSpecific {
                adult: v[14],
                children: [v[15], v[16], v[17]],
            },
            mortality_smear_positive: AgeSpecific {
                adult: v[18],
                children: [v[19], v[20], v[21]],
            },
            fitness_cost: v[22],
            acquired_resistance: v[23],
            superinfection: v[24],
            first_line_efficacy_resistant: [v[25], v[26]],
            mortality_smear_negative_hiv: v[27],
            mortality_smear_positive_hiv: v[28],
            rr_primary_disease: RelativeRisk {
                base: v[29],
                per_100_cd4: v[30],
            },
            rr_reactivation: RelativeRisk {
                base: v[31],
                per_100_cd4: v[32],
            },
            rr_protection: RelativeRisk {
                base: v[33],
                per_100_cd4: v[34],
            },
            art_tb_reduction: [v[35], v[36], v[37]],
            art_mortality_reduction: [v[38], v[39], v[40]],
            bcg_efficacy: v[41],
            smear_positive_hiv: v[42],
            self_cure_hiv: v[43],
            relative_infectiousness_smear_negative_hiv: v[44],
            smear_conversion_hiv: v[45],
            hiv_run: v[46] > 0.0,
            art_mortality: v[FIRST_ART_MORTALITY..].to_vec(),
        };
        parameters.validate()?;
        Ok(parameters)
    }

    /// Flattens back into the reference order.
    #[must_use]
    pub fn to_values(&self) -> Vec<f64> {
        let mut v = Vec::with_capacity(NUM_PARAMETERS);
        v.push(self.beta);
        push_age_specific(&mut v, &self.primary_disease);
        v.push(self.reactivation);
        v.push(self.protection);
        push_age_specific(&mut v, &self.smear_positive);
        v.push(self.relative_infectiousness_smear_negative);
        v.push(self.smear_conversion);
        v.push(self.self_cure);
        push_age_specific(&mut v, &self.mortality_smear_negative);
        push_age_specific(&mut v, &self.mortality_smear_positive);
        v.push(self.fitness_cost);
        v.push(self.acquired_resistance);
        v.push(self.superinfection);
        v.extend_from_slice(&self.first_line_efficacy_resistant);
        v.push(self.mortality_smear_negative_hiv);
        v.push(self.mortality_smear_positive_hiv);
        for rr in [
            &self.rr_primary_disease,
            &self.rr_reactivation,
            &self.rr_protection,
        ] {
            v.push(rr.base);
            v.push(rr.per_100_cd4);
        }
        v.extend_from_slice(&self.art_tb_reduction);
        v.extend_from_slice(&self.art_mortality_reduction);
        v.push(self.bcg_efficacy);
        v.push(self.smear_positive_hiv);
        v.push(self.self_cure_hiv);
        v.push(self.relative_infectiousness_smear_negative_hiv);
        v.push(self.smear_conversion_hiv);
        v.push(if self.hiv_run { 1.0 } else { 0.0 });
        v.extend_from_slice(&self.art_mortality);
        v
    }

    /// HIV mortality hazard on ART for a five-year age band.
    #[inline]
    #[must_use]
    pub fn art_mortality(&self, band: usize, cd4: usize, duration: usize) -> f64 {
        self.art_mortality[band * NUM_CD4 * NUM_ART_DURATIONS + cd4 * NUM_ART_DURATIONS + duration]
    }

    /// Checks table sizes and value ranges.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::ConfigError` naming the first offending field.
    pub fn validate(&self) -> Result<(), ModelError> {
        check_len("art_mortality", self.art_mortality.len(), ART_MORTALITY_LEN)?;

        let proportions = [
            ("primary_disease.adult", self.primary_disease.adult),
            ("primary_disease.children[0]", self.primary_disease.children[0]),
            ("primary_disease.children[1]", self.primary_disease.children[1]),
            ("primary_disease.children[2]", self.primary_disease.children[2]),
            ("protection", self.protection),
            ("smear_positive.adult", self.smear_positive.adult),
            ("smear_positive.children[0]", self.smear_positive.children[0]),
            ("smear_positive.children[1]", self.smear_positive.children[1]),
            ("smear_positive.children[2]", self.smear_positive.children[2]),
            ("acquired_resistance", self.acquired_resistance),
            ("superinfection", self.superinfection),
            (
                "first_line_efficacy_resistant[0]",
                self.first_line_efficacy_resistant[0],
            ),
            (
                "first_line_efficacy_resistant[1]",
                self.first_line_efficacy_resistant[1],
            ),
            ("art_tb_reduction[0]", self.art_tb_reduction[0]),
            ("art_tb_reduction[1]", self.art_tb_reduction[1]),
            ("art_tb_reduction[2]", self.art_tb_reduction[2]),
            ("art_mortality_reduction[0]", self.art_mortality_reduction[0]),
            ("art_mortality_reduction[1]", self.art_mortality_reduction[1]),
            ("art_mortality_reduction[2]", self.art_mortality_reduction[2]),
            ("bcg_efficacy", self.bcg_efficacy),
            ("smear_positive_hiv", self.smear_positive_hiv),
        ];
        for (name, value) in proportions {
            if !(0.0..=1.0).contains(&value) {
                return Err(ModelError::ConfigError(format!(
                    "parameter {name} = {value} must be a proportion in [0, 1]"
                )));
            }
        }

        for (index, value) in self.to_values().into_iter().enumerate() {
            if !value.is_finite() || value < 0.0 {
                return Err(ModelError::ConfigError(format!(
                    "parameter {index} = {value} must be finite and nonnegative"
                )));
            }
        }
        Ok(())
    }
}

fn push_age_specific(values: &mut Vec<f64>, age_specific: &AgeSpecific) {
    values.push(age_specific.adult);
    values.extend_from_slice(&age_specific.children);
}

impl Default for Parameters {
    /// A plausible high-burden setting; useful as a starting point for tests and demos.
    fn default() -> Self {
        Parameters {
            beta: 12.0,
            primary_disease: AgeSpecific {
                adult: 0.14,
                children: [0.26, 0.07, 0.07],
            },
            reactivation: 0.0005,
            protection: 0.65,
            smear_positive: AgeSpecific {
                adult: 0.45,
                children: [0.0, 0.1, 0.1],
            },
            relative_infectiousness_smear_negative: 0.22,
            smear_conversion: 0.015,
            self_cure: 0.2,
            mortality_smear_negative: AgeSpecific {
                adult: 0.2,
                children: [0.24, 0.04, 0.04],
            },
            mortality_smear_positive: AgeSpecific {
                adult: 0.3,
                children: [0.36, 0.06, 0.06],
            },
            fitness_cost: 0.7,
            acquired_resistance: 0.01,
            superinfection: 0.5,
            first_line_efficacy_resistant: [0.5, 0.3],
            mortality_smear_negative_hiv: 0.4,
            mortality_smear_positive_hiv: 0.6,
            rr_primary_disease: RelativeRisk {
                base: 1.5,
                per_100_cd4: 1.3,
            },
            rr_reactivation: RelativeRisk {
                base: 2.0,
                per_100_cd4: 1.4,
            },
            rr_protection: RelativeRisk {
                base: 1.0,
                per_100_cd4: 1.1,
            },
            art_tb_reduction: [0.4, 0.6, 0.7],
            art_mortality_reduction: [0.3, 0.5, 0.6],
            bcg_efficacy: 0.5,
            smear_positive_hiv: 0.3,
            self_cure_hiv: 0.05,
            relative_infectiousness_smear_negative_hiv: 0.15,
            smear_conversion_hiv: 0.01,
            hiv_run: true,
            art_mortality: (0..ART_MORTALITY_LEN)
                .map(|i| {
                    let duration = i % NUM_ART_DURATIONS;
                    let cd4 = (i / NUM_ART_DURATIONS) % NUM_CD4;
                    0.01 * (1.0 + cd4 as f64) / (1.0 + duration as f64)
                })
                .collect(),
        }
    }
}
