//! Time-dependent external drivers, already evaluated at the current time.
//!
//! [`Forcings`] names every entry of the 166-value reference forcing vector. Banded
//! inputs (HIV incidence, migration, ART coverage) hold one value per five-year age
//! band; background mortality holds one hazard per single-year age.

use serde_derive::{Deserialize, Serialize};

use crate::error::{check_len, ModelError};
use crate::layout::{age_band, NUM_AGES, NUM_AGE_BANDS, NUM_CD4};

/// Number of entries in the flat forcing vector.
pub const NUM_FORCINGS: usize = 166;

/// Test sensitivity and specificity for one HIV status.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestAccuracy {
    pub sensitivity_smear_positive: f64,
    pub sensitivity_smear_negative: f64,
    pub sensitivity_resistance: f64,
    pub specificity_smear_positive: f64,
    pub specificity_smear_negative: f64,
    pub specificity_resistance: f64,
}

/// Drug-susceptibility testing coverage for one HIV status.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DstCoverage {
    pub naive: f64,
    pub treated: f64,
}

/// Treatment success for one regimen, by HIV/ART status.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreatmentSuccess {
    pub hiv_negative: f64,
    pub hiv_positive: f64,
    pub on_art: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forcings {
    /// Births per 1000 population per year
    pub birth_rate: f64,
    /// Background mortality hazard by single-year age
    pub background_mortality: Vec<f64>,
    /// HIV incidence hazard by age band
    pub hiv_incidence: Vec<f64>,
    pub bcg_coverage: f64,
    /// Subtract disease deaths from background mortality
    pub adjust_background_mortality: bool,
    pub detection_hiv_negative: f64,
    pub detection_hiv_positive: f64,
    /// Relative detection rate of smear-negative disease
    pub relative_detection_smear_negative: f64,
    pub dst_hiv_negative: DstCoverage,
    pub dst_hiv_positive: DstCoverage,
    pub linkage_first_line: f64,
    pub linkage_second_line: f64,
    pub first_line_success: TreatmentSuccess,
    pub second_line_success: TreatmentSuccess,
    /// Net migration by age band, as a count per five-year band per year
    pub migration: Vec<f64>,
    pub tests_hiv_negative: TestAccuracy,
    pub tests_hiv_positive: TestAccuracy,
    /// Relative rate at which people without TB present and are tested
    pub presentation_without_tb: f64,
    /// ART coverage target by age band
    pub art_coverage: Vec<f64>,
    /// CD4 categories with index at or above this are eligible for ART
    pub art_threshold: f64,
    /// Proportion of notified TB cases tested for HIV
    pub hiv_tested: f64,
    /// Proportion of HIV-positive notified cases linked to ART
    pub art_linkage: f64,
}

impl Forcings {
    /// Builds forcings from the flat reference vector.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::ConfigError` if `values` does not hold exactly
    /// [`NUM_FORCINGS`] entries or a value is out of range.
    pub fn from_values(values: &[f64]) -> Result<Forcings, ModelError> {
        check_len("forcing vector", values.len(), NUM_FORCINGS)?;
        let v = values;
        let banded = |start: usize| v[start..start + NUM_AGE_BANDS].to_vec();
        let accuracy = |start: usize| TestAccuracy {
            sensitivity_smear_positive: v[start],
            sensitivity_smear_negative: v[start + 1],
            sensitivity_resistance: v[start + 2],
            specificity_smear_positive: v[start + 3],
            specificity_smear_negative: v[start + 4],
            specificity_resistance: v[start + 5],
        };
        let forcings = Forcings {
            birth_rate: v[0],
            background_mortality: v[1..=NUM_AGES].to_vec(),
            hiv_incidence: banded(82),
            bcg_coverage: v[99],
            adjust_background_mortality: v[100] > 0.0,
            detection_hiv_negative: v[101],
            detection_hiv_positive: v[102],
            relative_detection_smear_negative: v[103],
            dst_hiv_negative: DstCoverage {
                naive: v[104],
                treated: v[105],
            },
            dst_hiv_positive: DstCoverage {
                naive: v[106],
                treated: v[107],
            },
            linkage_first_line: v[108],
            linkage_second_line: v[109],
            first_line_success: TreatmentSuccess {
                hiv_negative: v[110],
                hiv_positive: v[111],
                on_art: v[112],
            },
            second_line_success: TreatmentSuccess {
                hiv_negative: v[113],
                hiv_positive: v[114],
                on_art: v[115],
            },
            migration: banded(116),
            tests_hiv_negative: accuracy(133),
            tests_hiv_positive: accuracy(139),
            presentation_without_tb: v[145],
            art_coverage: banded(146),
            art_threshold: v[163],
            hiv_tested: v[164],
            art_linkage: v[165],
        };
        forcings.validate()?;
        Ok(forcings)
    }

    /// Flattens back into the reference order.
    #[must_use]
    pub fn to_values(&self) -> Vec<f64> {
        let mut v = Vec::with_capacity(NUM_FORCINGS);
        v.push(self.birth_rate);
        v.extend_from_slice(&self.background_mortality);
        v.extend_from_slice(&self.hiv_incidence);
        v.push(self.bcg_coverage);
        v.push(if self.adjust_background_mortality {
            1.0
        } else {
            0.0
        });
        v.push(self.detection_hiv_negative);
        v.push(self.detection_hiv_positive);
        v.push(self.relative_detection_smear_negative);
        for dst in [&self.dst_hiv_negative, &self.dst_hiv_positive] {
            v.push(dst.naive);
            v.push(dst.treated);
        }
        v.push(self.linkage_first_line);
        v.push(self.linkage_second_line);
        for success in [&self.first_line_success, &self.second_line_success] {
            v.push(success.hiv_negative);
            v.push(success.hiv_positive);
            v.push(success.on_art);
        }
        v.extend_from_slice(&self.migration);
        for tests in [&self.tests_hiv_negative, &self.tests_hiv_positive] {
            v.push(tests.sensitivity_smear_positive);
            v.push(tests.sensitivity_smear_negative);
            v.push(tests.sensitivity_resistance);
            v.push(tests.specificity_smear_positive);
            v.push(tests.specificity_smear_negative);
            v.push(tests.specificity_resistance);
        }
        v.push(self.presentation_without_tb);
        v.extend_from_slice(&self.art_coverage);
        v.push(self.art_threshold);
        v.push(self.hiv_tested);
        v.push(self.art_linkage);
        v
    }

    #[inline]
    #[must_use]
    pub fn hiv_incidence_at(&self, age: usize) -> f64 {
        self.hiv_incidence[age_band(age)]
    }

    /// Net migration apportioned to one single-year age.
    #[inline]
    #[must_use]
    pub fn migration_at(&self, age: usize) -> f64 {
        self.migration[age_band(age)] / 5.0
    }

    #[inline]
    #[must_use]
    pub fn art_coverage_at(&self, age: usize) -> f64 {
        self.art_coverage[age_band(age)]
    }

    /// Whether people in a CD4 category are eligible to start ART.
    #[inline]
    #[must_use]
    pub fn art_eligible(&self, cd4: usize) -> bool {
        cd4 as f64 >= self.art_threshold
    }

    /// Checks that the per-age and banded tables have the sizes the accessors index.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::ConfigError` naming the first short or long table.
    pub fn check_tables(&self) -> Result<(), ModelError> {
        check_len(
            "background_mortality",
            self.background_mortality.len(),
            NUM_AGES,
        )?;
        check_len("hiv_incidence", self.hiv_incidence.len(), NUM_AGE_BANDS)?;
        check_len("migration", self.migration.len(), NUM_AGE_BANDS)?;
        check_len("art_coverage", self.art_coverage.len(), NUM_AGE_BANDS)
    }

    /// Checks table sizes and value ranges. Migration may be negative.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::ConfigError` naming the first offending field.
    pub fn validate(&self) -> Result<(), ModelError> {
        self.check_tables()?;

        let mut proportions = vec![
            ("bcg_coverage", self.bcg_coverage),
            ("dst_hiv_negative.naive", self.dst_hiv_negative.naive),
            ("dst_hiv_negative.treated", self.dst_hiv_negative.treated),
            ("dst_hiv_positive.naive", self.dst_hiv_positive.naive),
            ("dst_hiv_positive.treated", self.dst_hiv_positive.treated),
            ("linkage_first_line", self.linkage_first_line),
            ("linkage_second_line", self.linkage_second_line),
            ("hiv_tested", self.hiv_tested),
            ("art_linkage", self.art_linkage),
        ];
        for (name, success) in [
            ("first_line_success", &self.first_line_success),
            ("second_line_success", &self.second_line_success),
        ] {
            proportions.push((name, success.hiv_negative));
            proportions.push((name, success.hiv_positive));
            proportions.push((name, success.on_art));
        }
        for (name, tests) in [
            ("tests_hiv_negative", &self.tests_hiv_negative),
            ("tests_hiv_positive", &self.tests_hiv_positive),
        ] {
            proportions.push((name, tests.sensitivity_smear_positive));
            proportions.push((name, tests.sensitivity_smear_negative));
            proportions.push((name, tests.sensitivity_resistance));
            proportions.push((name, tests.specificity_smear_positive));
            proportions.push((name, tests.specificity_smear_negative));
            proportions.push((name, tests.specificity_resistance));
        }
        for coverage in &self.art_coverage {
            proportions.push(("art_coverage", *coverage));
        }
        for (name, value) in proportions {
            if !(0.0..=1.0).contains(&value) {
                return Err(ModelError::ConfigError(format!(
                    "forcing {name} = {value} must be a proportion in [0, 1]"
                )));
            }
        }

        for (index, value) in self.to_values().into_iter().enumerate() {
            let is_migration = (116..116 + NUM_AGE_BANDS).contains(&index);
            if !value.is_finite() || (value < 0.0 && !is_migration) {
                return Err(ModelError::ConfigError(format!(
                    "forcing {index} = {value} must be finite and nonnegative"
                )));
            }
        }
        Ok(())
    }

    /// Forcings with every demographic driver switched off: no births, deaths,
    /// migration or HIV incidence. TB care inputs keep their default values.
    #[must_use]
    pub fn closed_population() -> Forcings {
        Forcings {
            birth_rate: 0.0,
            background_mortality: vec![0.0; NUM_AGES],
            hiv_incidence: vec![0.0; NUM_AGE_BANDS],
            migration: vec![0.0; NUM_AGE_BANDS],
            ..Forcings::default()
        }
    }
}

impl Default for Forcings {
    /// A plausible setting with a generalized HIV epidemic and partial ART coverage.
    fn default() -> Self {
        let accuracy = TestAccuracy {
            sensitivity_smear_positive: 0.9,
            sensitivity_smear_negative: 0.6,
            sensitivity_resistance: 0.95,
            specificity_smear_positive: 0.98,
            specificity_smear_negative: 0.95,
            specificity_resistance: 0.98,
        };
        Forcings {
            birth_rate: 25.0,
            background_mortality: (0..NUM_AGES)
                .map(|age| match age {
                    0 => 0.05,
                    1..=4 => 0.005,
                    5..=49 => 0.003 + 0.0002 * age as f64,
                    _ => 0.01 * 1.08_f64.powi(age as i32 - 50),
                })
                .collect(),
            hiv_incidence: (0..NUM_AGE_BANDS)
                .map(|band| if (3..10).contains(&band) { 0.01 } else { 0.0 })
                .collect(),
            bcg_coverage: 0.8,
            adjust_background_mortality: true,
            detection_hiv_negative: 0.7,
            detection_hiv_positive: 0.9,
            relative_detection_smear_negative: 0.6,
            dst_hiv_negative: DstCoverage {
                naive: 0.1,
                treated: 0.6,
            },
            dst_hiv_positive: DstCoverage {
                naive: 0.2,
                treated: 0.7,
            },
            linkage_first_line: 0.9,
            linkage_second_line: 0.7,
            first_line_success: TreatmentSuccess {
                hiv_negative: 0.85,
                hiv_positive: 0.75,
                on_art: 0.8,
            },
            second_line_success: TreatmentSuccess {
                hiv_negative: 0.6,
                hiv_positive: 0.5,
                on_art: 0.55,
            },
            migration: vec![0.0; NUM_AGE_BANDS],
            tests_hiv_negative: accuracy,
            tests_hiv_positive: TestAccuracy {
                sensitivity_smear_positive: 0.8,
                sensitivity_smear_negative: 0.5,
                ..accuracy
            },
            presentation_without_tb: 0.01,
            art_coverage: vec![0.5; NUM_AGE_BANDS],
            art_threshold: (NUM_CD4 - 3) as f64,
            hiv_tested: 0.8,
            art_linkage: 0.6,
        }
    }
}
