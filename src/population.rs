//! The state vector unpacked into one 15-state cell per `(stratum, age)`.

use strum::IntoEnumIterator;

use crate::error::{check_len, ModelError};
use crate::layout::{
    Compartment, DiseaseState, Stratum, NUM_AGES, NUM_STATES, NUM_STRATA, STATE_LEN,
};

pub type Cell = [f64; NUM_STATES];

#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    cells: Vec<Cell>,
}

#[inline]
fn position(stratum: Stratum, age: usize) -> usize {
    stratum.ordinal() * NUM_AGES + age
}

impl Population {
    #[must_use]
    pub fn zeros() -> Self {
        Population {
            cells: vec![[0.0; NUM_STATES]; NUM_STRATA * NUM_AGES],
        }
    }

    /// Unpacks a flat state vector.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::ConfigError` if `state` is not [`STATE_LEN`] long.
    pub fn unpack(state: &[f64]) -> Result<Self, ModelError> {
        check_len("state vector", state.len(), STATE_LEN)?;
        let mut population = Population::zeros();
        for stratum in Stratum::iter() {
            for disease_state in DiseaseState::iter() {
                let offset = stratum.block_offset(disease_state);
                for (age, value) in state[offset..offset + NUM_AGES].iter().enumerate() {
                    population.cells[position(stratum, age)][disease_state.index()] = *value;
                }
            }
        }
        Ok(population)
    }

    /// Writes every cell back into `out` in layout order.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::ConfigError` if `out` is not [`STATE_LEN`] long.
    pub fn pack_into(&self, out: &mut [f64]) -> Result<(), ModelError> {
        check_len("output vector", out.len(), STATE_LEN)?;
        for stratum in Stratum::iter() {
            for age in 0..NUM_AGES {
                let cell = &self.cells[position(stratum, age)];
                for disease_state in DiseaseState::iter() {
                    let index = Compartment::new(stratum, disease_state, age).index();
                    out[index] = cell[disease_state.index()];
                }
            }
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn cell(&self, stratum: Stratum, age: usize) -> &Cell {
        &self.cells[position(stratum, age)]
    }

    #[inline]
    pub fn add(&mut self, stratum: Stratum, age: usize, state: DiseaseState, amount: f64) {
        self.cells[position(stratum, age)][state.index()] += amount;
    }

    /// Moves `amount` from one compartment to another. `from == to` is a no-op.
    #[inline]
    pub fn transfer(
        &mut self,
        from: (Stratum, DiseaseState),
        to: (Stratum, DiseaseState),
        age: usize,
        amount: f64,
    ) {
        self.add(from.0, age, from.1, -amount);
        self.add(to.0, age, to.1, amount);
    }
}

/// Sum of a cell over all disease states.
#[inline]
#[must_use]
pub fn cell_total(cell: &Cell) -> f64 {
    cell.iter().sum()
}
