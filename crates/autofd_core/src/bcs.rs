//! Periodic boundary conditions on the halo of work arrays.

use crate::error::Result;
use crate::grid::{ArrayId, Grid, WorkArrays};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BcState {
    Unapplied,
    Applied,
}

/// Halo rule of one array along one direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodicRule {
    pub array: ArrayId,
    pub direction: usize,
    /// Interior points along `direction`.
    pub points: usize,
    pub halo: usize,
}

impl PeriodicRule {
    /// Interior index a ghost point copies from, for ghosts `-halo..0` and
    /// `points..points + halo`. Interior points map to `None`. A halo wider
    /// than the interior wraps around it more than once.
    pub fn source(&self, ghost: i64) -> Option<i64> {
        let n = self.points as i64;
        let h = self.halo as i64;
        if (-h..0).contains(&ghost) || (n..n + h).contains(&ghost) {
            Some(ghost.rem_euclid(n))
        } else {
            None
        }
    }

    /// `(ghost, source)` pairs on both sides.
    pub fn copies(&self) -> Vec<(i64, i64)> {
        let n = self.points as i64;
        let h = self.halo as i64;
        (-h..0)
            .chain(n..n + h)
            .filter_map(|ghost| self.source(ghost).map(|src| (ghost, src)))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct PeriodicBoundaryCondition {
    grid: Grid,
    rules: IndexMap<(ArrayId, usize), PeriodicRule>,
}

impl PeriodicBoundaryCondition {
    pub fn new(grid: &Grid) -> Self {
        Self {
            grid: grid.clone(),
            rules: IndexMap::new(),
        }
    }

    /// Marks `names` periodic along `direction`. Applying a pair twice leaves
    /// a single rule.
    pub fn apply(&mut self, arrays: &WorkArrays, names: &[&str], direction: usize) -> Result<()> {
        self.grid.check_direction(direction)?;
        let ids = names
            .iter()
            .map(|name| arrays.lookup(name))
            .collect::<Result<Vec<_>>>()?;
        for id in ids {
            self.rules.entry((id, direction)).or_insert_with(|| {
                debug!(array = arrays.name(id), direction, "periodic boundary");
                PeriodicRule {
                    array: id,
                    direction,
                    points: self.grid.points()[direction],
                    halo: self.grid.halo(),
                }
            });
        }
        Ok(())
    }

    pub fn state(&self, array: ArrayId, direction: usize) -> BcState {
        if self.rules.contains_key(&(array, direction)) {
            BcState::Applied
        } else {
            BcState::Unapplied
        }
    }

    pub fn rules(&self) -> impl Iterator<Item = &PeriodicRule> {
        self.rules.values()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
