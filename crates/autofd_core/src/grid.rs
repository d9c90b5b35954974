//! Uniform structured grid and the registry of grid-resident work arrays.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Ghost layers on each side of every direction unless a stencil needs more.
pub const DEFAULT_HALO: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    points: Vec<usize>,
    deltas: Vec<f64>,
    halo: usize,
}

impl Grid {
    pub fn new(points: Vec<usize>, deltas: Vec<f64>) -> Result<Self> {
        if points.is_empty() {
            return Err(Error::DimensionMismatch(
                "grid needs at least one direction".to_string(),
            ));
        }
        if points.len() != deltas.len() {
            return Err(Error::DimensionMismatch(format!(
                "{} point counts but {} grid spacings",
                points.len(),
                deltas.len()
            )));
        }
        if let Some(d) = points.iter().position(|&n| n == 0) {
            return Err(Error::invalid_parameter(
                "points",
                format!("direction {d} has no interior points"),
            ));
        }
        if let Some(d) = deltas.iter().position(|&h| !(h.is_finite() && h > 0.0)) {
            return Err(Error::invalid_parameter(
                "deltas",
                format!("spacing {} in direction {d} must be positive", deltas[d]),
            ));
        }
        Ok(Self {
            points,
            deltas,
            halo: DEFAULT_HALO,
        })
    }

    /// Grid spanning `lengths[d]` with `points[d]` periodic cells per direction.
    pub fn with_lengths(points: Vec<usize>, lengths: &[f64]) -> Result<Self> {
        if points.len() != lengths.len() {
            return Err(Error::DimensionMismatch(format!(
                "{} point counts but {} domain lengths",
                points.len(),
                lengths.len()
            )));
        }
        let deltas = points
            .iter()
            .zip(lengths)
            .map(|(&n, &length)| length / n.max(1) as f64)
            .collect();
        Self::new(points, deltas)
    }

    pub fn with_halo(mut self, halo: usize) -> Self {
        self.halo = halo;
        self
    }

    pub fn ndim(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[usize] {
        &self.points
    }

    pub fn deltas(&self) -> &[f64] {
        &self.deltas
    }

    pub fn halo(&self) -> usize {
        self.halo
    }

    pub fn check_direction(&self, direction: usize) -> Result<()> {
        if direction >= self.ndim() {
            return Err(Error::DimensionMismatch(format!(
                "direction {direction} is outside [0, {})",
                self.ndim()
            )));
        }
        Ok(())
    }
}

/// Handle into a [`WorkArrays`] registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArrayId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayKind {
    /// Evolved in time by one of the equations.
    Prognostic,
    /// Read by the equations but not evolved (e.g. primitive variables).
    Auxiliary,
    Coordinate,
    Metric,
    /// Copy of a prognostic variable taken before the first stage.
    Saved,
    /// Right-hand side of one Runge-Kutta stage.
    StageResidual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkArray {
    pub name: String,
    pub kind: ArrayKind,
}

/// Insertion-ordered registry of every array the generated solver allocates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct WorkArrays {
    arrays: IndexMap<String, WorkArray>,
}

impl WorkArrays {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name`, or returns the existing handle. An auxiliary array
    /// registered again as prognostic is promoted.
    pub fn register(&mut self, name: impl Into<String>, kind: ArrayKind) -> ArrayId {
        let name = name.into();
        if let Some((index, _, existing)) = self.arrays.get_full_mut(&name) {
            if existing.kind == ArrayKind::Auxiliary && kind == ArrayKind::Prognostic {
                existing.kind = kind;
            }
            return ArrayId(index);
        }
        debug!(array = %name, ?kind, "registered work array");
        let (index, _) = self.arrays.insert_full(name.clone(), WorkArray { name, kind });
        ArrayId(index)
    }

    pub fn id(&self, name: &str) -> Option<ArrayId> {
        self.arrays.get_index_of(name).map(ArrayId)
    }

    pub fn lookup(&self, name: &str) -> Result<ArrayId> {
        self.id(name)
            .ok_or_else(|| Error::UnknownVariable(name.to_string()))
    }

    pub fn get(&self, id: ArrayId) -> Option<&WorkArray> {
        self.arrays.get_index(id.0).map(|(_, array)| array)
    }

    pub fn contains(&self, id: ArrayId) -> bool {
        id.0 < self.arrays.len()
    }

    /// Name behind a handle issued by this registry.
    pub fn name(&self, id: ArrayId) -> &str {
        self.get(id).map(|a| a.name.as_str()).unwrap_or("<unknown>")
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArrayId, &WorkArray)> {
        self.arrays.values().enumerate().map(|(i, a)| (ArrayId(i), a))
    }

    pub fn of_kind(&self, kind: ArrayKind) -> impl Iterator<Item = (ArrayId, &WorkArray)> {
        self.iter().filter(move |(_, a)| a.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_rejects_mismatched_directions() {
        let err = Grid::new(vec![16, 16], vec![0.1]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch(_)));
        let err = Grid::new(vec![16], vec![-0.1]).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[test]
    fn lengths_become_spacings() {
        let grid = Grid::with_lengths(vec![8, 4], &[1.0, 2.0]).unwrap();
        assert_eq!(grid.deltas(), &[0.125, 0.5]);
        assert_eq!(grid.halo(), DEFAULT_HALO);
        assert!(grid.check_direction(1).is_ok());
        assert!(grid.check_direction(2).is_err());
    }

    #[test]
    fn registry_hands_out_stable_ids() {
        let mut arrays = WorkArrays::new();
        let rho = arrays.register("rho", ArrayKind::Auxiliary);
        let u = arrays.register("u0", ArrayKind::Auxiliary);
        assert_eq!(arrays.register("rho", ArrayKind::Prognostic), rho);
        assert_eq!(arrays.get(rho).map(|a| a.kind), Some(ArrayKind::Prognostic));
        assert_eq!(arrays.name(u), "u0");
        assert_eq!(arrays.lookup("u0").unwrap(), u);
        assert!(matches!(arrays.lookup("p"), Err(Error::UnknownVariable(_))));
        assert_eq!(arrays.of_kind(ArrayKind::Prognostic).count(), 1);
    }

    #[test]
    fn prognostic_is_never_demoted() {
        let mut arrays = WorkArrays::new();
        let phi = arrays.register("phi", ArrayKind::Prognostic);
        arrays.register("phi", ArrayKind::Auxiliary);
        assert_eq!(arrays.get(phi).map(|a| a.kind), Some(ArrayKind::Prognostic));
    }
}
