//! Simulation parameters and grid specification records.

use crate::error::{Error, Result};
use crate::grid::Grid;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Single,
    #[default]
    Double,
}

/// Run-time parameters handed through to the generated solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParameters {
    pub niter: usize,
    /// Reference (wave) speed.
    pub c0: f64,
    pub deltat: f64,
    pub precision: Precision,
    pub name: String,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            niter: 1,
            c0: 1.0,
            deltat: 1e-3,
            precision: Precision::Double,
            name: "autofd".to_string(),
        }
    }
}

impl SimulationParameters {
    /// Time step from the CFL condition `dt = dx * courant / c0` and enough
    /// iterations to reach `end_time`.
    pub fn from_cfl(
        dx: f64,
        c0: f64,
        courant: f64,
        end_time: f64,
        precision: Precision,
        name: impl Into<String>,
    ) -> Result<Self> {
        for (field, value) in [("dx", dx), ("c0", c0), ("courant", courant), ("end_time", end_time)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::invalid_parameter(field, format!("must be positive, got {value}")));
            }
        }
        let deltat = dx * courant / c0;
        let niter = (end_time / deltat).ceil() as usize;
        let params = Self {
            niter,
            c0,
            deltat,
            precision,
            name: name.into(),
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.niter == 0 {
            return Err(Error::invalid_parameter("niter", "must be at least 1"));
        }
        if !(self.deltat.is_finite() && self.deltat > 0.0) {
            return Err(Error::invalid_parameter(
                "deltat",
                format!("must be positive, got {}", self.deltat),
            ));
        }
        if !self.c0.is_finite() {
            return Err(Error::invalid_parameter("c0", "must be finite"));
        }
        let valid_name = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid_name {
            return Err(Error::invalid_parameter(
                "name",
                format!("`{}` is not usable as a file stem", self.name),
            ));
        }
        Ok(())
    }

    /// Simulated time after `niter` steps.
    pub fn end_time(&self) -> f64 {
        self.niter as f64 * self.deltat
    }
}

/// Grid as written in a case file: point counts plus either domain lengths
/// or explicit spacings. Without either the domain has unit length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub points: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lengths: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deltas: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halo: Option<usize>,
}

impl GridSpec {
    pub fn uniform(points: Vec<usize>) -> Self {
        Self {
            points,
            lengths: None,
            deltas: None,
            halo: None,
        }
    }

    pub fn to_grid(&self) -> Result<Grid> {
        let grid = match (&self.lengths, &self.deltas) {
            (Some(_), Some(_)) => {
                return Err(Error::invalid_parameter(
                    "grid",
                    "give either lengths or deltas, not both",
                ))
            }
            (Some(lengths), None) => Grid::with_lengths(self.points.clone(), lengths)?,
            (None, Some(deltas)) => Grid::new(self.points.clone(), deltas.clone())?,
            (None, None) => Grid::with_lengths(self.points.clone(), &vec![1.0; self.points.len()])?,
        };
        Ok(match self.halo {
            Some(halo) => grid.with_halo(halo),
            None => grid,
        })
    }

    /// Same spec with every point count multiplied by `factor`.
    pub fn refined(&self, factor: usize) -> Self {
        Self {
            points: self.points.iter().map(|n| n * factor).collect(),
            deltas: self
                .deltas
                .as_ref()
                .map(|d| d.iter().map(|h| h / factor as f64).collect()),
            ..self.clone()
        }
    }
}
