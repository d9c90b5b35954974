//! JSON case files: one generation run described in full.

use anyhow::{Context, Result};
use autofd_core::config::{GridSpec, SimulationParameters};
use autofd_core::discretisation::{Central, RungeKutta};
use autofd_core::grid::Grid;
use autofd_core::{Generator, Problem, ProblemDefinition};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

fn default_order() -> usize {
    2
}

fn default_stages() -> usize {
    3
}

/// Either a path to a definition text file or the sections inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefinitionSource {
    Path(PathBuf),
    Inline(ProblemDefinition),
}

/// Time stepping derived from the grid spacing along the first direction,
/// in place of a fixed `deltat` and `niter`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cfl {
    pub courant: f64,
    pub end_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub definition: DefinitionSource,
    pub grid: GridSpec,
    /// Spatial order of accuracy.
    #[serde(default = "default_order")]
    pub order: usize,
    /// Runge-Kutta stage count.
    #[serde(default = "default_stages")]
    pub stages: usize,
    #[serde(default)]
    pub periodic: Vec<usize>,
    #[serde(default)]
    pub initial_conditions: Vec<String>,
    #[serde(default)]
    pub parameters: SimulationParameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cfl: Option<Cfl>,
}

impl Case {
    /// Reads a case file. A relative definition path is taken relative to
    /// the case file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).with_context(|| format!("reading case {}", path.display()))?;
        let mut case: Case =
            serde_json::from_str(&text).with_context(|| format!("parsing case {}", path.display()))?;
        if let DefinitionSource::Path(definition) = &mut case.definition {
            if definition.is_relative() {
                if let Some(dir) = path.parent() {
                    *definition = dir.join(&*definition);
                }
            }
        }
        Ok(case)
    }

    pub fn definition(&self) -> Result<ProblemDefinition> {
        match &self.definition {
            DefinitionSource::Inline(definition) => Ok(definition.clone()),
            DefinitionSource::Path(path) => ProblemDefinition::read(path)
                .with_context(|| format!("reading definition {}", path.display())),
        }
    }

    pub fn problem(&self) -> Result<Problem> {
        Ok(Problem::from_definition(self.definition()?)?)
    }

    /// Simulation parameters for `grid`, with `deltat` and `niter` taken
    /// from the CFL block when there is one.
    pub fn parameters_for(&self, grid: &Grid) -> Result<SimulationParameters> {
        let Some(cfl) = self.cfl else {
            return Ok(self.parameters.clone());
        };
        let dx = *grid.deltas().first().context("CFL time step needs at least one direction")?;
        let params = &self.parameters;
        let derived = SimulationParameters::from_cfl(
            dx,
            params.c0,
            cfl.courant,
            cfl.end_time,
            params.precision,
            params.name.clone(),
        )
        .context("deriving time step from CFL")?;
        info!(dx, deltat = derived.deltat, niter = derived.niter, "CFL time step");
        Ok(derived)
    }

    pub fn generator(&self) -> Result<Generator> {
        let grid = self.grid.to_grid().context("building grid")?;
        let parameters = self.parameters_for(&grid)?;
        let spatial = Central::new(self.order)?;
        let temporal = RungeKutta::new(self.stages)?;
        Ok(Generator::new(self.problem()?, grid, spatial, temporal)
            .periodic(self.periodic.iter().copied())
            .initial_conditions(self.initial_conditions.iter().cloned())
            .parameters(parameters))
    }
}
