//! Backend-agnostic intermediate representation of a discretised problem.
//!
//! The bundle borrows from the pipeline's outputs and is only ever read.
//! Serialising it with serde is the hand-off to any code emitter.

use crate::bcs::{PeriodicBoundaryCondition, PeriodicRule};
use crate::config::SimulationParameters;
use crate::discretisation::{Assignment, Stage, StencilUse, TemporalDiscretisation};
use crate::error::{Error, Result};
use crate::grid::{ArrayId, Grid, WorkArrays, DEFAULT_HALO};
use crate::ics::{GridBasedInitialisation, InitialCondition};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct GridSection<'a> {
    pub points: &'a [usize],
    pub deltas: &'a [f64],
    /// Ghost layers actually required, never less than the grid's own halo.
    pub halo: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputDeclaration {
    pub array: ArrayId,
    pub file: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IrBundle<'a> {
    pub name: &'a str,
    pub ndim: usize,
    pub grid: GridSection<'a>,
    pub constants: &'a [String],
    pub parameters: &'a SimulationParameters,
    pub spatial_order: usize,
    pub stencils: Vec<&'a StencilUse>,
    pub work_arrays: &'a WorkArrays,
    pub prognostic: &'a [ArrayId],
    pub save: &'a [Assignment],
    pub stages: &'a [Stage],
    pub combination: &'a [Assignment],
    pub boundary_conditions: Vec<&'a PeriodicRule>,
    pub initial_conditions: &'a [InitialCondition],
    pub outputs: Vec<OutputDeclaration>,
}

/// Ghost layers needed by `grid` for stencils reaching `max_offset` points.
pub fn effective_halo(grid: &Grid, max_offset: usize) -> usize {
    grid.halo().max(DEFAULT_HALO).max(max_offset)
}

impl<'a> IrBundle<'a> {
    pub fn emit(
        parameters: &'a SimulationParameters,
        grid: &'a Grid,
        constants: &'a [String],
        temporal: &'a TemporalDiscretisation,
        boundaries: &'a PeriodicBoundaryCondition,
        initial: &'a GridBasedInitialisation,
    ) -> Result<Self> {
        let arrays = temporal.arrays();
        let spatial = temporal.spatial();
        if grid.ndim() != spatial.ndim() {
            return Err(Error::DimensionMismatch(format!(
                "grid has {} directions but the residuals use {}",
                grid.ndim(),
                spatial.ndim()
            )));
        }

        let boundary_conditions: Vec<&PeriodicRule> = boundaries.rules().collect();
        for rule in &boundary_conditions {
            require(arrays, rule.array)?;
        }
        for condition in initial.conditions() {
            require(arrays, condition.array)?;
        }

        let outputs = spatial
            .prognostic()
            .iter()
            .map(|&array| OutputDeclaration {
                array,
                file: format!("{}_final.dat", arrays.name(array)),
            })
            .collect();

        Ok(Self {
            name: &parameters.name,
            ndim: grid.ndim(),
            grid: GridSection {
                points: grid.points(),
                deltas: grid.deltas(),
                halo: effective_halo(grid, spatial.max_offset()),
            },
            constants,
            parameters,
            spatial_order: spatial.scheme().order(),
            stencils: spatial.stencils().collect(),
            work_arrays: arrays,
            prognostic: spatial.prognostic(),
            save: temporal.save(),
            stages: temporal.stages(),
            combination: temporal.combination(),
            boundary_conditions,
            initial_conditions: initial.conditions(),
            outputs,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Number of stage-update assignments across all stages.
    pub fn stage_updates(&self) -> usize {
        self.stages.iter().map(|s| s.updates.len()).sum()
    }
}

fn require(arrays: &WorkArrays, id: ArrayId) -> Result<()> {
    if arrays.contains(id) {
        Ok(())
    } else {
        Err(Error::UnknownVariable(format!("work array #{}", id.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretisation::{Central, RungeKutta, SpatialDiscretisation, StretchedMetric};
    use crate::expansion::expand_all;
    use crate::problem::Problem;

    struct Fixture {
        problem: Problem,
        grid: Grid,
        params: SimulationParameters,
        temporal: TemporalDiscretisation,
    }

    fn fixture() -> Fixture {
        let problem = Problem::new(
            &["Eq(Der(phi,t), -c_j*Der(phi,x_j))"],
            &[],
            1,
            &["c_j"],
            "x",
            &[false],
            &[],
        )
        .unwrap();
        let grid = Grid::new(vec![16], vec![1.0 / 16.0]).unwrap();
        let expanded = expand_all(&problem.equations, 1).unwrap();
        let spatial = SpatialDiscretisation::new(
            &expanded,
            &problem,
            &grid,
            &Central::new(6).unwrap(),
            &StretchedMetric::default(),
        )
        .unwrap();
        let temporal = TemporalDiscretisation::new(&RungeKutta::new(2).unwrap(), &grid, spatial).unwrap();
        Fixture {
            problem,
            grid,
            params: SimulationParameters {
                name: "wave".into(),
                ..Default::default()
            },
            temporal,
        }
    }

    #[test]
    fn bundle_serialises_with_widened_halo() {
        let f = fixture();
        let mut bcs = PeriodicBoundaryCondition::new(&f.grid);
        bcs.apply(f.temporal.arrays(), &["phi"], 0).unwrap();
        let ics = GridBasedInitialisation::new(&f.grid, f.temporal.arrays(), &["Eq(phi, sin(2*M_PI*Idx_0*delta_0))"])
            .unwrap();
        let ir = IrBundle::emit(&f.params, &f.grid, &f.problem.constants, &f.temporal, &bcs, &ics).unwrap();

        assert_eq!(ir.grid.halo, 3);
        assert_eq!(ir.stage_updates(), 2);
        assert_eq!(ir.outputs[0].file, "phi_final.dat");

        let json: serde_json::Value = serde_json::from_str(&ir.to_json().unwrap()).unwrap();
        assert_eq!(json["name"], "wave");
        assert_eq!(json["grid"]["points"], serde_json::json!([16]));
        assert_eq!(json["work_arrays"]["phi_rhs2"]["kind"], "stage_residual");
        assert_eq!(json["boundary_conditions"][0]["direction"], 0);
        assert_eq!(json["parameters"]["precision"], "double");
    }

    #[test]
    fn foreign_array_handles_are_rejected() {
        let f = fixture();
        let other_grid = Grid::new(vec![16], vec![1.0 / 16.0]).unwrap();
        let mut bigger = WorkArrays::new();
        for name in ["a", "b", "c", "d", "e", "f", "g"] {
            bigger.register(name, crate::grid::ArrayKind::Auxiliary);
        }
        let ics = GridBasedInitialisation::new(&other_grid, &bigger, &["Eq(g, 1)"]).unwrap();
        let bcs = PeriodicBoundaryCondition::new(&f.grid);
        let err = IrBundle::emit(&f.params, &f.grid, &f.problem.constants, &f.temporal, &bcs, &ics).unwrap_err();
        assert!(matches!(err, Error::UnknownVariable(_)));
    }
}
