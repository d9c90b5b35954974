//! Stage orchestration from a parsed problem to an IR bundle.
//!
//! ```text
//! Problem -> resolve definitions -> expand -> spatial -> temporal
//!         -> boundaries -> initial conditions -> IR
//! ```
//!
//! Every stage runs inside [`GenerationContext::stage`]. Any error aborts the
//! run before an IR exists.

use crate::bcs::PeriodicBoundaryCondition;
use crate::config::SimulationParameters;
use crate::context::GenerationContext;
use crate::discretisation::{
    Central, MetricTransform, RungeKutta, SpatialDiscretisation, StretchedMetric,
    TemporalDiscretisation,
};
use crate::error::{Error, Result};
use crate::expansion::ExpandedEquation;
use crate::expr::Equation;
use crate::grid::{ArrayKind, Grid};
use crate::ics::GridBasedInitialisation;
use crate::ir::{effective_halo, IrBundle};
use crate::problem::Problem;
use crate::substitution::SubstitutionResolver;
use tracing::info;

/// Array kinds whose halos are filled by periodic boundaries.
const PERIODIC_KINDS: [ArrayKind; 3] = [ArrayKind::Prognostic, ArrayKind::Auxiliary, ArrayKind::Metric];

#[derive(Debug)]
pub struct Generator {
    problem: Problem,
    grid: Grid,
    spatial: Central,
    temporal: RungeKutta,
    periodic: Vec<usize>,
    initial_conditions: Vec<String>,
    parameters: SimulationParameters,
    metric: Box<dyn MetricTransform>,
}

impl Generator {
    pub fn new(problem: Problem, grid: Grid, spatial: Central, temporal: RungeKutta) -> Self {
        Self {
            problem,
            grid,
            spatial,
            temporal,
            periodic: Vec::new(),
            initial_conditions: Vec::new(),
            parameters: SimulationParameters::default(),
            metric: Box::new(StretchedMetric::default()),
        }
    }

    /// Directions with periodic boundaries on every field array.
    pub fn periodic(mut self, directions: impl IntoIterator<Item = usize>) -> Self {
        self.periodic.extend(directions);
        self
    }

    pub fn initial_conditions<S: Into<String>>(mut self, equations: impl IntoIterator<Item = S>) -> Self {
        self.initial_conditions.extend(equations.into_iter().map(Into::into));
        self
    }

    pub fn parameters(mut self, parameters: SimulationParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn metric(mut self, metric: impl MetricTransform + 'static) -> Self {
        self.metric = Box::new(metric);
        self
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn run(&self, ctx: &mut GenerationContext) -> Result<Generation> {
        let problem = &self.problem;
        ctx.stage("validate", || {
            self.parameters.validate()?;
            if self.grid.ndim() != problem.ndim() {
                return Err(Error::DimensionMismatch(format!(
                    "grid has {} directions but the problem has {}",
                    self.grid.ndim(),
                    problem.ndim()
                )));
            }
            Ok(())
        })?;

        let resolver = ctx.stage("resolve", || SubstitutionResolver::new(problem))?;
        let expanded = ctx.stage("expand", || resolver.expand_and_resolve(&problem.equations))?;
        let spatial = ctx.stage("spatial", || {
            SpatialDiscretisation::new(&expanded, problem, &self.grid, &self.spatial, self.metric.as_ref())
        })?;
        let grid = self
            .grid
            .clone()
            .with_halo(effective_halo(&self.grid, spatial.max_offset()));
        let temporal = ctx.stage("temporal", || TemporalDiscretisation::new(&self.temporal, &grid, spatial))?;

        let boundaries = ctx.stage("boundaries", || {
            let arrays = temporal.arrays();
            let names: Vec<&str> = arrays
                .iter()
                .filter(|(_, a)| PERIODIC_KINDS.contains(&a.kind))
                .map(|(_, a)| a.name.as_str())
                .collect();
            let mut boundaries = PeriodicBoundaryCondition::new(&grid);
            for &direction in &self.periodic {
                boundaries.apply(arrays, &names, direction)?;
            }
            Ok(boundaries)
        })?;
        let initial = ctx.stage("initial", || {
            GridBasedInitialisation::new(&grid, temporal.arrays(), &self.initial_conditions)
        })?;

        let generation = Generation {
            parameters: self.parameters.clone(),
            constants: problem.constants.clone(),
            formulas: resolver.expanded_formulas(),
            grid,
            expanded,
            temporal,
            boundaries,
            initial,
        };
        ctx.stage("emit", || generation.ir().map(|_| ()))?;
        info!(
            name = %generation.parameters.name,
            equations = generation.expanded.len(),
            arrays = generation.temporal.arrays().len(),
            "generation complete"
        );
        Ok(generation)
    }
}

/// Owns every stage's output; the IR borrows from it.
#[derive(Debug, Clone)]
pub struct Generation {
    parameters: SimulationParameters,
    constants: Vec<String>,
    formulas: Vec<Equation>,
    grid: Grid,
    expanded: Vec<ExpandedEquation>,
    temporal: TemporalDiscretisation,
    boundaries: PeriodicBoundaryCondition,
    initial: GridBasedInitialisation,
}

impl Generation {
    pub fn ir(&self) -> Result<IrBundle<'_>> {
        IrBundle::emit(
            &self.parameters,
            &self.grid,
            &self.constants,
            &self.temporal,
            &self.boundaries,
            &self.initial,
        )
    }

    /// Grid with its halo widened to what the stencils need.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn expanded(&self) -> &[ExpandedEquation] {
        &self.expanded
    }

    /// Formulas after index expansion, in dependency order.
    pub fn formulas(&self) -> &[Equation] {
        &self.formulas
    }

    pub fn temporal(&self) -> &TemporalDiscretisation {
        &self.temporal
    }

    pub fn boundaries(&self) -> &PeriodicBoundaryCondition {
        &self.boundaries
    }

    pub fn initial(&self) -> &GridBasedInitialisation {
        &self.initial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bcs::BcState;
    use crate::expr::Expr;

    fn wave_generator(order: usize, stages: usize) -> Generator {
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
        let grid = Grid::new(vec![64], vec![1.0 / 64.0]).unwrap();
        Generator::new(problem, grid, Central::new(order).unwrap(), RungeKutta::new(stages).unwrap())
            .periodic([0])
            .initial_conditions(["Eq(phi, sin(2*M_PI*Idx_0*delta_0))"])
            .parameters(SimulationParameters {
                name: "wave".into(),
                ..Default::default()
            })
    }

    #[test]
    fn one_dimensional_wave_end_to_end() {
        let mut ctx = GenerationContext::new("wave");
        let generation = wave_generator(8, 3).run(&mut ctx).unwrap();

        assert_eq!(generation.expanded().len(), 1);
        let temporal = generation.temporal();
        assert_eq!(temporal.spatial().scheme().first().len(), 9);

        let ir = generation.ir().unwrap();
        assert_eq!(ir.stage_updates(), 3);
        assert_eq!(ir.combination.len(), 1);
        assert_eq!(ir.grid.halo, 4);
        assert_eq!(ir.outputs[0].file, "phi_final.dat");

        let phi = temporal.arrays().lookup("phi").unwrap();
        assert_eq!(generation.boundaries().state(phi, 0), BcState::Applied);
        assert_eq!(generation.initial().conditions()[0].array, phi);

        let stages: Vec<&str> = ctx.timings().iter().map(|t| t.stage.as_str()).collect();
        assert_eq!(
            stages,
            vec!["validate", "resolve", "expand", "spatial", "temporal", "boundaries", "initial", "emit"]
        );
    }

    #[test]
    fn output_is_deterministic() {
        let a = wave_generator(4, 2).run(&mut GenerationContext::default()).unwrap();
        let b = wave_generator(4, 2).run(&mut GenerationContext::default()).unwrap();
        assert_eq!(a.ir().unwrap().to_json().unwrap(), b.ir().unwrap().to_json().unwrap());
    }

    #[test]
    fn navier_stokes_in_three_dimensions() {
        let problem = Problem::new(
            &[
                "Eq(Der(rho,t),- conser(rhou_j,x_j))",
                "Eq(Der(rhou_i,t) ,-conser(rhou_i*u_j + p* KroneckerDelta(_i,_j),x_j) + Der(tau_i_j,x_j) )",
                "Eq(Der(rhoE,t),-conser((p+rhoE)*u_j,x_j) -Der(q_i,x_i) + Der(u_i*tau_i_j ,x_j) )",
            ],
            &[
                "Eq(tau_i_j, (mu/Re)*(Der(u_i,x_j) + Der(u_j,x_i) - (2/3) * KroneckerDelta(_i,_j)*Der(u_k,x_k)))",
                "Eq(q_i, -(mu/((gama-1)*Minf*Minf*Pr*Re))*Der(T,x_i))",
            ],
            3,
            &["Re", "Pr", "mu", "gama", "Minf", "C23"],
            "x",
            &[false; 3],
            &[
                "Eq(u_i, rhou_i/rho)",
                "Eq(p, (gama-1)*(rhoE - (1/(2*rho))*(rhou_j**2)))",
                "Eq(T, p*gama*Minf*Minf/(rho))",
                "Eq(mu, T**(2/3))",
            ],
        )
        .unwrap();
        let grid = Grid::new(vec![8; 3], vec![0.1; 3]).unwrap();
        let generation = Generator::new(problem, grid, Central::new(2).unwrap(), RungeKutta::new(3).unwrap())
            .periodic([0, 1, 2])
            .run(&mut GenerationContext::new("navier-stokes"))
            .unwrap();

        let arrays = generation.temporal().arrays();
        let prognostic: Vec<&str> = arrays
            .of_kind(ArrayKind::Prognostic)
            .map(|(_, a)| a.name.as_str())
            .collect();
        assert_eq!(prognostic, vec!["rho", "rhou0", "rhou1", "rhou2", "rhoE"]);
        assert_eq!(arrays.of_kind(ArrayKind::Auxiliary).count(), 0);
        assert_eq!(generation.boundaries().len(), 15);

        let formulas: Vec<String> = generation.formulas().iter().map(|f| f.lhs.to_string()).collect();
        assert_eq!(formulas, vec!["u0", "u1", "u2", "p", "T", "mu"]);

        for residual in generation.temporal().spatial().residuals() {
            assert!(!residual.rhs.contains(|e| matches!(e, Expr::Derivative { .. })));
        }
    }

    #[test]
    fn coarse_grid_and_large_literals_still_generate() {
        let problem = Problem::new(&["Eq(Der(u,t), 2**64*u - Der(u,x_0))"], &[], 1, &[], "x", &[false], &[]).unwrap();
        let grid = Grid::new(vec![4], vec![0.25]).unwrap();
        let generation = Generator::new(problem, grid, Central::new(12).unwrap(), RungeKutta::new(1).unwrap())
            .periodic([0])
            .run(&mut GenerationContext::default())
            .unwrap();

        assert_eq!(generation.grid().halo(), 6);
        for rule in generation.boundaries().rules() {
            assert!(rule.copies().iter().all(|&(_, src)| (0..4).contains(&src)));
        }
        let rhs = generation.temporal().spatial().residuals()[0].rhs.to_string();
        assert!(rhs.contains("2**64"), "{rhs}");
    }

    #[test]
    fn grid_reference_with_wrong_rank_is_an_error() {
        let problem = Problem::new(&["Eq(Der(u,t), Der(w[0], x_1))"], &[], 2, &[], "x", &[false, false], &[]).unwrap();
        let grid = Grid::new(vec![8, 8], vec![0.1, 0.1]).unwrap();
        let err = Generator::new(problem, grid, Central::new(2).unwrap(), RungeKutta::new(1).unwrap())
            .run(&mut GenerationContext::default())
            .unwrap_err();
        assert!(matches!(err, Error::MalformedEquation { .. }), "{err}");
    }

    #[test]
    fn errors_abort_before_ir() {
        let problem = Problem::new(&["Eq(Der(a,t), b)"], &["Eq(b, a*b)"], 1, &[], "x", &[false], &[]).unwrap();
        let grid = Grid::new(vec![8], vec![0.1]).unwrap();
        let mut ctx = GenerationContext::default();
        let err = Generator::new(problem, grid, Central::new(2).unwrap(), RungeKutta::new(1).unwrap())
            .run(&mut ctx)
            .unwrap_err();
        assert!(matches!(err, Error::CyclicSubstitution { .. }));
        let last = ctx.timings().last().unwrap();
        assert_eq!((last.stage.as_str(), last.succeeded), ("resolve", false));

        let problem = Problem::new(&["Eq(Der(a,t), a)"], &[], 1, &[], "x", &[false], &[]).unwrap();
        let grid = Grid::new(vec![8, 8], vec![0.1, 0.1]).unwrap();
        let err = Generator::new(problem, grid, Central::new(2).unwrap(), RungeKutta::new(1).unwrap())
            .run(&mut GenerationContext::default())
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch(_)));
    }
}
