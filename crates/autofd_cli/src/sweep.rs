//! Order/refinement sweeps over one base case.

use crate::case::Case;
use anyhow::{Context, Result};
use autofd_core::backend::Backend;
use autofd_core::context::GenerationContext;
use std::path::{Path, PathBuf};
use tracing::{info, info_span};

/// One generated member of a sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepRun {
    pub name: String,
    pub order: usize,
    pub refinement: usize,
    pub points: Vec<usize>,
    pub artifact: PathBuf,
}

/// Variant of `base` at `order` with its points multiplied by `2^refinement`.
pub fn variant(base: &Case, order: usize, refinement: usize) -> Case {
    let mut case = base.clone();
    case.order = order;
    case.grid = base.grid.refined(1 << refinement);
    case.parameters.name = format!("{}_o{order}_r{refinement}", base.parameters.name);
    case
}

/// Generates every (order, refinement) pair in order. The first failure
/// stops the sweep and is returned.
pub fn run_sweep(
    base: &Case,
    orders: &[usize],
    refinements: usize,
    backend: &dyn Backend,
    out_dir: &Path,
) -> Result<Vec<SweepRun>> {
    let mut runs = Vec::with_capacity(orders.len() * refinements);
    for &order in orders {
        for refinement in 0..refinements {
            let case = variant(base, order, refinement);
            let name = case.parameters.name.clone();
            let _span = info_span!("case", %name).entered();

            let artifact = generate(&case, backend, out_dir).with_context(|| format!("sweep case {name}"))?;
            info!(order, points = ?case.grid.points, "case generated");
            runs.push(SweepRun {
                name,
                order,
                refinement,
                points: case.grid.points,
                artifact,
            });
        }
    }
    Ok(runs)
}

/// Runs the pipeline for `case` and hands the IR to `backend`.
pub fn generate(case: &Case, backend: &dyn Backend, out_dir: &Path) -> Result<PathBuf> {
    let mut ctx = GenerationContext::new(&case.parameters.name);
    let generation = case.generator()?.run(&mut ctx)?;
    let ir = generation.ir()?;
    Ok(backend.generate(&ir, out_dir)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use autofd_core::backend::JsonBackend;
    use autofd_core::config::GridSpec;
    use autofd_core::ir::IrBundle;
    use autofd_core::{Error, ProblemDefinition};
    use std::cell::RefCell;

    fn advection() -> Case {
        Case {
            definition: crate::case::DefinitionSource::Inline(ProblemDefinition {
                equations: vec!["Eq(Der(u,t), -Der(u,x_0))".into()],
                ndim: 1,
                coordinate_symbol: "x".into(),
                metrics: vec![false],
                ..Default::default()
            }),
            grid: GridSpec::uniform(vec![16]),
            order: 2,
            stages: 1,
            periodic: vec![0],
            initial_conditions: Vec::new(),
            parameters: Default::default(),
            cfl: None,
        }
    }

    /// Fails on one named bundle and records every bundle it sees.
    struct FailingOn {
        name: &'static str,
        seen: RefCell<Vec<(String, usize)>>,
    }

    impl Backend for FailingOn {
        fn generate(&self, ir: &IrBundle<'_>, out_dir: &Path) -> autofd_core::Result<PathBuf> {
            self.seen.borrow_mut().push((ir.name.to_string(), ir.grid.points[0]));
            if ir.name == self.name {
                return Err(Error::BackendGenerationFailure {
                    program: "emit".into(),
                    status: Some(1),
                    stderr: "boom".into(),
                });
            }
            Ok(out_dir.join(ir.name))
        }
    }

    #[test]
    fn sweep_covers_orders_and_refinements() {
        let dir = tempfile::tempdir().unwrap();
        let runs = run_sweep(&advection(), &[2, 4], 3, &JsonBackend, dir.path()).unwrap();

        let summary: Vec<(usize, usize)> = runs.iter().map(|r| (r.order, r.points[0])).collect();
        assert_eq!(summary, vec![(2, 16), (2, 32), (2, 64), (4, 16), (4, 32), (4, 64)]);
        assert_eq!(runs[4].name, "autofd_o4_r1");
        assert!(runs.iter().all(|r| r.artifact.exists()));
    }

    #[test]
    fn cfl_step_follows_refinement() {
        let mut base = advection();
        base.cfl = Some(crate::case::Cfl {
            courant: 0.5,
            end_time: 1.0,
        });
        let step = |refinement| {
            let case = variant(&base, 2, refinement);
            let grid = case.grid.to_grid().unwrap();
            case.parameters_for(&grid).unwrap()
        };
        let (coarse, fine) = (step(0), step(1));
        assert_eq!(fine.deltat, coarse.deltat / 2.0);
        assert_eq!(fine.niter, coarse.niter * 2);
        assert_eq!(coarse.niter, 32);
        assert_eq!(fine.name, "autofd_o2_r1");
    }

    #[test]
    fn sweep_stops_at_first_failure() {
        let backend = FailingOn {
            name: "autofd_o2_r1",
            seen: RefCell::new(Vec::new()),
        };
        let err = run_sweep(&advection(), &[2, 4], 2, &backend, Path::new("unused")).unwrap_err();

        assert!(format!("{err:#}").contains("sweep case autofd_o2_r1"));
        assert_eq!(
            *backend.seen.borrow(),
            vec![("autofd_o2_r0".to_string(), 16), ("autofd_o2_r1".to_string(), 32)]
        );
    }

    #[test]
    fn unsupported_order_fails_before_backend() {
        let backend = FailingOn {
            name: "never",
            seen: RefCell::new(Vec::new()),
        };
        assert!(run_sweep(&advection(), &[3], 1, &backend, Path::new("unused")).is_err());
        assert!(backend.seen.borrow().is_empty());
    }
}
