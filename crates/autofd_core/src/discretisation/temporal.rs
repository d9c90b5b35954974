//! Explicit Runge-Kutta time integration expressed as array assignments.

use super::spatial::SpatialDiscretisation;
use super::TIME_STEP;
use crate::error::{Error, Result};
use crate::expr::{Equation, Expr, GridRef};
use crate::grid::{ArrayId, ArrayKind, Grid, WorkArrays};
use crate::rational::Rational;
use num_traits::Zero;
use serde::Serialize;
use tracing::debug;

/// Stage counts with a Butcher table.
pub const SUPPORTED_STAGES: [usize; 4] = [1, 2, 3, 4];

/// An explicit Butcher tableau with strictly lower-triangular `a`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RungeKutta {
    /// `a[i]` holds the coefficients of stages `0..i`.
    a: Vec<Vec<Rational>>,
    b: Vec<Rational>,
    c: Vec<Rational>,
}

fn row(values: &[(i64, i64)]) -> Vec<Rational> {
    values.iter().map(|&(n, d)| Rational::new(n, d)).collect()
}

impl RungeKutta {
    pub fn new(stages: usize) -> Result<Self> {
        let (a, b, c) = match stages {
            // Forward Euler
            1 => (vec![vec![]], row(&[(1, 1)]), row(&[(0, 1)])),
            // Heun
            2 => (
                vec![vec![], row(&[(1, 1)])],
                row(&[(1, 2), (1, 2)]),
                row(&[(0, 1), (1, 1)]),
            ),
            // Kutta's third order
            3 => (
                vec![vec![], row(&[(1, 2)]), row(&[(-1, 1), (2, 1)])],
                row(&[(1, 6), (2, 3), (1, 6)]),
                row(&[(0, 1), (1, 2), (1, 1)]),
            ),
            // Classic fourth order
            4 => (
                vec![
                    vec![],
                    row(&[(1, 2)]),
                    row(&[(0, 1), (1, 2)]),
                    row(&[(0, 1), (0, 1), (1, 1)]),
                ],
                row(&[(1, 6), (1, 3), (1, 3), (1, 6)]),
                row(&[(0, 1), (1, 2), (1, 2), (1, 1)]),
            ),
            _ => {
                return Err(Error::UnsupportedStageCount {
                    stages,
                    supported: SUPPORTED_STAGES.to_vec(),
                })
            }
        };
        Ok(Self { a, b, c })
    }

    pub fn stages(&self) -> usize {
        self.b.len()
    }

    /// Coefficient of stage `j` in the update of stage `i` (zero-based).
    pub fn a(&self, i: usize, j: usize) -> Rational {
        self.a
            .get(i)
            .and_then(|r| r.get(j))
            .copied()
            .unwrap_or_else(Rational::zero)
    }

    pub fn weights(&self) -> &[Rational] {
        &self.b
    }

    pub fn nodes(&self) -> &[Rational] {
        &self.c
    }
}

/// `target = value` over the interior of the grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub target: ArrayId,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stage {
    /// One-based stage number.
    pub index: usize,
    /// `v = v_old + deltat * sum_j a_ij v_rhs_j`, one per prognostic variable.
    pub updates: Vec<Assignment>,
    /// `v_rhs_i = rhs(v)`, one per prognostic variable.
    pub residuals: Vec<Assignment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemporalDiscretisation {
    scheme: RungeKutta,
    spatial: SpatialDiscretisation,
    save: Vec<Assignment>,
    stages: Vec<Stage>,
    combination: Vec<Assignment>,
}

/// Work arrays added for one prognostic variable.
struct StageArrays {
    variable: ArrayId,
    saved: ArrayId,
    residuals: Vec<ArrayId>,
}

impl TemporalDiscretisation {
    pub fn new(scheme: &RungeKutta, grid: &Grid, mut spatial: SpatialDiscretisation) -> Result<Self> {
        if grid.ndim() != spatial.ndim() {
            return Err(Error::DimensionMismatch(format!(
                "grid has {} directions but the residuals use {}",
                grid.ndim(),
                spatial.ndim()
            )));
        }
        let ndim = grid.ndim();
        let stages = scheme.stages();

        let prognostic = spatial.prognostic().to_vec();
        let arrays = spatial.arrays_mut();
        let per_variable: Vec<StageArrays> = prognostic
            .into_iter()
            .map(|variable| {
                let name = arrays.name(variable).to_string();
                StageArrays {
                    variable,
                    saved: arrays.register(format!("{name}_old"), ArrayKind::Saved),
                    residuals: (1..=stages)
                        .map(|i| arrays.register(format!("{name}_rhs{i}"), ArrayKind::StageResidual))
                        .collect(),
                }
            })
            .collect();

        let read = |id: ArrayId, arrays: &WorkArrays| {
            Expr::GridRef(GridRef::centered(arrays.name(id), ndim))
        };
        let arrays = spatial.arrays();

        let save = per_variable
            .iter()
            .map(|v| Assignment {
                target: v.saved,
                value: read(v.variable, arrays),
            })
            .collect();

        let advance = |v: &StageArrays, coefficients: Vec<(usize, Rational)>| {
            let increments: Vec<Expr> = coefficients
                .into_iter()
                .filter(|(_, w)| !w.is_zero())
                .map(|(j, w)| Expr::Product(vec![Expr::Number(w), read(v.residuals[j], arrays)]))
                .collect();
            let base = read(v.saved, arrays);
            if increments.is_empty() {
                return base;
            }
            Expr::Sum(vec![
                base,
                Expr::Product(vec![Expr::symbol(TIME_STEP), Expr::Sum(increments)]),
            ])
            .simplify()
        };

        let mut stage_list = Vec::with_capacity(stages);
        for i in 0..stages {
            let updates = per_variable
                .iter()
                .map(|v| Assignment {
                    target: v.variable,
                    value: advance(v, (0..i).map(|j| (j, scheme.a(i, j))).collect()),
                })
                .collect();
            let residuals = per_variable
                .iter()
                .zip(spatial.residuals())
                .map(|(v, residual)| Assignment {
                    target: v.residuals[i],
                    value: residual.rhs.clone(),
                })
                .collect();
            stage_list.push(Stage {
                index: i + 1,
                updates,
                residuals,
            });
        }

        let combination = per_variable
            .iter()
            .map(|v| Assignment {
                target: v.variable,
                value: advance(v, scheme.weights().iter().copied().enumerate().collect()),
            })
            .collect();

        debug!(
            stages,
            variables = per_variable.len(),
            arrays = arrays.len(),
            "temporal discretisation"
        );
        Ok(Self {
            scheme: scheme.clone(),
            save,
            stages: stage_list,
            combination,
            spatial,
        })
    }

    pub fn scheme(&self) -> &RungeKutta {
        &self.scheme
    }

    pub fn spatial(&self) -> &SpatialDiscretisation {
        &self.spatial
    }

    /// Registry of every work array, including the stage arrays.
    pub fn arrays(&self) -> &WorkArrays {
        self.spatial.arrays()
    }

    pub fn save(&self) -> &[Assignment] {
        &self.save
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn combination(&self) -> &[Assignment] {
        &self.combination
    }

    /// Renders assignments as `target = value` equations.
    pub fn equations<'a>(&self, assignments: impl IntoIterator<Item = &'a Assignment>) -> Vec<Equation> {
        assignments
            .into_iter()
            .map(|a| Equation::new(Expr::symbol(self.arrays().name(a.target)), a.value.clone()))
            .collect()
    }
}
