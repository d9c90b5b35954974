//! Initial conditions written as `Eq(array, expr)` over the grid interior.
//!
//! Expressions may use `Idx_d` (the grid index along direction `d`),
//! `delta_d` (the spacing along `d`), `M_PI` and any problem constant.

use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::grid::{ArrayId, Grid, WorkArrays};
use crate::parser::parse_equation;
use serde::Serialize;
use tracing::debug;

/// Grid-index symbol base (`Idx_0`).
pub const GRID_INDEX: &str = "Idx";
/// Grid-spacing symbol base (`delta_0`).
pub const GRID_SPACING: &str = "delta";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitialCondition {
    pub array: ArrayId,
    pub value: Expr,
    /// Source text as given.
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridBasedInitialisation {
    /// Interior region `[0, points[d])` the values are assigned on.
    pub points: Vec<usize>,
    pub conditions: Vec<InitialCondition>,
}

impl GridBasedInitialisation {
    pub fn new<S: AsRef<str>>(grid: &Grid, arrays: &WorkArrays, equations: &[S]) -> Result<Self> {
        let mut conditions = Vec::with_capacity(equations.len());
        for source in equations {
            let source = source.as_ref();
            let equation = parse_equation(source)?;
            let name = match &equation.lhs {
                Expr::Symbol(_) | Expr::Indexed(..) => equation.lhs.concrete_name(),
                _ => None,
            }
            .ok_or_else(|| Error::malformed(source, "initial condition must assign an array"))?;
            let array = arrays.lookup(&name)?;
            check_grid_vocabulary(&equation.rhs, grid, source)?;
            debug!(array = %name, value = %equation.rhs, "initial condition");
            conditions.push(InitialCondition {
                array,
                value: equation.rhs,
                source: source.to_string(),
            });
        }
        Ok(Self {
            points: grid.points().to_vec(),
            conditions,
        })
    }

    pub fn conditions(&self) -> &[InitialCondition] {
        &self.conditions
    }
}

fn check_grid_vocabulary(expr: &Expr, grid: &Grid, source: &str) -> Result<()> {
    let mut problem = None;
    expr.walk(&mut |e| {
        if problem.is_some() {
            return;
        }
        match e {
            Expr::Indexed(base, indices) if base == GRID_INDEX || base == GRID_SPACING => {
                match indices.as_slice() {
                    [index] => match index.as_fixed() {
                        Some(d) if d >= grid.ndim() => {
                            problem = Some(Error::DimensionMismatch(format!(
                                "`{e}` refers to direction {d} of a {}-dimensional grid",
                                grid.ndim()
                            )))
                        }
                        Some(_) => {}
                        None => {
                            problem = Some(Error::malformed(source, format!("`{e}` needs a concrete direction")))
                        }
                    },
                    _ => problem = Some(Error::malformed(source, format!("`{e}` takes one direction"))),
                }
            }
            Expr::Derivative { .. } => {
                problem = Some(Error::malformed(source, "initial conditions cannot contain derivatives"))
            }
            _ => {}
        }
    });
    problem.map_or(Ok(()), Err)
}
