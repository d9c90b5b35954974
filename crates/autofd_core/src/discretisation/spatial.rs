//! Central finite differences and the spatial discretisation of residuals.

use super::metric::MetricTransform;
use super::{TIME, TIME_STEP};
use crate::error::{Error, Result};
use crate::expansion::ExpandedEquation;
use crate::expr::{Equation, Expr, GridRef, Index};
use crate::grid::{ArrayId, ArrayKind, Grid, WorkArrays};
use crate::parser::identifier_to_expr;
use crate::problem::Problem;
use crate::rational::Rational;
use nalgebra::{DMatrix, DVector};
use num_traits::{ToPrimitive, Zero};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Central-difference orders with a coefficient table.
pub const SUPPORTED_ORDERS: [usize; 6] = [2, 4, 6, 8, 10, 12];

/// Bumped whenever a table entry changes.
pub const TABLE_VERSION: u32 = 1;

/// First-derivative weights for offsets `1..=order/2`. The stencil is
/// antisymmetric and its center weight is zero.
const FIRST_DERIVATIVE: [&[(i64, i64)]; 6] = [
    &[(1, 2)],
    &[(2, 3), (-1, 12)],
    &[(3, 4), (-3, 20), (1, 60)],
    &[(4, 5), (-1, 5), (4, 105), (-1, 280)],
    &[(5, 6), (-5, 21), (5, 84), (-5, 504), (1, 1260)],
    &[(6, 7), (-15, 56), (5, 63), (-1, 56), (1, 385), (-1, 5544)],
];

/// Second-derivative weights for offsets `0..=order/2`; symmetric.
const SECOND_DERIVATIVE: [&[(i64, i64)]; 6] = [
    &[(-2, 1), (1, 1)],
    &[(-5, 2), (4, 3), (-1, 12)],
    &[(-49, 18), (3, 2), (-3, 20), (1, 90)],
    &[(-205, 72), (8, 5), (-1, 5), (8, 315), (-1, 560)],
    &[(-5269, 1800), (5, 3), (-5, 21), (5, 126), (-5, 1008), (1, 3150)],
    &[(-5369, 1800), (12, 7), (-15, 56), (10, 189), (-1, 112), (2, 1925), (-1, 16632)],
];

/// Weights over offsets `-m..=m`, ascending.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stencil {
    derivative: usize,
    points: Vec<(i64, Rational)>,
}

impl Stencil {
    fn antisymmetric(half: &[(i64, i64)]) -> Self {
        let m = half.len() as i64;
        let points = (-m..=m)
            .map(|offset| {
                let weight = match offset {
                    0 => Rational::zero(),
                    o => {
                        let (num, den) = half[(o.unsigned_abs() - 1) as usize];
                        let w = Rational::new(num, den);
                        if o < 0 {
                            -w
                        } else {
                            w
                        }
                    }
                };
                (offset, weight)
            })
            .collect();
        Self {
            derivative: 1,
            points,
        }
    }

    fn symmetric(half: &[(i64, i64)]) -> Self {
        let m = half.len() as i64 - 1;
        let points = (-m..=m)
            .map(|offset| {
                let (num, den) = half[offset.unsigned_abs() as usize];
                (offset, Rational::new(num, den))
            })
            .collect();
        Self {
            derivative: 2,
            points,
        }
    }

    pub fn derivative(&self) -> usize {
        self.derivative
    }

    pub fn points(&self) -> &[(i64, Rational)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn half_width(&self) -> usize {
        self.points.len() / 2
    }

    pub fn weight_sum(&self) -> Rational {
        self.points
            .iter()
            .fold(Rational::zero(), |acc, (_, w)| acc + *w)
    }

    /// Largest deviation from the Taylor conditions
    /// `sum_k w_k o_k^p / p! = [p == derivative]` for `p < len()`.
    pub fn taylor_residual(&self) -> f64 {
        let n = self.points.len();
        let vandermonde = DMatrix::from_fn(n, n, |p, k| {
            let offset = self.points[k].0 as f64;
            offset.powi(p as i32) / factorial(p)
        });
        let weights = DVector::from_iterator(
            n,
            self.points
                .iter()
                .map(|(_, w)| w.to_f64().unwrap_or(f64::NAN)),
        );
        let mut moments = vandermonde * weights;
        moments[self.derivative] -= 1.0;
        moments.amax()
    }
}

fn factorial(p: usize) -> f64 {
    (1..=p).map(|k| k as f64).product()
}

/// Central finite differences of a fixed even order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Central {
    order: usize,
    first: Stencil,
    second: Stencil,
}

impl Central {
    pub fn new(order: usize) -> Result<Self> {
        let slot = SUPPORTED_ORDERS
            .iter()
            .position(|&o| o == order)
            .ok_or_else(|| Error::UnsupportedOrder {
                order,
                supported: SUPPORTED_ORDERS.to_vec(),
            })?;
        let scheme = Self {
            order,
            first: Stencil::antisymmetric(FIRST_DERIVATIVE[slot]),
            second: Stencil::symmetric(SECOND_DERIVATIVE[slot]),
        };
        debug!(
            order,
            version = TABLE_VERSION,
            first_residual = scheme.first.taylor_residual(),
            second_residual = scheme.second.taylor_residual(),
            "central difference tables"
        );
        Ok(scheme)
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn first(&self) -> &Stencil {
        &self.first
    }

    pub fn second(&self) -> &Stencil {
        &self.second
    }

    fn stencil(&self, derivative: usize) -> &Stencil {
        if derivative == 2 {
            &self.second
        } else {
            &self.first
        }
    }
}

/// A derivative of the given order applied along one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct StencilUse {
    pub direction: usize,
    pub derivative: usize,
}

/// Discretised right-hand side of one evolution equation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Residual {
    pub variable: ArrayId,
    /// Position of the equation this residual came from.
    pub source: usize,
    pub rhs: Expr,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpatialDiscretisation {
    ndim: usize,
    scheme: Central,
    residuals: Vec<Residual>,
    prognostic: Vec<ArrayId>,
    stencils: BTreeSet<StencilUse>,
    max_offset: usize,
    arrays: WorkArrays,
}

impl SpatialDiscretisation {
    pub fn new(
        expanded: &[ExpandedEquation],
        problem: &Problem,
        grid: &Grid,
        scheme: &Central,
        metric: &dyn MetricTransform,
    ) -> Result<Self> {
        if grid.ndim() != problem.ndim() {
            return Err(Error::DimensionMismatch(format!(
                "grid has {} directions but the problem has {}",
                grid.ndim(),
                problem.ndim()
            )));
        }

        let mut discretiser = Discretiser::new(problem, scheme, metric);
        let mut evolved = Vec::with_capacity(expanded.len());
        for eq in expanded {
            let name = discretiser.evolved_variable(&eq.equation)?;
            let id = discretiser.arrays.register(&name, ArrayKind::Prognostic);
            if evolved.iter().any(|(_, other)| *other == id) {
                return Err(Error::malformed(
                    eq.equation.to_string(),
                    format!("`{name}` is evolved by more than one equation"),
                ));
            }
            evolved.push((eq, id));
        }

        let mut residuals = Vec::with_capacity(evolved.len());
        for (eq, variable) in &evolved {
            discretiser.current = eq.equation.to_string();
            let rhs = discretiser.discretise(&eq.equation.rhs)?.simplify();
            debug!(variable = discretiser.arrays.name(*variable), %rhs, "discretised residual");
            residuals.push(Residual {
                variable: *variable,
                source: eq.source,
                rhs,
            });
        }

        let max_offset = residuals
            .iter()
            .map(|r| max_offset(&r.rhs))
            .max()
            .unwrap_or(0);
        Ok(Self {
            ndim: problem.ndim(),
            scheme: scheme.clone(),
            prognostic: evolved.iter().map(|(_, id)| *id).collect(),
            residuals,
            stencils: discretiser.stencils,
            max_offset,
            arrays: discretiser.arrays,
        })
    }

    pub fn ndim(&self) -> usize {
        self.ndim
    }

    pub fn scheme(&self) -> &Central {
        &self.scheme
    }

    pub fn residuals(&self) -> &[Residual] {
        &self.residuals
    }

    pub fn prognostic(&self) -> &[ArrayId] {
        &self.prognostic
    }

    pub fn stencils(&self) -> impl Iterator<Item = &StencilUse> {
        self.stencils.iter()
    }

    /// Widest offset read by any residual, in grid points.
    pub fn max_offset(&self) -> usize {
        self.max_offset
    }

    pub fn arrays(&self) -> &WorkArrays {
        &self.arrays
    }

    pub(crate) fn arrays_mut(&mut self) -> &mut WorkArrays {
        &mut self.arrays
    }

    /// Residuals as `<variable> = rhs` equations, for display.
    pub fn equations(&self) -> Vec<Equation> {
        self.residuals
            .iter()
            .map(|r| Equation::new(Expr::symbol(self.arrays.name(r.variable)), r.rhs.clone()))
            .collect()
    }
}

fn max_offset(expr: &Expr) -> usize {
    let mut widest = 0;
    expr.walk(&mut |e| {
        if let Expr::GridRef(grid) = e {
            for offset in &grid.offsets {
                widest = widest.max(offset.unsigned_abs() as usize);
            }
        }
    });
    widest
}

fn has_grid_ref(expr: &Expr) -> bool {
    expr.contains(|e| matches!(e, Expr::GridRef(_)))
}

fn shift(expr: &Expr, direction: usize, by: i64) -> Expr {
    match expr {
        Expr::GridRef(grid) => Expr::GridRef(grid.shifted(direction, by)),
        _ => expr.map_children(|child| shift(child, direction, by)),
    }
}

struct Discretiser<'a> {
    problem: &'a Problem,
    scheme: &'a Central,
    metric: &'a dyn MetricTransform,
    constants: BTreeSet<String>,
    arrays: WorkArrays,
    stencils: BTreeSet<StencilUse>,
    /// Equation being discretised, for error messages.
    current: String,
}

impl<'a> Discretiser<'a> {
    fn new(problem: &'a Problem, scheme: &'a Central, metric: &'a dyn MetricTransform) -> Self {
        let constants = problem
            .constants
            .iter()
            .filter_map(|c| match identifier_to_expr(c) {
                Expr::Symbol(name) | Expr::Indexed(name, _) => Some(name),
                _ => None,
            })
            .collect();
        Self {
            problem,
            scheme,
            metric,
            constants,
            arrays: WorkArrays::new(),
            stencils: BTreeSet::new(),
            current: String::new(),
        }
    }

    fn malformed(&self, message: impl Into<String>) -> Error {
        Error::malformed(self.current.clone(), message)
    }

    fn centered(&self, array: impl Into<String>) -> Expr {
        Expr::GridRef(GridRef::centered(array, self.problem.ndim()))
    }

    fn coordinate_direction(&self, expr: &Expr) -> Option<usize> {
        match expr {
            Expr::Indexed(_, indices) if self.problem.is_coordinate(expr) => indices[0].as_fixed(),
            _ => None,
        }
    }

    /// Name of `v` in `Der(v, t) = rhs`.
    fn evolved_variable(&self, eq: &Equation) -> Result<String> {
        let malformed = |message: &str| Error::malformed(eq.to_string(), message);
        let Expr::Derivative { expr, wrt, .. } = &eq.lhs else {
            return Err(malformed("left-hand side must be Der(variable, t)"));
        };
        if !matches!(wrt.as_slice(), [Expr::Symbol(t)] if t == TIME) {
            return Err(malformed("left-hand side must differentiate once with respect to t"));
        }
        let base = match expr.as_ref() {
            Expr::Symbol(name) | Expr::Indexed(name, _) => name,
            _ => return Err(malformed("evolved quantity must be a field")),
        };
        if self.constants.contains(base) || self.problem.is_coordinate(expr) {
            return Err(malformed("evolved quantity must be a field"));
        }
        expr.concrete_name()
            .ok_or_else(|| malformed("evolved quantity still carries a symbolic index"))
    }

    fn discretise(&mut self, expr: &Expr) -> Result<Expr> {
        match expr {
            Expr::Number(_) => Ok(expr.clone()),
            Expr::GridRef(grid) => {
                let ndim = self.problem.ndim();
                if grid.offsets.len() != ndim {
                    return Err(self.malformed(format!(
                        "grid reference `{expr}` has {} offsets, expected {ndim}",
                        grid.offsets.len()
                    )));
                }
                if self.arrays.id(&grid.array).is_none() {
                    self.arrays.register(&grid.array, ArrayKind::Auxiliary);
                }
                Ok(expr.clone())
            }
            Expr::Symbol(_) | Expr::Indexed(..) => self.leaf(expr),
            Expr::Delta(..) => Err(self.malformed(format!("unresolved Kronecker delta `{expr}`"))),
            Expr::Derivative { expr: inner, wrt, .. } => self.derivative(inner, wrt),
            _ => expr.try_map_children(|child| self.discretise(child)),
        }
    }

    fn leaf(&mut self, expr: &Expr) -> Result<Expr> {
        let name = expr
            .concrete_name()
            .ok_or_else(|| self.malformed(format!("`{expr}` still carries a symbolic index")))?;
        let base = match expr {
            Expr::Indexed(base, _) => base.as_str(),
            _ => name.as_str(),
        };
        if base == TIME || base == TIME_STEP {
            return Ok(Expr::Symbol(name));
        }
        if base == "delta" {
            return Ok(expr.clone());
        }
        if self.constants.contains(base) {
            return Ok(Expr::Symbol(name));
        }
        if let Some(direction) = self.coordinate_direction(expr) {
            let array = format!("{}{direction}", self.problem.coordinate_symbol);
            self.arrays.register(&array, ArrayKind::Coordinate);
            return Ok(self.centered(array));
        }
        if self.arrays.id(&name).is_none() {
            warn!(
                symbol = %name,
                equation = %self.current,
                "symbol is neither evolved nor a constant; treating it as an auxiliary array"
            );
            self.arrays.register(&name, ArrayKind::Auxiliary);
        }
        Ok(self.centered(name))
    }

    fn derivative(&mut self, inner: &Expr, wrt: &[Expr]) -> Result<Expr> {
        let mut directions: Vec<(usize, usize)> = Vec::new();
        for w in wrt {
            if matches!(w, Expr::Symbol(t) if t == TIME) {
                return Err(self.malformed("time derivative on the right-hand side"));
            }
            let direction = self
                .coordinate_direction(w)
                .ok_or_else(|| self.malformed(format!("cannot differentiate with respect to `{w}`")))?;
            match directions.iter_mut().find(|(d, _)| *d == direction) {
                Some((_, count)) => *count += 1,
                None => directions.push((direction, 1)),
            }
        }

        let mut result = self.discretise(inner)?.simplify();
        for (direction, count) in directions {
            let mut remaining = count;
            while remaining > 0 {
                let derivative = remaining.min(2);
                result = self.apply_stencil(&result, direction, derivative);
                remaining -= derivative;
            }
        }
        Ok(result)
    }

    fn apply_stencil(&mut self, f: &Expr, direction: usize, derivative: usize) -> Expr {
        if !has_grid_ref(f) {
            return Expr::zero();
        }
        self.stencils.insert(StencilUse {
            direction,
            derivative,
        });
        let terms = self
            .scheme
            .stencil(derivative)
            .points()
            .iter()
            .filter(|(_, w)| !w.is_zero())
            .map(|(offset, w)| Expr::Product(vec![Expr::Number(*w), shift(f, direction, *offset)]))
            .collect();
        Expr::Product(vec![Expr::Sum(terms), self.scale(direction, derivative as i64)])
    }

    /// `(1/delta_d)^power`, or the metric coefficient array to that power.
    fn scale(&mut self, direction: usize, power: i64) -> Expr {
        let (base, exponent) = if self.problem.metrics.get(direction).copied().unwrap_or(false) {
            let array = self.metric.coefficient_array(direction);
            self.arrays.register(&array, ArrayKind::Metric);
            (self.centered(array), power)
        } else {
            let delta = Expr::Indexed("delta".to_string(), vec![Index::Fixed(direction)]);
            (delta, -power)
        };
        if exponent == 1 {
            base
        } else {
            Expr::Power(Box::new(base), Box::new(Expr::int(exponent)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretisation::StretchedMetric;
    use crate::expansion::expand_all;

    fn discretise(
        equations: &[&str],
        constants: &[&str],
        ndim: usize,
        metrics: &[bool],
        order: usize,
    ) -> Result<SpatialDiscretisation> {
        let problem = Problem::new(equations, &[], ndim, constants, "x", metrics, &[])?;
        let expanded = expand_all(&problem.equations, ndim)?;
        let grid = Grid::new(vec![16; ndim], vec![0.1; ndim])?;
        SpatialDiscretisation::new(
            &expanded,
            &problem,
            &grid,
            &Central::new(order)?,
            &StretchedMetric::default(),
        )
    }

    fn offsets_of(expr: &Expr, array: &str) -> BTreeSet<Vec<i64>> {
        let mut out = BTreeSet::new();
        expr.walk(&mut |e| {
            if let Expr::GridRef(grid) = e {
                if grid.array == array {
                    out.insert(grid.offsets.clone());
                }
            }
        });
        out
    }

    #[test]
    fn every_table_is_consistent() {
        for order in SUPPORTED_ORDERS {
            let scheme = Central::new(order).unwrap();
            for stencil in [scheme.first(), scheme.second()] {
                assert_eq!(stencil.len(), order + 1);
                assert!(stencil.weight_sum().is_zero(), "order {order} weights do not sum to zero");
                assert!(
                    stencil.taylor_residual() < 1e-9,
                    "order {order} derivative {} residual {}",
                    stencil.derivative(),
                    stencil.taylor_residual()
                );
            }
            let first = scheme.first().points();
            let second = scheme.second().points();
            for k in 0..first.len() {
                let mirror = first.len() - 1 - k;
                assert_eq!(first[k].1, -first[mirror].1);
                assert_eq!(second[k].1, second[mirror].1);
            }
        }
    }

    #[test]
    fn exact_moments_for_order_eight() {
        let scheme = Central::new(8).unwrap();
        let moment = |stencil: &Stencil, p: i32| {
            stencil
                .points()
                .iter()
                .fold(Rational::zero(), |acc, (o, w)| {
                    acc + *w * Rational::integer(*o).powi(p).unwrap()
                })
        };
        assert_eq!(moment(scheme.first(), 1), Rational::integer(1));
        assert_eq!(moment(scheme.second(), 2), Rational::integer(2));
        for p in [3, 5, 7] {
            assert!(moment(scheme.first(), p).is_zero());
        }
        for p in [4, 6, 8] {
            assert!(moment(scheme.second(), p).is_zero());
        }
    }

    #[test]
    fn unsupported_order_is_rejected() {
        for order in [0, 3, 14] {
            assert!(matches!(
                Central::new(order),
                Err(Error::UnsupportedOrder { .. })
            ));
        }
    }

    #[test]
    fn wave_equation_uses_full_stencil() {
        let spatial = discretise(
            &["Eq(Der(phi,t), -c_j*Der(phi,x_j))"],
            &["c_j"],
            1,
            &[false],
            8,
        )
        .unwrap();
        assert_eq!(spatial.scheme().first().len(), 9);
        assert_eq!(spatial.residuals().len(), 1);
        let rhs = &spatial.residuals()[0].rhs;
        // The zero center weight is dropped.
        let expected: BTreeSet<Vec<i64>> = [-4, -3, -2, -1, 1, 2, 3, 4].iter().map(|&o| vec![o]).collect();
        assert_eq!(offsets_of(rhs, "phi"), expected);
        assert!(rhs.to_string().contains("c0"), "constant lost in {rhs}");
        assert!(rhs.to_string().contains("delta_0"), "spacing lost in {rhs}");
        assert_eq!(spatial.max_offset(), 4);
        assert_eq!(
            spatial.stencils().copied().collect::<Vec<_>>(),
            vec![StencilUse { direction: 0, derivative: 1 }]
        );
    }

    #[test]
    fn repeated_coordinate_uses_second_derivative_table() {
        let spatial = discretise(&["Eq(Der(u,t), nu*Der(u,x_0,x_0))"], &["nu"], 1, &[false], 2).unwrap();
        let rhs = &spatial.residuals()[0].rhs;
        let expected: BTreeSet<Vec<i64>> = [-1, 0, 1].iter().map(|&o| vec![o]).collect();
        assert_eq!(offsets_of(rhs, "u"), expected);
        assert!(rhs.to_string().contains("delta_0**2"), "unexpected scale in {rhs}");
    }

    #[test]
    fn mixed_and_nested_derivatives_compose() {
        let spatial = discretise(&["Eq(Der(u,t), Der(u,x_0,x_1))"], &[], 2, &[false, false], 2).unwrap();
        let offsets = offsets_of(&spatial.residuals()[0].rhs, "u");
        let expected: BTreeSet<Vec<i64>> =
            [[-1, -1], [-1, 1], [1, -1], [1, 1]].iter().map(|o| o.to_vec()).collect();
        assert_eq!(offsets, expected);

        let nested = discretise(&["Eq(Der(u,t), Der(Der(u,x_0),x_0))"], &[], 1, &[false], 2).unwrap();
        let expected: BTreeSet<Vec<i64>> = [-2, 0, 2].iter().map(|&o| vec![o]).collect();
        assert_eq!(offsets_of(&nested.residuals()[0].rhs, "u"), expected);
    }

    #[test]
    fn metric_flag_scales_by_coefficient_array() {
        let spatial = discretise(&["Eq(Der(u,t), Der(u,x_0) + Der(u,x_1))"], &[], 2, &[true, false], 2)
            .unwrap();
        let rhs = &spatial.residuals()[0].rhs;
        assert_eq!(offsets_of(rhs, "D0"), BTreeSet::from([vec![0, 0]]));
        assert!(offsets_of(rhs, "D1").is_empty());
        assert!(rhs.to_string().contains("delta_1"));
        let kind = spatial.arrays().id("D0").and_then(|id| spatial.arrays().get(id)).map(|a| a.kind);
        assert_eq!(kind, Some(ArrayKind::Metric));
    }

    #[test]
    fn grid_free_derivative_vanishes() {
        let spatial = discretise(&["Eq(Der(u,t), Der(c,x_0) + u)"], &["c"], 1, &[false], 4).unwrap();
        assert_eq!(spatial.residuals()[0].rhs, Expr::GridRef(GridRef::centered("u", 1)));
    }

    #[test]
    fn auxiliary_fields_and_coordinates_become_arrays() {
        let spatial = discretise(&["Eq(Der(rho,t), -Der(rho*w, x_0) + x_0)"], &[], 1, &[false], 2).unwrap();
        let arrays = spatial.arrays();
        let kind = |name: &str| arrays.id(name).and_then(|id| arrays.get(id)).map(|a| a.kind);
        assert_eq!(kind("rho"), Some(ArrayKind::Prognostic));
        assert_eq!(kind("w"), Some(ArrayKind::Auxiliary));
        assert_eq!(kind("x0"), Some(ArrayKind::Coordinate));
    }

    #[test]
    fn malformed_evolution_forms_are_rejected() {
        for bad in [
            "Eq(u, Der(u,x_0))",
            "Eq(Der(u,x_0), u)",
            "Eq(Der(u,t), Der(u,t))",
            "Eq(Der(c,t), u)",
        ] {
            let err = discretise(&[bad], &["c"], 1, &[false], 2).expect_err(bad);
            assert!(matches!(err, Error::MalformedEquation { .. }), "{bad}: {err}");
        }
        let err = discretise(&["Eq(Der(u,t), u)", "Eq(Der(u,t), -u)"], &[], 1, &[false], 2)
            .expect_err("duplicate variable");
        assert!(matches!(err, Error::MalformedEquation { .. }));
    }

    #[test]
    fn grid_reference_needs_one_offset_per_direction() {
        for bad in ["Eq(Der(u,t), Der(w[0], x_1))", "Eq(Der(u,t), w[0,1,0])"] {
            let err = discretise(&[bad], &[], 2, &[false, false], 2).expect_err(bad);
            assert!(matches!(err, Error::MalformedEquation { .. }), "{bad}: {err}");
        }
        let spatial = discretise(&["Eq(Der(u,t), Der(w[1,0], x_1))"], &[], 2, &[false, false], 2).unwrap();
        assert_eq!(
            offsets_of(&spatial.residuals()[0].rhs, "w"),
            BTreeSet::from([vec![1, -1], vec![1, 1]])
        );
    }
}
