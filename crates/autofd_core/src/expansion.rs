//! Einstein-notation index expansion.
//!
//! Free indices of the left-hand side generate one equation per direction
//! assignment; an index repeated within a single term is replaced by an
//! explicit sum over all directions.

use crate::error::{Error, Result};
use crate::expr::{Equation, Expr, Index};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// An equation with every index bound to a concrete direction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpandedEquation {
    /// Position of the source equation in its input list.
    pub source: usize,
    /// Free index -> direction assignment that produced this equation.
    pub assignment: Vec<(String, usize)>,
    pub equation: Equation,
}

/// Free and contracted indices of one term.
struct Contraction {
    free: Vec<String>,
    dummies: Vec<String>,
}

/// Counts index occurrences across the parts of one term. Once is free,
/// twice is summed, anything more is ambiguous.
fn contract<I>(parts: I) -> std::result::Result<Contraction, String>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut order: Vec<String> = Vec::new();
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for name in parts.into_iter().flatten() {
        let count = counts.entry(name.clone()).or_insert(0);
        if *count == 0 {
            order.push(name);
        }
        *count += 1;
    }
    let mut free = Vec::new();
    let mut dummies = Vec::new();
    for name in order {
        match counts[&name] {
            1 => free.push(name),
            2 => dummies.push(name),
            n => {
                return Err(format!(
                    "index `{name}` appears {n} times in one term; summation is ambiguous"
                ))
            }
        }
    }
    Ok(Contraction { free, dummies })
}

fn symbolic_names<'a>(indices: impl IntoIterator<Item = &'a Index>) -> Vec<String> {
    indices
        .into_iter()
        .filter_map(|i| i.as_symbolic().map(str::to_string))
        .collect()
}

fn is_square(exp: &Expr) -> bool {
    matches!(exp.as_number(), Some(n) if n == crate::rational::Rational::integer(2))
}

/// Index lists of the parts that form one term at this node, or `None` for
/// nodes that do not contract (sums and atoms).
fn term_parts(expr: &Expr) -> std::result::Result<Option<Vec<Vec<String>>>, String> {
    Ok(match expr {
        Expr::Indexed(_, indices) => Some(vec![symbolic_names(indices)]),
        Expr::Delta(a, b) => Some(vec![symbolic_names([a, b])]),
        Expr::Product(factors) | Expr::Call(_, factors) => Some(
            factors
                .iter()
                .map(free_indices)
                .collect::<std::result::Result<_, _>>()?,
        ),
        Expr::Power(base, exp) => {
            let base_free = free_indices(base)?;
            if is_square(exp) {
                Some(vec![base_free.clone(), base_free])
            } else {
                if !free_indices(exp)?.is_empty() {
                    return Err(format!("exponent `{exp}` carries free indices"));
                }
                Some(vec![base_free])
            }
        }
        Expr::Derivative { expr, wrt, .. } => {
            let mut parts = vec![free_indices(expr)?];
            for w in wrt {
                parts.push(free_indices(w)?);
            }
            Some(parts)
        }
        Expr::Number(_) | Expr::Symbol(_) | Expr::GridRef(_) | Expr::Sum(_) => None,
    })
}

/// Free symbolic indices of `expr` after contracting repeated ones, in
/// first-appearance order. Every term of a sum must carry the same set.
pub fn free_indices(expr: &Expr) -> std::result::Result<Vec<String>, String> {
    if let Expr::Sum(terms) = expr {
        let mut result: Option<Vec<String>> = None;
        for term in terms {
            let free = free_indices(term)?;
            match &result {
                None => result = Some(free),
                Some(first) => {
                    let mut a = first.clone();
                    let mut b = free.clone();
                    a.sort();
                    b.sort();
                    if a != b {
                        return Err(format!(
                            "terms of a sum carry different free indices {first:?} and {free:?} (at `{term}`)"
                        ));
                    }
                }
            }
        }
        return Ok(result.unwrap_or_default());
    }
    match term_parts(expr)? {
        Some(parts) => Ok(contract(parts)?.free),
        None => Ok(Vec::new()),
    }
}

/// Every direction assignment for `count` indices, direction-major with the
/// first index outermost.
pub fn assignments(count: usize, ndim: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    let mut current = vec![0; count];
    loop {
        out.push(current.clone());
        let mut pos = count;
        loop {
            if pos == 0 {
                return out;
            }
            pos -= 1;
            current[pos] += 1;
            if current[pos] < ndim {
                break;
            }
            current[pos] = 0;
        }
    }
}

fn expand_node(expr: &Expr, ndim: usize) -> std::result::Result<Expr, String> {
    let expr = expr.try_map_children(|child| expand_node(child, ndim))?;
    let dummies = match term_parts(&expr)? {
        Some(parts) => contract(parts)?.dummies,
        None => Vec::new(),
    };
    if dummies.is_empty() {
        return Ok(expr);
    }
    let terms = assignments(dummies.len(), ndim)
        .into_iter()
        .map(|directions| {
            let map: BTreeMap<String, Index> = dummies
                .iter()
                .cloned()
                .zip(directions.into_iter().map(Index::Fixed))
                .collect();
            expr.rename_indices(&map)
        })
        .collect();
    Ok(Expr::Sum(terms))
}

/// Replaces every repeated index in `expr` by an explicit sum.
pub fn expand_dummies(expr: &Expr, ndim: usize) -> std::result::Result<Expr, String> {
    expand_node(expr, ndim)
}

fn check_fixed_range(eq: &Equation, ndim: usize) -> Result<()> {
    for side in [&eq.lhs, &eq.rhs] {
        for index in side.all_indices() {
            if let Index::Fixed(d) = index {
                if d >= ndim {
                    return Err(Error::imbalance(
                        eq.to_string(),
                        format!("direction {d} is outside [0, {ndim})"),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Expands one equation into `ndim^m` concrete equations, `m` being the
/// number of distinct free indices on its left-hand side.
pub fn expand_equation(eq: &Equation, ndim: usize) -> Result<Vec<(Vec<(String, usize)>, Equation)>> {
    let describe = || eq.to_string();
    check_fixed_range(eq, ndim)?;

    let lhs_free = free_indices(&eq.lhs).map_err(|m| Error::imbalance(describe(), m))?;
    let rhs_free = free_indices(&eq.rhs).map_err(|m| Error::imbalance(describe(), m))?;
    if let Some(missing) = rhs_free.iter().find(|i| !lhs_free.contains(i)) {
        return Err(Error::imbalance(
            describe(),
            format!("free index `{missing}` on the right is absent on the left"),
        ));
    }
    if let Some(missing) = lhs_free.iter().find(|i| !rhs_free.contains(i)) {
        return Err(Error::imbalance(
            describe(),
            format!("free index `{missing}` on the left is absent on the right"),
        ));
    }

    let mut out = Vec::new();
    for directions in assignments(lhs_free.len(), ndim) {
        let map: BTreeMap<String, Index> = lhs_free
            .iter()
            .cloned()
            .zip(directions.iter().copied().map(Index::Fixed))
            .collect();
        let bound = eq.map(|side| side.rename_indices(&map));
        let lhs = expand_dummies(&bound.lhs, ndim)
            .map_err(|m| Error::imbalance(describe(), m))?
            .simplify();
        let rhs = expand_dummies(&bound.rhs, ndim)
            .map_err(|m| Error::imbalance(describe(), m))?
            .simplify();
        let expanded = Equation::new(lhs, rhs);
        if let Some(left) = expanded
            .rhs
            .all_indices()
            .into_iter()
            .chain(expanded.lhs.all_indices())
            .find(|i| i.as_symbolic().is_some())
        {
            return Err(Error::imbalance(
                describe(),
                format!("index `{left}` could not be resolved"),
            ));
        }
        let assignment = lhs_free.iter().cloned().zip(directions).collect();
        out.push((assignment, expanded));
    }
    debug!(equation = %eq, count = out.len(), "expanded equation");
    Ok(out)
}

/// Expands a list of equations, keeping input order then direction order.
pub fn expand_all(equations: &[Equation], ndim: usize) -> Result<Vec<ExpandedEquation>> {
    let mut out = Vec::new();
    for (source, eq) in equations.iter().enumerate() {
        for (assignment, equation) in expand_equation(eq, ndim)? {
            out.push(ExpandedEquation {
                source,
                assignment,
                equation,
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_equation, parse_expr};

    fn expand(source: &str, ndim: usize) -> Result<Vec<Equation>> {
        let eq = parse_equation(source).expect("test equation should parse");
        Ok(expand_equation(&eq, ndim)?
            .into_iter()
            .map(|(_, eq)| eq)
            .collect())
    }

    fn count_terms(expr: &Expr) -> usize {
        match expr {
            Expr::Sum(terms) => terms.len(),
            Expr::Product(factors) => factors.iter().map(count_terms).max().unwrap_or(1),
            _ => 1,
        }
    }

    #[test]
    fn produces_ndim_to_the_m_equations() {
        for ndim in 1..=3 {
            assert_eq!(expand("Eq(Der(phi,t), -c_j*Der(phi,x_j))", ndim).unwrap().len(), 1);
            assert_eq!(
                expand("Eq(Der(rhou_i,t), -conser(rhou_i*u_j, x_j))", ndim).unwrap().len(),
                ndim
            );
            assert_eq!(
                expand("Eq(tau_i_j, Der(u_i,x_j) + Der(u_j,x_i))", ndim).unwrap().len(),
                ndim * ndim
            );
        }
    }

    #[test]
    fn assignments_are_direction_major() {
        assert_eq!(
            assignments(2, 2),
            vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]
        );
        assert_eq!(assignments(0, 3), vec![Vec::<usize>::new()]);
    }

    #[test]
    fn free_index_assignment_is_recorded_in_order() {
        let eq = parse_equation("Eq(tau_i_j, u_i*v_j)").unwrap();
        let expanded = expand_all(&[eq], 2).unwrap();
        let order: Vec<Vec<usize>> = expanded
            .iter()
            .map(|e| e.assignment.iter().map(|(_, d)| *d).collect())
            .collect();
        assert_eq!(order, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);
        assert_eq!(expanded[1].equation.lhs.to_string(), "tau_0_1");
        assert_eq!(expanded[1].equation.rhs.to_string(), "u_0*v_1");
    }

    #[test]
    fn repeated_index_becomes_sum() {
        let eqs = expand("Eq(Der(phi,t), -c_j*Der(phi,x_j))", 3).unwrap();
        let expected = parse_expr(
            "-(c_0*Der(phi,x_0) + c_1*Der(phi,x_1) + c_2*Der(phi,x_2))",
        )
        .unwrap()
        .simplify();
        assert_eq!(eqs[0].rhs, expected);
    }

    #[test]
    fn double_summation_expands_nested() {
        let eqs = expand("Eq(e, u_i*u_j*v_i*v_j)", 2).unwrap();
        assert_eq!(count_terms(&eqs[0].rhs), 4);
    }

    #[test]
    fn contraction_inside_derivative_argument_and_coordinate() {
        let eqs = expand("Eq(e, Der(u_i*tau_i_j, x_j))", 2).unwrap();
        let Expr::Sum(outer) = &eqs[0].rhs else {
            panic!("expected outer sum, got {}", eqs[0].rhs);
        };
        assert_eq!(outer.len(), 2);
        for term in outer {
            let Expr::Derivative { expr, .. } = term else {
                panic!("expected derivative, got {term}");
            };
            assert_eq!(count_terms(expr), 2);
        }
    }

    #[test]
    fn kronecker_delta_folds_after_expansion() {
        let eqs = expand("Eq(Der(rhou_i,t), -Der(p*KroneckerDelta(_i,_j), x_j))", 2).unwrap();
        assert_eq!(eqs[0].rhs.to_string(), "-Der(p, x_0)");
        assert_eq!(eqs[1].rhs.to_string(), "-Der(p, x_1)");
    }

    #[test]
    fn squared_indexed_symbol_is_summed() {
        let eqs = expand("Eq(k, rhou_j**2)", 3).unwrap();
        assert_eq!(eqs[0].rhs.to_string(), "rhou_0**2 + rhou_1**2 + rhou_2**2");
    }

    #[test]
    fn imbalance_is_rejected() {
        for bad in [
            "Eq(a, u_i)",
            "Eq(a_i, b)",
            "Eq(a, u_j*v_j*w_j)",
            "Eq(a_i, u_i + v_j)",
            "Eq(a, u_5)",
        ] {
            let err = expand(bad, 3).expect_err("should be rejected");
            assert!(
                matches!(err, Error::IndexImbalance { .. }),
                "unexpected error for {bad}: {err}"
            );
        }
    }

    #[test]
    fn fully_concrete_equation_passes_through() {
        let eqs = expand("Eq(Der(u_0,t), Der(u_0, x_1))", 2).unwrap();
        assert_eq!(eqs.len(), 1);
        assert_eq!(eqs[0].rhs.to_string(), "Der(u_0, x_1)");
    }
}
