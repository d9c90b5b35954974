//! Substitution and formula inlining.
//!
//! Definitions form an explicit dependency graph (a definition depends on
//! every definition whose symbol its right-hand side mentions). The graph is
//! sorted once, deterministically, with ties broken by declaration order.
//! Substitutions are inlined structurally before index expansion; formulas
//! are index-expanded themselves and inlined by concrete name afterwards.

use crate::error::{Error, Result};
use crate::expansion::{expand_equation, ExpandedEquation};
use crate::expr::{Equation, Expr, Index};
use crate::problem::Problem;
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    Substitution,
    Formula,
}

#[derive(Debug, Clone)]
pub struct Definition {
    pub kind: DefinitionKind,
    /// Base symbol produced by this definition (`tau` for `tau_i_j`).
    pub name: String,
    pub equation: Equation,
}

fn defined_name(eq: &Equation) -> Result<String> {
    match &eq.lhs {
        Expr::Symbol(name) => Ok(name.clone()),
        Expr::Indexed(base, _) => Ok(base.clone()),
        other => Err(Error::malformed(
            eq.to_string(),
            format!("definition target `{other}` must be a symbol"),
        )),
    }
}

/// Base names of every symbol referenced by `expr`.
fn referenced_names(expr: &Expr) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    expr.walk(&mut |e| match e {
        Expr::Symbol(name) | Expr::Indexed(name, _) => {
            names.insert(name.clone());
        }
        _ => {}
    });
    names
}

/// Dependency graph over definitions in declaration order.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// `dependencies[d]` lists the definitions `d` consumes.
    dependencies: Vec<BTreeSet<usize>>,
}

impl DependencyGraph {
    pub fn build(definitions: &[Definition]) -> Self {
        let mut producers: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, def) in definitions.iter().enumerate() {
            producers.entry(def.name.as_str()).or_default().push(i);
        }
        let dependencies = definitions
            .iter()
            .map(|def| {
                referenced_names(&def.equation.rhs)
                    .iter()
                    .filter_map(|name| producers.get(name.as_str()))
                    .flatten()
                    .copied()
                    .collect()
            })
            .collect();
        Self { dependencies }
    }

    /// Kahn's algorithm; dependencies come first and ties go to the earlier
    /// declaration. Returns the members of one cycle on failure.
    pub fn topological_order(&self) -> std::result::Result<Vec<usize>, Vec<usize>> {
        let n = self.dependencies.len();
        let mut remaining: Vec<usize> = self.dependencies.iter().map(BTreeSet::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (node, deps) in self.dependencies.iter().enumerate() {
            for &dep in deps {
                dependents[dep].push(node);
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| remaining[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(node) = ready.pop_first() {
            order.push(node);
            for &dependent in &dependents[node] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() == n {
            Ok(order)
        } else {
            Err(self.find_cycle(&order))
        }
    }

    fn find_cycle(&self, sorted: &[usize]) -> Vec<usize> {
        let unsorted: Vec<usize> = (0..self.dependencies.len())
            .filter(|i| !sorted.contains(i))
            .collect();
        // Every unsorted node has an unsorted dependency, so walking them
        // must revisit a node.
        let mut path: Vec<usize> = Vec::new();
        let mut current = unsorted[0];
        loop {
            if let Some(start) = path.iter().position(|&p| p == current) {
                let mut cycle = path[start..].to_vec();
                cycle.push(current);
                return cycle;
            }
            path.push(current);
            current = match self.dependencies[current]
                .iter()
                .copied()
                .find(|d| unsorted.contains(d))
            {
                Some(next) => next,
                None => return path,
            };
        }
    }
}

/// Picks index names unused by the surrounding equation.
struct FreshIndices {
    taken: BTreeSet<String>,
}

impl FreshIndices {
    fn new(taken: impl IntoIterator<Item = String>) -> Self {
        Self {
            taken: taken.into_iter().collect(),
        }
    }

    fn next(&mut self) -> String {
        let letters = ('i'..='z').chain('a'..'i');
        let candidate = letters
            .map(|c| c.to_string())
            .find(|c| !self.taken.contains(c))
            .unwrap_or_else(|| {
                (0..)
                    .map(|n| format!("k{n}"))
                    .find(|c| !self.taken.contains(c))
                    .unwrap_or_default()
            });
        self.taken.insert(candidate.clone());
        candidate
    }
}

#[derive(Debug, Clone)]
pub struct SubstitutionResolver {
    ndim: usize,
    definitions: Vec<Definition>,
    order: Vec<usize>,
    /// Expanded, fully resolved formulas keyed by concrete name (`u0`).
    formulas: IndexMap<String, Expr>,
}

impl SubstitutionResolver {
    pub fn new(problem: &Problem) -> Result<Self> {
        let mut definitions = Vec::new();
        for (kind, equations) in [
            (DefinitionKind::Substitution, &problem.substitutions),
            (DefinitionKind::Formula, &problem.formulas),
        ] {
            for equation in equations {
                definitions.push(Definition {
                    kind,
                    name: defined_name(equation)?,
                    equation: equation.clone(),
                });
            }
        }
        for def in &definitions {
            if def.kind == DefinitionKind::Formula && problem.constants.contains(&def.name) {
                warn!(
                    symbol = %def.name,
                    "symbol is both a constant and a formula; the formula takes precedence"
                );
            }
        }

        let graph = DependencyGraph::build(&definitions);
        let order = graph.topological_order().map_err(|cycle| Error::CyclicSubstitution {
            cycle: cycle.iter().map(|&i| definitions[i].name.clone()).collect(),
        })?;
        debug!(
            order = ?order.iter().map(|&i| definitions[i].name.as_str()).collect::<Vec<_>>(),
            "definition order"
        );

        let mut resolver = Self {
            ndim: problem.ndim(),
            definitions,
            order,
            formulas: IndexMap::new(),
        };
        resolver.formulas = resolver.expand_formulas()?;
        Ok(resolver)
    }

    pub fn definitions(&self) -> &[Definition] {
        &self.definitions
    }

    /// Definitions in dependency order.
    pub fn ordered(&self) -> impl Iterator<Item = &Definition> {
        self.order.iter().map(|&i| &self.definitions[i])
    }

    fn iteration_bound(&self) -> usize {
        self.definitions.len() + 1
    }

    fn substitutions(&self) -> impl Iterator<Item = &Definition> {
        self.ordered()
            .filter(|d| d.kind == DefinitionKind::Substitution)
    }

    fn expand_formulas(&self) -> Result<IndexMap<String, Expr>> {
        let mut resolved: IndexMap<String, Expr> = IndexMap::new();
        let formulas: Vec<&Definition> = self
            .ordered()
            .filter(|d| d.kind == DefinitionKind::Formula)
            .collect();
        for def in formulas {
            let equation = self.apply_substitutions(&def.equation)?;
            for (_, expanded) in expand_equation(&equation, self.ndim)? {
                let name = expanded.lhs.concrete_name().ok_or_else(|| {
                    Error::malformed(def.equation.to_string(), "formula target is not a symbol")
                })?;
                let rhs = inline_concrete(&expanded.rhs, &resolved).simplify();
                resolved.insert(name, rhs);
            }
        }
        Ok(resolved)
    }

    /// Expanded formulas as equations, in dependency order.
    pub fn expanded_formulas(&self) -> Vec<Equation> {
        self.formulas
            .iter()
            .map(|(name, rhs)| Equation::new(Expr::symbol(name.clone()), rhs.clone()))
            .collect()
    }

    /// Inlines substitutions into the right-hand side until none remain.
    pub fn apply_substitutions(&self, eq: &Equation) -> Result<Equation> {
        let mut rhs = eq.rhs.clone();
        for _ in 0..self.iteration_bound() {
            let taken = eq
                .lhs
                .all_indices()
                .into_iter()
                .chain(rhs.all_indices())
                .filter_map(|i| i.as_symbolic().map(str::to_string));
            let mut fresh = FreshIndices::new(taken);
            let next = self.inline_substitutions(&rhs, &mut fresh);
            if next == rhs {
                return Ok(Equation::new(eq.lhs.clone(), rhs));
            }
            rhs = next;
        }
        Err(Error::UnresolvedSymbol {
            symbols: self.remaining(&rhs, DefinitionKind::Substitution),
            iterations: self.iteration_bound(),
        })
    }

    fn inline_substitutions(&self, expr: &Expr, fresh: &mut FreshIndices) -> Expr {
        let (name, use_indices): (&str, &[Index]) = match expr {
            Expr::Symbol(name) => (name.as_str(), &[]),
            Expr::Indexed(base, indices) => (base.as_str(), indices.as_slice()),
            _ => return expr.map_children(|child| self.inline_substitutions(child, fresh)),
        };
        let Some(def) = self.substitutions().find(|d| d.name == name) else {
            return expr.clone();
        };
        let def_indices: &[Index] = match &def.equation.lhs {
            Expr::Indexed(_, indices) => indices,
            _ => &[],
        };
        if def_indices.len() != use_indices.len() {
            return expr.clone();
        }

        let mut map: BTreeMap<String, Index> = BTreeMap::new();
        for (def_index, use_index) in def_indices.iter().zip(use_indices) {
            match def_index {
                Index::Symbolic(name) => {
                    map.insert(name.clone(), use_index.clone());
                }
                Index::Fixed(_) if def_index == use_index => {}
                Index::Fixed(_) => return expr.clone(),
            }
        }
        for index in def.equation.rhs.all_indices() {
            if let Index::Symbolic(name) = index {
                if !map.contains_key(&name) {
                    map.insert(name, Index::Symbolic(fresh.next()));
                }
            }
        }
        def.equation.rhs.rename_indices(&map)
    }

    /// Inlines expanded formulas by concrete name until a fixed point.
    pub fn apply_formulas(&self, eq: &Equation) -> Result<Equation> {
        let mut rhs = eq.rhs.clone();
        for _ in 0..self.iteration_bound() {
            let next = inline_concrete(&rhs, &self.formulas);
            if next == rhs {
                return Ok(Equation::new(eq.lhs.clone(), rhs.simplify()));
            }
            rhs = next;
        }
        Err(Error::UnresolvedSymbol {
            symbols: self.remaining(&rhs, DefinitionKind::Formula),
            iterations: self.iteration_bound(),
        })
    }

    /// Formula inlining for an already expanded equation. Idempotent.
    pub fn resolve(&self, expanded: &ExpandedEquation) -> Result<ExpandedEquation> {
        Ok(ExpandedEquation {
            source: expanded.source,
            assignment: expanded.assignment.clone(),
            equation: self.apply_formulas(&expanded.equation)?,
        })
    }

    /// Substitutions, index expansion, then formulas, for every equation.
    pub fn expand_and_resolve(&self, equations: &[Equation]) -> Result<Vec<ExpandedEquation>> {
        let mut out = Vec::new();
        for (source, equation) in equations.iter().enumerate() {
            let substituted = self.apply_substitutions(equation)?;
            for (assignment, expanded) in expand_equation(&substituted, self.ndim)? {
                out.push(self.resolve(&ExpandedEquation {
                    source,
                    assignment,
                    equation: expanded,
                })?);
            }
        }
        Ok(out)
    }

    fn remaining(&self, expr: &Expr, kind: DefinitionKind) -> Vec<String> {
        let names = referenced_names(expr);
        self.definitions
            .iter()
            .filter(|d| d.kind == kind && names.contains(&d.name))
            .map(|d| d.name.clone())
            .collect()
    }
}

fn inline_concrete(expr: &Expr, formulas: &IndexMap<String, Expr>) -> Expr {
    match expr {
        Expr::Symbol(_) | Expr::Indexed(..) => expr
            .concrete_name()
            .and_then(|name| formulas.get(&name).cloned())
            .unwrap_or_else(|| expr.clone()),
        _ => expr.map_children(|child| inline_concrete(child, formulas)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expansion::free_indices;
    use crate::parser::parse_equation;

    fn problem(substitutions: &[&str], formulas: &[&str], ndim: usize) -> Result<Problem> {
        Problem::new(&[], substitutions, ndim, &[], "x", &vec![false; ndim], formulas)
    }

    #[test]
    fn order_puts_dependencies_first_and_keeps_declaration_ties() {
        let p = problem(
            &[],
            &["Eq(T, p*gama/rho)", "Eq(u_i, rhou_i/rho)", "Eq(p, rhoE - u_j*u_j)"],
            2,
        )
        .unwrap();
        let resolver = SubstitutionResolver::new(&p).unwrap();
        let names: Vec<&str> = resolver.ordered().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["u", "p", "T"]);
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let err = SubstitutionResolver::new(&problem(&["Eq(a, a + 1)"], &[], 1).unwrap())
            .expect_err("self reference");
        assert!(matches!(err, Error::CyclicSubstitution { .. }), "unexpected: {err}");
    }

    #[test]
    fn transitive_cycle_is_reported_with_members() {
        let p = problem(&["Eq(a, b*2)", "Eq(b, c + 1)"], &["Eq(c, a)"], 1).unwrap();
        match SubstitutionResolver::new(&p) {
            Err(Error::CyclicSubstitution { cycle }) => {
                for name in ["a", "b", "c"] {
                    assert!(cycle.iter().any(|c| c == name), "{name} missing from {cycle:?}");
                }
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn substitution_maps_indices_and_renames_dummies() {
        let p = problem(
            &["Eq(tau_i_j, Der(u_i,x_j) - KroneckerDelta(_i,_j)*Der(u_k,x_k))"],
            &[],
            3,
        )
        .unwrap();
        let resolver = SubstitutionResolver::new(&p).unwrap();
        let eq = parse_equation("Eq(Der(rhou_k,t), Der(tau_k_j,x_j))").unwrap();
        let substituted = resolver.apply_substitutions(&eq).unwrap();

        // `k` is taken by the use site, so the definition's dummy is renamed.
        let rhs = substituted.rhs.to_string();
        assert!(rhs.contains("Der(u_k, x_j)"), "unexpected rhs {rhs}");
        assert!(!rhs.contains("Der(u_k, x_k)"), "dummy index collided: {rhs}");
        assert_eq!(free_indices(&substituted.rhs).unwrap(), vec!["k".to_string()]);
    }

    #[test]
    fn formulas_are_expanded_and_inlined() {
        let p = problem(&[], &["Eq(u_i, rhou_i/rho)", "Eq(k, u_j*u_j)"], 2).unwrap();
        let resolver = SubstitutionResolver::new(&p).unwrap();
        let names: Vec<String> = resolver
            .expanded_formulas()
            .iter()
            .map(|f| f.lhs.to_string())
            .collect();
        assert_eq!(names, vec!["u0", "u1", "k"]);

        let eq = parse_equation("Eq(Der(e,t), k)").unwrap();
        let resolved = resolver.apply_formulas(&eq).unwrap();
        assert_eq!(
            resolved.rhs.to_string(),
            "rhou_0*rhou_0/rho/rho + rhou_1*rhou_1/rho/rho"
        );
    }

    #[test]
    fn resolution_is_idempotent() {
        let p = problem(&[], &["Eq(u_i, rhou_i/rho)", "Eq(p, u_j*u_j)"], 3).unwrap();
        let resolver = SubstitutionResolver::new(&p).unwrap();
        let eq = parse_equation("Eq(Der(rho,t), -Der(p + rhou_j*u_j, x_0))").unwrap();
        let once = resolver.expand_and_resolve(&[eq]).unwrap();
        let twice: Vec<ExpandedEquation> = once
            .iter()
            .map(|e| resolver.resolve(e).unwrap())
            .collect();
        assert_eq!(once, twice);
    }

    #[test]
    fn substitutions_feed_formulas() {
        let p = problem(&["Eq(q_i, -kappa*Der(T,x_i))"], &["Eq(T, p/rho)"], 1).unwrap();
        let resolver = SubstitutionResolver::new(&p).unwrap();
        let eq = parse_equation("Eq(Der(rhoE,t), -Der(q_i,x_i))").unwrap();
        let out = resolver.expand_and_resolve(&[eq]).unwrap();
        assert_eq!(out.len(), 1);
        let rhs = out[0].equation.rhs.to_string();
        assert!(rhs.contains("Der(p/rho, x_0)"), "unexpected rhs {rhs}");
        assert!(!rhs.contains('T') && !rhs.contains('q'), "unresolved symbol in {rhs}");
    }
}
