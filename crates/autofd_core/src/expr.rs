//! Structured expression tree shared by every pipeline stage.
//!
//! Expressions are built once by the parser and rewritten structurally from
//! then on. Subtraction is represented as a sum with a `-1` product factor and
//! division as a power with exponent `-1`.

use crate::rational::Rational;
use num_traits::{One, Signed, Zero};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A tensor index: either still symbolic (`i`, `j`) or bound to a direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Index {
    Symbolic(String),
    Fixed(usize),
}

impl Index {
    pub fn symbolic(name: impl Into<String>) -> Self {
        Index::Symbolic(name.into())
    }

    pub fn as_symbolic(&self) -> Option<&str> {
        match self {
            Index::Symbolic(name) => Some(name),
            Index::Fixed(_) => None,
        }
    }

    pub fn as_fixed(&self) -> Option<usize> {
        match self {
            Index::Fixed(d) => Some(*d),
            Index::Symbolic(_) => None,
        }
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Index::Symbolic(name) => write!(f, "{name}"),
            Index::Fixed(d) => write!(f, "{d}"),
        }
    }
}

/// `Der` and `conser` share a discretisation but keep their written form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DerivativeKind {
    Standard,
    Conservative,
}

impl DerivativeKind {
    pub fn keyword(self) -> &'static str {
        match self {
            DerivativeKind::Standard => "Der",
            DerivativeKind::Conservative => "conser",
        }
    }
}

/// A grid-resident array read at integer offsets from the current point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridRef {
    pub array: String,
    pub offsets: Vec<i64>,
}

impl GridRef {
    pub fn centered(array: impl Into<String>, ndim: usize) -> Self {
        Self {
            array: array.into(),
            offsets: vec![0; ndim],
        }
    }

    pub fn shifted(&self, direction: usize, by: i64) -> Self {
        let mut offsets = self.offsets.clone();
        offsets[direction] += by;
        Self {
            array: self.array.clone(),
            offsets,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Number(Rational),
    Symbol(String),
    Indexed(String, Vec<Index>),
    Sum(Vec<Expr>),
    Product(Vec<Expr>),
    Power(Box<Expr>, Box<Expr>),
    Derivative {
        kind: DerivativeKind,
        expr: Box<Expr>,
        wrt: Vec<Expr>,
    },
    Delta(Index, Index),
    Call(String, Vec<Expr>),
    GridRef(GridRef),
}

/// A `lhs = rhs` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equation {
    pub lhs: Expr,
    pub rhs: Expr,
}

impl Equation {
    pub fn new(lhs: Expr, rhs: Expr) -> Self {
        Self { lhs, rhs }
    }

    pub fn map(&self, mut f: impl FnMut(&Expr) -> Expr) -> Self {
        Self {
            lhs: f(&self.lhs),
            rhs: f(&self.rhs),
        }
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Eq({}, {})", self.lhs, self.rhs)
    }
}

impl Expr {
    pub fn int(value: i64) -> Self {
        Expr::Number(Rational::integer(value))
    }

    pub fn zero() -> Self {
        Expr::Number(Rational::zero())
    }

    pub fn one() -> Self {
        Expr::Number(Rational::one())
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Expr::Symbol(name.into())
    }

    pub fn neg(expr: Expr) -> Self {
        Expr::Product(vec![Expr::int(-1), expr])
    }

    pub fn recip(expr: Expr) -> Self {
        Expr::Power(Box::new(expr), Box::new(Expr::int(-1)))
    }

    pub fn derivative(kind: DerivativeKind, expr: Expr, wrt: Vec<Expr>) -> Self {
        Expr::Derivative {
            kind,
            expr: Box::new(expr),
            wrt,
        }
    }

    pub fn as_number(&self) -> Option<Rational> {
        match self {
            Expr::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::Number(n) if n.is_zero())
    }

    /// Name of a scalar or fully concrete indexed symbol (`rhou_0` -> `rhou0`).
    pub fn concrete_name(&self) -> Option<String> {
        match self {
            Expr::Symbol(name) => Some(name.clone()),
            Expr::Indexed(base, indices) => {
                let mut name = base.clone();
                for index in indices {
                    name.push_str(&index.as_fixed()?.to_string());
                }
                Some(name)
            }
            _ => None,
        }
    }

    /// Rebuilds this node with `f` applied to each direct child.
    pub fn map_children(&self, mut f: impl FnMut(&Expr) -> Expr) -> Expr {
        match self {
            Expr::Number(_)
            | Expr::Symbol(_)
            | Expr::Indexed(..)
            | Expr::Delta(..)
            | Expr::GridRef(_) => self.clone(),
            Expr::Sum(terms) => Expr::Sum(terms.iter().map(&mut f).collect()),
            Expr::Product(factors) => Expr::Product(factors.iter().map(&mut f).collect()),
            Expr::Power(base, exp) => Expr::Power(Box::new(f(base)), Box::new(f(exp))),
            Expr::Derivative { kind, expr, wrt } => Expr::Derivative {
                kind: *kind,
                expr: Box::new(f(expr)),
                wrt: wrt.iter().map(&mut f).collect(),
            },
            Expr::Call(name, args) => Expr::Call(name.clone(), args.iter().map(&mut f).collect()),
        }
    }

    /// Fallible variant of [`Expr::map_children`].
    pub fn try_map_children<E>(
        &self,
        mut f: impl FnMut(&Expr) -> Result<Expr, E>,
    ) -> Result<Expr, E> {
        Ok(match self {
            Expr::Number(_)
            | Expr::Symbol(_)
            | Expr::Indexed(..)
            | Expr::Delta(..)
            | Expr::GridRef(_) => self.clone(),
            Expr::Sum(terms) => Expr::Sum(terms.iter().map(&mut f).collect::<Result<_, _>>()?),
            Expr::Product(factors) => {
                Expr::Product(factors.iter().map(&mut f).collect::<Result<_, _>>()?)
            }
            Expr::Power(base, exp) => Expr::Power(Box::new(f(base)?), Box::new(f(exp)?)),
            Expr::Derivative { kind, expr, wrt } => Expr::Derivative {
                kind: *kind,
                expr: Box::new(f(expr)?),
                wrt: wrt.iter().map(&mut f).collect::<Result<_, _>>()?,
            },
            Expr::Call(name, args) => {
                Expr::Call(name.clone(), args.iter().map(&mut f).collect::<Result<_, _>>()?)
            }
        })
    }

    /// Visits every node, parents before children.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Sum(items) | Expr::Product(items) | Expr::Call(_, items) => {
                for item in items {
                    item.walk(visit);
                }
            }
            Expr::Power(base, exp) => {
                base.walk(visit);
                exp.walk(visit);
            }
            Expr::Derivative { expr, wrt, .. } => {
                expr.walk(visit);
                for w in wrt {
                    w.walk(visit);
                }
            }
            _ => {}
        }
    }

    pub fn contains(&self, mut pred: impl FnMut(&Expr) -> bool) -> bool {
        let mut found = false;
        self.walk(&mut |e| found |= pred(e));
        found
    }

    /// Every distinct index appearing anywhere, in first-appearance order.
    pub fn all_indices(&self) -> Vec<Index> {
        let mut out: Vec<Index> = Vec::new();
        self.walk(&mut |e| {
            let found: Vec<&Index> = match e {
                Expr::Indexed(_, indices) => indices.iter().collect(),
                Expr::Delta(a, b) => vec![a, b],
                _ => Vec::new(),
            };
            for idx in found {
                if !out.contains(idx) {
                    out.push(idx.clone());
                }
            }
        });
        out
    }

    /// Replaces symbolic indices according to `map`; unmapped indices stay.
    pub fn rename_indices(&self, map: &BTreeMap<String, Index>) -> Expr {
        let rename = |idx: &Index| match idx {
            Index::Symbolic(name) => map.get(name).cloned().unwrap_or_else(|| idx.clone()),
            Index::Fixed(_) => idx.clone(),
        };
        match self {
            Expr::Indexed(base, indices) => {
                Expr::Indexed(base.clone(), indices.iter().map(rename).collect())
            }
            Expr::Delta(a, b) => Expr::Delta(rename(a), rename(b)),
            _ => self.map_children(|child| child.rename_indices(map)),
        }
    }

    /// Algebraic clean-up: flattens nested sums and products, folds numeric
    /// factors and terms, resolves concrete Kronecker deltas, and drops
    /// neutral elements. Term order is preserved.
    pub fn simplify(&self) -> Expr {
        match self {
            Expr::Delta(Index::Fixed(a), Index::Fixed(b)) => {
                if a == b {
                    Expr::one()
                } else {
                    Expr::zero()
                }
            }
            Expr::Sum(terms) => {
                let mut constant = Rational::zero();
                let mut out = Vec::new();
                for term in terms.iter().map(Expr::simplify) {
                    match term {
                        Expr::Number(n) => match constant.checked_add(&n) {
                            Some(folded) => constant = folded,
                            None => out.push(Expr::Number(n)),
                        },
                        Expr::Sum(inner) => out.extend(inner),
                        other => out.push(other),
                    }
                }
                if !constant.is_zero() {
                    out.push(Expr::Number(constant));
                }
                match out.len() {
                    0 => Expr::zero(),
                    1 => out.remove(0),
                    _ => Expr::Sum(out),
                }
            }
            Expr::Product(factors) => {
                let mut coefficient = Rational::one();
                let mut out = Vec::new();
                let fold = |factor: Expr, coefficient: &mut Rational, out: &mut Vec<Expr>| match factor {
                    Expr::Number(n) => match coefficient.checked_mul(&n) {
                        Some(folded) => *coefficient = folded,
                        None => out.push(Expr::Number(n)),
                    },
                    other => out.push(other),
                };
                for factor in factors.iter().map(Expr::simplify) {
                    match factor {
                        Expr::Product(inner) => {
                            for f in inner {
                                fold(f, &mut coefficient, &mut out);
                            }
                        }
                        other => fold(other, &mut coefficient, &mut out),
                    }
                }
                if coefficient.is_zero() {
                    return Expr::zero();
                }
                if out.is_empty() {
                    return Expr::Number(coefficient);
                }
                if !coefficient.is_one() {
                    out.insert(0, Expr::Number(coefficient));
                }
                if out.len() == 1 {
                    out.remove(0)
                } else {
                    Expr::Product(out)
                }
            }
            Expr::Power(base, exp) => {
                let base = base.simplify();
                let exp = exp.simplify();
                match (&base, &exp) {
                    (_, Expr::Number(e)) if e.is_zero() => Expr::one(),
                    (_, Expr::Number(e)) if e.is_one() => base,
                    (Expr::Number(b), Expr::Number(e)) if e.is_integer() => {
                        let folded = i32::try_from(e.numer())
                            .ok()
                            .and_then(|e| b.powi(e));
                        match folded {
                            Some(value) => Expr::Number(value),
                            None => Expr::Power(Box::new(base), Box::new(exp)),
                        }
                    }
                    _ => Expr::Power(Box::new(base), Box::new(exp)),
                }
            }
            Expr::Derivative { kind, expr, wrt } => {
                let expr = expr.simplify();
                if matches!(expr, Expr::Number(_)) {
                    return Expr::zero();
                }
                Expr::Derivative {
                    kind: *kind,
                    expr: Box::new(expr),
                    wrt: wrt.iter().map(Expr::simplify).collect(),
                }
            }
            _ => self.map_children(Expr::simplify),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Sum(_) => 1,
            Expr::Product(_) => 2,
            Expr::Number(n) if !n.is_integer() || n.is_negative() => 2,
            Expr::Power(..) => 3,
            _ => 4,
        }
    }

    fn fmt_wrapped(&self, f: &mut fmt::Formatter<'_>, min_precedence: u8) -> fmt::Result {
        if self.precedence() < min_precedence {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }

    /// Splits a product term into a sign and its magnitude for display.
    fn negated_term(&self) -> Option<Expr> {
        match self {
            Expr::Number(n) if n.is_negative() => Some(Expr::Number(-*n)),
            Expr::Product(factors) => match factors.first() {
                Some(Expr::Number(n)) if n.is_negative() => {
                    let mut rest = factors.clone();
                    let magnitude = n.abs();
                    if magnitude.is_one() {
                        rest.remove(0);
                    } else {
                        rest[0] = Expr::Number(magnitude);
                    }
                    Some(if rest.len() == 1 {
                        rest.remove(0)
                    } else {
                        Expr::Product(rest)
                    })
                }
                _ => None,
            },
            _ => None,
        }
    }
}

fn reciprocal_base(expr: &Expr) -> Option<Expr> {
    match expr {
        Expr::Power(base, exp) => match exp.as_number() {
            Some(e) if e.is_negative() => {
                let positive = -e;
                Some(if positive.is_one() {
                    (**base).clone()
                } else {
                    Expr::Power(base.clone(), Box::new(Expr::Number(positive)))
                })
            }
            _ => None,
        },
        _ => None,
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Expr]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{arg}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Symbol(name) => write!(f, "{name}"),
            Expr::Indexed(base, indices) => {
                write!(f, "{base}")?;
                for index in indices {
                    write!(f, "_{index}")?;
                }
                Ok(())
            }
            Expr::Sum(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    match (i, term.negated_term()) {
                        (0, Some(magnitude)) => {
                            write!(f, "-")?;
                            magnitude.fmt_wrapped(f, 2)?;
                        }
                        (0, None) => write!(f, "{term}")?,
                        (_, Some(magnitude)) => {
                            write!(f, " - ")?;
                            magnitude.fmt_wrapped(f, 2)?;
                        }
                        (_, None) => write!(f, " + {term}")?,
                    }
                }
                Ok(())
            }
            Expr::Product(factors) => {
                if let Some(magnitude) = self.negated_term() {
                    write!(f, "-")?;
                    return magnitude.fmt_wrapped(f, 2);
                }
                let mut numerator = Vec::new();
                let mut denominator = Vec::new();
                for factor in factors {
                    match reciprocal_base(factor) {
                        Some(base) => denominator.push(base),
                        None => numerator.push(factor.clone()),
                    }
                }
                if numerator.is_empty() {
                    write!(f, "1")?;
                }
                for (i, factor) in numerator.iter().enumerate() {
                    if i > 0 {
                        write!(f, "*")?;
                    }
                    factor.fmt_wrapped(f, 3)?;
                }
                for factor in &denominator {
                    write!(f, "/")?;
                    factor.fmt_wrapped(f, 4)?;
                }
                Ok(())
            }
            Expr::Power(base, exp) => {
                if let Some(inverse) = reciprocal_base(self) {
                    write!(f, "1/")?;
                    return inverse.fmt_wrapped(f, 4);
                }
                base.fmt_wrapped(f, 4)?;
                write!(f, "**")?;
                exp.fmt_wrapped(f, 4)
            }
            Expr::Derivative { kind, expr, wrt } => {
                write!(f, "{}({expr}", kind.keyword())?;
                for w in wrt {
                    write!(f, ", {w}")?;
                }
                write!(f, ")")
            }
            Expr::Delta(a, b) => write!(f, "KroneckerDelta(_{a}, _{b})"),
            Expr::Call(name, args) => {
                write!(f, "{name}(")?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Expr::GridRef(grid) => {
                write!(f, "{}[", grid.array)?;
                for (i, offset) in grid.offsets.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{offset}")?;
                }
                write!(f, "]")
            }
        }
    }
}
