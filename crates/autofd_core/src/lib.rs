//! The `autofd_core` crate turns PDEs written in Einstein notation into fully
//! expanded finite-difference update expressions for structured-grid solvers.
//!
//! Key components:
//! - **Equation store**: `problem` (labeled-section definitions), `parser` and
//!   `expr` (structured expression trees with exact `rational` numbers).
//! - **Expansion**: `expansion` (free and repeated indices) and `substitution`
//!   (dependency-ordered inlining of substitutions and formulas).
//! - **Discretisation**: central differences and explicit Runge-Kutta stages
//!   over the work arrays of a `grid`.
//! - **Conditions**: periodic `bcs` and grid-based `ics`.
//! - **Output**: the serde `ir` bundle, handed to a `backend` process.
pub mod backend;
pub mod bcs;
pub mod config;
pub mod context;
pub mod discretisation;
pub mod error;
pub mod expansion;
pub mod expr;
pub mod grid;
pub mod ics;
pub mod ir;
pub mod parser;
pub mod pipeline;
pub mod problem;
pub mod rational;
pub mod snapshot;
pub mod substitution;

pub use error::{Error, Result};
pub use pipeline::{Generation, Generator};
pub use problem::{Problem, ProblemDefinition};
