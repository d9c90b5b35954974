//! Equation store.
//!
//! [`ProblemDefinition`] is the raw, order-preserving record of a definition
//! source; [`Problem`] is the parsed view the pipeline works on. Index and
//! cycle validation are left to the stages that detect them.

use crate::error::{Error, Result};
use crate::expr::{Equation, Expr};
use crate::parser::parse_equation;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Section labels of the definition text format, in canonical order.
pub const SECTION_EQUATIONS: &str = "Equations";
pub const SECTION_SUBSTITUTIONS: &str = "Substitutions";
pub const SECTION_DIMENSION: &str = "Dimension";
pub const SECTION_CONSTANTS: &str = "Constants";
pub const SECTION_COORDINATE: &str = "Coordinate symbol";
pub const SECTION_METRICS: &str = "Metrics";
pub const SECTION_FORMULAS: &str = "Formulas";

/// Raw definition source, exactly as written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProblemDefinition {
    #[serde(default)]
    pub equations: Vec<String>,
    #[serde(default)]
    pub substitutions: Vec<String>,
    pub ndim: usize,
    #[serde(default)]
    pub constants: Vec<String>,
    pub coordinate_symbol: String,
    #[serde(default)]
    pub metrics: Vec<bool>,
    #[serde(default)]
    pub formulas: Vec<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Equations,
    Substitutions,
    Dimension,
    Constants,
    Coordinate,
    Metrics,
    Formulas,
}

fn section_for(label: &str) -> Option<Section> {
    let label = label.trim();
    let matches = |name: &str| label.eq_ignore_ascii_case(name);
    if matches(SECTION_EQUATIONS) {
        Some(Section::Equations)
    } else if matches(SECTION_SUBSTITUTIONS) {
        Some(Section::Substitutions)
    } else if matches(SECTION_DIMENSION) || matches("ndim") {
        Some(Section::Dimension)
    } else if matches(SECTION_CONSTANTS) {
        Some(Section::Constants)
    } else if matches(SECTION_COORDINATE) {
        Some(Section::Coordinate)
    } else if matches(SECTION_METRICS) {
        Some(Section::Metrics)
    } else if matches(SECTION_FORMULAS) {
        Some(Section::Formulas)
    } else {
        None
    }
}

fn split_names(line: &str) -> impl Iterator<Item = String> + '_ {
    line.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_flag(text: &str) -> Option<bool> {
    match text {
        "True" | "true" => Some(true),
        "False" | "false" => Some(false),
        _ => None,
    }
}

impl ProblemDefinition {
    /// Reads the labeled-section text format. Equation lines are kept
    /// byte-identical (only the line terminator is removed).
    pub fn parse(text: &str) -> Result<Self> {
        let mut definition = ProblemDefinition::default();
        let mut section: Option<Section> = None;
        let mut ndim: Option<usize> = None;

        for (line_no, raw) in text.lines().enumerate() {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if let Some(label) = trimmed.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = Some(section_for(label).ok_or_else(|| {
                    Error::invalid_parameter(
                        "definition",
                        format!("line {}: unknown section `[{label}]`", line_no + 1),
                    )
                })?);
                continue;
            }
            match section {
                Some(Section::Equations) => definition.equations.push(raw.to_string()),
                Some(Section::Substitutions) => definition.substitutions.push(raw.to_string()),
                Some(Section::Formulas) => definition.formulas.push(raw.to_string()),
                Some(Section::Constants) => definition.constants.extend(split_names(trimmed)),
                Some(Section::Coordinate) => definition.coordinate_symbol = trimmed.to_string(),
                Some(Section::Dimension) => {
                    let value = trimmed.parse().map_err(|_| {
                        Error::invalid_parameter(
                            "ndim",
                            format!("line {}: `{trimmed}` is not an integer", line_no + 1),
                        )
                    })?;
                    ndim = Some(value);
                }
                Some(Section::Metrics) => {
                    for flag in split_names(trimmed) {
                        let value = parse_flag(&flag).ok_or_else(|| {
                            Error::invalid_parameter(
                                "metrics",
                                format!("line {}: `{flag}` is not a boolean", line_no + 1),
                            )
                        })?;
                        definition.metrics.push(value);
                    }
                }
                None => {
                    return Err(Error::invalid_parameter(
                        "definition",
                        format!("line {}: content before the first section", line_no + 1),
                    ))
                }
            }
        }

        definition.ndim = ndim.ok_or_else(|| {
            Error::invalid_parameter("ndim", format!("missing `[{SECTION_DIMENSION}]` section"))
        })?;
        if definition.coordinate_symbol.is_empty() {
            return Err(Error::invalid_parameter(
                "coordinate_symbol",
                format!("missing `[{SECTION_COORDINATE}]` section"),
            ));
        }
        Ok(definition)
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "read problem definition");
        Self::parse(&text)
    }

    /// Writes the labeled-section text format; `parse(to_text())` round-trips.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let mut section = |label: &str, lines: &[String]| {
            out.push_str(&format!("[{label}]\n"));
            for line in lines {
                out.push_str(line);
                out.push('\n');
            }
        };
        section(SECTION_EQUATIONS, &self.equations);
        section(SECTION_SUBSTITUTIONS, &self.substitutions);
        section(SECTION_DIMENSION, &[self.ndim.to_string()]);
        section(SECTION_CONSTANTS, &[self.constants.join(", ")]);
        section(SECTION_COORDINATE, &[self.coordinate_symbol.clone()]);
        let metrics: Vec<&str> = self
            .metrics
            .iter()
            .map(|m| if *m { "True" } else { "False" })
            .collect();
        section(SECTION_METRICS, &[metrics.join(", ")]);
        section(SECTION_FORMULAS, &self.formulas);
        out
    }
}

/// Parsed and dimension-checked problem.
#[derive(Debug, Clone)]
pub struct Problem {
    ndim: usize,
    pub equations: Vec<Equation>,
    pub substitutions: Vec<Equation>,
    pub formulas: Vec<Equation>,
    pub constants: Vec<String>,
    pub coordinate_symbol: String,
    pub metrics: Vec<bool>,
    definition: ProblemDefinition,
}

fn parse_all(sources: &[String]) -> Result<Vec<Equation>> {
    sources.iter().map(|s| parse_equation(s)).collect()
}

impl Problem {
    pub fn from_definition(definition: ProblemDefinition) -> Result<Self> {
        if definition.ndim == 0 {
            return Err(Error::DimensionMismatch(
                "problem dimension must be at least 1".to_string(),
            ));
        }
        if definition.metrics.len() != definition.ndim {
            return Err(Error::DimensionMismatch(format!(
                "{} metric flags given for a {}-dimensional problem",
                definition.metrics.len(),
                definition.ndim
            )));
        }
        if definition.coordinate_symbol.trim().is_empty() {
            return Err(Error::malformed(
                definition.coordinate_symbol.clone(),
                "coordinate symbol is empty",
            ));
        }

        let problem = Self {
            ndim: definition.ndim,
            equations: parse_all(&definition.equations)?,
            substitutions: parse_all(&definition.substitutions)?,
            formulas: parse_all(&definition.formulas)?,
            constants: definition.constants.clone(),
            coordinate_symbol: definition.coordinate_symbol.trim().to_string(),
            metrics: definition.metrics.clone(),
            definition,
        };
        debug!(
            ndim = problem.ndim,
            equations = problem.equations.len(),
            substitutions = problem.substitutions.len(),
            formulas = problem.formulas.len(),
            "parsed problem"
        );
        Ok(problem)
    }

    /// Convenience constructor mirroring the definition sections.
    pub fn new(
        equations: &[&str],
        substitutions: &[&str],
        ndim: usize,
        constants: &[&str],
        coordinate_symbol: &str,
        metrics: &[bool],
        formulas: &[&str],
    ) -> Result<Self> {
        let owned = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
        Self::from_definition(ProblemDefinition {
            equations: owned(equations),
            substitutions: owned(substitutions),
            ndim,
            constants: owned(constants),
            coordinate_symbol: coordinate_symbol.to_string(),
            metrics: metrics.to_vec(),
            formulas: owned(formulas),
        })
    }

    pub fn ndim(&self) -> usize {
        self.ndim
    }

    pub fn definition(&self) -> &ProblemDefinition {
        &self.definition
    }

    pub fn is_coordinate(&self, expr: &Expr) -> bool {
        matches!(expr, Expr::Indexed(base, indices) if *base == self.coordinate_symbol && indices.len() == 1)
    }
}
