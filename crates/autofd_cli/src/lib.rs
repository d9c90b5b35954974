//! autofd command-line bridge
//!
//! Case files, logging setup and the drivers behind the `autofd` binary.

pub mod case;
pub mod sweep;

use anyhow::{Context, Result};
use autofd_core::backend::{Backend, CommandBackend, CommandSpec, JsonBackend};
use autofd_core::expansion::ExpandedEquation;
use autofd_core::substitution::SubstitutionResolver;
use tracing_subscriber::{fmt, EnvFilter};

pub use case::{Case, Cfl, DefinitionSource};

/// Initialize logging with a default filter.
///
/// Use `RUST_LOG` environment variable to override the default filter.
/// Default is `info` for autofd crates and `warn` for others.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,autofd_core=info,autofd_cli=info"));

    fmt().with_env_filter(filter).with_target(false).init();
}

/// Backend for an optional command line; without one the IR JSON is written
/// as-is.
pub fn backend_for(command: Option<&str>) -> Result<Box<dyn Backend>> {
    match command {
        None => Ok(Box::new(JsonBackend)),
        Some(line) => {
            let spec = CommandSpec::parse(line).context("empty backend command")?;
            Ok(Box::new(CommandBackend::new(spec)))
        }
    }
}

/// Equations of `case` after index expansion and inlining, without
/// discretising them.
pub fn expand_case(case: &Case) -> Result<Vec<ExpandedEquation>> {
    let problem = case.problem()?;
    let resolver = SubstitutionResolver::new(&problem)?;
    Ok(resolver.expand_and_resolve(&problem.equations)?)
}
