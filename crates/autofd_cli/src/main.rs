//!
//! Generate finite-difference solver IR from Einstein-notation PDEs.
//!
//! Usage: `autofd <generate|expand|sweep> <case.json> [options]`

use anyhow::Result;
use autofd_cli::sweep::{generate, run_sweep};
use autofd_cli::{backend_for, expand_case, init_logging, Case};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "autofd")]
#[command(about = "Expand and discretise PDEs into a backend-agnostic IR")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline and write the IR
    Generate {
        /// Path to the case file
        case: PathBuf,

        /// Output directory for the IR and backend artifacts
        #[arg(long = "out-dir", default_value = "build")]
        out_dir: PathBuf,

        /// Backend command line; receives the IR path as its last argument
        #[arg(long)]
        backend: Option<String>,
    },
    /// Print the expanded equations without discretising them
    Expand {
        /// Path to the case file
        case: PathBuf,
    },
    /// Generate one case per spatial order and grid refinement
    Sweep {
        /// Path to the base case file
        case: PathBuf,

        /// Spatial orders to generate
        #[arg(long, value_delimiter = ',', required = true)]
        orders: Vec<usize>,

        /// Number of grid levels; level `i` has `2^i` times the base points
        #[arg(long, default_value_t = 1)]
        refinements: usize,

        #[arg(long = "out-dir", default_value = "build")]
        out_dir: PathBuf,

        #[arg(long)]
        backend: Option<String>,
    },
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Generate { case, out_dir, backend } => {
            let case = Case::load(&case)?;
            let backend = backend_for(backend.as_deref())?;
            let path = generate(&case, backend.as_ref(), &out_dir)?;
            info!("Wrote {}", path.display());
        }
        Command::Expand { case } => {
            let case = Case::load(&case)?;
            for expanded in expand_case(&case)? {
                println!("{}", expanded.equation);
            }
        }
        Command::Sweep {
            case,
            orders,
            refinements,
            out_dir,
            backend,
        } => {
            let case = Case::load(&case)?;
            let backend = backend_for(backend.as_deref())?;
            let runs = run_sweep(&case, &orders, refinements, backend.as_ref(), &out_dir)?;
            for run in &runs {
                println!("{}\torder {}\tpoints {:?}\t{}", run.name, run.order, run.points, run.artifact.display());
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    init_logging();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
