//! Hand-off of an IR bundle to an external code emitter process.
//!
//! The emitter is any command that accepts the path of an IR JSON file as its
//! last argument. The IR is staged under a temporary name and only promoted to
//! `<name>.ir.json` once the command succeeds, so a failed run leaves nothing
//! behind.

use crate::error::{Error, Result};
use crate::ir::IrBundle;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Splits a whitespace-separated command line (`"emit --target c"`).
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(Self {
            program: program.to_string(),
            args: parts.map(str::to_string).collect(),
            cwd: None,
        })
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Runs commands as child processes of this one.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args);
        if let Some(dir) = &spec.cwd {
            command.current_dir(dir);
        }
        debug!(program = %spec.program, args = ?spec.args, "running backend command");
        let output = command.output()?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Something that turns an IR bundle into artifacts under `out_dir`.
pub trait Backend {
    fn generate(&self, ir: &IrBundle<'_>, out_dir: &Path) -> Result<PathBuf>;
}

/// Writes the IR JSON without invoking anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBackend;

impl Backend for JsonBackend {
    fn generate(&self, ir: &IrBundle<'_>, out_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(out_dir)?;
        let path = out_dir.join(format!("{}.ir.json", ir.name));
        fs::write(&path, ir.to_json()?)?;
        info!(path = %path.display(), "wrote IR");
        Ok(path)
    }
}

/// Stages the IR and passes its path to an external command.
#[derive(Debug, Clone)]
pub struct CommandBackend<R = SystemRunner> {
    command: CommandSpec,
    runner: R,
}

impl CommandBackend<SystemRunner> {
    pub fn new(command: CommandSpec) -> Self {
        Self::with_runner(command, SystemRunner)
    }
}

impl<R: CommandRunner> CommandBackend<R> {
    pub fn with_runner(command: CommandSpec, runner: R) -> Self {
        Self { command, runner }
    }
}

impl<R: CommandRunner> Backend for CommandBackend<R> {
    fn generate(&self, ir: &IrBundle<'_>, out_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(out_dir)?;
        let staged = out_dir.join(format!("{}.ir.json.tmp", ir.name));
        let target = out_dir.join(format!("{}.ir.json", ir.name));
        fs::write(&staged, ir.to_json()?)?;

        let spec = self.command.clone().arg(staged.to_string_lossy());
        let output = match self.runner.run(&spec) {
            Ok(output) => output,
            Err(error) => {
                discard(&staged);
                return Err(error);
            }
        };
        if !output.success() {
            discard(&staged);
            return Err(Error::BackendGenerationFailure {
                program: self.command.program.clone(),
                status: output.code,
                stderr: output.stderr,
            });
        }
        if !output.stdout.trim().is_empty() {
            debug!(stdout = %output.stdout.trim_end(), "backend output");
        }

        fs::rename(&staged, &target)?;
        info!(program = %self.command.program, path = %target.display(), "backend finished");
        Ok(target)
    }
}

fn discard(path: &Path) {
    if let Err(error) = fs::remove_file(path) {
        warn!(path = %path.display(), %error, "could not remove staged IR");
    }
}
