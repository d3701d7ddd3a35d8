use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use tajaa_core::runner::CommandSpec;

#[derive(Parser, Debug)]
#[command(name = "tajaa", version, about = "Run and supervise external tool commands")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Load configuration from this file instead of the default locations.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct OutputArgs {
    /// Do not echo output lines while the command runs.
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// Print results as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Command line, already fully substituted.
    pub command: String,

    /// Give up after this many seconds (fractions allowed).
    #[arg(long)]
    pub timeout: Option<f64>,

    /// Decode the captured output with this tool's decoder.
    #[arg(long)]
    pub tool: Option<String>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ChainArgs {
    /// Entries as NAME=COMMAND, run in order.
    #[arg(required = true, value_parser = parse_named_command)]
    pub commands: Vec<CommandSpec>,

    /// Keep going after a failed step.
    #[arg(long)]
    pub keep_going: bool,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ParallelArgs {
    /// Entries as NAME=COMMAND.
    #[arg(required = true, value_parser = parse_named_command)]
    pub commands: Vec<CommandSpec>,

    /// Commands in flight at once (defaults to `parallel.max_concurrent`).
    #[arg(long)]
    pub max: Option<usize>,

    /// Print the results as JSON instead of a summary table.
    #[arg(long)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct BatchArgs {
    /// Entries as NAME=COMMAND, submitted as background tasks.
    #[arg(required = true, value_parser = parse_named_command)]
    pub commands: Vec<CommandSpec>,

    /// Concurrency ceiling (defaults to `supervisor.max_concurrent`).
    #[arg(long)]
    pub max: Option<usize>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one command in the foreground.
    Run(RunArgs),
    /// Run commands one after another, stopping at the first failure.
    Chain(ChainArgs),
    /// Run commands concurrently and report in input order.
    Parallel(ParallelArgs),
    /// Submit commands to the background supervisor and wait for all of them.
    Batch(BatchArgs),
}

/// Parse `NAME=COMMAND`. Only the first `=` separates; the command may
/// contain more.
pub fn parse_named_command(raw: &str) -> Result<CommandSpec, String> {
    let (name, command) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=COMMAND, got `{raw}`"))?;
    let name = name.trim();
    let command = command.trim();
    if name.is_empty() {
        return Err(format!("missing name in `{raw}`"));
    }
    if command.is_empty() {
        return Err(format!("missing command for `{name}`"));
    }
    Ok(CommandSpec::new(name, command))
}
