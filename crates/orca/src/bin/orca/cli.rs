//! orca cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; orca ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate templates and report all issues
    ///
    /// Reads YAML from stdin unless any other source is provided (via --input-*)
    Validate(ValidateCommand),

    /// Link templates and print the deployment plan
    ///
    /// Reads YAML from stdin unless any other source is provided (via --input-*)
    Plan(PlanCommand),

    /// Print debug information for development
    Dev(DevCommand),
}

#[derive(Parser, Debug)]
pub struct ValidateCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[clap(flatten)]
    pub values: InputValues,

    /// Treat warnings as errors
    #[clap(long = "strict")]
    pub strict: bool,
}

#[derive(Parser, Debug)]
pub struct PlanCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[clap(flatten)]
    pub values: InputValues,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// Print the plan even when errors were found
    #[clap(long = "provisional")]
    pub provisional: bool,

    /// Number instances `<node>_1`, `<node>_2`, ... instead of random ids
    #[clap(long = "sequential-ids")]
    pub sequential_ids: bool,
}

#[derive(Parser, Debug)]
pub struct InputArgs {
    /// Load files from work directory
    #[clap(short = 'w', long = "input-workdir")]
    pub workdir: bool,

    /// Load a file and its imports
    #[clap(short = 'f', long = "input-file")]
    pub files: Vec<PathBuf>,

    /// Load files from given directory
    #[clap(short = 'd', long = "input-dir")]
    pub directories: Vec<PathBuf>,
}

/// Values for topology inputs
#[derive(Parser, Debug)]
pub struct InputValues {
    /// Load input values from a YAML mapping
    #[clap(short = 'i', long = "inputs")]
    pub files: Vec<PathBuf>,

    /// Set one input value, parsed as YAML
    ///
    /// e.g. --input port=8080
    #[clap(long = "input", value_name = "KEY=VALUE")]
    pub pairs: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct DevCommand {
    #[command(subcommand)]
    pub command: DevSubCommand,
}

#[derive(Subcommand, Debug)]
pub enum DevSubCommand {
    Documents,
    Schemas,
    Registry,
    Topology,
}
