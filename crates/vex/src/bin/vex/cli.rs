//! vex cli interface

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
    /// This is equivalent to running { cd <directory>; vex ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve one variable to its fully expanded value
    ///
    /// Loads the given root files, runs the collector, then expands the
    /// named variable. A trailing '?' answers yes/no instead.
    #[command(alias = "get")]
    Lookup(LookupCommand),

    /// List all variables that currently resolve
    Keys(KeysCommand),

    /// Print debug information for development
    Dev(DevCommand),
}

#[derive(Parser, Debug)]
pub struct LookupCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// Variable name to expand
    pub name: String,
}

#[derive(Parser, Debug)]
pub struct KeysCommand {
    #[clap(flatten)]
    pub input: InputArgs,
}

#[derive(Parser, Debug)]
pub struct InputArgs {
    /// Load a root file (repeatable; collected files follow automatically)
    #[clap(short = 'f', long = "input-file")]
    pub files: Vec<PathBuf>,

    /// Define a variable directly, as key=value
    ///
    /// Applied after the root files load and before collection, so
    /// collected paths may reference defined values.
    #[clap(short = 'D', long = "define")]
    pub defines: Vec<String>,

    /// Tolerate undefined references, expanding them to nothing
    #[clap(short = 'l', long = "lax")]
    pub lax: bool,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => f.write_str("text"),
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct DevCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[command(subcommand)]
    pub command: DevSubCommand,
}

#[derive(Subcommand, Debug)]
pub enum DevSubCommand {
    /// Dump the store after loading and collecting
    Store,
    /// List names that lax expansion substituted with nothing
    Blanks,
}
