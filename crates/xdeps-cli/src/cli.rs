//! CLI argument definitions for xdeps.
//!
//! Uses `clap` derive macros to define the command surface. Each command
//! corresponds to a handler in the [`super::commands`] module.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use xdeps_ops::ops_resolve::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "xdeps",
    version,
    about = "Resolve the transitive dependencies of a package or source tree",
    long_about = "xdeps builds the full dependency graph of a source tree or package across \
                  ecosystems: PyPI, npm and crates.io packages, plus the Debian/Ubuntu system \
                  packages that provide the native libraries they link against."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to ~/.xdeps/config.toml)
    #[arg(long, global = true, env = "XDEPS_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve a source tree or package and write its dependency graph
    Resolve {
        /// A source tree, or a package as SOURCE:NAME[@CONSTRAINT] (default: current directory)
        #[arg(value_name = "PATH_OR_DEP")]
        target: Option<String>,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Json)]
        format: Format,
        /// Write the graph to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output_file: Option<PathBuf>,
        /// Overwrite the output file if it exists
        #[arg(long)]
        force: bool,
        /// Maximum number of concurrent resolver calls
        #[arg(short, long)]
        jobs: Option<usize>,
        /// Stop expanding this many levels below the roots
        #[arg(short, long)]
        depth_limit: Option<usize>,
        /// Time budget for a single resolver call, in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
        /// Print how a package (NAME or SOURCE:NAME) is reached instead of the graph
        #[arg(long, value_name = "NAME")]
        why: Option<String>,
        /// Reuse and update resolver answers stored in this file
        #[arg(long, value_name = "FILE")]
        database: Option<PathBuf>,
    },

    /// List resolvers and whether each can handle a target
    List {
        /// A source tree, or a package as SOURCE:NAME[@CONSTRAINT]
        #[arg(value_name = "PATH_OR_DEP")]
        target: Option<String>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Dot,
    Tree,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => OutputFormat::Json,
            Format::Dot => OutputFormat::Dot,
            Format::Tree => OutputFormat::Tree,
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_resolve_flags() {
        let cli = Cli::try_parse_from([
            "xdeps", "resolve", "pip:cvedb", "-f", "tree", "-o", "out.txt", "--force", "-j", "2",
            "-d", "3", "--timeout", "10", "--why", "pip:urllib3",
            "--database", "deps.db.json",
        ])
        .unwrap();
        match cli.command {
            Command::Resolve {
                target,
                format,
                output_file,
                force,
                jobs,
                depth_limit,
                timeout,
                why,
                database,
            } => {
                assert_eq!(target.as_deref(), Some("pip:cvedb"));
                assert_eq!(format, Format::Tree);
                assert_eq!(output_file, Some(PathBuf::from("out.txt")));
                assert!(force);
                assert_eq!(jobs, Some(2));
                assert_eq!(depth_limit, Some(3));
                assert_eq!(timeout, Some(10));
                assert_eq!(why.as_deref(), Some("pip:urllib3"));
                assert_eq!(database, Some(PathBuf::from("deps.db.json")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
