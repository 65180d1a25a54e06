//! Command dispatch and handler modules.

mod list;
mod resolve;

use miette::Result;
use xdeps_core::config::GlobalConfig;

use crate::cli::{Cli, Command};

/// Route a parsed CLI invocation to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<()> {
    let config = match cli.config {
        Some(ref path) => GlobalConfig::load_from(path)?,
        None => GlobalConfig::load()?,
    };
    tracing::debug!("Using configuration {config:?}");

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
            resolve::exec(
                target,
                format,
                output_file,
                force,
                jobs,
                depth_limit,
                timeout,
                why,
                database,
                &config,
            )
            .await
        }
        Command::List { target } => list::exec(target.as_deref(), &config, cli.verbose),
    }
}
