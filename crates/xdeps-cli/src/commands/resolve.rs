//! Handler for `xdeps resolve`.

use std::path::PathBuf;

use miette::Result;
use xdeps_core::config::GlobalConfig;
use xdeps_ops::ops_resolve::{self, ResolveRequest};

use crate::cli::Format;

#[allow(clippy::too_many_arguments)]
pub async fn exec(
    target: Option<String>,
    format: Format,
    output_file: Option<PathBuf>,
    force: bool,
    jobs: Option<usize>,
    depth_limit: Option<usize>,
    timeout: Option<u64>,
    why: Option<String>,
    database: Option<PathBuf>,
    config: &GlobalConfig,
) -> Result<()> {
    let req = ResolveRequest {
        target,
        format: format.into(),
        output_file,
        force,
        jobs,
        depth_limit,
        timeout_secs: timeout,
        why,
        database,
    };

    ops_resolve::resolve(&req, config).await
}
