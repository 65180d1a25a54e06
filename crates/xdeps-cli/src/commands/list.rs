//! Handler for `xdeps list`.

use miette::Result;
use xdeps_core::config::GlobalConfig;
use xdeps_ops::ops_list;

pub fn exec(target: Option<&str>, config: &GlobalConfig, verbose: bool) -> Result<()> {
    let registry = xdeps_backends::builtin_registry(config)?;
    ops_list::list(target, &registry, verbose)
}
