//! Shared-library dependencies of the ELF binaries in a source tree.
//!
//! Each ELF file is inspected with `ldd`; every library it loads from outside
//! the tree becomes a file dependency, left for the OS package resolver to map
//! to the package that ships it.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use xdeps_core::{Dependency, SourceRepository};
use xdeps_util::errors::DependsError;
use xdeps_util::fs::{find_program, is_elf};
use xdeps_util::process::CommandBuilder;

/// Libraries loaded by ELF files below `root`, excluding ones shipped in the tree.
pub async fn shared_libraries(root: &Path, timeout: Duration) -> Result<BTreeSet<PathBuf>, DependsError> {
    let mut libs = BTreeSet::new();
    if find_program("ldd").is_none() {
        tracing::debug!("`ldd` not found; skipping native scan of {}", root.display());
        return Ok(libs);
    }

    let repo = SourceRepository::open(root)?;
    for file in repo.files().into_iter().filter(|f| is_elf(f)) {
        let output = CommandBuilder::new("ldd")
            .arg(file.to_string_lossy())
            .timeout(timeout)
            .exec()
            .await?;
        if !output.status.success() {
            tracing::debug!("{} is not dynamically linked", file.display());
            continue;
        }
        libs.extend(
            parse_ldd(&String::from_utf8_lossy(&output.stdout))
                .into_iter()
                .filter(|lib| !lib.starts_with(repo.root())),
        );
    }
    Ok(libs)
}

/// File dependencies, addressed to `source`, for every library found by [`shared_libraries`].
pub async fn native_dependencies(
    source: &str,
    root: &Path,
    timeout: Duration,
) -> Result<Vec<Dependency>, DependsError> {
    Ok(shared_libraries(root, timeout)
        .await?
        .into_iter()
        .map(|lib| Dependency::file(source, lib))
        .collect())
}

/// Extract resolved library paths from `ldd` output.
///
/// Handles `name => /path (0x...)` lines and bare `/path (0x...)` lines for the
/// dynamic loader; virtual objects and unresolved libraries are ignored.
pub fn parse_ldd(output: &str) -> Vec<PathBuf> {
    output
        .lines()
        .filter_map(|line| {
            let target = match line.split_once("=>") {
                Some((_, rhs)) => rhs,
                None => line,
            };
            let path = target.split_whitespace().next()?;
            path.starts_with('/').then(|| PathBuf::from(path))
        })
        .collect()
}
