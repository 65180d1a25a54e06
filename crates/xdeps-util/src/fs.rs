use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// Search `PATH` for an executable named `program`.
pub fn find_program(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

/// Search the given `PATH`-style list of directories for an executable named `program`.
pub fn find_program_in(program: &str, search_path: &OsStr) -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    which::which_in(program, Some(search_path), cwd).ok()
}

/// Whether the file at `path` starts with the ELF magic number.
pub fn is_elf(path: &Path) -> bool {
    let mut magic = [0u8; 4];
    match std::fs::File::open(path) {
        Ok(mut file) => file.read_exact(&mut magic).is_ok() && magic == ELF_MAGIC,
        Err(_) => false,
    }
}

/// Ensure a directory exists, creating it and any parents if needed.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Ensure the parent directory of a file path exists.
pub fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}
