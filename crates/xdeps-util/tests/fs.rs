use xdeps_util::fs::{ensure_dir, ensure_parent_dir, find_program, find_program_in, is_elf};
use tempfile::TempDir;

#[test]
fn test_is_elf_detects_magic() {
    let tmp = TempDir::new().unwrap();
    let elf = tmp.path().join("libfoo.so");
    std::fs::write(&elf, [0x7f, b'E', b'L', b'F', 2, 1, 1, 0]).unwrap();
    assert!(is_elf(&elf));
}

#[test]
fn test_is_elf_rejects_text_and_short_files() {
    let tmp = TempDir::new().unwrap();
    let text = tmp.path().join("README");
    std::fs::write(&text, "hello world").unwrap();
    let short = tmp.path().join("tiny");
    std::fs::write(&short, [0x7f, b'E']).unwrap();
    assert!(!is_elf(&text));
    assert!(!is_elf(&short));
    assert!(!is_elf(&tmp.path().join("missing")));
}

#[cfg(unix)]
#[test]
fn test_find_program_on_path() {
    assert!(find_program("sh").is_some());
    assert!(find_program("nonexistent_program_xyz_123").is_none());
}

#[cfg(unix)]
#[test]
fn test_find_program_requires_executable_bit() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().unwrap();
    let tool = tmp.path().join("apt-cache");
    std::fs::write(&tool, "#!/bin/sh\n").unwrap();
    std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o644)).unwrap();
    assert!(find_program_in("apt-cache", tmp.path().as_os_str()).is_none());

    std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
    let found = find_program_in("apt-cache", tmp.path().as_os_str()).unwrap();
    assert!(found.ends_with("apt-cache"));
}

#[test]
fn test_ensure_dir_creates_nested() {
    let tmp = TempDir::new().unwrap();
    let deep = tmp.path().join("x").join("y").join("z");
    assert!(!deep.exists());
    ensure_dir(&deep).unwrap();
    assert!(deep.is_dir());
}

#[test]
fn test_ensure_parent_dir() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("out").join("graph.json");
    ensure_parent_dir(&file).unwrap();
    assert!(tmp.path().join("out").is_dir());
    assert!(!file.exists());
}
