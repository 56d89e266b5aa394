//! On-disk layout of checkouts under the root folder.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Working directory of `project` under `root`.
///
/// Slashes, spaces and hyphens become underscores: `org/my-repo` → `org_my_repo`.
pub fn folder_for(root: &Path, project: &str) -> PathBuf {
    root.join(folder_name(project))
}

pub fn folder_name(project: &str) -> String {
    project
        .chars()
        .map(|c| match c {
            '/' | ' ' | '-' => '_',
            other => other,
        })
        .collect()
}

/// Recursively copy `src` into `dst`, creating `dst` as needed.
///
/// Symlinks are recreated as links on unix and skipped elsewhere.
pub fn copy_dir(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let out = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if file_type.is_symlink() {
            copy_symlink(entry.path(), &out)?;
            continue;
        }
        std::fs::copy(entry.path(), &out)?;
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    let target = std::fs::read_link(src)?;
    std::os::unix::fs::symlink(target, dst)
}

#[cfg(not(unix))]
fn copy_symlink(_src: &Path, _dst: &Path) -> io::Result<()> {
    Ok(())
}
