// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Pre-order traversal of a host directory tree.
//!
//! This is the library half of the `dfs_walk` demonstration tool. It walks the host
//! filesystem, not a DFS namespace.
//!
//! # Examples
//!
//! ```no_run
//! use std::path::Path;
//!
//! dfs_walk::walk(Path::new("."), |path| {
//!     println!("{}", path.display());
//!     Ok(())
//! })?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Visits `root` and every path below it, each exactly once, parents before their children.
///
/// Siblings are visited in lexical order of their names. Symbolic links are visited but never
/// followed, so the traversal cannot loop.
///
/// # Errors
///
/// Stops at the first path that cannot be inspected or directory that cannot be read, and at the
/// first error returned by `visit`.
pub fn walk(root: &Path, mut visit: impl FnMut(&Path) -> Result<()>) -> Result<()> {
    // Siblings are pushed in reverse so the smallest name is visited next.
    let mut pending = vec![root.to_path_buf()];
    while let Some(path) = pending.pop() {
        let metadata = fs::symlink_metadata(&path).with_context(|| format!("cannot access {}", path.display()))?;
        visit(&path)?;

        // symlink_metadata never reports a link as a directory.
        if metadata.is_dir() {
            pending.extend(sorted_children(&path)?.into_iter().rev());
        }
    }
    Ok(())
}

fn sorted_children(dir: &Path) -> Result<Vec<PathBuf>> {
    let context = || format!("cannot read directory {}", dir.display());

    let mut children = fs::read_dir(dir)
        .with_context(context)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(context)?;
    children.sort_unstable();

    tracing::debug!(dir = %dir.display(), entries = children.len(), "read directory");
    Ok(children)
}
