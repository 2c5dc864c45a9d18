//! Binding source stager: copy the read-only binding tree to the fixed,
//! writable location the patcher and installer work on.

use std::path::Path;

use mclenv_core::error::{BootstrapError, BootstrapResult};
use mclenv_core::info_log;
use mclenv_core::model::WorkingInstallTree;

use crate::fetch::FetchedSource;
use crate::fsutil::{self, PathIoError};

fn stage_io(e: PathIoError) -> BootstrapError {
    BootstrapError::StageIo {
        path: e.path,
        source: e.source,
    }
}

/// Replace whatever sits at `dest` with a fresh writable copy of `fetched`.
///
/// Running it twice leaves exactly the tree a single run leaves.
pub fn stage_binding(
    fetched: &FetchedSource,
    dest: &Path,
    build_script: &str,
) -> BootstrapResult<WorkingInstallTree> {
    stage_inner(&fetched.path, dest)?;
    let tree = WorkingInstallTree::new(dest, build_script);
    if !tree.build_script.is_file() {
        return Err(BootstrapError::StageIo {
            path: tree.build_script.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} has no {}", fetched.source.slug(), build_script),
            ),
        });
    }
    info_log!("staged {} at {}", fetched.source.slug(), dest.display());
    Ok(tree)
}

fn stage_inner(src: &Path, dest: &Path) -> BootstrapResult<()> {
    if dest.starts_with(src) || src.starts_with(dest) {
        return Err(BootstrapError::StageIo {
            path: dest.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("staging dir overlaps source tree {}", src.display()),
            ),
        });
    }
    if fsutil::remove_path(dest).map_err(stage_io)? {
        tracing::debug!(dest = %dest.display(), "removed previous working tree");
    }
    let copied = fsutil::copy_tree(src, dest).map_err(stage_io)?;
    fsutil::set_tree_writable(dest, true).map_err(stage_io)?;
    tracing::debug!(copied, "binding tree copied");
    Ok(())
}
