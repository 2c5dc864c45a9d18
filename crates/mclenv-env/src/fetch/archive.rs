//! Unpack a gzip'd source tarball, dropping the single top-level directory
//! that forge archives wrap everything in (`mcl-2.14/...`).

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

/// Unpack into `dest` (which must exist). Returns the number of entries written.
pub fn unpack_tarball(bytes: &[u8], dest: &Path) -> Result<usize> {
    let mut archive = Archive::new(GzDecoder::new(bytes));
    archive.set_preserve_mtime(false);
    let mut written = 0;

    for entry in archive.entries().context("not a gzip'd tar archive")? {
        let mut entry = entry.context("corrupt archive entry")?;
        let kind = entry.header().entry_type();
        if matches!(kind, EntryType::XGlobalHeader | EntryType::XHeader) {
            continue;
        }
        let path = entry.path().context("unreadable entry path")?.into_owned();
        let Some(rel) = strip_top_level(&path)? else {
            continue;
        };
        if kind.is_hard_link() {
            anyhow::bail!("hard link entries are not supported: {}", path.display());
        }
        if kind.is_symlink() {
            let target = entry
                .link_name()
                .context("unreadable symlink target")?
                .ok_or_else(|| anyhow::anyhow!("symlink without target: {}", path.display()))?
                .into_owned();
            check_link_target(&rel, &target)
                .with_context(|| format!("unsafe symlink in archive: {}", path.display()))?;
        }
        // An earlier symlink entry must not redirect a later write.
        check_no_symlink_ancestor(dest, &rel)?;

        let out = dest.join(&rel);
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        entry
            .unpack(&out)
            .with_context(|| format!("unpack {}", rel.display()))?;
        written += 1;
    }

    if written == 0 {
        anyhow::bail!("archive is empty");
    }
    Ok(written)
}

/// `mcl-2.14/include/mcl/bn.h` → `include/mcl/bn.h`; the top-level dir itself → `None`.
fn strip_top_level(path: &Path) -> Result<Option<PathBuf>> {
    let mut rel = PathBuf::new();
    let mut seen_top = false;
    for comp in path.components() {
        match comp {
            Component::Normal(part) if seen_top => rel.push(part),
            Component::Normal(_) => seen_top = true,
            Component::CurDir => {}
            _ => anyhow::bail!("unsafe path in archive: {}", path.display()),
        }
    }
    if rel.as_os_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(rel))
    }
}

/// A link target must be relative and resolve inside the unpacked tree.
fn check_link_target(rel: &Path, target: &Path) -> Result<()> {
    let mut depth = rel.components().count().saturating_sub(1);
    for comp in target.components() {
        match comp {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir if depth > 0 => depth -= 1,
            Component::ParentDir => anyhow::bail!("target {} leaves the tree", target.display()),
            _ => anyhow::bail!("absolute target {}", target.display()),
        }
    }
    Ok(())
}

fn check_no_symlink_ancestor(dest: &Path, rel: &Path) -> Result<()> {
    let mut at = dest.to_path_buf();
    let mut parents = rel.components().peekable();
    while let Some(comp) = parents.next() {
        if parents.peek().is_none() {
            break;
        }
        at.push(comp);
        match fs::symlink_metadata(&at) {
            Ok(meta) if meta.file_type().is_symlink() => {
                anyhow::bail!("archive writes through symlink {}", at.display())
            }
            _ => {}
        }
    }
    Ok(())
}
