//! Source fetcher: pinned remote tree → read-only, content-addressed local tree.
//!
//! Trees land in `<store>/<hash32>-<repo>`. Unpacking happens in a temporary
//! directory inside the store and is only renamed into place after the hash
//! check passes, so a mismatch never leaves a partial tree behind.

pub mod archive;
pub mod hash;
pub mod transport;

use std::path::{Path, PathBuf};

use mclenv_core::error::{BootstrapError, BootstrapResult};
use mclenv_core::info_log;
use mclenv_core::model::{ContentHash, PinnedSource};

use crate::fsutil;
pub use hash::tree_hash;
pub use transport::{DefaultTransport, SourceTransport};

/// A tree sitting in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSource {
    pub source: PinnedSource,
    pub path: PathBuf,
    pub hash: ContentHash,
    /// True when the store already held the tree and nothing was downloaded.
    pub reused: bool,
}

pub struct SourceFetcher<'a> {
    transport: &'a dyn SourceTransport,
    store_dir: PathBuf,
    url_template: String,
}

impl<'a> SourceFetcher<'a> {
    pub fn new(transport: &'a dyn SourceTransport, store_dir: &Path, url_template: &str) -> Self {
        Self {
            transport,
            store_dir: store_dir.to_path_buf(),
            url_template: url_template.to_string(),
        }
    }

    pub fn store_path(&self, hash: &ContentHash, source: &PinnedSource) -> PathBuf {
        self.store_dir
            .join(format!("{}-{}", hash.short(32), source.repo))
    }

    pub fn fetch(&self, source: &PinnedSource) -> BootstrapResult<FetchedSource> {
        let slug = source.slug();
        match &source.hash {
            Some(expected) => {
                let path = self.store_path(expected, source);
                if path.is_dir() {
                    info_log!("{}: using stored tree {}", slug, path.display());
                    return Ok(FetchedSource {
                        source: source.clone(),
                        path,
                        hash: expected.clone(),
                        reused: true,
                    });
                }
            }
            None => {
                tracing::warn!(
                    "{} ({}) has no pinned content hash; the fetched tree may differ between runs",
                    slug,
                    source.revision
                );
            }
        }

        let url = source.archive_url(&self.url_template);
        let fetch_err = |message: String| BootstrapError::Fetch {
            slug: slug.clone(),
            url: url.clone(),
            message,
        };

        info_log!("{}: downloading {}", slug, url);
        let bytes = self
            .transport
            .download(&url)
            .map_err(|e| fetch_err(format!("{:#}", e)))?;

        std::fs::create_dir_all(&self.store_dir)
            .map_err(|e| fetch_err(format!("create {}: {}", self.store_dir.display(), e)))?;
        let staging = tempfile::Builder::new()
            .prefix(".fetch-")
            .tempdir_in(&self.store_dir)
            .map_err(|e| fetch_err(format!("create temp dir in store: {}", e)))?;

        let entries = archive::unpack_tarball(&bytes, staging.path())
            .map_err(|e| fetch_err(format!("invalid archive: {:#}", e)))?;
        let actual =
            tree_hash(staging.path()).map_err(|e| fetch_err(format!("hash tree: {:#}", e)))?;
        tracing::debug!(%slug, entries, hash = %actual, "unpacked");

        if let Some(expected) = &source.hash {
            if *expected != actual {
                // `staging` is dropped here, taking the unpacked tree with it.
                return Err(BootstrapError::FetchIntegrity {
                    slug: slug.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        let final_path = self.store_path(&actual, source);
        if final_path.is_dir() {
            info_log!("{}: content unchanged ({})", slug, actual);
            return Ok(FetchedSource {
                source: source.clone(),
                path: final_path,
                hash: actual,
                reused: true,
            });
        }

        #[allow(deprecated)]
        let staged = staging.into_path();
        if let Err(e) = std::fs::rename(&staged, &final_path) {
            let _ = fsutil::remove_path(&staged);
            return Err(fetch_err(format!(
                "move into store {}: {}",
                final_path.display(),
                e
            )));
        }
        fsutil::set_tree_writable(&final_path, false)
            .map_err(|e| fetch_err(format!("mark read-only: {}", e)))?;

        info_log!("{}: stored as {} ({})", slug, final_path.display(), actual);
        Ok(FetchedSource {
            source: source.clone(),
            path: final_path,
            hash: actual,
            reused: false,
        })
    }
}
