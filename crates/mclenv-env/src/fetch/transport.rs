//! Where archive bytes come from.

#[cfg(feature = "http")]
use std::io::Read;
#[cfg(feature = "http")]
use std::time::Duration;

use anyhow::{Context, Result};

/// Archives above this size are refused.
pub const MAX_ARCHIVE_BYTES: u64 = 256 * 1024 * 1024;

pub trait SourceTransport {
    fn download(&self, url: &str) -> Result<Vec<u8>>;
}

/// `file://` paths from disk, everything else over HTTP(S) when the `http` feature is on.
pub struct DefaultTransport {
    #[cfg(feature = "http")]
    agent: ureq::Agent,
}

impl DefaultTransport {
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "http")]
            agent: ureq::AgentBuilder::new()
                .timeout_connect(Duration::from_secs(15))
                .timeout_read(Duration::from_secs(120))
                .user_agent(concat!("mclenv/", env!("CARGO_PKG_VERSION")))
                .build(),
        }
    }
}

impl Default for DefaultTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceTransport for DefaultTransport {
    fn download(&self, url: &str) -> Result<Vec<u8>> {
        if let Some(path) = url.strip_prefix("file://") {
            let meta = std::fs::metadata(path).with_context(|| format!("stat {}", path))?;
            if meta.len() > MAX_ARCHIVE_BYTES {
                anyhow::bail!("{} is larger than {} bytes", path, MAX_ARCHIVE_BYTES);
            }
            return std::fs::read(path).with_context(|| format!("read {}", path));
        }
        self.download_http(url)
    }
}

impl DefaultTransport {
    #[cfg(feature = "http")]
    fn download_http(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.agent.get(url).call().map_err(|e| match &e {
            ureq::Error::Status(code, _) => anyhow::anyhow!("server returned HTTP {}", code),
            ureq::Error::Transport(_) => anyhow::anyhow!("cannot reach host: {}", e),
        })?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_ARCHIVE_BYTES + 1)
            .read_to_end(&mut bytes)
            .context("connection dropped while downloading")?;
        if bytes.len() as u64 > MAX_ARCHIVE_BYTES {
            anyhow::bail!("archive is larger than {} bytes", MAX_ARCHIVE_BYTES);
        }
        tracing::debug!(url, bytes = bytes.len(), "downloaded");
        Ok(bytes)
    }

    #[cfg(not(feature = "http"))]
    fn download_http(&self, _url: &str) -> Result<Vec<u8>> {
        anyhow::bail!("HTTP downloads require the 'http' feature (ureq); use a file:// archive_url")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_url_reads_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mcl.tar.gz");
        std::fs::write(&path, b"bytes").unwrap();
        let url = format!("file://{}", path.display());
        assert_eq!(DefaultTransport::new().download(&url).unwrap(), b"bytes");
    }

    #[test]
    fn test_missing_file_url_is_error() {
        let err = DefaultTransport::new()
            .download("file:///no/such/archive.tar.gz")
            .unwrap_err();
        assert!(err.to_string().contains("/no/such/archive.tar.gz"));
    }
}
