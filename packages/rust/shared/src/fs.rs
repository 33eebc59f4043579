//! Atomic file writes.

use std::path::{Path, PathBuf};

use crate::config::RetryConfig;
use crate::error::{NotefoldError, Result};
use crate::hash::sha256_hex;
use crate::retry::retry_io;

/// Temp path used while writing `target` (`dir/.name.tmp`).
pub fn temp_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    target.with_file_name(format!(".{name}.tmp"))
}

/// Write `content` to `target` atomically: write to a dot-temp file in the
/// same directory, then rename over the target. Transient errors are retried.
///
/// Returns the SHA-256 of the written bytes.
pub fn write_atomic(target: &Path, content: &[u8], retry: &RetryConfig) -> Result<String> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| NotefoldError::io(parent, e))?;
    }

    let temp = temp_path_for(target);
    retry_io(retry, "write", &temp, || std::fs::write(&temp, content))?;
    if let Err(e) = retry_io(retry, "rename", target, || std::fs::rename(&temp, target)) {
        std::fs::remove_file(&temp).ok();
        return Err(e);
    }

    Ok(sha256_hex(content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_replaces_and_cleans_temp() {
        let dir = std::env::temp_dir().join(format!("nf-fs-{}", uuid::Uuid::now_v7()));
        let target = dir.join("nested/out.md");

        let first = write_atomic(&target, b"one", &RetryConfig::default()).unwrap();
        let second = write_atomic(&target, b"two", &RetryConfig::default()).unwrap();

        assert_ne!(first, second);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "two");
        assert!(!temp_path_for(&target).exists());
        assert_eq!(second, sha256_hex(b"two"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
