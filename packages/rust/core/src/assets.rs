//! Asset sink: copies and transcodes referenced files into the output tree.
//!
//! Files land in `<output>/<assets_dir>/<doc-slug>/<name>`. An identical file
//! already at the target is reused; a differing one is kept and the new file
//! gets a `-<hash8>` suffix.

use std::path::{Path, PathBuf};

use tracing::debug;

use notefold_shared::paths::extension_of;
use notefold_shared::{
    IssueKind, Processed, Report, Result, RetryConfig, RunConfig, retry_io, sha256_hex,
    write_atomic,
};

use crate::collaborators::ImageCodec;

/// A file stored under the assets directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    /// Absolute path of the stored file.
    pub path: PathBuf,
    /// `/`-separated path relative to the output directory.
    pub rel: String,
    /// Whether an identical file was already present.
    pub reused: bool,
}

/// Writes assets below one output directory.
#[derive(Debug, Clone)]
pub struct AssetSink {
    output_dir: PathBuf,
    assets_dir: String,
    retry: RetryConfig,
}

impl AssetSink {
    pub fn new(output_dir: impl Into<PathBuf>, assets_dir: impl Into<String>, retry: RetryConfig) -> Self {
        Self {
            output_dir: output_dir.into(),
            assets_dir: assets_dir.into(),
            retry,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Store `bytes` as `file_name` in the document's asset folder.
    pub fn store(&self, doc_slug: &str, file_name: &str, bytes: &[u8]) -> Result<StoredAsset> {
        let dir = self.output_dir.join(&self.assets_dir).join(doc_slug);
        let mut name = sanitize_file_name(file_name);
        let mut target = dir.join(&name);

        if target.exists() {
            if same_content(&target, bytes) {
                return Ok(self.stored(doc_slug, name, target, true));
            }
            name = suffixed_name(&name, &sha256_hex(bytes)[..8]);
            target = dir.join(&name);
            if target.exists() && same_content(&target, bytes) {
                return Ok(self.stored(doc_slug, name, target, true));
            }
        }

        write_atomic(&target, bytes, &self.retry)?;
        debug!(path = %target.display(), bytes = bytes.len(), "stored asset");
        Ok(self.stored(doc_slug, name, target, false))
    }

    /// Copy a source file into the document's asset folder.
    pub fn copy(&self, doc_slug: &str, source: &Path) -> Result<StoredAsset> {
        let bytes = retry_io(&self.retry, "read", source, || std::fs::read(source))?;
        self.store(doc_slug, &file_name_of(source), &bytes)
    }

    /// Copy an image, transcoding it when the codec asks for a different
    /// format. A failed transcode falls back to a raw copy plus a warning.
    pub fn store_image(
        &self,
        doc_slug: &str,
        source: &Path,
        codec: &dyn ImageCodec,
        scope: &str,
    ) -> Result<Processed<StoredAsset>> {
        let bytes = retry_io(&self.retry, "read", source, || std::fs::read(source))?;
        let file_name = file_name_of(source);
        let mut report = Report::default();

        let from = extension_of(&file_name).unwrap_or_default();
        if let Some(to) = codec.target_extension(&from) {
            match codec.transcode(&bytes, &from, to) {
                Ok(converted) => {
                    let renamed = with_extension(&file_name, to);
                    let stored = self.store(doc_slug, &renamed, &converted)?;
                    debug!(source = %source.display(), from, to, "transcoded image");
                    return Ok(Processed::new(stored, report));
                }
                Err(e) => report.warning(
                    IssueKind::Conversion,
                    scope,
                    format!("could not convert {file_name} to {to}, copied original: {e}"),
                ),
            }
        }

        let stored = self.store(doc_slug, &file_name, &bytes)?;
        Ok(Processed::new(stored, report))
    }

    fn stored(&self, doc_slug: &str, name: String, path: PathBuf, reused: bool) -> StoredAsset {
        StoredAsset {
            rel: format!("{}/{doc_slug}/{name}", self.assets_dir),
            path,
            reused,
        }
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "asset".to_string())
}

fn same_content(path: &Path, bytes: &[u8]) -> bool {
    std::fs::read(path).is_ok_and(|existing| existing == bytes)
}

/// Strip path separators and control characters; never empty.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "asset".to_string()
    } else {
        cleaned
    }
}

fn suffixed_name(name: &str, suffix: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}-{suffix}.{ext}"),
        _ => format!("{name}-{suffix}"),
    }
}

fn with_extension(name: &str, ext: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => format!("{stem}.{ext}"),
        _ => format!("{name}.{ext}"),
    }
}

impl From<&RunConfig> for AssetSink {
    fn from(config: &RunConfig) -> Self {
        Self::new(&config.output_dir, &config.assets_dir, config.retry.clone())
    }
}
