//! Input discovery: walking the note tree, reading source documents and
//! extracting the asset references they contain.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use notefold_markdown::FenceTracker;
use notefold_shared::{
    AttachmentReference, IssueKind, NotefoldError, Processed, Report, Result, RetryConfig,
    SourceDocument, is_external_target, is_image_name, is_markdown_name, retry_io, to_slash,
};

/// Directory names never descended into.
const SKIP_DIRS: &[&str] = &["_media", "node_modules", "target"];

// ---------------------------------------------------------------------------
// Tree walk
// ---------------------------------------------------------------------------

/// Whether `dir` is the same-stem attachment directory of a sibling note.
pub fn is_attachment_dir(dir: &Path) -> bool {
    let (Some(parent), Some(name)) = (dir.parent(), dir.file_name()) else {
        return false;
    };
    let name = name.to_string_lossy();
    parent.join(format!("{name}.md")).is_file() || parent.join(format!("{name}.markdown")).is_file()
}

/// Find every markdown note under `root`, sorted by path.
///
/// Hidden directories, `_media` folders, note attachment directories and
/// anything under `exclude` (typically the output directory) are skipped.
/// Walk errors are recorded as warnings.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn discover_documents(root: &Path, exclude: &[PathBuf]) -> Result<Processed<Vec<PathBuf>>> {
    if !root.is_dir() {
        return Err(NotefoldError::NoInput {
            path: root.to_path_buf(),
        });
    }

    let excluded: Vec<PathBuf> = exclude
        .iter()
        .map(|p| p.canonicalize().unwrap_or_else(|_| p.clone()))
        .collect();

    let mut report = Report::default();
    let mut found = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            if name.starts_with('.') || SKIP_DIRS.contains(&name.as_ref()) {
                return false;
            }
            if is_attachment_dir(e.path()) {
                return false;
            }
            let canonical = e.path().canonicalize().unwrap_or_else(|_| e.path().to_path_buf());
            !excluded.contains(&canonical)
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let scope = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| root.display().to_string());
                report.warning(IssueKind::Io, scope, format!("skipped during walk: {e}"));
                continue;
            }
        };
        if entry.file_type().is_file() && is_markdown_name(&entry.file_name().to_string_lossy()) {
            found.push(entry.into_path());
        }
    }

    found.sort();
    info!(documents = found.len(), "discovered source documents");
    Ok(Processed::new(found, report))
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Date from a leading `YYYYMMDD` file-name prefix.
pub fn date_from_file_name(path: &Path) -> Option<NaiveDate> {
    static DATE_PREFIX_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(\d{8})").expect("valid regex"));

    let name = path.file_name()?.to_string_lossy();
    let caps = DATE_PREFIX_RE.captures(&name)?;
    NaiveDate::parse_from_str(&caps[1], "%Y%m%d").ok()
}

/// Read one note into a [`SourceDocument`].
///
/// Invalid UTF-8 is decoded lossily and reported as a warning. A missing
/// date prefix falls back to the Unix epoch.
pub fn read_source(
    path: &Path,
    root: &Path,
    retry: &RetryConfig,
) -> Result<Processed<SourceDocument>> {
    let rel_path = to_slash(path.strip_prefix(root).unwrap_or(path));
    let mut report = Report::default();

    let bytes = retry_io(retry, "read", path, || std::fs::read(path))?;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            report.warning(
                IssueKind::Io,
                rel_path.clone(),
                "invalid UTF-8, decoded lossily",
            );
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    };

    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from);

    let named_date = date_from_file_name(path);
    let references = extract_references(&text);
    debug!(path = %rel_path, references = references.len(), "read source document");

    let document = SourceDocument {
        path: path.to_path_buf(),
        rel_path,
        date: named_date.unwrap_or(DateTime::<Utc>::UNIX_EPOCH.date_naive()),
        dated_by_name: named_date.is_some(),
        modified,
        text,
        references,
    };
    Ok(Processed::new(document, report))
}

// ---------------------------------------------------------------------------
// Reference extraction
// ---------------------------------------------------------------------------

static IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"!\[(?P<label>[^\]\n]*)\]\(\s*(?P<target><[^>\n]+>|[^)\s]+)(?:\s+"[^"\n]*")?\s*\)"#)
        .expect("valid regex")
});

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[^!\]])(?P<link>\[(?P<label>[^\]\n]*)\]\(\s*(?P<target><[^>\n]+>|[^)\s]+)(?:\s+"[^"\n]*")?\s*\))"#)
        .expect("valid regex")
});

static EMBED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!\[\[(?P<target>[^\]|\n]+)(?:\|(?P<label>[^\]\n]*))?\]\]").expect("valid regex")
});

/// Decode a raw link target: strip `<>`, percent-decode, drop `?query` and `#fragment`.
pub fn decode_target(raw: &str) -> String {
    let trimmed = raw.trim();
    let unwrapped = trimmed
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(trimmed);
    let path = unwrapped.split(['?', '#']).next().unwrap_or_default();
    percent_encoding::percent_decode_str(path)
        .decode_utf8_lossy()
        .into_owned()
}

/// Extract image, attachment-link and embed references outside fenced code.
/// Each distinct snippet is reported once, in document order.
pub fn extract_references(text: &str) -> Vec<AttachmentReference> {
    let mut fence = FenceTracker::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut refs = Vec::new();

    let mut push = |raw: &str, target: String, label: &str, is_image: bool| {
        if target.is_empty() || is_external_target(&target) || !seen.insert(raw.to_string()) {
            return;
        }
        refs.push(AttachmentReference {
            raw: raw.to_string(),
            target,
            label: label.to_string(),
            is_image,
            resolved: None,
            strategy: None,
        });
    };

    for line in text.lines() {
        if fence.observe(line) {
            continue;
        }

        // (start offset, raw, target, label, is_image) so mixed kinds stay in line order
        let mut found: Vec<(usize, String, String, String, bool)> = Vec::new();

        for caps in IMAGE_RE.captures_iter(line) {
            let (Some(whole), Some(target)) = (caps.get(0), caps.name("target")) else {
                continue;
            };
            let label = caps.name("label").map_or("", |m| m.as_str());
            found.push((
                whole.start(),
                whole.as_str().to_string(),
                decode_target(target.as_str()),
                label.to_string(),
                true,
            ));
        }

        for caps in EMBED_RE.captures_iter(line) {
            let (Some(whole), Some(target)) = (caps.get(0), caps.name("target")) else {
                continue;
            };
            let target = target.as_str().trim().to_string();
            let label = caps.name("label").map_or("", |m| m.as_str());
            let is_image = is_image_name(&target);
            found.push((
                whole.start(),
                whole.as_str().to_string(),
                target,
                label.to_string(),
                is_image,
            ));
        }

        for caps in LINK_RE.captures_iter(line) {
            let (Some(link), Some(target)) = (caps.name("link"), caps.name("target")) else {
                continue;
            };
            let target = decode_target(target.as_str());
            if is_markdown_name(&target) {
                continue;
            }
            let label = caps.name("label").map_or("", |m| m.as_str());
            let is_image = is_image_name(&target);
            found.push((
                link.start(),
                link.as_str().to_string(),
                target,
                label.to_string(),
                is_image,
            ));
        }

        found.sort_by_key(|f| f.0);
        for (_, raw, target, label, is_image) in found {
            push(&raw, target, &label, is_image);
        }
    }

    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_tree(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("nf-{tag}-{}", uuid::Uuid::now_v7()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn discovers_sorted_notes_and_skips_attachment_dirs() {
        let root = temp_tree("discover");
        fs::write(root.join("b.md"), "b").unwrap();
        fs::write(root.join("a.md"), "a").unwrap();
        fs::create_dir_all(root.join("a")).unwrap();
        fs::write(root.join("a/inner.md"), "attachment note").unwrap();
        fs::create_dir_all(root.join(".hidden")).unwrap();
        fs::write(root.join(".hidden/x.md"), "x").unwrap();
        fs::create_dir_all(root.join("_media")).unwrap();
        fs::write(root.join("_media/m.md"), "m").unwrap();
        fs::create_dir_all(root.join("out")).unwrap();
        fs::write(root.join("out/corpus.md"), "c").unwrap();
        fs::create_dir_all(root.join("2024")).unwrap();
        fs::write(root.join("2024/c.md"), "c").unwrap();

        let found = discover_documents(&root, &[root.join("out")]).unwrap();
        let rel: Vec<String> = found
            .value
            .iter()
            .map(|p| to_slash(p.strip_prefix(&root).unwrap()))
            .collect();
        assert_eq!(rel, vec!["2024/c.md", "a.md", "b.md"]);
        assert!(found.report.is_clean());

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn missing_root_is_no_input() {
        let root = std::env::temp_dir().join(format!("nf-none-{}", uuid::Uuid::now_v7()));
        assert!(matches!(
            discover_documents(&root, &[]),
            Err(NotefoldError::NoInput { .. })
        ));
    }

    #[test]
    fn date_prefix_parsing() {
        assert_eq!(
            date_from_file_name(Path::new("/n/20240315 standup.md")),
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
        assert_eq!(date_from_file_name(Path::new("20241399-bad.md")), None);
        assert_eq!(date_from_file_name(Path::new("notes.md")), None);
    }

    #[test]
    fn read_source_fills_metadata() {
        let root = temp_tree("read");
        let path = root.join("20240102-sync.md");
        fs::write(&path, "# Sync\n![board](board.png)\n").unwrap();

        let doc = read_source(&path, &root, &RetryConfig::default()).unwrap();
        assert!(doc.report.is_clean());
        let doc = doc.value;
        assert_eq!(doc.rel_path, "20240102-sync.md");
        assert!(doc.dated_by_name);
        assert_eq!(doc.date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert!(doc.modified.is_some());
        assert_eq!(doc.references.len(), 1);

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn read_source_decodes_invalid_utf8_lossily() {
        let root = temp_tree("lossy");
        let path = root.join("notes.md");
        fs::write(&path, b"ok \xff\xfe text").unwrap();

        let doc = read_source(&path, &root, &RetryConfig::default()).unwrap();
        assert_eq!(doc.report.warnings.len(), 1);
        assert!(doc.value.text.starts_with("ok "));
        assert!(!doc.value.dated_by_name);
        assert_eq!(doc.value.date, DateTime::<Utc>::UNIX_EPOCH.date_naive());

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn extracts_images_links_and_embeds() {
        let text = "\
Intro ![Photo One](<my photo.HEIC> \"title\") and [spec](files/spec%20v2.pdf?raw=1).
See [other note](other.md) and [site](https://example.com).
![[scan.png|Scan]]
```
![ignored](in-code.png)
```
![Photo One](<my photo.HEIC> \"title\")
";
        let refs = extract_references(text);
        let targets: Vec<&str> = refs.iter().map(|r| r.target.as_str()).collect();
        assert_eq!(targets, vec!["my photo.HEIC", "files/spec v2.pdf", "scan.png"]);
        assert!(refs[0].is_image);
        assert_eq!(refs[0].label, "Photo One");
        assert!(!refs[1].is_image);
        assert_eq!(refs[1].raw, "[spec](files/spec%20v2.pdf?raw=1)");
        assert_eq!(refs[2].label, "Scan");
    }

    #[test]
    fn decode_target_strips_query_and_brackets() {
        assert_eq!(decode_target("<a b.png>"), "a b.png");
        assert_eq!(decode_target("img%2Fx.png#frag"), "img/x.png");
    }
}
