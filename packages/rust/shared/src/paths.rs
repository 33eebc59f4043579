//! Path helpers: slugs, `/`-separated relative paths, and relative-path
//! computation between two locations.

use std::path::{Component, Path, PathBuf};

/// Extensions treated as images by the resolver, classifier and handlers.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "webp", "svg", "heic", "heif", "tif", "tiff",
];

/// Extensions of office/PDF documents handed to the format converter.
pub const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "odt", "rtf", "xls", "xlsx", "ods", "ppt", "pptx", "odp",
];

/// Lowercased extension of a path-like string, if any.
pub fn extension_of(target: &str) -> Option<String> {
    let name = target.rsplit(['/', '\\']).next().unwrap_or(target);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Whether the target names an image file.
pub fn is_image_name(target: &str) -> bool {
    extension_of(target).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Whether the target names an office/PDF document.
pub fn is_document_name(target: &str) -> bool {
    extension_of(target).is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext.as_str()))
}

/// Whether the target names a markdown file.
pub fn is_markdown_name(target: &str) -> bool {
    extension_of(target).is_some_and(|ext| ext == "md" || ext == "markdown")
}

/// Whether a link target is external (has a URL scheme) or an in-page anchor.
pub fn is_external_target(target: &str) -> bool {
    if target.starts_with('#') || target.starts_with("//") {
        return true;
    }
    match target.split_once(':') {
        Some((scheme, _)) => {
            scheme.len() > 1
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
        }
        None => false,
    }
}

/// Render a path with `/` separators regardless of platform.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Generate a filesystem-safe slug from a relative document path.
///
/// The extension is dropped, separators become `-`, everything is lowercased
/// and characters outside `[a-z0-9_-]` are replaced with `-`.
pub fn slugify_path(rel_path: &str) -> String {
    let trimmed = rel_path
        .trim_start_matches("./")
        .trim_start_matches('/')
        .trim_end_matches(".md")
        .trim_end_matches(".markdown");

    let mut slug = String::with_capacity(trimmed.len());
    let mut last_dash = false;
    for c in trimmed.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() || c == '_' {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }

    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "document".to_string()
    } else {
        slug
    }
}

/// Lexically normalize a path (resolve `.` and `..` without touching disk).
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Compute the path of `target` relative to the directory `from_dir`.
///
/// Both paths should be absolute (or both relative to the same base).
pub fn relative_path(from_dir: &Path, target: &Path) -> PathBuf {
    let from = normalize_lexically(from_dir);
    let target = normalize_lexically(target);

    let from_parts: Vec<_> = from.components().collect();
    let target_parts: Vec<_> = target.components().collect();

    let common = from_parts
        .iter()
        .zip(target_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..from_parts.len() {
        rel.push("..");
    }
    for part in &target_parts[common..] {
        rel.push(part.as_os_str());
    }
    rel
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_flattens_and_lowercases() {
        assert_eq!(slugify_path("2024/20240101 Team Sync.md"), "2024-20240101-team-sync");
        assert_eq!(slugify_path("notes/a_b.md"), "notes-a_b");
        assert_eq!(slugify_path("???.md"), "document");
    }

    #[test]
    fn relative_path_walks_up_and_down() {
        let rel = relative_path(Path::new("/out"), Path::new("/notes/a/img.png"));
        assert_eq!(to_slash(&rel), "../notes/a/img.png");

        let rel = relative_path(Path::new("/out"), Path::new("/out/assets/x.png"));
        assert_eq!(to_slash(&rel), "assets/x.png");
    }

    #[test]
    fn extension_classification() {
        assert!(is_image_name("photos/IMG_1.HEIC"));
        assert!(is_document_name("report.final.PDF"));
        assert!(is_markdown_name("../other.md"));
        assert!(!is_image_name(".png"));
        assert_eq!(extension_of("archive.tar.gz").as_deref(), Some("gz"));
    }

    #[test]
    fn external_targets() {
        assert!(is_external_target("https://example.com/a.png"));
        assert!(is_external_target("mailto:someone@example.com"));
        assert!(is_external_target("#heading"));
        assert!(!is_external_target("img/a.png"));
        assert!(!is_external_target("C:/notes/a.png"));
    }

    #[test]
    fn normalize_resolves_dots() {
        let p = normalize_lexically(Path::new("/a/b/../c/./d"));
        assert_eq!(p, PathBuf::from("/a/c/d"));
    }
}
