//! Text-like attachments are inlined into the block body.

use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use notefold_markdown::{FenceTracker, normalize};
use notefold_shared::paths::{extension_of, normalize_lexically};
use notefold_shared::{IssueKind, Processed, Report, Result, is_external_target, retry_io, to_slash};

use super::{AttachmentBody, AttachmentHandler, HandlerContext, asset_link, file_name_str};

/// Extension → fence language. An empty language means a bare fence.
const TEXT_EXTENSIONS: &[(&str, &str)] = &[
    ("md", "markdown"),
    ("markdown", "markdown"),
    ("txt", ""),
    ("text", ""),
    ("log", ""),
    ("csv", "csv"),
    ("tsv", "tsv"),
    ("json", "json"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
    ("toml", "toml"),
    ("xml", "xml"),
    ("html", "html"),
    ("htm", "html"),
    ("ini", "ini"),
    ("cfg", "ini"),
    ("conf", ""),
    ("sql", "sql"),
    ("sh", "bash"),
    ("py", "python"),
    ("rs", "rust"),
    ("js", "javascript"),
    ("ts", "typescript"),
    ("css", "css"),
    ("go", "go"),
    ("java", "java"),
    ("c", "c"),
    ("h", "c"),
    ("cpp", "cpp"),
    ("rb", "ruby"),
];

fn language_of(path: &Path) -> Option<&'static str> {
    let ext = extension_of(&file_name_str(path))?;
    TEXT_EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|&(_, lang)| lang)
}

/// Inlines text files; markdown as-is apart from rebased links, everything
/// else fenced.
pub struct TextHandler;

impl AttachmentHandler for TextHandler {
    fn name(&self) -> &'static str {
        "text"
    }

    fn accepts(&self, path: &Path) -> bool {
        language_of(path).is_some()
    }

    fn process(&self, ctx: &HandlerContext<'_>) -> Result<Processed<AttachmentBody>> {
        let mut report = Report::default();
        let language = language_of(ctx.path).unwrap_or_default();

        let size = std::fs::metadata(ctx.path).map(|m| m.len()).unwrap_or(0);
        if size > ctx.max_inline_bytes {
            let stored = ctx.sink.copy(ctx.doc_slug, ctx.path)?;
            debug!(path = %ctx.path.display(), size, "text attachment too large to inline");
            let body = format!(
                "{}\n\n_{size} bytes, not inlined_",
                asset_link(&ctx.file_name(), &stored.rel, false)
            );
            return Ok(Processed::new(AttachmentBody::linked(body, stored.rel), report));
        }

        let bytes = retry_io(ctx.retry, "read", ctx.path, || std::fs::read(ctx.path))?;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                report.warning(
                    IssueKind::Io,
                    ctx.scope,
                    format!("{}: invalid UTF-8, decoded lossily", ctx.rel_name),
                );
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };

        let text = normalize(&text);
        let body = if language == "markdown" {
            rebase_links(text.trim_end(), ctx.link_base)
        } else {
            fenced(language, text.trim_end())
        };
        Ok(Processed::new(AttachmentBody::inline(body), report))
    }
}

static LINK_TARGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<lead>!?\[[^\]\n]*\]\(\s*)(?P<target><[^>\n]+>|[^)\s]+)")
        .expect("valid regex")
});

/// Prefix relative link targets with `base` so they resolve from the note's
/// directory instead of the attachment's. Fenced code is left alone.
fn rebase_links(text: &str, base: &str) -> String {
    if base.is_empty() {
        return text.to_string();
    }
    let mut fence = FenceTracker::new();
    text.split('\n')
        .map(|line| {
            if fence.observe(line) {
                return line.to_string();
            }
            LINK_TARGET_RE
                .replace_all(line, |caps: &Captures<'_>| {
                    format!("{}{}", &caps["lead"], rebase_target(&caps["target"], base))
                })
                .into_owned()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn rebase_target(raw: &str, base: &str) -> String {
    let (bare, angled) = match raw.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
        Some(inner) => (inner, true),
        None => (raw, false),
    };
    if bare.starts_with('/') || is_external_target(bare) {
        return raw.to_string();
    }

    let (path, suffix) = bare.split_at(bare.find(['?', '#']).unwrap_or(bare.len()));
    let target = format!("{}{suffix}", to_slash(&normalize_lexically(&Path::new(base).join(path))));
    if angled { format!("<{target}>") } else { target }
}

/// Wrap `content` in a backtick fence longer than any run inside it.
fn fenced(language: &str, content: &str) -> String {
    let longest = content
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    let fence = "`".repeat(longest.max(2) + 1);
    format!("{fence}{language}\n{content}\n{fence}")
}
