//! Attachment handlers.
//!
//! Every file found in a note's same-stem attachment directory is turned into
//! the body of one attachment block by the first handler that accepts it.
//! The registry order is text, document, image, binary; the binary handler
//! accepts everything.

mod binary;
mod document;
mod image;
mod text;

use std::path::Path;

use notefold_shared::{Processed, Result, RetryConfig};

use crate::assets::AssetSink;
use crate::collaborators::Collaborators;

pub use binary::BinaryHandler;
pub use document::DocumentHandler;
pub use image::ImageHandler;
pub use text::TextHandler;

/// Everything a handler may use while processing one attachment.
pub struct HandlerContext<'a> {
    /// Relative path of the owning note (issue scope).
    pub scope: &'a str,
    /// Asset folder slug of the owning note.
    pub doc_slug: &'a str,
    /// The attachment file.
    pub path: &'a Path,
    /// Path of the attachment relative to the attachment directory.
    pub rel_name: &'a str,
    /// Directory holding the attachment, relative to the note's directory.
    pub link_base: &'a str,
    pub sink: &'a AssetSink,
    pub collaborators: &'a Collaborators,
    /// Text attachments larger than this are linked instead of inlined.
    pub max_inline_bytes: u64,
    pub retry: &'a RetryConfig,
}

impl HandlerContext<'_> {
    /// File name of the attachment.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.rel_name.to_string())
    }
}

/// Block body produced by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentBody {
    pub body: String,
    /// Output-relative paths of assets the body links to.
    pub assets: Vec<String>,
}

impl AttachmentBody {
    pub fn inline(body: String) -> Self {
        Self {
            body,
            assets: Vec::new(),
        }
    }

    pub fn linked(body: String, asset: String) -> Self {
        Self {
            body,
            assets: vec![asset],
        }
    }
}

/// One attachment kind.
///
/// `process` returns the block body. `Err` means the attachment itself could
/// not be read or stored and is skipped; collaborator failures are recorded in
/// the returned report instead.
pub trait AttachmentHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn accepts(&self, path: &Path) -> bool;

    fn process(&self, ctx: &HandlerContext<'_>) -> Result<Processed<AttachmentBody>>;
}

/// Handlers in priority order.
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn AttachmentHandler>>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self {
            handlers: vec![
                Box::new(TextHandler),
                Box::new(DocumentHandler),
                Box::new(ImageHandler),
                Box::new(BinaryHandler),
            ],
        }
    }
}

impl HandlerRegistry {
    pub fn new(handlers: Vec<Box<dyn AttachmentHandler>>) -> Self {
        Self { handlers }
    }

    /// First handler accepting `path`.
    pub fn handler_for(&self, path: &Path) -> Option<&dyn AttachmentHandler> {
        self.handlers
            .iter()
            .find(|h| h.accepts(path))
            .map(|h| h.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }
}

/// Markdown link to a stored asset; targets with spaces are wrapped in `<>`.
pub(crate) fn asset_link(label: &str, rel: &str, image: bool) -> String {
    let target = if rel.contains(' ') {
        format!("<{rel}>")
    } else {
        rel.to_string()
    };
    let bang = if image { "!" } else { "" };
    format!("{bang}[{label}]({target})")
}

fn file_name_str(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_picks_handlers_in_priority_order() {
        let registry = HandlerRegistry::default();
        assert_eq!(registry.names(), vec!["text", "document", "image", "binary"]);

        let pick = |name: &str| registry.handler_for(Path::new(name)).map(|h| h.name());
        assert_eq!(pick("notes.txt"), Some("text"));
        assert_eq!(pick("README.md"), Some("text"));
        assert_eq!(pick("report.PDF"), Some("document"));
        assert_eq!(pick("photo.heic"), Some("image"));
        assert_eq!(pick("archive.zip"), Some("binary"));
        assert_eq!(pick("no_extension"), Some("binary"));
    }

    #[test]
    fn asset_links_wrap_spaces() {
        assert_eq!(asset_link("a", "assets/n/a.png", true), "![a](assets/n/a.png)");
        assert_eq!(asset_link("b c", "assets/n/b c.pdf", false), "[b c](<assets/n/b c.pdf>)");
    }
}
