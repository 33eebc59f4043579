//! Office/PDF attachments: the original is copied, and the format converter
//! (when configured) supplies an inline markdown rendition.

use std::path::Path;

use notefold_shared::{IssueKind, Processed, Report, Result, is_document_name, retry_io};

use super::{AttachmentBody, AttachmentHandler, HandlerContext, asset_link, file_name_str};

pub struct DocumentHandler;

impl AttachmentHandler for DocumentHandler {
    fn name(&self) -> &'static str {
        "document"
    }

    fn accepts(&self, path: &Path) -> bool {
        is_document_name(&file_name_str(path))
    }

    fn process(&self, ctx: &HandlerContext<'_>) -> Result<Processed<AttachmentBody>> {
        let mut report = Report::default();
        let file_name = ctx.file_name();
        let stored = ctx.sink.copy(ctx.doc_slug, ctx.path)?;
        let link = asset_link(&file_name, &stored.rel, false);

        let Some(converter) = &ctx.collaborators.converter else {
            return Ok(Processed::new(AttachmentBody::linked(link, stored.rel), report));
        };

        let bytes = retry_io(ctx.retry, "read", ctx.path, || std::fs::read(ctx.path))?;
        let body = match converter.convert(&file_name, &bytes) {
            Ok(markdown) if !markdown.trim().is_empty() => {
                format!("{link}\n\n{}", notefold_markdown::normalize(&markdown).trim_end())
            }
            Ok(_) => {
                report.warning(
                    IssueKind::Conversion,
                    ctx.scope,
                    format!("{}: converter returned no text", ctx.rel_name),
                );
                link
            }
            Err(e) => {
                report.error(
                    IssueKind::Conversion,
                    ctx.scope,
                    format!("{}: {e}", ctx.rel_name),
                );
                format!("{link}\n\n> _Conversion failed for {file_name}; the original is linked above._")
            }
        };
        Ok(Processed::new(AttachmentBody::linked(body, stored.rel), report))
    }
}
