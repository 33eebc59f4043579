//! Image attachments: copied or transcoded, optionally described.

use std::path::Path;

use notefold_shared::{IssueKind, Processed, Report, Result, is_image_name, retry_io};

use super::{AttachmentBody, AttachmentHandler, HandlerContext, asset_link, file_name_str};

pub struct ImageHandler;

impl AttachmentHandler for ImageHandler {
    fn name(&self) -> &'static str {
        "image"
    }

    fn accepts(&self, path: &Path) -> bool {
        is_image_name(&file_name_str(path))
    }

    fn process(&self, ctx: &HandlerContext<'_>) -> Result<Processed<AttachmentBody>> {
        let mut report = Report::default();
        let file_name = ctx.file_name();

        let stored = ctx
            .sink
            .store_image(ctx.doc_slug, ctx.path, ctx.collaborators.codec.as_ref(), ctx.scope)?;
        report.merge(stored.report);
        let mut body = asset_link(&file_name, &stored.value.rel, true);

        if let Some(describer) = &ctx.collaborators.describer {
            let bytes = retry_io(ctx.retry, "read", ctx.path, || std::fs::read(ctx.path))?;
            match describer.describe(&file_name, &bytes) {
                Ok(description) if !description.is_empty() => {
                    body.push_str("\n\n");
                    let quoted: Vec<String> =
                        description.lines().map(|l| format!("> {l}").trim_end().to_string()).collect();
                    body.push_str(&quoted.join("\n"));
                }
                Ok(_) => {}
                Err(e) => report.warning(
                    IssueKind::Conversion,
                    ctx.scope,
                    format!("{}: no description: {e}", ctx.rel_name),
                ),
            }
        }

        Ok(Processed::new(AttachmentBody::linked(body, stored.value.rel), report))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::collaborators::ImageDescriber;
    use crate::handlers::test_support::Fixture;

    struct Fixed;

    impl ImageDescriber for Fixed {
        fn describe(&self, _file_name: &str, _bytes: &[u8]) -> Result<String> {
            Ok("A whiteboard.\n\nWith arrows.".into())
        }
    }

    #[test]
    fn links_the_stored_image() {
        let fx = Fixture::new("img");
        let path = fx.file("board.png", b"png");
        let out = ImageHandler.process(&fx.context(&path, "board.png")).unwrap();
        assert_eq!(out.value.body, "![board.png](assets/note/board.png)");
    }

    #[test]
    fn description_is_quoted_below_the_image() {
        let mut fx = Fixture::new("img");
        fx.collaborators.describer = Some(Arc::new(Fixed));
        let path = fx.file("board.jpg", b"jpg");
        let out = ImageHandler.process(&fx.context(&path, "board.jpg")).unwrap();
        assert_eq!(
            out.value.body,
            "![board.jpg](assets/note/board.jpg)\n\n> A whiteboard.\n>\n> With arrows."
        );
    }
}
