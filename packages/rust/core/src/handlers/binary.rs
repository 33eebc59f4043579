//! Fallback handler: copy the file and link it.

use std::path::Path;

use notefold_shared::{Processed, Report, Result};

use super::{AttachmentBody, AttachmentHandler, HandlerContext, asset_link};

pub struct BinaryHandler;

impl AttachmentHandler for BinaryHandler {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn accepts(&self, _path: &Path) -> bool {
        true
    }

    fn process(&self, ctx: &HandlerContext<'_>) -> Result<Processed<AttachmentBody>> {
        let stored = ctx.sink.copy(ctx.doc_slug, ctx.path)?;
        let size = std::fs::metadata(&stored.path).map(|m| m.len()).unwrap_or(0);
        let body = format!(
            "{}\n\n_{size} bytes_",
            asset_link(&ctx.file_name(), &stored.rel, false)
        );
        Ok(Processed::new(
            AttachmentBody::linked(body, stored.rel),
            Report::default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::Fixture;

    #[test]
    fn copies_and_links() {
        let fx = Fixture::new("bin");
        let path = fx.file("data.zip", &[0u8; 10]);
        let out = BinaryHandler.process(&fx.context(&path, "data.zip")).unwrap();
        assert_eq!(out.value.body, "[data.zip](assets/note/data.zip)\n\n_10 bytes_");
        assert_eq!(out.value.assets, vec!["assets/note/data.zip".to_string()]);
        assert!(fx.dir.join("out/assets/note/data.zip").is_file());
    }

    #[test]
    fn missing_file_is_an_error() {
        let fx = Fixture::new("bin");
        let path = fx.dir.join("in/gone.bin");
        assert!(BinaryHandler.process(&fx.context(&path, "gone.bin")).is_err());
    }
}
